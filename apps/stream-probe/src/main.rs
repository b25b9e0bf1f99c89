mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use stream_link::{ConnectionManager, ConnectionState, LinkEvent};
use stream_transport::{Endpoint, WsTransport};
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

fn init_tracing(config: &Config) -> Result<()> {
	let filter = EnvFilter::from_str(&config.rust_log)?;

	let layer = if config.log_json {
		tracing_subscriber::fmt::layer().json().flatten_event(true).with_filter(filter).boxed()
	} else {
		tracing_subscriber::fmt::layer().with_target(true).with_filter(filter).boxed()
	};

	tracing_subscriber::registry().with(layer).init();
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let config = Config::parse();
	init_tracing(&config)?;

	let transport = Arc::new(WsTransport::new(Duration::from_secs(config.ping_interval)));
	let link = ConnectionManager::new(transport, config.link_config())?;
	let mut events = link.subscribe();

	let mut endpoint = Endpoint::new(config.url.clone());
	if let Some(protocol) = &config.protocol {
		endpoint = endpoint.with_subprotocols([protocol.as_str()]);
	}

	info!(url = %config.url, connection_id = %link.id(), "connecting");
	link.connect(endpoint, config.auth()).await?;

	let mut pending_send = config.send.clone();

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!("received shutdown signal");
				break;
			}
			event = events.recv() => {
				let Some(event) = event else {
					warn!("event stream ended");
					break;
				};
				match event {
					LinkEvent::StateChanged { from, to } => {
						info!(%from, %to, "state changed");
						if to == ConnectionState::Connected {
							if let Some(content) = pending_send.take() {
								let entry = link.send_optimistic(content).await?;
								info!(local_id = %entry.local_id, "sent message");
							}
						}
					}
					LinkEvent::Flush { chunks } => {
						for chunk in chunks {
							println!("[{}#{}] {}", chunk.stream_id, chunk.seq, chunk.text().unwrap_or("<binary>"));
						}
					}
					LinkEvent::StreamEnded { stream_id } => info!(%stream_id, "stream ended"),
					LinkEvent::Entry(entry) => info!(entry = %serde_json::to_string(&entry)?, "entry updated"),
					LinkEvent::EntryRemoved { local_id } => info!(%local_id, "entry removed"),
					LinkEvent::Metrics(snapshot) => info!(metrics = %serde_json::to_string(&snapshot)?, "metrics"),
					LinkEvent::Backpressure { engaged } => warn!(engaged, "backpressure"),
					LinkEvent::ConnectionLost { attempts, reason } => {
						error!(attempts, %reason, "connection lost");
						break;
					}
					LinkEvent::Closed => break,
				}
			}
		}
	}

	link.shutdown().await;
	print!("{}", link.prometheus_text()?);
	Ok(())
}

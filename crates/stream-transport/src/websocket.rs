//! WebSocket transport over `tokio-tungstenite`
//!
//! `open` builds the handshake request (credential and sub-protocols
//! applied), connects, and spawns a pump task that owns the socket: it forwards
//! inbound frames to the session, writes queued outbound frames, answers pings
//! and sends its own keepalive pings. Cancelling the session token sends a
//! close frame and stops the pump.

#![cfg(feature = "websocket")]

use crate::error::{Result, TransportError};
use crate::frame::{Credential, Frame, OpenRequest, TransportEvent};
use crate::session::Session;
use crate::traits::Transport;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{
		client::IntoClientRequest,
		http::{
			header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL},
			HeaderValue, Request, StatusCode,
		},
		Error as WsError, Message,
	},
	MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsTransport {
	ping_interval: Duration,
}

impl WsTransport {
	#[must_use]
	pub const fn new(ping_interval: Duration) -> Self {
		Self { ping_interval }
	}
}

impl Default for WsTransport {
	fn default() -> Self {
		Self::new(Duration::from_secs(30))
	}
}

#[async_trait::async_trait]
impl Transport for WsTransport {
	async fn open(&self, request: OpenRequest) -> Result<Session> {
		let handshake = build_request(&request)?;
		let (stream, response) = connect_async(handshake).await.map_err(handshake_error)?;

		let protocol = response.headers().get(SEC_WEBSOCKET_PROTOCOL).and_then(|v| v.to_str().ok()).map(str::to_owned);
		info!(endpoint = %request.endpoint, protocol = ?protocol, "WebSocket handshake complete");

		let (outbound_tx, outbound_rx) = mpsc::channel(request.outbound_capacity.max(1));
		let (inbound_tx, inbound_rx) = mpsc::channel(request.inbound_capacity.max(1));
		let cancel = CancellationToken::new();

		tokio::spawn(pump(stream, outbound_rx, inbound_tx, cancel.clone(), self.ping_interval));

		Ok(Session::new(outbound_tx, inbound_rx, cancel).with_protocol(protocol))
	}

	fn name(&self) -> &'static str {
		"websocket"
	}
}

fn build_request(request: &OpenRequest) -> Result<Request<()>> {
	let mut url = Url::parse(&request.endpoint.url).map_err(|e| TransportError::Handshake(format!("invalid endpoint url: {e}")))?;

	if let Some(Credential::Ticket { ticket, url: ticket_url }) = &request.credential {
		if let Some(ticket_url) = ticket_url {
			url = Url::parse(ticket_url).map_err(|e| TransportError::Handshake(format!("invalid ticket url: {e}")))?;
		}
		url.query_pairs_mut().append_pair("ticket", ticket);
	}

	let mut handshake = url.as_str().into_client_request().map_err(|e| TransportError::Handshake(e.to_string()))?;

	if let Some(Credential::Bearer(token)) = &request.credential {
		let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| TransportError::Handshake("bearer token is not a valid header value".to_string()))?;
		handshake.headers_mut().insert(AUTHORIZATION, value);
	}

	if !request.endpoint.subprotocols.is_empty() {
		let value = HeaderValue::from_str(&request.endpoint.subprotocols.join(", ")).map_err(|_| TransportError::Handshake("invalid sub-protocol list".to_string()))?;
		handshake.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
	}

	Ok(handshake)
}

fn handshake_error(error: WsError) -> TransportError {
	match error {
		WsError::Http(response) => {
			let status = response.status();
			if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
				TransportError::Unauthorized(status.to_string())
			} else {
				TransportError::Handshake(format!("unexpected HTTP status {status}"))
			}
		}
		other => TransportError::Handshake(other.to_string()),
	}
}

fn to_message(frame: Frame) -> Message {
	match frame {
		Frame::Text(text) => Message::text(text),
		Frame::Binary(data) => Message::binary(data),
	}
}

async fn pump(stream: WsStream, mut outbound: mpsc::Receiver<Frame>, inbound: mpsc::Sender<TransportEvent>, cancel: CancellationToken, ping_interval: Duration) {
	let (mut sink, mut source) = stream.split();
	let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);
	ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

	loop {
		tokio::select! {
			() = cancel.cancelled() => {
				debug!("session cancelled, sending close frame");
				let _ = sink.send(Message::Close(None)).await;
				break;
			}
			frame = outbound.recv() => {
				let Some(frame) = frame else {
					let _ = sink.send(Message::Close(None)).await;
					break;
				};
				if let Err(e) = sink.send(to_message(frame)).await {
					warn!("WebSocket send failed: {}", e);
					let _ = inbound.send(TransportEvent::Error(TransportError::SendFailed(e.to_string()))).await;
					break;
				}
			}
			msg = source.next() => {
				let event = match msg {
					Some(Ok(Message::Text(text))) => TransportEvent::Message(Frame::Text(text.to_string())),
					Some(Ok(Message::Binary(data))) => TransportEvent::Message(Frame::Binary(Bytes::copy_from_slice(&data))),
					Some(Ok(Message::Ping(payload))) => {
						let _ = sink.send(Message::Pong(payload)).await;
						continue;
					}
					Some(Ok(Message::Close(frame))) => {
						info!("WebSocket close frame received");
						let (code, reason) = frame.map_or((None, None), |f| (Some(u16::from(f.code)), Some(f.reason.to_string())));
						let _ = inbound.send(TransportEvent::Closed { code, reason }).await;
						break;
					}
					Some(Ok(_)) => continue,
					Some(Err(e)) => {
						warn!("WebSocket error: {}", e);
						let _ = inbound.send(TransportEvent::Error(TransportError::Io(e.to_string()))).await;
						break;
					}
					None => {
						info!("WebSocket stream ended");
						let _ = inbound.send(TransportEvent::Closed { code: None, reason: None }).await;
						break;
					}
				};

				if inbound.send(event).await.is_err() {
					debug!("session receiver dropped, stopping pump");
					break;
				}
			}
			_ = ping.tick() => {
				if sink.send(Message::Ping(Default::default())).await.is_err() {
					let _ = inbound.send(TransportEvent::Error(TransportError::Io("failed to send ping".to_string()))).await;
					break;
				}
			}
		}
	}
}

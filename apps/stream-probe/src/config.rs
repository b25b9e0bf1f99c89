use clap::Parser;
use serde::{Deserialize, Serialize};
use stream_link::{AuthConfig, LinkConfig};

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about = "Connects to a streaming endpoint and prints what arrives", long_about = None)]
pub struct Config {
	/// WebSocket endpoint, ws:// or wss://
	#[arg(long, env = "STREAM_URL")]
	pub url: String,

	/// Bearer token sent with the handshake
	#[arg(long, env = "STREAM_TOKEN")]
	pub token: Option<String>,

	/// Subprotocol to negotiate
	#[arg(long, env = "STREAM_PROTOCOL")]
	pub protocol: Option<String>,

	/// Message to send optimistically once connected
	#[arg(long)]
	pub send: Option<String>,

	/// Use JSON formatting for tracing
	#[arg(long, env = "LOG_JSON", default_value = "false")]
	pub log_json: bool,

	/// Log filter
	#[arg(long, env = "RUST_LOG", default_value = "info,stream_link=debug")]
	pub rust_log: String,

	#[arg(long, env = "BUFFER_CAPACITY", default_value = "1024")]
	pub buffer_capacity: usize,

	#[arg(long, env = "TARGET_FPS", default_value = "60")]
	pub target_fps: u32,

	#[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value = "5")]
	pub max_reconnect_attempts: u32,

	/// First reconnect delay in milliseconds, doubled per attempt
	#[arg(long, env = "BASE_DELAY_MS", default_value = "1000")]
	pub base_delay_ms: u64,

	#[arg(long, env = "MAX_DELAY_MS")]
	pub max_delay_ms: Option<u64>,

	#[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "10000")]
	pub connect_timeout_ms: u64,

	/// Seconds between keepalive pings
	#[arg(long, env = "PING_INTERVAL", default_value = "30")]
	pub ping_interval: u64,

	/// Milliseconds between metrics snapshots, 0 to disable
	#[arg(long, env = "METRICS_INTERVAL_MS", default_value = "5000")]
	pub metrics_interval_ms: u64,

	/// Drop chunks on a full buffer instead of pausing reads
	#[arg(long, env = "NO_FLOW_CONTROL")]
	pub no_flow_control: bool,
}

impl Config {
	pub fn link_config(&self) -> LinkConfig {
		LinkConfig::default()
			.with_buffer_capacity(self.buffer_capacity)
			.with_target_fps(self.target_fps)
			.with_retry(self.max_reconnect_attempts, self.base_delay_ms, self.max_delay_ms)
			.with_connect_timeout(self.connect_timeout_ms)
			.with_metrics_interval(self.metrics_interval_ms)
			.with_flow_control(!self.no_flow_control)
	}

	pub fn auth(&self) -> AuthConfig {
		self.token.as_ref().map_or(AuthConfig::None, AuthConfig::bearer)
	}
}

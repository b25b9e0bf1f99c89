use crate::error::{LinkError, Result};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
	/// Maximum chunks held between flushes
	#[serde(default = "default_buffer_capacity")]
	pub buffer_capacity: usize,

	/// Fraction of capacity at which the buffer reports backpressure
	#[serde(default = "default_high_water_ratio")]
	pub high_water_ratio: f64,

	/// Flushes per second
	#[serde(default = "default_target_fps")]
	pub target_fps: u32,

	#[serde(default = "default_max_reconnect_attempts")]
	pub max_reconnect_attempts: u32,

	/// First reconnect delay (ms); doubles on every attempt
	#[serde(default = "default_base_delay")]
	pub base_delay_ms: u64,

	/// Cap on a single reconnect delay (ms). Absent means uncapped.
	#[serde(default)]
	pub max_delay_ms: Option<u64>,

	/// Window for a handshake to open or fail (ms)
	#[serde(default = "default_connect_timeout")]
	pub connect_timeout_ms: u64,

	#[serde(default = "default_outbound_queue")]
	pub outbound_queue: usize,

	#[serde(default = "default_inbound_queue")]
	pub inbound_queue: usize,

	/// Events retained for slow subscribers before the oldest are dropped
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,

	#[serde(default = "default_command_capacity")]
	pub command_capacity: usize,

	/// Transitions and reconnect attempts kept for diagnostics
	#[serde(default = "default_history_limit")]
	pub history_limit: usize,

	#[serde(default = "default_latency_samples")]
	pub latency_samples: usize,

	/// Period of `Metrics` events (ms). 0 disables them.
	#[serde(default = "default_metrics_interval")]
	pub metrics_interval_ms: u64,

	/// Stop reading the transport while the buffer is backpressured
	#[serde(default = "default_flow_control")]
	pub flow_control: bool,
}

fn default_buffer_capacity() -> usize {
	1024
}

fn default_high_water_ratio() -> f64 {
	0.8
}

fn default_target_fps() -> u32 {
	60
}

fn default_max_reconnect_attempts() -> u32 {
	5
}

fn default_base_delay() -> u64 {
	1000
}

fn default_connect_timeout() -> u64 {
	10_000
}

fn default_outbound_queue() -> usize {
	256
}

fn default_inbound_queue() -> usize {
	1024
}

fn default_event_capacity() -> usize {
	1024
}

fn default_command_capacity() -> usize {
	64
}

fn default_history_limit() -> usize {
	64
}

fn default_latency_samples() -> usize {
	100
}

fn default_metrics_interval() -> u64 {
	1000
}

fn default_flow_control() -> bool {
	true
}

impl LinkConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
		self.buffer_capacity = capacity;
		self
	}

	#[must_use]
	pub fn with_high_water_ratio(mut self, ratio: f64) -> Self {
		self.high_water_ratio = ratio;
		self
	}

	#[must_use]
	pub const fn with_target_fps(mut self, fps: u32) -> Self {
		self.target_fps = fps;
		self
	}

	#[must_use]
	pub const fn with_retry(mut self, max_attempts: u32, base_delay_ms: u64, max_delay_ms: Option<u64>) -> Self {
		self.max_reconnect_attempts = max_attempts;
		self.base_delay_ms = base_delay_ms;
		self.max_delay_ms = max_delay_ms;
		self
	}

	#[must_use]
	pub const fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
		self.connect_timeout_ms = timeout_ms;
		self
	}

	#[must_use]
	pub const fn with_metrics_interval(mut self, interval_ms: u64) -> Self {
		self.metrics_interval_ms = interval_ms;
		self
	}

	#[must_use]
	pub const fn with_flow_control(mut self, enabled: bool) -> Self {
		self.flow_control = enabled;
		self
	}

	#[must_use]
	pub const fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}

	#[must_use]
	pub const fn metrics_interval(&self) -> Option<Duration> {
		if self.metrics_interval_ms == 0 {
			None
		} else {
			Some(Duration::from_millis(self.metrics_interval_ms))
		}
	}

	#[must_use]
	pub fn retry(&self) -> RetryConfig {
		RetryConfig {
			max_attempts: self.max_reconnect_attempts,
			base_delay: Duration::from_millis(self.base_delay_ms),
			max_delay: self.max_delay_ms.map(Duration::from_millis),
			history_limit: self.history_limit,
		}
	}

	/// # Errors
	/// `LinkError::Config` naming the first offending field.
	pub fn validate(&self) -> Result<()> {
		if self.buffer_capacity == 0 {
			return Err(LinkError::Config("buffer_capacity must be at least 1".into()));
		}
		if !(self.high_water_ratio > 0.0 && self.high_water_ratio <= 1.0) {
			return Err(LinkError::Config(format!("high_water_ratio must be in (0, 1], got {}", self.high_water_ratio)));
		}
		if self.target_fps == 0 {
			return Err(LinkError::Config("target_fps must be at least 1".into()));
		}
		if self.base_delay_ms == 0 {
			return Err(LinkError::Config("base_delay_ms must be at least 1".into()));
		}
		if let Some(max) = self.max_delay_ms {
			if max < self.base_delay_ms {
				return Err(LinkError::Config(format!("max_delay_ms ({max}) is below base_delay_ms ({})", self.base_delay_ms)));
			}
		}
		if self.connect_timeout_ms == 0 {
			return Err(LinkError::Config("connect_timeout_ms must be at least 1".into()));
		}
		for (name, value) in [
			("outbound_queue", self.outbound_queue),
			("inbound_queue", self.inbound_queue),
			("event_capacity", self.event_capacity),
			("command_capacity", self.command_capacity),
		] {
			if value == 0 {
				return Err(LinkError::Config(format!("{name} must be at least 1")));
			}
		}
		Ok(())
	}
}

impl Default for LinkConfig {
	fn default() -> Self {
		Self {
			buffer_capacity: default_buffer_capacity(),
			high_water_ratio: default_high_water_ratio(),
			target_fps: default_target_fps(),
			max_reconnect_attempts: default_max_reconnect_attempts(),
			base_delay_ms: default_base_delay(),
			max_delay_ms: None,
			connect_timeout_ms: default_connect_timeout(),
			outbound_queue: default_outbound_queue(),
			inbound_queue: default_inbound_queue(),
			event_capacity: default_event_capacity(),
			command_capacity: default_command_capacity(),
			history_limit: default_history_limit(),
			latency_samples: default_latency_samples(),
			metrics_interval_ms: default_metrics_interval(),
			flow_control: default_flow_control(),
		}
	}
}

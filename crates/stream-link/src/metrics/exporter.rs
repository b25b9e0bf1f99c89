use crate::types::ConnectionId;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::time::Duration;

/// Prometheus view of one link.
///
/// Each instance registers into its own [`Registry`], so several managers in
/// one process never collide on metric names.
#[derive(Debug, Clone)]
pub struct LinkMetrics {
	registry: Registry,

	pub chunks_received_total: IntCounter,
	pub chunks_dropped_total: IntCounter,
	pub backpressure_events_total: IntCounter,
	pub reconnect_attempts_total: IntCounter,
	pub frames_rendered_total: IntCounter,
	pub dropped_frames_total: IntCounter,
	pub malformed_frames_total: IntCounter,
	pub buffer_size: IntGauge,
	pub delivery_latency_seconds: Histogram,
}

impl LinkMetrics {
	pub fn new(connection_id: ConnectionId) -> Result<Self, prometheus::Error> {
		let labels = HashMap::from([("connection_id".to_string(), connection_id.to_string())]);
		let registry = Registry::new_custom(Some("stream_link".to_string()), Some(labels))?;

		let chunks_received_total = IntCounter::with_opts(Opts::new("chunks_received_total", "Total number of chunks decoded from the transport"))?;
		let chunks_dropped_total = IntCounter::with_opts(Opts::new("chunks_dropped_total", "Total number of chunks rejected by a full buffer"))?;
		let backpressure_events_total = IntCounter::with_opts(Opts::new("backpressure_events_total", "Total number of times the buffer crossed its high-water mark"))?;
		let reconnect_attempts_total = IntCounter::with_opts(Opts::new("reconnect_attempts_total", "Total number of scheduled reconnect attempts"))?;
		let frames_rendered_total = IntCounter::with_opts(Opts::new("frames_rendered_total", "Total number of flushes delivered to observers"))?;
		let dropped_frames_total = IntCounter::with_opts(Opts::new("dropped_frames_total", "Total number of frame slots missed while content waited"))?;
		let malformed_frames_total = IntCounter::with_opts(Opts::new("malformed_frames_total", "Total number of inbound frames that failed to decode"))?;
		let buffer_size = IntGauge::with_opts(Opts::new("buffer_size", "Chunks currently waiting in the stream buffer"))?;
		let delivery_latency_seconds = Histogram::with_opts(
			HistogramOpts::new("delivery_latency_seconds", "Time the oldest chunk of a flush spent buffered").buckets(vec![0.001, 0.005, 0.01, 0.017, 0.033, 0.05, 0.1, 0.25, 0.5, 1.0]),
		)?;

		registry.register(Box::new(chunks_received_total.clone()))?;
		registry.register(Box::new(chunks_dropped_total.clone()))?;
		registry.register(Box::new(backpressure_events_total.clone()))?;
		registry.register(Box::new(reconnect_attempts_total.clone()))?;
		registry.register(Box::new(frames_rendered_total.clone()))?;
		registry.register(Box::new(dropped_frames_total.clone()))?;
		registry.register(Box::new(malformed_frames_total.clone()))?;
		registry.register(Box::new(buffer_size.clone()))?;
		registry.register(Box::new(delivery_latency_seconds.clone()))?;

		Ok(Self {
			registry,
			chunks_received_total,
			chunks_dropped_total,
			backpressure_events_total,
			reconnect_attempts_total,
			frames_rendered_total,
			dropped_frames_total,
			malformed_frames_total,
			buffer_size,
			delivery_latency_seconds,
		})
	}

	#[allow(clippy::cast_possible_wrap)]
	pub fn set_buffer_size(&self, size: usize) {
		self.buffer_size.set(size as i64);
	}

	pub fn observe_latency(&self, latency: Duration) {
		self.delivery_latency_seconds.observe(latency.as_secs_f64());
	}

	#[must_use]
	pub const fn registry(&self) -> &Registry {
		&self.registry
	}

	/// Text exposition format of every metric in this link's registry.
	pub fn encode(&self) -> Result<String, prometheus::Error> {
		let mut buffer = Vec::new();
		TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
		String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_two_links_do_not_collide() {
		let a = LinkMetrics::new(ConnectionId::new()).unwrap();
		let b = LinkMetrics::new(ConnectionId::new()).unwrap();

		a.chunks_dropped_total.inc();
		assert_eq!(a.chunks_dropped_total.get(), 1);
		assert_eq!(b.chunks_dropped_total.get(), 0);
	}

	#[test]
	fn test_encode_includes_prefixed_names_and_label() {
		let id = ConnectionId::new();
		let metrics = LinkMetrics::new(id).unwrap();
		metrics.chunks_received_total.inc_by(3);
		metrics.set_buffer_size(12);
		metrics.observe_latency(Duration::from_millis(20));

		let text = metrics.encode().unwrap();
		assert!(text.contains("stream_link_chunks_received_total"));
		assert!(text.contains("stream_link_buffer_size"));
		assert!(text.contains("stream_link_delivery_latency_seconds_bucket"));
		assert!(text.contains(&id.to_string()));
	}
}

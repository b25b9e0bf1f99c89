mod exporter;

pub use exporter::LinkMetrics;

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Point-in-time view of a link's health, handed to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
	pub messages_per_second: u64,
	pub frames_per_second: u64,
	pub dropped_frames: u64,
	pub buffer_size: usize,
	pub backpressure_events: u64,
	pub average_latency_ms: f64,
	pub chunks_dropped: u64,
	pub malformed_frames: u64,
	pub reconnect_attempts: u32,
}

/// Figures owned by other components, merged into a snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkGauges {
	pub buffer_size: usize,
	pub backpressure_events: u64,
	pub reconnect_attempts: u32,
}

/// One-second rolling counters plus bounded latency samples.
///
/// Timestamps older than the window are evicted on every record and every
/// read, so retained samples never exceed one window.
#[derive(Debug)]
pub struct PerformanceMonitor {
	messages: VecDeque<Instant>,
	frames: VecDeque<Instant>,
	latencies: VecDeque<Duration>,
	latency_limit: usize,
	dropped_frames: u64,
	chunks_dropped: u64,
	malformed_frames: u64,
}

impl PerformanceMonitor {
	#[must_use]
	pub fn new(latency_limit: usize) -> Self {
		Self {
			messages: VecDeque::new(),
			frames: VecDeque::new(),
			latencies: VecDeque::with_capacity(latency_limit.min(1024)),
			latency_limit,
			dropped_frames: 0,
			chunks_dropped: 0,
			malformed_frames: 0,
		}
	}

	pub fn record_message(&mut self, now: Instant) {
		evict(&mut self.messages, now);
		self.messages.push_back(now);
	}

	pub fn record_frame(&mut self, now: Instant) {
		evict(&mut self.frames, now);
		self.frames.push_back(now);
	}

	pub fn record_chunks_dropped(&mut self, count: u64) {
		self.chunks_dropped += count;
	}

	pub fn record_dropped_frames(&mut self, count: u64) {
		self.dropped_frames += count;
	}

	pub fn record_chunk_dropped(&mut self) {
		self.chunks_dropped += 1;
	}

	pub fn record_malformed_frame(&mut self) {
		self.malformed_frames += 1;
	}

	pub fn record_latency(&mut self, sample: Duration) {
		if self.latency_limit == 0 {
			return;
		}
		if self.latencies.len() == self.latency_limit {
			self.latencies.pop_front();
		}
		self.latencies.push_back(sample);
	}

	pub fn messages_per_second(&mut self, now: Instant) -> u64 {
		evict(&mut self.messages, now);
		self.messages.len() as u64
	}

	pub fn frames_per_second(&mut self, now: Instant) -> u64 {
		evict(&mut self.frames, now);
		self.frames.len() as u64
	}

	#[must_use]
	pub const fn dropped_frames(&self) -> u64 {
		self.dropped_frames
	}

	#[must_use]
	pub const fn chunks_dropped(&self) -> u64 {
		self.chunks_dropped
	}

	#[must_use]
	pub const fn malformed_frames(&self) -> u64 {
		self.malformed_frames
	}

	/// Mean of the retained latency samples in milliseconds, 0 when empty.
	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn average_latency_ms(&self) -> f64 {
		if self.latencies.is_empty() {
			return 0.0;
		}
		let total: Duration = self.latencies.iter().sum();
		total.as_secs_f64() * 1000.0 / self.latencies.len() as f64
	}

	pub fn snapshot(&mut self, now: Instant, gauges: LinkGauges) -> MetricsSnapshot {
		MetricsSnapshot {
			messages_per_second: self.messages_per_second(now),
			frames_per_second: self.frames_per_second(now),
			dropped_frames: self.dropped_frames,
			buffer_size: gauges.buffer_size,
			backpressure_events: gauges.backpressure_events,
			average_latency_ms: self.average_latency_ms(),
			chunks_dropped: self.chunks_dropped,
			malformed_frames: self.malformed_frames,
			reconnect_attempts: gauges.reconnect_attempts,
		}
	}
}

impl Default for PerformanceMonitor {
	fn default() -> Self {
		Self::new(100)
	}
}

fn evict(timestamps: &mut VecDeque<Instant>, now: Instant) {
	while let Some(&timestamp) = timestamps.front() {
		if now.saturating_duration_since(timestamp) >= WINDOW {
			timestamps.pop_front();
		} else {
			break;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_window_evicts_old_samples_on_read() {
		let mut monitor = PerformanceMonitor::default();
		let start = Instant::now();

		for ms in [0, 100, 200, 900] {
			monitor.record_message(start + Duration::from_millis(ms));
		}
		assert_eq!(monitor.messages_per_second(start + Duration::from_millis(950)), 4);
		assert_eq!(monitor.messages_per_second(start + Duration::from_millis(1150)), 2);
		assert_eq!(monitor.messages_per_second(start + Duration::from_secs(3)), 0);
	}

	#[test]
	fn test_unread_window_stays_bounded() {
		let mut monitor = PerformanceMonitor::default();
		let start = Instant::now();

		for ms in 0..100_000 {
			let at = start + Duration::from_millis(ms);
			monitor.record_message(at);
			monitor.record_frame(at);
		}

		assert!(monitor.messages.len() <= 1000);
		assert!(monitor.frames.len() <= 1000);
		assert_eq!(monitor.messages_per_second(start + Duration::from_millis(99_999)), 1000);
	}

	#[test]
	fn test_latency_samples_are_bounded() {
		let mut monitor = PerformanceMonitor::new(3);
		for ms in [100, 10, 20, 30] {
			monitor.record_latency(Duration::from_millis(ms));
		}
		assert!((monitor.average_latency_ms() - 20.0).abs() < 1e-9);
	}

	#[test]
	fn test_empty_latency_is_zero() {
		assert!(PerformanceMonitor::default().average_latency_ms().abs() < f64::EPSILON);
	}

	#[test]
	fn test_snapshot_merges_gauges() {
		let mut monitor = PerformanceMonitor::default();
		let now = Instant::now();
		monitor.record_frame(now);
		monitor.record_dropped_frames(2);
		monitor.record_chunk_dropped();

		let snapshot = monitor.snapshot(now, LinkGauges { buffer_size: 7, backpressure_events: 1, reconnect_attempts: 3 });

		assert_eq!(snapshot.frames_per_second, 1);
		assert_eq!(snapshot.dropped_frames, 2);
		assert_eq!(snapshot.chunks_dropped, 1);
		assert_eq!(snapshot.buffer_size, 7);
		assert_eq!(snapshot.backpressure_events, 1);
		assert_eq!(snapshot.reconnect_attempts, 3);
	}
}

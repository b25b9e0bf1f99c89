use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Instant;

/// One sequenced unit of streamed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
	pub stream_id: String,
	pub seq: u64,
	pub payload: Bytes,
	pub arrived_at: Instant,
}

impl Chunk {
	pub fn new(stream_id: impl Into<String>, seq: u64, payload: impl Into<Bytes>, arrived_at: Instant) -> Self {
		Self {
			stream_id: stream_id.into(),
			seq,
			payload: payload.into(),
			arrived_at,
		}
	}

	/// Payload size in bytes.
	#[must_use]
	pub fn size(&self) -> usize {
		self.payload.len()
	}

	/// Payload as text, if it is valid UTF-8.
	#[must_use]
	pub fn text(&self) -> Option<&str> {
		std::str::from_utf8(&self.payload).ok()
	}
}

/// Bounded FIFO of pending chunks.
///
/// `len() <= capacity()` always holds. A full buffer rejects new chunks and
/// never evicts the ones already queued.
#[derive(Debug)]
pub struct StreamBuffer {
	chunks: VecDeque<Chunk>,
	capacity: usize,
	high_water_mark: usize,
}

impl StreamBuffer {
	/// Buffer with the high-water mark at 80% of `capacity`.
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self::with_watermark(capacity, 0.8)
	}

	/// Buffer whose high-water mark is `ceil(capacity * ratio)`, at least 1.
	#[must_use]
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
	pub fn with_watermark(capacity: usize, ratio: f64) -> Self {
		let ratio = ratio.clamp(0.0, 1.0);
		// 1e-9 keeps 50 * 0.8 from rounding up to 41
		let high_water_mark = ((capacity as f64) * ratio - 1e-9).ceil() as usize;

		Self {
			chunks: VecDeque::with_capacity(capacity.min(4096)),
			capacity,
			high_water_mark: high_water_mark.clamp(1, capacity.max(1)),
		}
	}

	/// Append a chunk. Returns `false` without blocking once the buffer is full.
	pub fn enqueue(&mut self, chunk: Chunk) -> bool {
		if self.chunks.len() >= self.capacity {
			return false;
		}
		self.chunks.push_back(chunk);
		true
	}

	/// Pop the oldest chunk.
	pub fn dequeue(&mut self) -> Option<Chunk> {
		self.chunks.pop_front()
	}

	/// Take every pending chunk, oldest first.
	pub fn drain(&mut self) -> Vec<Chunk> {
		self.chunks.drain(..).collect()
	}

	pub fn clear(&mut self) {
		self.chunks.clear();
	}

	#[must_use]
	pub fn peek(&self) -> Option<&Chunk> {
		self.chunks.front()
	}

	#[must_use]
	pub fn is_backpressured(&self) -> bool {
		self.chunks.len() >= self.high_water_mark
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	#[must_use]
	pub fn is_full(&self) -> bool {
		self.chunks.len() >= self.capacity
	}

	#[must_use]
	pub const fn capacity(&self) -> usize {
		self.capacity
	}

	#[must_use]
	pub const fn high_water_mark(&self) -> usize {
		self.high_water_mark
	}
}

/// Result of sampling a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureChange {
	Entered,
	Relieved,
	Unchanged,
}

/// Watches a [`StreamBuffer`] and counts entries into the backpressured state.
///
/// Only the edge into pressure is counted, so a buffer sitting above its
/// high-water mark does not produce an event per sample. The monitor reads the
/// buffer and never touches it; acting on the signal is the caller's job.
#[derive(Debug, Default)]
pub struct BackpressureMonitor {
	engaged: bool,
	events: u64,
}

impl BackpressureMonitor {
	#[must_use]
	pub const fn new() -> Self {
		Self { engaged: false, events: 0 }
	}

	/// Sample after every enqueue or dequeue.
	pub fn observe(&mut self, buffer: &StreamBuffer) -> PressureChange {
		match (self.engaged, buffer.is_backpressured()) {
			(false, true) => {
				self.engaged = true;
				self.events += 1;
				PressureChange::Entered
			}
			(true, false) => {
				self.engaged = false;
				PressureChange::Relieved
			}
			_ => PressureChange::Unchanged,
		}
	}

	#[must_use]
	pub const fn is_engaged(&self) -> bool {
		self.engaged
	}

	#[must_use]
	pub const fn events(&self) -> u64 {
		self.events
	}
}

use crate::types::TimeMs;

/// Default visual refresh rate
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Deterministic rate limiter deciding when buffered content is flushed.
///
/// `should_render` accepts at most once per `1000 / target_rate` ms, measured
/// from the last accepted timestamp. There is no timer inside, so calling it
/// on every inbound event cannot accumulate drift. The pacer never holds or
/// drops content; it only answers "now or later".
#[derive(Debug, Clone)]
pub struct FramePacer {
	target_rate: u32,
	interval_ms: f64,
	last_render: Option<TimeMs>,
}

impl FramePacer {
	#[must_use]
	pub fn new(target_rate: u32) -> Self {
		let target_rate = target_rate.max(1);
		Self {
			target_rate,
			interval_ms: 1000.0 / f64::from(target_rate),
			last_render: None,
		}
	}

	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn should_render(&mut self, now_ms: TimeMs) -> bool {
		let due = match self.last_render {
			None => true,
			Some(last) => now_ms.saturating_sub(last) as f64 >= self.interval_ms,
		};

		if due {
			self.last_render = Some(now_ms);
		}
		due
	}

	/// Earliest timestamp at which `should_render` will accept again.
	///
	/// `None` when a render would be accepted right now.
	#[must_use]
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
	pub fn next_render_at(&self, now_ms: TimeMs) -> Option<TimeMs> {
		let last = self.last_render?;
		let at = (last as f64 + self.interval_ms).ceil() as TimeMs;
		(at > now_ms).then_some(at)
	}

	/// Whole frame slots missed while content was waiting.
	///
	/// Counted from whichever is later: the last accepted render or the moment
	/// content started waiting. The first slot is the one being rendered now.
	#[must_use]
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
	pub fn missed_frames(&self, waiting_since_ms: TimeMs, now_ms: TimeMs) -> u64 {
		let reference = self.last_render.map_or(waiting_since_ms, |last| last.max(waiting_since_ms));
		let slots = (now_ms.saturating_sub(reference) as f64 / self.interval_ms).floor() as u64;
		slots.saturating_sub(1)
	}

	#[must_use]
	pub const fn target_interval_ms(&self) -> f64 {
		self.interval_ms
	}

	#[must_use]
	pub const fn target_rate(&self) -> u32 {
		self.target_rate
	}

	#[must_use]
	pub const fn last_render(&self) -> Option<TimeMs> {
		self.last_render
	}

	pub fn reset(&mut self) {
		self.last_render = None;
	}
}

impl Default for FramePacer {
	fn default() -> Self {
		Self::new(DEFAULT_TARGET_FPS)
	}
}

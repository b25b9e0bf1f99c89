use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	/// Upper bound on a single delay. `None` leaves the backoff uncapped.
	pub max_delay: Option<Duration>,
	pub history_limit: usize,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			base_delay: Duration::from_secs(1),
			max_delay: None,
			history_limit: 32,
		}
	}
}

/// One scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
	pub attempt: u32,
	pub delay: Duration,
	pub scheduled_at: Instant,
	/// Set once the callback actually ran. Stays `None` if it was cancelled.
	pub fired_at: Option<Instant>,
}

struct Pending {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

/// Exponential backoff with a bounded attempt budget.
///
/// At most one callback is pending at a time; scheduling again replaces it.
/// Needs to be driven from inside a tokio runtime.
pub struct ReconnectScheduler {
	config: RetryConfig,
	attempts: u32,
	pending: Option<Pending>,
	history: Arc<Mutex<VecDeque<ReconnectAttempt>>>,
}

impl ReconnectScheduler {
	#[must_use]
	pub fn new(config: RetryConfig) -> Self {
		Self {
			config,
			attempts: 0,
			pending: None,
			history: Arc::new(Mutex::new(VecDeque::new())),
		}
	}

	#[must_use]
	pub const fn should_reconnect(&self) -> bool {
		self.attempts < self.config.max_attempts
	}

	/// Delay for the given 1-based attempt: `base * 2^(attempt - 1)`.
	#[must_use]
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(31);
		let delay = self.config.base_delay.saturating_mul(1 << exponent);

		match self.config.max_delay {
			Some(cap) => delay.min(cap),
			None => delay,
		}
	}

	/// Arrange for `callback` to run after the next backoff delay.
	///
	/// Returns `None` and does nothing once the attempt budget is spent.
	pub fn schedule_reconnect<F>(&mut self, callback: F) -> Option<Duration>
	where
		F: FnOnce() + Send + 'static,
	{
		if !self.should_reconnect() {
			debug!(attempts = self.attempts, "reconnect budget exhausted");
			return None;
		}

		self.cancel_pending();
		self.attempts += 1;

		let attempt = self.attempts;
		let delay = self.delay_for(attempt);
		let scheduled_at = Instant::now();

		self.record(ReconnectAttempt { attempt, delay, scheduled_at, fired_at: None });

		let cancel = CancellationToken::new();
		let token = cancel.clone();
		let history = Arc::clone(&self.history);

		let handle = tokio::spawn(async move {
			tokio::select! {
				() = token.cancelled() => {}
				() = tokio::time::sleep_until(scheduled_at + delay) => {
					mark_fired(&history, attempt, Instant::now());
					callback();
				}
			}
		});

		debug!(attempt, delay_ms = %delay.as_millis(), "reconnect scheduled");
		self.pending = Some(Pending { cancel, handle });

		Some(delay)
	}

	/// Zero the attempt counter and drop any pending callback.
	pub fn reset(&mut self) {
		self.attempts = 0;
		self.cancel_pending();
	}

	#[must_use]
	pub const fn attempts(&self) -> u32 {
		self.attempts
	}

	#[must_use]
	pub const fn max_attempts(&self) -> u32 {
		self.config.max_attempts
	}

	#[must_use]
	pub fn has_pending(&self) -> bool {
		self.pending.as_ref().is_some_and(|p| !p.handle.is_finished())
	}

	/// Scheduled attempts, oldest first.
	#[must_use]
	pub fn history(&self) -> Vec<ReconnectAttempt> {
		self.history.lock().unwrap_or_else(PoisonError::into_inner).iter().copied().collect()
	}

	fn cancel_pending(&mut self) {
		if let Some(pending) = self.pending.take() {
			pending.cancel.cancel();
			pending.handle.abort();
		}
	}

	fn record(&self, attempt: ReconnectAttempt) {
		if self.config.history_limit == 0 {
			return;
		}
		let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
		if history.len() == self.config.history_limit {
			history.pop_front();
		}
		history.push_back(attempt);
	}
}

impl Drop for ReconnectScheduler {
	fn drop(&mut self) {
		self.cancel_pending();
	}
}

fn mark_fired(history: &Mutex<VecDeque<ReconnectAttempt>>, attempt: u32, at: Instant) {
	let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
	if let Some(entry) = history.iter_mut().rev().find(|a| a.attempt == attempt && a.fired_at.is_none()) {
		entry.fired_at = Some(at);
	}
}

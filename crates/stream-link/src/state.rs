use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// Lifecycle state of the one logical connection a manager owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
	Error,
	Reconnecting,
}

impl ConnectionState {
	/// Targets reachable from `self` in one step.
	#[must_use]
	pub const fn allowed_targets(self) -> &'static [Self] {
		use ConnectionState::*;

		match self {
			Disconnected => &[Connecting],
			Connecting => &[Connected, Error],
			Connected => &[Disconnected, Error],
			Error => &[Reconnecting, Disconnected],
			Reconnecting => &[Connected, Error],
		}
	}

	#[must_use]
	pub fn can_reach(self, target: Self) -> bool {
		self.allowed_targets().contains(&target)
	}

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Connected => "connected",
			Self::Error => "error",
			Self::Reconnecting => "reconnecting",
		}
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One committed transition, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRecord {
	pub from: ConnectionState,
	pub to: ConnectionState,
	pub at: Instant,
}

/// The only authority allowed to change a connection's state.
///
/// Illegal targets are rejected by return value and leave the state as it was.
#[derive(Debug, Clone)]
pub struct StateMachine {
	current: ConnectionState,
	history: VecDeque<TransitionRecord>,
	history_limit: usize,
	rejected: u64,
}

impl StateMachine {
	#[must_use]
	pub fn new(history_limit: usize) -> Self {
		Self {
			current: ConnectionState::Disconnected,
			history: VecDeque::with_capacity(history_limit.min(64)),
			history_limit,
			rejected: 0,
		}
	}

	#[must_use]
	pub const fn current_state(&self) -> ConnectionState {
		self.current
	}

	#[must_use]
	pub fn can_transition(&self, target: ConnectionState) -> bool {
		self.current.can_reach(target)
	}

	/// Move to `target` if the table allows it.
	pub fn transition(&mut self, target: ConnectionState) -> bool {
		self.transition_at(target, Instant::now())
	}

	/// Same as [`transition`](Self::transition) with an explicit timestamp.
	pub fn transition_at(&mut self, target: ConnectionState, at: Instant) -> bool {
		if !self.can_transition(target) {
			self.rejected += 1;
			debug!(from = %self.current, to = %target, "rejected illegal state transition");
			return false;
		}

		let record = TransitionRecord { from: self.current, to: target, at };
		self.current = target;

		if self.history_limit > 0 {
			if self.history.len() == self.history_limit {
				self.history.pop_front();
			}
			self.history.push_back(record);
		}

		true
	}

	/// Committed transitions, oldest first.
	pub fn history(&self) -> impl Iterator<Item = &TransitionRecord> {
		self.history.iter()
	}

	#[must_use]
	pub const fn rejected_transitions(&self) -> u64 {
		self.rejected
	}
}

impl Default for StateMachine {
	fn default() -> Self {
		Self::new(64)
	}
}

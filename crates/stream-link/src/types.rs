use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one connection manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	#[must_use]
	pub const fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for ConnectionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Client-assigned identifier of an optimistic entry.
///
/// Generated once when the entry is created and never reused, so it stays
/// stable for the entry's whole lifetime and is unique across instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	#[must_use]
	pub const fn from_uuid(uuid: Uuid) -> Self {
		Self(uuid)
	}
}

impl Default for LocalId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for LocalId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Milliseconds on the link's monotonic clock
pub type TimeMs = u64;

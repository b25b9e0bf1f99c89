use std::time::Duration;

/// Transport-agnostic error type
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
	/// The remote end refused the credential presented during the handshake
	#[error("Handshake rejected as unauthorized: {0}")]
	Unauthorized(String),

	/// The handshake failed for any other reason
	#[error("Handshake failed: {0}")]
	Handshake(String),

	/// The handshake did not complete in time
	#[error("Handshake timed out after {0:?}")]
	Timeout(Duration),

	/// The channel or connection is closed
	#[error("Transport channel closed")]
	Closed,

	/// Failed to send a frame
	#[error("Failed to send: {0}")]
	SendFailed(String),

	/// Underlying socket or protocol failure after the session opened
	#[error("Transport I/O error: {0}")]
	Io(String),
}

impl TransportError {
	/// Whether retrying with a refreshed credential could succeed.
	#[must_use]
	pub const fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Unauthorized(_))
	}
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

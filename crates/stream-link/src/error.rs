use std::time::Duration;
use stream_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by the credential boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
	#[error("credential expired")]
	Expired,

	#[error("credential rejected: {0}")]
	Invalid(String),

	#[error("credential refresh failed: {0}")]
	RefreshFailed(String),

	#[error("credential provider unavailable: {0}")]
	Unavailable(String),
}

/// Errors for the stream-link crate.
///
/// Expected conditions (illegal transition, full buffer, unknown optimistic id,
/// send while disconnected) are reported through return values, not here.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("Credential error: {0}")]
	Auth(#[from] AuthError),

	#[error("Connection attempt timed out after {0:?}")]
	Timeout(Duration),

	#[error("Invalid configuration: {0}")]
	Config(String),

	#[error("Metrics registry error: {0}")]
	Metrics(String),

	#[error("Link actor unavailable")]
	ActorUnavailable,
}

impl From<prometheus::Error> for LinkError {
	fn from(error: prometheus::Error) -> Self {
		Self::Metrics(error.to_string())
	}
}

/// Result type alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;

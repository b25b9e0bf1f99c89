use crate::error::Result;
use crate::frame::OpenRequest;
use crate::session::Session;

/// Core transport interface that all implementations must satisfy.
///
/// `open` performs the handshake; resolving `Ok` is the *open* event. Every
/// later event (`message`, `error`, `close`) arrives on the returned
/// [`Session`]. Implementations must not block the caller beyond the handshake
/// itself and must be cancel-safe: dropping the future aborts the attempt.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Open a new session against `request.endpoint`.
	async fn open(&self, request: OpenRequest) -> Result<Session>;

	/// Short name used in logs.
	fn name(&self) -> &'static str {
		"transport"
	}
}

use crate::error::{Result, TransportError};
use crate::frame::{Frame, TransportEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// An open transport session.
///
/// The transport implementation owns the socket and pumps it from its own
/// task; the session is the channel pair plus the token that tears it down.
/// Dropping the session closes it.
#[derive(Debug)]
pub struct Session {
	outbound: mpsc::Sender<Frame>,
	inbound: mpsc::Receiver<TransportEvent>,
	cancel: CancellationToken,
	protocol: Option<String>,
}

impl Session {
	#[must_use]
	pub const fn new(outbound: mpsc::Sender<Frame>, inbound: mpsc::Receiver<TransportEvent>, cancel: CancellationToken) -> Self {
		Self {
			outbound,
			inbound,
			cancel,
			protocol: None,
		}
	}

	#[must_use]
	pub fn with_protocol(mut self, protocol: Option<String>) -> Self {
		self.protocol = protocol;
		self
	}

	/// Sub-protocol negotiated during the handshake, if any.
	#[must_use]
	pub fn protocol(&self) -> Option<&str> {
		self.protocol.as_deref()
	}

	/// Queue a frame without waiting.
	///
	/// # Errors
	/// `SendFailed` when the outbound queue is full, `Closed` once the session is gone.
	pub fn try_send(&self, frame: Frame) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(TransportError::Closed);
		}

		self.outbound.try_send(frame).map_err(|e| match e {
			TrySendError::Full(_) => TransportError::SendFailed("outbound queue full".to_string()),
			TrySendError::Closed(_) => TransportError::Closed,
		})
	}

	/// Wait for the next inbound event. `None` means the pump has stopped.
	pub async fn recv(&mut self) -> Option<TransportEvent> {
		self.inbound.recv().await
	}

	pub fn close(&self) {
		self.cancel.cancel();
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled() || self.outbound.is_closed()
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

#![cfg(any(test, feature = "inmem"))]

use crate::error::{Result, TransportError};
use crate::frame::{Frame, OpenRequest, TransportEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Server side of an in-memory session.
pub struct RemotePeer {
	request: OpenRequest,
	events: mpsc::Sender<TransportEvent>,
	outbound: mpsc::Receiver<Frame>,
	cancel: CancellationToken,
}

impl RemotePeer {
	pub(crate) const fn new(request: OpenRequest, events: mpsc::Sender<TransportEvent>, outbound: mpsc::Receiver<Frame>, cancel: CancellationToken) -> Self {
		Self {
			request,
			events,
			outbound,
			cancel,
		}
	}

	/// The request that produced this session, credential included.
	#[must_use]
	pub const fn request(&self) -> &OpenRequest {
		&self.request
	}

	pub async fn send(&self, frame: Frame) -> Result<()> {
		self.emit(TransportEvent::Message(frame)).await
	}

	pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
		self.send(Frame::text(text)).await
	}

	/// Report a transport failure to the client.
	pub async fn fail(&self, error: TransportError) -> Result<()> {
		self.emit(TransportEvent::Error(error)).await
	}

	/// Close from the server side.
	pub async fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
		self
			.emit(TransportEvent::Closed {
				code,
				reason: reason.map(str::to_owned),
			})
			.await
	}

	/// Next frame the client sent. `None` once the client dropped the session.
	pub async fn next_outbound(&mut self) -> Option<Frame> {
		self.outbound.recv().await
	}

	pub fn try_next_outbound(&mut self) -> Option<Frame> {
		self.outbound.try_recv().ok()
	}

	/// Whether the client closed its side.
	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub async fn closed(&self) {
		self.cancel.cancelled().await;
	}

	async fn emit(&self, event: TransportEvent) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(TransportError::Closed);
		}
		self.events.send(event).await.map_err(|_| TransportError::Closed)
	}
}

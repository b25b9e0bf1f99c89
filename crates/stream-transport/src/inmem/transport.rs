#![cfg(any(test, feature = "inmem"))]

use super::peer::RemotePeer;
use crate::error::{Result, TransportError};
use crate::frame::OpenRequest;
use crate::session::Session;
use crate::traits::Transport;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
	Accept,
	/// Accept once the delay has elapsed.
	AcceptAfter(Duration),
	Reject(TransportError),
	/// Never resolve. Useful for timeout and cancellation paths.
	Hang,
}

struct Inner {
	script: Mutex<VecDeque<Script>>,
	requests: Mutex<Vec<OpenRequest>>,
	peers_tx: mpsc::UnboundedSender<RemotePeer>,
	peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RemotePeer>>,
}

/// In-memory transport driven by a queue of [`Script`] steps.
///
/// Cloning shares the script and the peer queue, so a test can keep one
/// clone while the link under test owns another.
#[derive(Clone)]
pub struct InMemTransport {
	inner: Arc<Inner>,
}

impl InMemTransport {
	#[must_use]
	pub fn new() -> Self {
		let (peers_tx, peers_rx) = mpsc::unbounded_channel();
		Self {
			inner: Arc::new(Inner {
				script: Mutex::new(VecDeque::new()),
				requests: Mutex::new(Vec::new()),
				peers_tx,
				peers_rx: tokio::sync::Mutex::new(peers_rx),
			}),
		}
	}

	/// Append one step to the script.
	pub fn push(&self, step: Script) {
		self.inner.script.lock().unwrap_or_else(PoisonError::into_inner).push_back(step);
	}

	/// Append several steps in order.
	pub fn script<I>(&self, steps: I)
	where
		I: IntoIterator<Item = Script>,
	{
		self.inner.script.lock().unwrap_or_else(PoisonError::into_inner).extend(steps);
	}

	/// Every request seen so far, in call order.
	#[must_use]
	pub fn requests(&self) -> Vec<OpenRequest> {
		self.inner.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	#[must_use]
	pub fn open_count(&self) -> usize {
		self.inner.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
	}

	/// Wait for the server side of the next accepted session.
	pub async fn next_peer(&self) -> Option<RemotePeer> {
		self.inner.peers_rx.lock().await.recv().await
	}

	fn next_step(&self) -> Script {
		self.inner.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front().unwrap_or(Script::Accept)
	}

	fn accept(&self, request: OpenRequest) -> Session {
		let (outbound_tx, outbound_rx) = mpsc::channel(request.outbound_capacity.max(1));
		let (inbound_tx, inbound_rx) = mpsc::channel(request.inbound_capacity.max(1));
		let cancel = CancellationToken::new();
		let protocol = request.endpoint.subprotocols.first().cloned();

		let peer = RemotePeer::new(request, inbound_tx, outbound_rx, cancel.clone());
		if self.inner.peers_tx.send(peer).is_err() {
			debug!("in-memory peer queue closed");
		}

		Session::new(outbound_tx, inbound_rx, cancel).with_protocol(protocol)
	}
}

impl Default for InMemTransport {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Transport for InMemTransport {
	async fn open(&self, request: OpenRequest) -> Result<Session> {
		self.inner.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());

		match self.next_step() {
			Script::Accept => Ok(self.accept(request)),
			Script::AcceptAfter(delay) => {
				tokio::time::sleep(delay).await;
				Ok(self.accept(request))
			}
			Script::Reject(error) => Err(error),
			Script::Hang => std::future::pending().await,
		}
	}

	fn name(&self) -> &'static str {
		"inmem"
	}
}

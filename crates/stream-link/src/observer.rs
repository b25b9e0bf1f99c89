use crate::buffer::Chunk;
use crate::metrics::MetricsSnapshot;
use crate::optimistic::OptimisticEntry;
use crate::state::ConnectionState;
use crate::types::LocalId;
use async_broadcast::{Receiver, RecvError, TryRecvError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Everything a link reports to its observers, in commit order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
	StateChanged { from: ConnectionState, to: ConnectionState },
	/// Chunks released by one paced flush, in non-decreasing `seq` per stream.
	Flush { chunks: Vec<Chunk> },
	StreamEnded { stream_id: String },
	Entry(OptimisticEntry),
	EntryRemoved { local_id: LocalId },
	Metrics(MetricsSnapshot),
	Backpressure { engaged: bool },
	/// Reconnect budget exhausted. The link is `Disconnected` and stays there.
	ConnectionLost { attempts: u32, reason: String },
	Closed,
}

/// A live registration on a link's event stream.
///
/// Dropping it unsubscribes. `unsubscribe` may be called any number of times.
pub struct Subscription {
	receiver: Option<Receiver<LinkEvent>>,
	task: Option<(CancellationToken, JoinHandle<()>)>,
	skipped: Arc<AtomicU64>,
}

impl Subscription {
	pub(crate) fn from_receiver(receiver: Receiver<LinkEvent>) -> Self {
		Self {
			receiver: Some(receiver),
			task: None,
			skipped: Arc::default(),
		}
	}

	/// Run `handler` on a spawned task for every chunk of every flush.
	///
	/// The task outlives `close()` so a later `connect` keeps delivering; it
	/// ends on unsubscribe or when the link itself is gone.
	pub(crate) fn with_handler<F>(mut receiver: Receiver<LinkEvent>, mut handler: F) -> Self
	where
		F: FnMut(&Chunk) + Send + 'static,
	{
		let cancel = CancellationToken::new();
		let token = cancel.clone();
		let skipped = Arc::new(AtomicU64::new(0));
		let gaps = Arc::clone(&skipped);

		let handle = tokio::spawn(async move {
			loop {
				let event = tokio::select! {
					() = token.cancelled() => break,
					event = receiver.recv() => event,
				};

				match event {
					Ok(LinkEvent::Flush { chunks }) => chunks.iter().for_each(&mut handler),
					Err(RecvError::Closed) => break,
					Ok(_) => {}
					Err(RecvError::Overflowed(missed)) => {
						gaps.fetch_add(missed, Ordering::Relaxed);
						warn!(skipped = missed, "message handler lagged behind");
					}
				}
			}
		});

		Self {
			receiver: None,
			task: Some((cancel, handle)),
			skipped,
		}
	}

	/// Next event. `None` once unsubscribed or the link is gone.
	///
	/// A subscriber that falls behind loses the oldest events; the gap is added
	/// to [`skipped`](Self::skipped) and reading continues.
	pub async fn recv(&mut self) -> Option<LinkEvent> {
		let receiver = self.receiver.as_mut()?;
		loop {
			match receiver.recv().await {
				Ok(event) => return Some(event),
				Err(RecvError::Overflowed(missed)) => record_gap(&self.skipped, missed),
				Err(RecvError::Closed) => return None,
			}
		}
	}

	/// Next event if one is already queued.
	pub fn try_recv(&mut self) -> Option<LinkEvent> {
		let receiver = self.receiver.as_mut()?;
		loop {
			match receiver.try_recv() {
				Ok(event) => return Some(event),
				Err(TryRecvError::Overflowed(missed)) => record_gap(&self.skipped, missed),
				Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
			}
		}
	}

	/// Events this subscription never saw because it fell behind.
	#[must_use]
	pub fn skipped(&self) -> u64 {
		self.skipped.load(Ordering::Relaxed)
	}

	pub fn unsubscribe(&mut self) {
		self.receiver = None;
		if let Some((cancel, _handle)) = self.task.take() {
			cancel.cancel();
		}
	}

	#[must_use]
	pub fn is_active(&self) -> bool {
		self.receiver.is_some() || self.task.as_ref().is_some_and(|(_, handle)| !handle.is_finished())
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("handler", &self.task.is_some())
			.field("active", &self.is_active())
			.field("skipped", &self.skipped())
			.finish()
	}
}

fn record_gap(skipped: &AtomicU64, missed: u64) {
	skipped.fetch_add(missed, Ordering::Relaxed);
	warn!(skipped = missed, "subscriber lagged behind");
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.unsubscribe();
	}
}

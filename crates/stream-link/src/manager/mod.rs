//! Connection manager: the single object callers talk to.
//!
//! A [`ConnectionManager`] is a cheap, cloneable handle. All state lives in one
//! actor task per manager, which serializes commands, transport events and
//! timers so that no two transitions for the same connection are ever in
//! flight at once.

mod actor;
mod command;

pub use command::ConnectionInfo;

use crate::auth::AuthConfig;
use crate::buffer::Chunk;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::metrics::{LinkMetrics, MetricsSnapshot};
use crate::observer::{LinkEvent, Subscription};
use crate::optimistic::OptimisticEntry;
use crate::retry::ReconnectAttempt;
use crate::state::{ConnectionState, TransitionRecord};
use crate::types::{ConnectionId, LocalId};
use actor::{ActorChannels, LinkActor};
use async_broadcast::InactiveReceiver;
use command::Command;
use std::fmt;
use std::sync::Arc;
use stream_transport::{Endpoint, Frame, Transport};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info_span, Instrument};

#[derive(Clone)]
pub struct ConnectionManager {
	id: ConnectionId,
	commands: mpsc::Sender<Command>,
	state: watch::Receiver<ConnectionState>,
	events: InactiveReceiver<LinkEvent>,
	metrics: LinkMetrics,
}

impl ConnectionManager {
	/// Spawn the actor for a new link. Must be called inside a tokio runtime.
	///
	/// # Errors
	/// `Config` for an invalid configuration, `Metrics` if the registry cannot be built.
	pub fn new(transport: Arc<dyn Transport>, config: LinkConfig) -> Result<Self> {
		config.validate()?;

		let id = ConnectionId::new();
		let metrics = LinkMetrics::new(id)?;

		let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity);
		let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
		let (mut events_tx, events_rx) = async_broadcast::broadcast(config.event_capacity);
		events_tx.set_overflow(true);
		events_tx.set_await_active(false);

		let channels = ActorChannels {
			commands: commands_rx,
			events: events_tx,
			state_tx,
		};
		let actor = LinkActor::new(id, config, transport, metrics.clone(), channels);
		tokio::spawn(actor.run().instrument(info_span!("stream_link", connection_id = %id)));

		Ok(Self {
			id,
			commands: commands_tx,
			state: state_rx,
			events: events_rx.deactivate(),
			metrics,
		})
	}

	#[must_use]
	pub const fn id(&self) -> ConnectionId {
		self.id
	}

	/// Start connecting to `endpoint`.
	///
	/// Returns once the attempt is underway; watch [`state_changes`](Self::state_changes)
	/// or subscribe for the outcome. Any attempt already in flight is cancelled and
	/// its late result discarded.
	pub async fn connect(&self, endpoint: Endpoint, auth: AuthConfig) -> Result<()> {
		self.request(|reply| Command::Connect { endpoint, auth, reply }).await
	}

	/// Queue a frame for the server. `false` unless connected with room in the outbound queue.
	pub async fn send(&self, frame: Frame) -> bool {
		self.request(|reply| Command::Send { frame, reply }).await.unwrap_or(false)
	}

	/// Tear the connection down without retrying.
	pub async fn close(&self) -> Result<()> {
		self.request(Command::Close).await
	}

	/// Close the connection and stop the actor. Later calls on any handle fail
	/// with `ActorUnavailable`.
	pub async fn shutdown(&self) {
		let _ = self.request(Command::Shutdown).await;
	}

	/// Call `handler` for every delivered chunk, in flush order.
	pub fn on_message<F>(&self, handler: F) -> Subscription
	where
		F: FnMut(&Chunk) + Send + 'static,
	{
		Subscription::with_handler(self.events.activate_cloned(), handler)
	}

	/// Receive every [`LinkEvent`] committed after this call.
	#[must_use]
	pub fn subscribe(&self) -> Subscription {
		Subscription::from_receiver(self.events.activate_cloned())
	}

	#[must_use]
	pub fn state(&self) -> ConnectionState {
		*self.state.borrow()
	}

	#[must_use]
	pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
		self.state.clone()
	}

	/// Wait until the link reaches `target`.
	pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
		let mut state = self.state.clone();
		state.wait_for(|current| *current == target).await.map(|_| ()).map_err(|_| LinkError::ActorUnavailable)
	}

	pub async fn metrics(&self) -> Result<MetricsSnapshot> {
		self.request(Command::Metrics).await
	}

	pub async fn connection_info(&self) -> Result<ConnectionInfo> {
		self.request(Command::Info).await
	}

	pub async fn reconnect_history(&self) -> Result<Vec<ReconnectAttempt>> {
		self.request(Command::ReconnectHistory).await
	}

	pub async fn transition_history(&self) -> Result<Vec<TransitionRecord>> {
		self.request(Command::TransitionHistory).await
	}

	/// Record a pending entry and send it. The entry is failed on the spot when
	/// the link cannot take it.
	pub async fn send_optimistic(&self, content: impl Into<String>) -> Result<OptimisticEntry> {
		let content = content.into();
		self.request(|reply| Command::SendOptimistic { content, reply }).await
	}

	pub async fn confirm(&self, local_id: LocalId, server_id: impl Into<String>) -> Result<Option<OptimisticEntry>> {
		let server_id = server_id.into();
		self.request(|reply| Command::Confirm { local_id, server_id, reply }).await
	}

	pub async fn fail(&self, local_id: LocalId, reason: impl Into<String>) -> Result<Option<OptimisticEntry>> {
		let reason = reason.into();
		self.request(|reply| Command::Fail { local_id, reason, reply }).await
	}

	pub async fn rollback(&self, local_id: LocalId) -> Result<Option<OptimisticEntry>> {
		self.request(|reply| Command::Rollback { local_id, reply }).await
	}

	/// Resend a failed entry.
	pub async fn retry(&self, local_id: LocalId) -> Result<Option<OptimisticEntry>> {
		self.request(|reply| Command::Retry { local_id, reply }).await
	}

	pub async fn entries(&self) -> Result<Vec<OptimisticEntry>> {
		self.request(Command::Entries).await
	}

	/// Prometheus text exposition of this link's metrics.
	pub fn prometheus_text(&self) -> Result<String> {
		Ok(self.metrics.encode()?)
	}

	async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
		let (tx, rx) = oneshot::channel();
		self.commands.send(command(tx)).await.map_err(|_| LinkError::ActorUnavailable)?;
		rx.await.map_err(|_| LinkError::ActorUnavailable)
	}
}

impl fmt::Debug for ConnectionManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionManager").field("id", &self.id).field("state", &self.state()).finish_non_exhaustive()
	}
}

use super::command::{Command, ConnectionInfo, Internal};
use crate::auth::AuthConfig;
use crate::buffer::{BackpressureMonitor, Chunk, PressureChange, StreamBuffer};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::metrics::{LinkGauges, LinkMetrics, PerformanceMonitor};
use crate::observer::LinkEvent;
use crate::optimistic::{EntryRole, OptimisticEntry, OptimisticStore};
use crate::pacer::FramePacer;
use crate::retry::ReconnectScheduler;
use crate::state::{ConnectionState, StateMachine};
use crate::types::{ConnectionId, LocalId, TimeMs};
use crate::wire::{ClientFrame, Inbound, WireDecoder};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use stream_transport::{Endpoint, Frame, OpenRequest, Session, Transport, TransportEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

pub(crate) struct LinkActor {
	id: ConnectionId,
	config: LinkConfig,
	transport: Arc<dyn Transport>,

	commands: mpsc::Receiver<Command>,
	internal_tx: mpsc::UnboundedSender<Internal>,
	internal_rx: mpsc::UnboundedReceiver<Internal>,
	events: async_broadcast::Sender<LinkEvent>,
	state_tx: watch::Sender<ConnectionState>,

	machine: StateMachine,
	buffer: StreamBuffer,
	monitor: BackpressureMonitor,
	pacer: FramePacer,
	scheduler: ReconnectScheduler,
	store: OptimisticStore,
	perf: PerformanceMonitor,
	metrics: LinkMetrics,
	decoder: WireDecoder,

	endpoint: Option<Endpoint>,
	auth: AuthConfig,
	session: Option<Session>,
	attempt: Option<JoinHandle<()>>,
	generation: u64,

	/// Origin of the pacer's millisecond clock
	epoch: Instant,
	flush_at: Option<Instant>,
	waiting_since: Option<Instant>,
	last_seq: HashMap<String, u64>,

	last_error: Option<String>,
	created_at: Option<DateTime<Utc>>,
	connected_at: Option<DateTime<Utc>>,
	closed_at: Option<DateTime<Utc>>,
}

pub(crate) struct ActorChannels {
	pub commands: mpsc::Receiver<Command>,
	pub events: async_broadcast::Sender<LinkEvent>,
	pub state_tx: watch::Sender<ConnectionState>,
}

impl LinkActor {
	pub(crate) fn new(id: ConnectionId, config: LinkConfig, transport: Arc<dyn Transport>, metrics: LinkMetrics, channels: ActorChannels) -> Self {
		let (internal_tx, internal_rx) = mpsc::unbounded_channel();

		Self {
			id,
			machine: StateMachine::new(config.history_limit),
			buffer: StreamBuffer::with_watermark(config.buffer_capacity, config.high_water_ratio),
			monitor: BackpressureMonitor::new(),
			pacer: FramePacer::new(config.target_fps),
			scheduler: ReconnectScheduler::new(config.retry()),
			store: OptimisticStore::new(),
			perf: PerformanceMonitor::new(config.latency_samples),
			metrics,
			decoder: WireDecoder::new(),
			config,
			transport,
			commands: channels.commands,
			internal_tx,
			internal_rx,
			events: channels.events,
			state_tx: channels.state_tx,
			endpoint: None,
			auth: AuthConfig::None,
			session: None,
			attempt: None,
			generation: 0,
			epoch: Instant::now(),
			flush_at: None,
			waiting_since: None,
			last_seq: HashMap::new(),
			last_error: None,
			created_at: None,
			connected_at: None,
			closed_at: None,
		}
	}

	/// Serializes commands, transport events and timers for one link.
	pub(crate) async fn run(mut self) {
		let mut ticker = self.config.metrics_interval().map(|period| {
			let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
			ticker
		});

		info!(transport = self.transport.name(), "link actor started");

		loop {
			let flush_at = self.flush_at;
			let reading = !self.is_paused();

			tokio::select! {
				command = self.commands.recv() => match command {
					Some(command) => {
						if self.handle_command(command).is_break() {
							break;
						}
					}
					None => {
						debug!("all handles dropped");
						self.close();
						break;
					}
				},
				Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
				event = next_inbound(&mut self.session), if reading => self.handle_transport_event(event),
				() = sleep_until(flush_at) => {
					self.flush_at = None;
					self.pace(Instant::now());
				}
				() = tick(&mut ticker) => self.emit_metrics(),
			}
		}

		info!("link actor stopped");
	}

	fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
		match command {
			Command::Connect { endpoint, auth, reply } => {
				self.connect(endpoint, auth);
				let _ = reply.send(());
			}
			Command::Send { frame, reply } => {
				let _ = reply.send(self.send(frame));
			}
			Command::Close(reply) => {
				self.close();
				let _ = reply.send(());
			}
			Command::SendOptimistic { content, reply } => {
				let _ = reply.send(self.send_optimistic(content));
			}
			Command::Confirm { local_id, server_id, reply } => {
				let _ = reply.send(self.confirm_entry(local_id, server_id));
			}
			Command::Fail { local_id, reason, reply } => {
				let entry = self.store.fail(local_id, reason);
				let _ = reply.send(self.emit_entry(entry));
			}
			Command::Rollback { local_id, reply } => {
				let removed = self.store.rollback(local_id);
				if removed.is_some() {
					self.emit(LinkEvent::EntryRemoved { local_id });
				}
				let _ = reply.send(removed);
			}
			Command::Retry { local_id, reply } => {
				let _ = reply.send(self.retry_entry(local_id));
			}
			Command::Entries(reply) => {
				let _ = reply.send(self.store.entries().to_vec());
			}
			Command::Metrics(reply) => {
				let _ = reply.send(self.snapshot());
			}
			Command::Info(reply) => {
				let _ = reply.send(self.info());
			}
			Command::ReconnectHistory(reply) => {
				let _ = reply.send(self.scheduler.history());
			}
			Command::TransitionHistory(reply) => {
				let _ = reply.send(self.machine.history().copied().collect());
			}
			Command::Shutdown(reply) => {
				self.close();
				let _ = reply.send(());
				return ControlFlow::Break(());
			}
		}
		ControlFlow::Continue(())
	}

	fn handle_internal(&mut self, internal: Internal) {
		match internal {
			Internal::AttemptFinished { generation, result } => {
				if generation != self.generation {
					debug!(generation, current = self.generation, "discarding stale connection attempt");
					if let Ok(session) = result {
						session.close();
					}
					return;
				}

				self.attempt = None;
				match result {
					Ok(session) => self.on_open(session),
					Err(err) => self.on_failure(&err.to_string()),
				}
			}
			Internal::ReconnectDue { generation } => {
				if generation != self.generation || self.machine.current_state() != ConnectionState::Reconnecting {
					debug!(generation, "ignoring stale reconnect timer");
					return;
				}
				self.start_attempt(true);
			}
		}
	}

	fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
		match event {
			Some(TransportEvent::Message(frame)) => self.on_frame(frame),
			Some(TransportEvent::Error(err)) => self.on_failure(&err.to_string()),
			Some(TransportEvent::Closed { code, reason }) => {
				let reason = match (code, reason) {
					(Some(code), Some(reason)) => format!("closed by peer ({code}): {reason}"),
					(Some(code), None) => format!("closed by peer ({code})"),
					(None, Some(reason)) => format!("closed by peer: {reason}"),
					(None, None) => "closed by peer".to_string(),
				};
				self.on_failure(&reason);
			}
			None => self.on_failure("transport stream ended"),
		}
	}

	// ---- lifecycle ----

	/// Replace whatever is in flight with a fresh attempt. Last caller wins.
	fn connect(&mut self, endpoint: Endpoint, auth: AuthConfig) {
		self.cancel_attempt();
		self.scheduler.reset();
		self.end_session();
		self.settle_disconnected();

		info!(%endpoint, "connecting");
		self.endpoint = Some(endpoint);
		self.auth = auth;
		self.last_error = None;
		self.created_at = Some(Utc::now());
		self.connected_at = None;
		self.closed_at = None;

		self.transition(ConnectionState::Connecting);
		self.start_attempt(false);
	}

	fn close(&mut self) {
		let was_idle = self.machine.current_state() == ConnectionState::Disconnected && self.session.is_none() && self.attempt.is_none();

		self.cancel_attempt();
		self.scheduler.reset();
		self.end_session();
		self.settle_disconnected();

		if !was_idle {
			info!("connection closed");
			self.closed_at = Some(Utc::now());
		}
		self.emit(LinkEvent::Closed);
	}

	fn start_attempt(&mut self, refresh: bool) {
		let Some(endpoint) = self.endpoint.clone() else {
			return;
		};

		self.generation += 1;
		let generation = self.generation;
		let transport = Arc::clone(&self.transport);
		let auth = self.auth.clone();
		let timeout = self.config.connect_timeout();
		let request = OpenRequest::new(endpoint).with_capacities(self.config.outbound_queue, self.config.inbound_queue);
		let tx = self.internal_tx.clone();

		debug!(generation, refresh, "starting connection attempt");

		let task = async move {
			let result = match tokio::time::timeout(timeout, open_session(transport.as_ref(), request, &auth, refresh)).await {
				Ok(result) => result,
				Err(_) => Err(LinkError::Timeout(timeout)),
			};
			let _ = tx.send(Internal::AttemptFinished { generation, result });
		};
		self.attempt = Some(tokio::spawn(task.in_current_span()));
	}

	fn on_open(&mut self, session: Session) {
		if !self.transition(ConnectionState::Connected) {
			session.close();
			return;
		}
		self.scheduler.reset();
		self.decoder.reset();
		self.last_seq.clear();
		self.connected_at = Some(Utc::now());

		info!(protocol = session.protocol(), "connected");
		self.session = Some(session);
	}

	fn on_failure(&mut self, reason: &str) {
		let now = Instant::now();
		self.flush(now);
		if let Some(session) = self.session.take() {
			session.close();
		}

		warn!(%reason, "connection failed");
		self.last_error = Some(reason.to_string());
		if !self.transition(ConnectionState::Error) {
			return;
		}

		if self.scheduler.should_reconnect() {
			self.transition(ConnectionState::Reconnecting);

			let tx = self.internal_tx.clone();
			let generation = self.generation;
			if let Some(delay) = self.scheduler.schedule_reconnect(move || {
				let _ = tx.send(Internal::ReconnectDue { generation });
			}) {
				self.metrics.reconnect_attempts_total.inc();
				info!(attempt = self.scheduler.attempts(), delay_ms = %delay.as_millis(), "reconnect scheduled");
			}
			return;
		}

		let attempts = self.scheduler.attempts();
		self.transition(ConnectionState::Disconnected);
		self.closed_at = Some(Utc::now());

		error!(attempts, %reason, "connection lost, reconnect attempts exhausted");
		self.emit(LinkEvent::ConnectionLost {
			attempts,
			reason: reason.to_string(),
		});
	}

	/// Walk back to `Disconnected` using only legal transitions.
	fn settle_disconnected(&mut self) {
		match self.machine.current_state() {
			ConnectionState::Disconnected => {}
			ConnectionState::Connected | ConnectionState::Error => {
				self.transition(ConnectionState::Disconnected);
			}
			ConnectionState::Connecting | ConnectionState::Reconnecting => {
				self.transition(ConnectionState::Error);
				self.transition(ConnectionState::Disconnected);
			}
		}
	}

	fn cancel_attempt(&mut self) {
		if let Some(attempt) = self.attempt.take() {
			attempt.abort();
			debug!(generation = self.generation, "cancelled in-flight connection attempt");
		}
		// Late results from the aborted attempt now carry a stale generation.
		self.generation += 1;
	}

	fn end_session(&mut self) {
		self.flush(Instant::now());
		if let Some(session) = self.session.take() {
			session.close();
		}
	}

	fn transition(&mut self, to: ConnectionState) -> bool {
		let from = self.machine.current_state();
		if !self.machine.transition_at(to, Instant::now().into_std()) {
			return false;
		}

		debug!(%from, %to, "state transition");
		self.state_tx.send_replace(to);
		self.emit(LinkEvent::StateChanged { from, to });
		true
	}

	// ---- outbound ----

	fn send(&self, frame: Frame) -> bool {
		if self.machine.current_state() != ConnectionState::Connected {
			debug!(state = %self.machine.current_state(), "send rejected, not connected");
			return false;
		}
		let Some(session) = &self.session else {
			return false;
		};

		match session.try_send(frame) {
			Ok(()) => true,
			Err(err) => {
				warn!(error = %err, "outbound frame rejected");
				false
			}
		}
	}

	fn send_optimistic(&mut self, content: String) -> OptimisticEntry {
		let entry = self.store.add_optimistic_entry(EntryRole::Initiator, content);
		self.emit(LinkEvent::Entry(entry.clone()));
		self.deliver_entry(entry)
	}

	fn retry_entry(&mut self, local_id: LocalId) -> Option<OptimisticEntry> {
		let entry = self.store.retry(local_id)?;
		self.emit(LinkEvent::Entry(entry.clone()));
		Some(self.deliver_entry(entry))
	}

	/// Put a pending entry on the wire, failing it at once if that is impossible.
	fn deliver_entry(&mut self, entry: OptimisticEntry) -> OptimisticEntry {
		let message = ClientFrame::Message {
			local_id: entry.local_id,
			content: entry.payload.clone(),
		};
		let sent = match message.to_frame() {
			Ok(frame) => self.send(frame),
			Err(err) => {
				warn!(error = %err, "failed to encode outbound message");
				false
			}
		};
		if sent {
			return entry;
		}

		let failed = self.store.fail(entry.local_id, "not connected");
		self.emit_entry(failed).unwrap_or(entry)
	}

	/// Confirm an entry, retiring any entry that already carried the server id.
	fn confirm_entry(&mut self, local_id: LocalId, server_id: String) -> Option<OptimisticEntry> {
		let (entry, collapsed) = self.store.confirm_collapsing(local_id, server_id)?;
		if let Some(collapsed) = collapsed {
			debug!(local_id = %collapsed.local_id, "collapsed duplicate server record");
			self.emit(LinkEvent::EntryRemoved { local_id: collapsed.local_id });
		}
		self.emit_entry(Some(entry))
	}

	fn emit_entry(&mut self, entry: Option<OptimisticEntry>) -> Option<OptimisticEntry> {
		if let Some(entry) = &entry {
			self.emit(LinkEvent::Entry(entry.clone()));
		}
		entry
	}

	// ---- inbound ----

	fn is_paused(&self) -> bool {
		self.config.flow_control && self.buffer.is_backpressured()
	}

	fn on_frame(&mut self, frame: Frame) {
		let now = Instant::now();
		self.perf.record_message(now.into_std());

		let inbound = match self.decoder.decode(frame, now.into_std()) {
			Ok(inbound) => inbound,
			Err(err) => {
				self.perf.record_malformed_frame();
				self.metrics.malformed_frames_total.inc();
				warn!(error = %err, "dropping undecodable frame");
				return;
			}
		};

		match inbound {
			Inbound::Chunk(chunk) => self.on_chunk(chunk, now),
			Inbound::StreamEnd { stream_id } => {
				self.flush(now);
				self.last_seq.remove(&stream_id);
				self.emit(LinkEvent::StreamEnded { stream_id });
			}
			Inbound::Confirmed { local_id, server_id } => {
				self.confirm_entry(local_id, server_id);
			}
			Inbound::Rejected { local_id, reason } => {
				let entry = self.store.fail(local_id, reason);
				self.emit_entry(entry);
			}
			Inbound::Record { server_id, role, content } => {
				let entry = self.store.apply_server_record(server_id, role, content);
				self.emit_entry(entry);
			}
		}
	}

	fn on_chunk(&mut self, chunk: Chunk, now: Instant) {
		self.metrics.chunks_received_total.inc();

		if self.last_seq.get(&chunk.stream_id).is_some_and(|last| chunk.seq <= *last) {
			warn!(stream_id = %chunk.stream_id, seq = chunk.seq, "dropping out-of-order chunk");
			self.perf.record_chunk_dropped();
			self.metrics.chunks_dropped_total.inc();
			return;
		}

		let stream_id = chunk.stream_id.clone();
		let seq = chunk.seq;
		if self.buffer.enqueue(chunk) {
			self.last_seq.insert(stream_id, seq);
			self.waiting_since.get_or_insert(now);
		} else {
			warn!(%stream_id, seq, capacity = self.buffer.capacity(), "stream buffer full, chunk dropped");
			self.perf.record_chunk_dropped();
			self.metrics.chunks_dropped_total.inc();
		}

		self.observe_pressure();
		self.pace(now);
	}

	fn observe_pressure(&mut self) {
		self.metrics.set_buffer_size(self.buffer.len());

		match self.monitor.observe(&self.buffer) {
			PressureChange::Entered => {
				self.metrics.backpressure_events_total.inc();
				debug!(len = self.buffer.len(), high_water_mark = self.buffer.high_water_mark(), "backpressure engaged");
				self.emit(LinkEvent::Backpressure { engaged: true });
			}
			PressureChange::Relieved => {
				debug!("backpressure relieved");
				self.emit(LinkEvent::Backpressure { engaged: false });
			}
			PressureChange::Unchanged => {}
		}
	}

	/// Flush if the pacer allows it, otherwise arm the trailing deadline.
	fn pace(&mut self, now: Instant) {
		if self.buffer.is_empty() {
			self.flush_at = None;
			return;
		}

		let now_ms = self.millis(now);
		let waiting_ms = self.waiting_since.map_or(now_ms, |since| self.millis(since));
		let missed = self.pacer.missed_frames(waiting_ms, now_ms);

		if self.pacer.should_render(now_ms) {
			if missed > 0 {
				self.perf.record_dropped_frames(missed);
				self.metrics.dropped_frames_total.inc_by(missed);
			}
			self.flush(now);
		} else if self.flush_at.is_none() {
			self.flush_at = self.pacer.next_render_at(now_ms).map(|at| self.epoch + Duration::from_millis(at));
		}
	}

	/// Hand every buffered chunk to observers as one frame.
	fn flush(&mut self, now: Instant) {
		self.flush_at = None;
		let chunks = self.buffer.drain();
		if chunks.is_empty() {
			return;
		}
		self.waiting_since = None;

		if let Some(oldest) = chunks.first() {
			let latency = now.into_std().saturating_duration_since(oldest.arrived_at);
			self.perf.record_latency(latency);
			self.metrics.observe_latency(latency);
		}
		self.perf.record_frame(now.into_std());
		self.metrics.frames_rendered_total.inc();

		self.observe_pressure();
		self.emit(LinkEvent::Flush { chunks });
	}

	// ---- observers ----

	fn emit(&mut self, event: LinkEvent) {
		// Overflow evicts the oldest event for lagging subscribers instead of blocking.
		let Ok(Some(LinkEvent::Flush { chunks })) = self.events.try_broadcast(event) else {
			return;
		};
		let lost = u64::try_from(chunks.len()).unwrap_or(u64::MAX);
		warn!(chunks = lost, "event channel full, evicted a flush a subscriber had not read");
		self.perf.record_chunks_dropped(lost);
		self.metrics.chunks_dropped_total.inc_by(lost);
	}

	fn emit_metrics(&mut self) {
		let snapshot = self.snapshot();
		self.emit(LinkEvent::Metrics(snapshot));
	}

	fn snapshot(&mut self) -> crate::metrics::MetricsSnapshot {
		let gauges = LinkGauges {
			buffer_size: self.buffer.len(),
			backpressure_events: self.monitor.events(),
			reconnect_attempts: self.scheduler.attempts(),
		};
		self.perf.snapshot(Instant::now().into_std(), gauges)
	}

	fn info(&self) -> ConnectionInfo {
		ConnectionInfo {
			id: self.id,
			endpoint: self.endpoint.clone(),
			state: self.machine.current_state(),
			protocol: self.session.as_ref().and_then(|s| s.protocol().map(str::to_string)),
			reconnect_attempts: self.scheduler.attempts(),
			last_error: self.last_error.clone(),
			created_at: self.created_at,
			connected_at: self.connected_at,
			closed_at: self.closed_at,
		}
	}

	#[allow(clippy::cast_possible_truncation)]
	fn millis(&self, at: Instant) -> TimeMs {
		at.saturating_duration_since(self.epoch).as_millis() as TimeMs
	}
}

/// Acquire a credential and open a session. A failed first acquisition and an
/// `Unauthorized` handshake each get one refresh.
async fn open_session(transport: &dyn Transport, request: OpenRequest, auth: &AuthConfig, refresh: bool) -> Result<Session, LinkError> {
	let credential = match auth.acquire(refresh).await {
		Ok(credential) => credential,
		Err(err) if !refresh => {
			warn!(error = %err, "credential unavailable, refreshing once");
			auth.acquire(true).await?
		}
		Err(err) => return Err(err.into()),
	};
	let retry_request = request.clone();

	match transport.open(request.with_credential(credential)).await {
		Err(err) if err.is_unauthorized() && matches!(auth, AuthConfig::Provider(_)) => {
			warn!(error = %err, "handshake unauthorized, refreshing credential");
			let credential = auth.acquire(true).await?;
			Ok(transport.open(retry_request.with_credential(credential)).await?)
		}
		result => Ok(result?),
	}
}

async fn next_inbound(session: &mut Option<Session>) -> Option<TransportEvent> {
	match session {
		Some(session) => session.recv().await,
		None => std::future::pending().await,
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

async fn tick(ticker: &mut Option<Interval>) {
	match ticker {
		Some(ticker) => {
			ticker.tick().await;
		}
		None => std::future::pending().await,
	}
}

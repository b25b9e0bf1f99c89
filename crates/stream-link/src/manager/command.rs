use crate::auth::AuthConfig;
use crate::error::LinkError;
use crate::metrics::MetricsSnapshot;
use crate::optimistic::OptimisticEntry;
use crate::retry::ReconnectAttempt;
use crate::state::{ConnectionState, TransitionRecord};
use crate::types::{ConnectionId, LocalId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use stream_transport::{Endpoint, Frame, Session};
use tokio::sync::oneshot;

/// Requests from [`ConnectionManager`](super::ConnectionManager) handles to the actor.
pub(crate) enum Command {
	Connect {
		endpoint: Endpoint,
		auth: AuthConfig,
		reply: oneshot::Sender<()>,
	},
	Send {
		frame: Frame,
		reply: oneshot::Sender<bool>,
	},
	Close(oneshot::Sender<()>),
	Shutdown(oneshot::Sender<()>),

	// Optimistic entries
	SendOptimistic {
		content: String,
		reply: oneshot::Sender<OptimisticEntry>,
	},
	Confirm {
		local_id: LocalId,
		server_id: String,
		reply: oneshot::Sender<Option<OptimisticEntry>>,
	},
	Fail {
		local_id: LocalId,
		reason: String,
		reply: oneshot::Sender<Option<OptimisticEntry>>,
	},
	Rollback {
		local_id: LocalId,
		reply: oneshot::Sender<Option<OptimisticEntry>>,
	},
	Retry {
		local_id: LocalId,
		reply: oneshot::Sender<Option<OptimisticEntry>>,
	},
	Entries(oneshot::Sender<Vec<OptimisticEntry>>),

	// Queries
	Metrics(oneshot::Sender<MetricsSnapshot>),
	Info(oneshot::Sender<ConnectionInfo>),
	ReconnectHistory(oneshot::Sender<Vec<ReconnectAttempt>>),
	TransitionHistory(oneshot::Sender<Vec<TransitionRecord>>),
}

/// Results posted back to the actor by tasks and timers it spawned.
///
/// `generation` identifies the attempt that produced the message; anything
/// from an older generation is stale and discarded.
pub(crate) enum Internal {
	AttemptFinished { generation: u64, result: Result<Session, LinkError> },
	ReconnectDue { generation: u64 },
}

/// Diagnostic view of the current connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
	pub id: ConnectionId,
	pub endpoint: Option<Endpoint>,
	pub state: ConnectionState,
	pub protocol: Option<String>,
	pub reconnect_attempts: u32,
	pub last_error: Option<String>,
	pub created_at: Option<DateTime<Utc>>,
	pub connected_at: Option<DateTime<Utc>>,
	pub closed_at: Option<DateTime<Utc>>,
}

//! Streaming Link Core
//!
//! Keeps one persistent bidirectional connection alive, paces inbound streamed
//! content for observers, and reconciles locally-predicted entries with what
//! the server confirms.
//!
//! # Architecture
//!
//! ```text
//! transport events -> ConnectionManager (actor)
//!                       |-> StateMachine         (transition)
//!                       |-> StreamBuffer         (enqueue, backpressure)
//!                       |-> FramePacer           (paced flush)
//!                       |-> OptimisticStore      (confirm / reject / record)
//!                       '-> observers            (LinkEvent broadcast)
//! caller -> ConnectionManager::send -> transport  (only while connected)
//! ```
//!
//! Each [`ConnectionManager`] owns its own buffer, store, scheduler and metrics;
//! independent links share nothing.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stream_link::{AuthConfig, ConnectionManager, ConnectionState, LinkConfig};
//! use stream_transport::{Endpoint, InMemTransport};
//!
//! # async fn example() -> stream_link::Result<()> {
//! let transport = Arc::new(InMemTransport::new());
//! let link = ConnectionManager::new(transport, LinkConfig::default())?;
//!
//! let _messages = link.on_message(|chunk| println!("{}: {:?}", chunk.stream_id, chunk.text()));
//! link.connect(Endpoint::new("mem://chat"), AuthConfig::bearer("token")).await?;
//! link.wait_for_state(ConnectionState::Connected).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod buffer;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod observer;
pub mod optimistic;
pub mod pacer;
pub mod registry;
pub mod retry;
pub mod state;
pub mod types;
pub mod wire;

pub use auth::{AuthConfig, CredentialProvider, StaticToken};
pub use buffer::{BackpressureMonitor, Chunk, PressureChange, StreamBuffer};
pub use config::LinkConfig;
pub use error::{AuthError, LinkError, Result};
pub use manager::{ConnectionInfo, ConnectionManager};
pub use metrics::{LinkMetrics, MetricsSnapshot, PerformanceMonitor};
pub use observer::{LinkEvent, Subscription};
pub use optimistic::{EntryRole, EntryStatus, OptimisticEntry, OptimisticStore};
pub use pacer::FramePacer;
pub use registry::ConnectionRegistry;
pub use retry::{ReconnectAttempt, ReconnectScheduler, RetryConfig};
pub use state::{ConnectionState, StateMachine, TransitionRecord};
pub use types::{ConnectionId, LocalId};

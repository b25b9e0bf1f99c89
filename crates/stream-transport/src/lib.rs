//! Transport Boundary Crate
//!
//! Abstracts the bidirectional channel a streaming link runs over. The link
//! core only ever sees the [`Transport`] trait: `open` performs a handshake and
//! resolves to a [`Session`], whose inbound side yields [`TransportEvent`]s
//! (`Message`, `Error`, `Closed`) and whose outbound side accepts [`Frame`]s.
//!
//! # Features
//!
//! - `inmem` - Scripted in-process transport for tests and local wiring
//! - `websocket` - WebSocket transport backed by `tokio-tungstenite`
//! - `tls` - Enables `wss://` endpoints for the WebSocket transport
//!
//! # Example
//!
//! ```rust,no_run
//! use stream_transport::{Endpoint, OpenRequest, Transport};
//!
//! #[cfg(feature = "websocket")]
//! async fn example() {
//!     use stream_transport::WsTransport;
//!
//!     let transport = WsTransport::default();
//!     let request = OpenRequest::new(Endpoint::new("ws://localhost:8080/stream"));
//!
//!     let mut session = transport.open(request).await.unwrap();
//!     while let Some(event) = session.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

// Core modules (always available)
pub mod error;
pub mod frame;
pub mod session;
pub mod traits;

pub use error::{Result, TransportError};
pub use frame::{Credential, Endpoint, Frame, OpenRequest, TransportEvent};
pub use session::Session;
pub use traits::Transport;

// Feature-gated transport implementations
#[cfg(any(test, feature = "inmem"))]
pub mod inmem;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(any(test, feature = "inmem"))]
pub use inmem::{InMemTransport, RemotePeer, Script};

#[cfg(feature = "websocket")]
pub use websocket::WsTransport;

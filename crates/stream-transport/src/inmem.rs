//! Scripted in-memory transport
//!
//! Stands in for a real server in tests and local wiring. Each call to
//! `open` consumes the next [`Script`] step (defaulting to `Accept`), and every
//! accepted session hands a [`RemotePeer`] to the test so it can play the
//! server side: push frames, inject errors, close, and read what the client sent.
//!
//! # Example
//!
//! ```rust,no_run
//! use stream_transport::{Endpoint, InMemTransport, OpenRequest, Script, Transport, TransportError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = InMemTransport::new();
//!     transport.push(Script::Reject(TransportError::Handshake("refused".into())));
//!
//!     let request = OpenRequest::new(Endpoint::new("mem://chat"));
//!     assert!(transport.open(request.clone()).await.is_err());
//!
//!     let _session = transport.open(request).await.unwrap();
//!     let peer = transport.next_peer().await.unwrap();
//!     peer.send_text("hello").await.unwrap();
//! }
//! ```

#![cfg(any(test, feature = "inmem"))]

mod peer;
mod transport;

pub use peer::RemotePeer;
pub use transport::{InMemTransport, Script};

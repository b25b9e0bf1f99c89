use crate::error::TransportError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Text(String),
	Binary(Bytes),
}

impl Frame {
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text(text.into())
	}

	pub fn binary(data: impl Into<Bytes>) -> Self {
		Self::Binary(data.into())
	}

	/// Payload size in bytes.
	#[must_use]
	pub fn len(&self) -> usize {
		match self {
			Self::Text(text) => text.len(),
			Self::Binary(data) => data.len(),
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub const fn frame_type(&self) -> &'static str {
		match self {
			Self::Text(_) => "text",
			Self::Binary(_) => "binary",
		}
	}
}

/// Everything a session can report after it opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	Message(Frame),
	Error(TransportError),
	Closed { code: Option<u16>, reason: Option<String> },
}

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
	pub url: String,
	#[serde(default)]
	pub subprotocols: Vec<String>,
}

impl Endpoint {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			subprotocols: Vec::new(),
		}
	}

	#[must_use]
	pub fn with_subprotocols<I, S>(mut self, protocols: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.subprotocols = protocols.into_iter().map(Into::into).collect();
		self
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.url)
	}
}

/// Credential presented during the handshake.
///
/// A bearer token may be reused across connections. A ticket is single use and
/// may come with its own connection URL, which then replaces the endpoint URL.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
	Bearer(String),
	Ticket { ticket: String, url: Option<String> },
}

impl Credential {
	pub fn bearer(token: impl Into<String>) -> Self {
		Self::Bearer(token.into())
	}

	pub fn ticket(ticket: impl Into<String>) -> Self {
		Self::Ticket {
			ticket: ticket.into(),
			url: None,
		}
	}

	#[must_use]
	pub const fn is_ticket(&self) -> bool {
		matches!(self, Self::Ticket { .. })
	}
}

// Secrets never reach logs.
impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
			Self::Ticket { url, .. } => f.debug_struct("Ticket").field("ticket", &"<redacted>").field("url", url).finish(),
		}
	}
}

/// Parameters for a single handshake.
#[derive(Debug, Clone)]
pub struct OpenRequest {
	pub endpoint: Endpoint,
	pub credential: Option<Credential>,
	pub outbound_capacity: usize,
	pub inbound_capacity: usize,
}

impl OpenRequest {
	#[must_use]
	pub const fn new(endpoint: Endpoint) -> Self {
		Self {
			endpoint,
			credential: None,
			outbound_capacity: 256,
			inbound_capacity: 1024,
		}
	}

	#[must_use]
	pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
		self.credential = credential;
		self
	}

	#[must_use]
	pub const fn with_capacities(mut self, outbound: usize, inbound: usize) -> Self {
		self.outbound_capacity = outbound;
		self.inbound_capacity = inbound;
		self
	}
}

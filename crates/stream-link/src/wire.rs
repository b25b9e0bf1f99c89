use crate::buffer::Chunk;
use crate::optimistic::EntryRole;
use crate::types::LocalId;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use stream_transport::Frame;

/// Stream id given to raw binary frames.
pub const BINARY_STREAM: &str = "binary";

/// JSON text frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
	Chunk { stream_id: String, seq: u64, content: String },
	StreamEnd { stream_id: String },
	Confirmed { local_id: LocalId, server_id: String },
	Rejected { local_id: LocalId, reason: String },
	Record { server_id: String, role: EntryRole, content: String },
}

/// JSON text frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
	Message { local_id: LocalId, content: String },
}

impl ClientFrame {
	pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
		serde_json::to_string(self).map(Frame::Text)
	}
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	Chunk(Chunk),
	StreamEnd { stream_id: String },
	Confirmed { local_id: LocalId, server_id: String },
	Rejected { local_id: LocalId, reason: String },
	Record { server_id: String, role: EntryRole, content: String },
}

/// Turns transport frames into [`Inbound`] values.
///
/// Binary frames carry no header, so they are numbered locally in arrival order.
#[derive(Debug, Default)]
pub struct WireDecoder {
	binary_seq: u64,
}

impl WireDecoder {
	#[must_use]
	pub const fn new() -> Self {
		Self { binary_seq: 0 }
	}

	pub fn decode(&mut self, frame: Frame, arrived_at: Instant) -> Result<Inbound, serde_json::Error> {
		let text = match frame {
			Frame::Binary(data) => {
				self.binary_seq += 1;
				return Ok(Inbound::Chunk(Chunk::new(BINARY_STREAM, self.binary_seq, data, arrived_at)));
			}
			Frame::Text(text) => text,
		};

		Ok(match serde_json::from_str::<ServerFrame>(&text)? {
			ServerFrame::Chunk { stream_id, seq, content } => Inbound::Chunk(Chunk::new(stream_id, seq, content, arrived_at)),
			ServerFrame::StreamEnd { stream_id } => Inbound::StreamEnd { stream_id },
			ServerFrame::Confirmed { local_id, server_id } => Inbound::Confirmed { local_id, server_id },
			ServerFrame::Rejected { local_id, reason } => Inbound::Rejected { local_id, reason },
			ServerFrame::Record { server_id, role, content } => Inbound::Record { server_id, role, content },
		})
	}

	/// Restart local binary numbering, done for each new session.
	pub fn reset(&mut self) {
		self.binary_seq = 0;
	}
}

#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stream_link::{ConnectionManager, ConnectionState, LinkConfig, LinkEvent, Subscription};
use stream_transport::{Endpoint, InMemTransport};

pub fn endpoint() -> Endpoint {
	Endpoint::new("mem://chat")
}

pub fn link(transport: &InMemTransport, config: LinkConfig) -> ConnectionManager {
	ConnectionManager::new(Arc::new(transport.clone()), config).unwrap()
}

pub fn chunk_json(stream_id: &str, seq: u64, content: &str) -> String {
	json!({"type": "chunk", "stream_id": stream_id, "seq": seq, "content": content}).to_string()
}

/// Wait for the first event `pick` accepts. Panics after a minute of (virtual) time.
pub async fn next_matching<T>(events: &mut Subscription, mut pick: impl FnMut(LinkEvent) -> Option<T>) -> T {
	tokio::time::timeout(Duration::from_secs(60), async {
		loop {
			let event = events.recv().await.expect("link stopped");
			if let Some(found) = pick(event) {
				return found;
			}
		}
	})
	.await
	.expect("timed out waiting for event")
}

/// Drain already-queued events and keep the state transitions.
pub fn transitions(events: &mut Subscription) -> Vec<(ConnectionState, ConnectionState)> {
	std::iter::from_fn(|| events.try_recv())
		.filter_map(|event| match event {
			LinkEvent::StateChanged { from, to } => Some((from, to)),
			_ => None,
		})
		.collect()
}

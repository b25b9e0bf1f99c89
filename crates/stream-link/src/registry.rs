use crate::manager::ConnectionManager;
use crate::types::ConnectionId;
use dashmap::DashMap;
use std::sync::Arc;

/// Lookup table for independent links, e.g. one per conversation.
///
/// Holds handles only. Every manager keeps its own buffer, store and state,
/// so nothing here is shared between links beyond the map itself.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
	links: Arc<DashMap<ConnectionId, ConnectionManager>>,
}

impl ConnectionRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a manager under its own id, returning any handle it replaced.
	pub fn insert(&self, manager: ConnectionManager) -> Option<ConnectionManager> {
		self.links.insert(manager.id(), manager)
	}

	#[must_use]
	pub fn get(&self, id: &ConnectionId) -> Option<ConnectionManager> {
		self.links.get(id).map(|entry| entry.value().clone())
	}

	pub fn remove(&self, id: &ConnectionId) -> Option<ConnectionManager> {
		self.links.remove(id).map(|(_, manager)| manager)
	}

	#[must_use]
	pub fn ids(&self) -> Vec<ConnectionId> {
		self.links.iter().map(|entry| *entry.key()).collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.links.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.links.is_empty()
	}

	/// Close and forget every registered link.
	pub async fn shutdown_all(&self) {
		let managers: Vec<_> = self.links.iter().map(|entry| entry.value().clone()).collect();
		self.links.clear();

		for manager in managers {
			manager.shutdown().await;
		}
	}
}

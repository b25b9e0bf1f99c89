use crate::types::LocalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Who an entry speaks for in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
	Initiator,
	Responder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
	Pending,
	Confirmed,
	Failed { reason: String },
}

/// A locally-created record, shown before the server has seen it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimisticEntry {
	pub local_id: LocalId,
	pub role: EntryRole,
	pub payload: String,
	pub status: EntryStatus,
	pub server_id: Option<String>,
	pub created_at: DateTime<Utc>,
}

impl OptimisticEntry {
	#[must_use]
	pub const fn is_pending(&self) -> bool {
		matches!(self.status, EntryStatus::Pending)
	}

	#[must_use]
	pub const fn is_failed(&self) -> bool {
		matches!(self.status, EntryStatus::Failed { .. })
	}
}

/// Timeline of provisional and confirmed entries for one connection.
///
/// Confirmation or failure for an id the store does not know is a no-op.
/// Those races between quick user actions and slow acknowledgements are
/// expected, so they are reported through return values only.
#[derive(Debug, Default)]
pub struct OptimisticStore {
	entries: Vec<OptimisticEntry>,
}

impl OptimisticStore {
	#[must_use]
	pub const fn new() -> Self {
		Self { entries: Vec::new() }
	}

	/// Append a pending entry and return a copy of it.
	pub fn add_optimistic_entry(&mut self, role: EntryRole, payload: impl Into<String>) -> OptimisticEntry {
		let entry = OptimisticEntry {
			local_id: LocalId::new(),
			role,
			payload: payload.into(),
			status: EntryStatus::Pending,
			server_id: None,
			created_at: Utc::now(),
		};
		self.entries.push(entry.clone());
		entry
	}

	/// Link a pending or failed entry to its server id.
	pub fn confirm(&mut self, local_id: LocalId, server_id: impl Into<String>) -> Option<OptimisticEntry> {
		self.confirm_collapsing(local_id, server_id).map(|(entry, _)| entry)
	}

	/// Like [`confirm`](Self::confirm), also handing back the entry that was
	/// removed because it already carried `server_id`.
	///
	/// Nothing is touched unless the confirmation itself applies.
	pub fn confirm_collapsing(&mut self, local_id: LocalId, server_id: impl Into<String>) -> Option<(OptimisticEntry, Option<OptimisticEntry>)> {
		let server_id = server_id.into();

		let Some(entry) = self.get(local_id) else {
			debug!(%local_id, "confirm for unknown entry ignored");
			return None;
		};
		if matches!(entry.status, EntryStatus::Confirmed) {
			return None;
		}

		// A record with this server id may have arrived before the ack.
		let duplicate = self.entries.iter().position(|e| e.local_id != local_id && e.server_id.as_deref() == Some(server_id.as_str()));
		let collapsed = duplicate.map(|pos| self.entries.remove(pos));

		let entry = self.find_mut(local_id)?;
		entry.status = EntryStatus::Confirmed;
		entry.server_id = Some(server_id);
		Some((entry.clone(), collapsed))
	}

	/// Mark an entry failed. It stays in the timeline so it can be retried.
	pub fn fail(&mut self, local_id: LocalId, reason: impl Into<String>) -> Option<OptimisticEntry> {
		let Some(entry) = self.find_mut(local_id) else {
			debug!(%local_id, "fail for unknown entry ignored");
			return None;
		};
		if !entry.is_pending() {
			return None;
		}

		entry.status = EntryStatus::Failed { reason: reason.into() };
		Some(entry.clone())
	}

	/// Drop an entry that has not been confirmed.
	pub fn rollback(&mut self, local_id: LocalId) -> Option<OptimisticEntry> {
		let pos = self.entries.iter().position(|e| e.local_id == local_id && !matches!(e.status, EntryStatus::Confirmed))?;
		Some(self.entries.remove(pos))
	}

	/// Put a failed entry back to pending.
	pub fn retry(&mut self, local_id: LocalId) -> Option<OptimisticEntry> {
		let entry = self.find_mut(local_id)?;
		if !entry.is_failed() {
			return None;
		}
		entry.status = EntryStatus::Pending;
		Some(entry.clone())
	}

	/// Insert a record that originated on the server.
	///
	/// Returns `None` when an entry is already linked to `server_id`, which is
	/// the case for an echo of a confirmed optimistic entry.
	pub fn apply_server_record(&mut self, server_id: impl Into<String>, role: EntryRole, payload: impl Into<String>) -> Option<OptimisticEntry> {
		let server_id = server_id.into();
		if self.entries.iter().any(|e| e.server_id.as_deref() == Some(server_id.as_str())) {
			return None;
		}

		let entry = OptimisticEntry {
			local_id: LocalId::new(),
			role,
			payload: payload.into(),
			status: EntryStatus::Confirmed,
			server_id: Some(server_id),
			created_at: Utc::now(),
		};
		self.entries.push(entry.clone());
		Some(entry)
	}

	#[must_use]
	pub fn get(&self, local_id: LocalId) -> Option<&OptimisticEntry> {
		self.entries.iter().find(|e| e.local_id == local_id)
	}

	/// All entries in timeline order.
	#[must_use]
	pub fn entries(&self) -> &[OptimisticEntry] {
		&self.entries
	}

	pub fn pending(&self) -> impl Iterator<Item = &OptimisticEntry> {
		self.entries.iter().filter(|e| e.is_pending())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn find_mut(&mut self, local_id: LocalId) -> Option<&mut OptimisticEntry> {
		self.entries.iter_mut().find(|e| e.local_id == local_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_entry_is_pending_and_visible() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");

		assert_eq!(entry.status, EntryStatus::Pending);
		assert_eq!(store.get(entry.local_id), Some(&entry));
		assert_eq!(store.pending().count(), 1);
	}

	#[test]
	fn test_local_ids_are_unique() {
		let mut store = OptimisticStore::new();
		let a = store.add_optimistic_entry(EntryRole::Initiator, "a");
		let b = store.add_optimistic_entry(EntryRole::Responder, "b");
		assert_ne!(a.local_id, b.local_id);
	}

	#[test]
	fn test_confirmed_entry_matches_server_record_shape() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");

		let confirmed = store.confirm(entry.local_id, "srv-1").unwrap();
		assert_eq!(confirmed.status, EntryStatus::Confirmed);
		assert_eq!(confirmed.server_id.as_deref(), Some("srv-1"));
		assert_eq!(store.pending().count(), 0);

		let mut other = OptimisticStore::new();
		let record = other.apply_server_record("srv-2", EntryRole::Initiator, "hello").unwrap();
		assert_eq!(record.status, confirmed.status);
		assert_eq!(record.role, confirmed.role);
		assert_eq!(record.payload, confirmed.payload);
	}

	#[test]
	fn test_failed_entry_stays_visible() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");

		let failed = store.fail(entry.local_id, "timeout").unwrap();
		assert_eq!(failed.status, EntryStatus::Failed { reason: "timeout".into() });
		assert_eq!(store.len(), 1);
		assert!(store.get(entry.local_id).unwrap().is_failed());
	}

	#[test]
	fn test_unknown_ids_are_noops() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");
		let before = store.entries().to_vec();

		let unknown = LocalId::new();
		assert!(store.confirm(unknown, "srv").is_none());
		assert!(store.fail(unknown, "nope").is_none());
		assert!(store.rollback(unknown).is_none());
		assert!(store.retry(unknown).is_none());

		assert_eq!(store.entries(), before.as_slice());
		assert!(store.get(entry.local_id).unwrap().is_pending());
	}

	#[test]
	fn test_retry_then_confirm() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");
		store.fail(entry.local_id, "offline");

		let retried = store.retry(entry.local_id).unwrap();
		assert!(retried.is_pending());
		assert!(store.confirm(entry.local_id, "srv-9").is_some());
		assert!(store.retry(entry.local_id).is_none());
	}

	#[test]
	fn test_rollback_removes_unconfirmed_only() {
		let mut store = OptimisticStore::new();
		let a = store.add_optimistic_entry(EntryRole::Initiator, "a");
		let b = store.add_optimistic_entry(EntryRole::Initiator, "b");
		store.confirm(b.local_id, "srv-b");

		assert!(store.rollback(a.local_id).is_some());
		assert!(store.rollback(b.local_id).is_none());
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn test_server_echo_is_not_duplicated() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");
		store.confirm(entry.local_id, "srv-1");

		assert!(store.apply_server_record("srv-1", EntryRole::Initiator, "hello").is_none());
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn test_record_before_ack_collapses_on_confirm() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");
		store.apply_server_record("srv-1", EntryRole::Initiator, "hello");
		assert_eq!(store.len(), 2);

		let (confirmed, collapsed) = store.confirm_collapsing(entry.local_id, "srv-1").unwrap();
		assert_eq!(confirmed.local_id, entry.local_id);
		assert_eq!(collapsed.unwrap().server_id.as_deref(), Some("srv-1"));
		assert_eq!(store.len(), 1);
		assert_eq!(store.entries()[0].local_id, entry.local_id);
	}

	#[test]
	fn test_repeated_confirm_leaves_other_entries_alone() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");
		store.confirm(entry.local_id, "srv-a");
		let record = store.apply_server_record("srv-x", EntryRole::Responder, "hi").unwrap();

		assert!(store.confirm_collapsing(entry.local_id, "srv-x").is_none());
		assert_eq!(store.len(), 2);
		assert_eq!(store.get(record.local_id), Some(&record));
		assert_eq!(store.get(entry.local_id).unwrap().server_id.as_deref(), Some("srv-a"));
	}

	#[test]
	fn test_confirm_without_duplicate_collapses_nothing() {
		let mut store = OptimisticStore::new();
		let entry = store.add_optimistic_entry(EntryRole::Initiator, "hello");

		let (_, collapsed) = store.confirm_collapsing(entry.local_id, "srv-1").unwrap();
		assert!(collapsed.is_none());
	}
}

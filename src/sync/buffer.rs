//! Buffer store: operations waiting for a causal prerequisite
//!
//! Keyed by the identifier the operation is waiting for. When that identifier
//! is applied the client takes the entry and re-queues its operations.

use crate::crdt::text::{ItemId, Operation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which prerequisite an operation is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BufferKind {
    /// Insert waiting for its origin
    Origin,
    /// Insert waiting for its right origin
    Right,
    /// Delete waiting for its target
    Target,
}

/// One buffered dependency, as persisted in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEntry {
    pub waiting_for: ItemId,
    pub operations: Vec<Operation>,
}

/// Operations parked until an identifier arrives
#[derive(Debug, Clone, Default)]
pub struct BufferStore {
    pending: BTreeMap<ItemId, Vec<Operation>>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `op` until `key` is applied
    ///
    /// Returns false if the same operation was already parked under `key`
    /// (duplicate delivery).
    pub fn push(&mut self, key: ItemId, op: Operation) -> bool {
        let waiting = self.pending.entry(key).or_default();
        if waiting.iter().any(|o| o.id() == op.id()) {
            return false;
        }
        waiting.push(op);
        true
    }

    /// Remove and return everything waiting for `key`
    pub fn take(&mut self, key: &ItemId) -> Vec<Operation> {
        self.pending.remove(key).unwrap_or_default()
    }

    /// Whether `op_id` is parked anywhere in this buffer
    pub fn contains_op(&self, op_id: &ItemId) -> bool {
        self.pending
            .values()
            .any(|ops| ops.iter().any(|o| o.id() == *op_id))
    }

    /// Number of parked operations
    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Identifiers something is waiting for
    pub fn keys(&self) -> impl Iterator<Item = &ItemId> {
        self.pending.keys()
    }

    pub fn entries(&self) -> Vec<BufferedEntry> {
        self.pending
            .iter()
            .map(|(key, ops)| BufferedEntry {
                waiting_for: *key,
                operations: ops.clone(),
            })
            .collect()
    }

    pub fn from_entries(entries: Vec<BufferedEntry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            for op in entry.operations {
                store.push(entry.waiting_for, op);
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::text::{Content, HEAD};

    fn waiting_insert(seq: u64, origin: ItemId) -> Operation {
        Operation::insert(ItemId::new(2, seq), Content::text("y"), origin, HEAD)
    }

    #[test]
    fn test_push_and_take() {
        let mut buffer = BufferStore::new();
        let key = ItemId::new(1, 1);

        assert!(buffer.push(key, waiting_insert(1, key)));
        assert!(buffer.push(key, waiting_insert(2, key)));
        assert_eq!(buffer.len(), 2);
        assert!(buffer.contains_op(&ItemId::new(2, 2)));

        let taken = buffer.take(&key);
        assert_eq!(taken.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.take(&key).is_empty());
    }

    #[test]
    fn test_duplicate_delivery_is_parked_once() {
        let mut buffer = BufferStore::new();
        let key = ItemId::new(1, 1);

        assert!(buffer.push(key, waiting_insert(1, key)));
        assert!(!buffer.push(key, waiting_insert(1, key)));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_entries_round_trip() {
        let mut buffer = BufferStore::new();
        buffer.push(ItemId::new(1, 1), waiting_insert(1, ItemId::new(1, 1)));
        buffer.push(ItemId::new(1, 5), waiting_insert(2, ItemId::new(1, 5)));

        let restored = BufferStore::from_entries(buffer.entries());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.keys().count(), 2);
    }
}

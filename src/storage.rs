//! Persisted replica state
//!
//! A snapshot is the durable blob an outer layer stores and hands back on
//! reload. Inserts are listed in document order and relinked in exactly that
//! order on restore; conflict resolution already happened when they were
//! first applied and is not repeated.

use crate::client::Client;
use crate::crdt::text::{Item, ItemId, Operation, ReplicaId, HEAD, TAIL};
use crate::error::{Result, SyncError};
use crate::sync::{BufferStore, BufferedEntry, StateVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub replica_id: ReplicaId,
    /// Last locally allocated sequence
    pub sequence: u64,
    /// Live inserts in document order, then every stored delete
    pub stored_operations: Vec<Operation>,
    pub state_vector: StateVector,
    pub gap_set: BTreeSet<ItemId>,
    pub origin_buffer: Vec<BufferedEntry>,
    pub right_buffer: Vec<BufferedEntry>,
    pub target_buffer: Vec<BufferedEntry>,
    /// Collected item and the right neighbor it had when unlinked
    #[serde(default)]
    pub collected_successors: Vec<(ItemId, ItemId)>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Client {
    /// Capture everything needed to rebuild this replica
    pub fn snapshot(&self) -> Snapshot {
        let inserts = self
            .document
            .iter()
            .filter(|item| !item.id.is_sentinel())
            .map(|item| {
                Operation::insert(item.id, item.content.clone(), item.origin, item.right_origin)
            });
        let deletes = self
            .store
            .iter()
            .filter(|op| !op.is_insert())
            .cloned();

        Snapshot {
            replica_id: self.replica_id(),
            sequence: self.sequence(),
            stored_operations: inserts.chain(deletes).collect(),
            state_vector: self.state.clone(),
            gap_set: self.state.gaps().clone(),
            origin_buffer: self.origin_buffer.entries(),
            right_buffer: self.right_buffer.entries(),
            target_buffer: self.target_buffer.entries(),
            collected_successors: {
                let mut pairs: Vec<(ItemId, ItemId)> =
                    self.successors.iter().map(|(id, next)| (*id, *next)).collect();
                pairs.sort();
                pairs
            },
        }
    }

    /// Rebuild a replica from a snapshot
    pub fn restore(snapshot: Snapshot) -> Result<Client> {
        if snapshot.replica_id == HEAD.replica || snapshot.replica_id == TAIL.replica {
            return Err(SyncError::InvalidState(format!(
                "snapshot has reserved replica id {}",
                snapshot.replica_id
            )));
        }

        let mut client = Client::new(snapshot.replica_id);
        let mut last = HEAD;
        let mut deletes = Vec::new();

        for op in snapshot.stored_operations {
            match op {
                Operation::Insert(insert) => {
                    if insert.id.is_sentinel() || client.document.contains(&insert.id) {
                        return Err(SyncError::InvalidState(format!(
                            "snapshot relinks item {}",
                            insert.id
                        )));
                    }
                    client.document.link_after(last, Item::from_op(&insert))?;
                    client.blocks.on_insert(&mut client.document, insert.id)?;
                    last = insert.id;
                    client.store.insert(Operation::Insert(insert));
                }
                Operation::Delete(delete) => deletes.push(delete),
            }
        }

        for delete in deletes {
            if client.document.contains(&delete.target) {
                client.handle_delete(&delete);
            } else {
                client.orphaned_deletes.push(delete.id);
                client.store.insert(Operation::Delete(delete));
            }
        }

        let mut state = snapshot.state_vector;
        state.set_gaps(snapshot.gap_set);
        client.set_sequence(snapshot.sequence.max(state.get(snapshot.replica_id)));
        client.state = state;
        client.origin_buffer = BufferStore::from_entries(snapshot.origin_buffer);
        client.right_buffer = BufferStore::from_entries(snapshot.right_buffer);
        client.target_buffer = BufferStore::from_entries(snapshot.target_buffer);
        client.successors = snapshot.collected_successors.into_iter().collect();
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::text::Content;
    use serde_json::json;

    fn edited() -> Client {
        let mut client = Client::new(5);
        client.local_insert(0, "Hello\nWorld", None).unwrap();
        client.local_insert(5, "!", None).unwrap();
        client.local_delete(0, 1).unwrap();
        client
    }

    #[test]
    fn test_restore_rebuilds_text_and_blocks() {
        let client = edited();
        let restored = Client::restore(client.snapshot()).unwrap();

        assert_eq!(restored.text(), client.text());
        assert_eq!(restored.len(), client.len());
        assert_eq!(restored.blocks().len(), client.blocks().len());
        assert!(restored.blocks().is_consistent(restored.document()));
        assert_eq!(restored.state_vector(), client.state_vector());
        assert_eq!(restored.sequence(), client.sequence());
    }

    #[test]
    fn test_restore_keeps_buffers() {
        let mut client = Client::new(5);
        client.apply_ops(vec![Operation::insert(
            ItemId::new(9, 2),
            Content::text("late"),
            ItemId::new(9, 1),
            TAIL,
        )]);
        let mut restored = Client::restore(client.snapshot()).unwrap();
        assert_eq!(restored.buffered_len(), 1);

        restored.apply_ops(vec![Operation::insert(
            ItemId::new(9, 1),
            Content::text("early "),
            HEAD,
            TAIL,
        )]);
        assert_eq!(restored.text(), "early late");
    }

    #[test]
    fn test_restored_replica_keeps_allocating_fresh_ids() {
        let client = edited();
        let mut restored = Client::restore(client.snapshot()).unwrap();
        let next = restored.next_id();
        assert!(restored.state_vector().is_new(&next));
        assert_eq!(next.seq, client.sequence() + 1);
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = edited().snapshot();
        let json = snapshot.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["replicaId"], json!(5));
        assert!(value["storedOperations"].is_array());

        assert_eq!(Snapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_restore_keeps_collected_successors() {
        let mut client = Client::new(5);
        client.local_insert(0, "a", None).unwrap();
        let x = client.local_insert(1, "x", None).unwrap()[0].id();
        client.local_insert(2, "bc", None).unwrap();
        client.local_delete(1, 1).unwrap();
        client.collect_item(&x);

        let json = client.snapshot().to_json().unwrap();
        let restored = Client::restore(Snapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.collected_successor(&x), client.collected_successor(&x));
        assert_ne!(restored.collected_successor(&x), TAIL);
        assert_eq!(restored.text(), "abc");
    }

    #[test]
    fn test_rejects_duplicate_items() {
        let mut snapshot = edited().snapshot();
        let first = snapshot.stored_operations[0].clone();
        snapshot.stored_operations.push(first);
        assert!(Client::restore(snapshot).is_err());
    }
}

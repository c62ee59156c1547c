//! Client: the per-replica apply loop
//!
//! Owns the document, its block index, the operation log, the state vector
//! and the three dependency buffers. Incoming batches are drained with a
//! work-list: each applied operation releases whatever was buffered on its
//! id back into the queue, so a batch settles in one call no matter the
//! delivery order.
//!
//! # Example
//!
//! ```
//! use synctext_core::client::Client;
//!
//! let mut a = Client::new(1);
//! let mut b = Client::new(2);
//!
//! let ops = a.local_insert(0, "Hello", None).unwrap();
//! let report = b.apply_ops(ops);
//!
//! assert!(report.is_clean());
//! assert_eq!(b.text(), "Hello");
//! ```

mod delete;
mod insert;

use crate::config::ReplicaConfig;
use crate::crdt::text::{BlockIndex, Document, Item, ItemId, Operation, ReplicaId, HEAD, TAIL};
use crate::error::{Result, SyncError};
use crate::sync::{BufferKind, BufferStore, OperationStore, StateVector};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Result of handling one operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Integrated into the document
    Applied(Effect),
    /// Parked until a dependency arrives
    Buffered(BufferKind),
    /// Already applied; nothing to do
    Stale,
    /// Rejected; the operation is lost on this replica
    Dropped(DropReason),
}

/// Visible consequence of an applied operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A new item was linked
    Inserted(ItemId),
    /// A visible item was tombstoned, removing `removed` characters
    Deleted { target: ItemId, removed: usize },
    /// Recorded with no change to the visible text
    Unchanged,
}

/// Why an operation was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The insert's origin was applied earlier and has been garbage-collected
    OriginCollected(ItemId),
    /// The operation names a sentinel where that is not allowed
    InvalidAnchor(ItemId),
    /// Document or block bookkeeping failed
    Internal(String),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::OriginCollected(id) => write!(f, "origin {} was collected", id),
            DropReason::InvalidAnchor(id) => write!(f, "invalid anchor {}", id),
            DropReason::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

/// Summary of one `apply_ops` call
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Operations integrated, in application order
    pub applied: Vec<Operation>,
    /// Operations still waiting for a dependency when the call returned
    pub buffered: Vec<(ItemId, BufferKind)>,
    /// Repeats of already-applied operations
    pub stale: usize,
    /// Operations rejected, with the reason
    pub dropped: Vec<(Operation, DropReason)>,
}

impl ApplyReport {
    /// Nothing dropped and nothing left waiting
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && self.buffered.is_empty()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

/// One replica of the text
#[derive(Debug, Clone)]
pub struct Client {
    replica: ReplicaId,
    seq: u64,
    pub(crate) document: Document,
    pub(crate) blocks: BlockIndex,
    pub(crate) store: OperationStore,
    pub(crate) state: StateVector,
    pub(crate) origin_buffer: BufferStore,
    pub(crate) right_buffer: BufferStore,
    pub(crate) target_buffer: BufferStore,
    /// Deletes recorded after their target was collected; compaction fodder
    pub(crate) orphaned_deletes: Vec<ItemId>,
    /// Collected item -> its right neighbor when it was unlinked
    pub(crate) successors: HashMap<ItemId, ItemId>,
}

impl Client {
    /// Create an empty replica
    pub fn new(replica: ReplicaId) -> Self {
        let mut document = Document::new();
        let blocks = BlockIndex::new(&mut document);
        Self {
            replica,
            seq: 0,
            document,
            blocks,
            store: OperationStore::new(),
            state: StateVector::new(),
            origin_buffer: BufferStore::new(),
            right_buffer: BufferStore::new(),
            target_buffer: BufferStore::new(),
            orphaned_deletes: Vec::new(),
            successors: HashMap::new(),
        }
    }

    /// Create an empty replica from configuration
    pub fn from_config(config: &ReplicaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.resolve_replica_id()))
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica
    }

    /// Last sequence number allocated locally
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_sequence(&mut self, seq: u64) {
        self.seq = seq;
    }

    /// Allocate the id for a new local operation
    pub fn next_id(&mut self) -> ItemId {
        self.seq = self.seq.max(self.state.get(self.replica)) + 1;
        ItemId::new(self.replica, self.seq)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn blocks(&self) -> &BlockIndex {
        &self.blocks
    }

    pub fn store(&self) -> &OperationStore {
        &self.store
    }

    pub fn state_vector(&self) -> &StateVector {
        &self.state
    }

    /// Visible text
    pub fn text(&self) -> String {
        self.document.text()
    }

    /// Number of visible characters
    pub fn len(&self) -> usize {
        self.blocks.total_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operations parked across all three buffers
    pub fn buffered_len(&self) -> usize {
        self.origin_buffer.len() + self.right_buffer.len() + self.target_buffer.len()
    }

    /// Operations this replica has that the holder of `other` has not seen
    pub fn get_missing_ops(&self, other: &StateVector) -> Vec<Operation> {
        self.store.missing_since(other)
    }

    /// Apply a batch of operations
    ///
    /// Returns what was applied (for re-broadcast), what is still waiting,
    /// and what had to be dropped.
    pub fn apply_ops(&mut self, ops: Vec<Operation>) -> ApplyReport {
        self.apply_ops_with(ops, |_, _, _| {})
    }

    /// Apply a batch, calling `observe` right after each operation is
    /// integrated, while the document reflects exactly that operation
    pub fn apply_ops_with<F>(&mut self, ops: Vec<Operation>, mut observe: F) -> ApplyReport
    where
        F: FnMut(&Client, &Operation, &Effect),
    {
        let mut queue: VecDeque<Operation> = ops.into();
        let mut report = ApplyReport::default();
        let mut parked: Vec<(ItemId, BufferKind)> = Vec::new();

        while let Some(op) = queue.pop_front() {
            let id = op.id();
            match self.handle(&op) {
                Outcome::Applied(effect) => {
                    observe(self, &op, &effect);
                    for buffer in [
                        &mut self.origin_buffer,
                        &mut self.right_buffer,
                        &mut self.target_buffer,
                    ] {
                        queue.extend(buffer.take(&id));
                    }
                    report.applied.push(op);
                }
                Outcome::Buffered(kind) => parked.push((id, kind)),
                Outcome::Stale => report.stale += 1,
                Outcome::Dropped(reason) => {
                    warn!(op = %id, %reason, "dropping operation");
                    report.dropped.push((op, reason));
                }
            }
        }

        let applied: HashSet<ItemId> = report.applied.iter().map(Operation::id).collect();
        let mut seen = HashSet::new();
        report.buffered = parked
            .into_iter()
            .rev()
            .filter(|(id, _)| !applied.contains(id) && seen.insert(*id))
            .collect();
        report.buffered.reverse();
        report
    }

    /// Dispatch one operation to its handler
    ///
    /// Ids on the sentinel replicas are never allocated to real operations
    /// and are rejected before they can reach the state vector.
    pub fn handle(&mut self, op: &Operation) -> Outcome {
        let id = op.id();
        if id.replica == HEAD.replica || id.replica == TAIL.replica {
            return Outcome::Dropped(DropReason::InvalidAnchor(id));
        }
        if !self.state.is_new(&id) {
            return Outcome::Stale;
        }
        match op {
            Operation::Insert(insert) => self.handle_insert(insert),
            Operation::Delete(delete) => self.handle_delete(delete),
        }
    }

    /// Apply an operation authored on this replica
    ///
    /// Local operations always have their dependencies present, so anything
    /// but `Applied` means the replica is inconsistent.
    pub(crate) fn apply_local(&mut self, op: Operation) -> Result<Effect> {
        let id = op.id();
        match self.handle(&op) {
            Outcome::Applied(effect) => Ok(effect),
            other => Err(SyncError::InvalidState(format!(
                "local operation {} not applied: {:?}",
                id, other
            ))),
        }
    }

    /// Physically remove a tombstone (garbage collection)
    pub(crate) fn collect_item(&mut self, id: &ItemId) -> Option<Item> {
        let left = self.document.prev(id);
        let right = self.document.next(id).unwrap_or(TAIL);
        let item = self.document.unlink(id)?;
        self.successors.insert(*id, right);
        self.blocks.on_collect(&mut self.document, id, left);
        debug!(item = %id, "collected item");
        Some(item)
    }

    /// First linked item that followed `id` when it was collected
    ///
    /// Follows the chain through successors that were collected in turn.
    /// Falls back to `TAIL` when nothing was recorded for `id`.
    pub(crate) fn collected_successor(&self, id: &ItemId) -> ItemId {
        let mut current = *id;
        while let Some(next) = self.successors.get(&current) {
            if self.document.contains(next) {
                return *next;
            }
            current = *next;
        }
        TAIL
    }

    pub(crate) fn park(&mut self, kind: BufferKind, key: ItemId, op: Operation) -> Outcome {
        let id = op.id();
        let buffer = match kind {
            BufferKind::Origin => &mut self.origin_buffer,
            BufferKind::Right => &mut self.right_buffer,
            BufferKind::Target => &mut self.target_buffer,
        };
        if buffer.push(key, op) {
            debug!(op = %id, waiting_for = %key, ?kind, "buffered operation");
        }
        Outcome::Buffered(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::text::{Content, HEAD, TAIL};

    fn ins(replica: u64, seq: u64, text: &str, origin: ItemId, right: ItemId) -> Operation {
        Operation::insert(ItemId::new(replica, seq), Content::text(text), origin, right)
    }

    #[test]
    fn test_apply_in_order() {
        let mut client = Client::new(9);
        let report = client.apply_ops(vec![
            ins(1, 1, "a", HEAD, TAIL),
            ins(1, 2, "b", ItemId::new(1, 1), TAIL),
        ]);

        assert!(report.is_clean());
        assert_eq!(report.applied.len(), 2);
        assert_eq!(client.text(), "ab");
        assert_eq!(client.state_vector().get(1), 2);
        assert_eq!(client.store().len(), 2);
    }

    #[test]
    fn test_out_of_order_origin_is_buffered_then_released() {
        let mut client = Client::new(9);

        let report = client.apply_ops(vec![ins(1, 2, "b", ItemId::new(1, 1), TAIL)]);
        assert_eq!(report.buffered, vec![(ItemId::new(1, 2), BufferKind::Origin)]);
        assert_eq!(client.buffered_len(), 1);
        assert_eq!(client.text(), "");

        let report = client.apply_ops(vec![ins(1, 1, "a", HEAD, TAIL)]);
        assert!(report.is_clean());
        assert_eq!(report.applied.len(), 2);
        assert_eq!(client.buffered_len(), 0);
        assert_eq!(client.text(), "ab");
    }

    #[test]
    fn test_missing_right_origin_is_buffered() {
        let mut client = Client::new(9);
        client.apply_ops(vec![ins(1, 1, "a", HEAD, TAIL)]);

        // "x" was authored between "a" and "b", but "b" has not arrived
        let x = ins(2, 1, "x", ItemId::new(1, 1), ItemId::new(1, 2));
        let report = client.apply_ops(vec![x]);
        assert_eq!(report.buffered, vec![(ItemId::new(2, 1), BufferKind::Right)]);

        client.apply_ops(vec![ins(1, 2, "b", ItemId::new(1, 1), TAIL)]);
        assert_eq!(client.text(), "axb");
        assert_eq!(client.buffered_len(), 0);
    }

    #[test]
    fn test_delete_before_insert_is_buffered() {
        let mut client = Client::new(9);
        let report =
            client.apply_ops(vec![Operation::delete(ItemId::new(2, 1), ItemId::new(1, 1))]);
        assert_eq!(report.buffered, vec![(ItemId::new(2, 1), BufferKind::Target)]);

        client.apply_ops(vec![ins(1, 1, "gone", HEAD, TAIL)]);
        assert_eq!(client.text(), "");
        assert!(client.document().get(&ItemId::new(1, 1)).unwrap().deleted);
    }

    #[test]
    fn test_reapplying_is_stale() {
        let mut client = Client::new(9);
        let ops = vec![
            ins(1, 1, "a", HEAD, TAIL),
            Operation::delete(ItemId::new(1, 2), ItemId::new(1, 1)),
        ];
        client.apply_ops(ops.clone());
        let text = client.text();
        let vector = client.state_vector().clone();

        let report = client.apply_ops(ops);
        assert_eq!(report.stale, 2);
        assert!(report.applied.is_empty());
        assert_eq!(client.text(), text);
        assert_eq!(client.state_vector(), &vector);
    }

    #[test]
    fn test_invalid_anchor_is_dropped_and_reported() {
        let mut client = Client::new(9);
        let report = client.apply_ops(vec![
            ins(1, 1, "a", TAIL, TAIL),
            Operation::delete(ItemId::new(1, 2), HEAD),
        ]);

        assert_eq!(report.dropped_count(), 2);
        assert!(matches!(report.dropped[0].1, DropReason::InvalidAnchor(_)));
        assert_eq!(client.text(), "");
    }

    #[test]
    fn test_sentinel_op_ids_are_rejected() {
        let mut client = Client::new(9);
        let report = client.apply_ops(vec![
            Operation::delete(TAIL, ItemId::new(9, 1)),
            Operation::delete(ItemId::new(u64::MAX, 3), ItemId::new(9, 1)),
            ins(0, 4, "x", HEAD, TAIL),
            Operation::delete(HEAD, ItemId::new(9, 1)),
        ]);

        assert_eq!(report.dropped_count(), 4);
        assert!(report
            .dropped
            .iter()
            .all(|(op, reason)| *reason == DropReason::InvalidAnchor(op.id())));
        assert_eq!(client.state_vector(), &StateVector::new());
        assert_eq!(client.buffered_len(), 0);
        assert!(client.store().is_empty());
    }

    #[test]
    fn test_collected_successor_follows_chain() {
        let mut client = Client::new(9);
        client.apply_ops(vec![
            ins(1, 1, "a", HEAD, TAIL),
            ins(1, 2, "b", ItemId::new(1, 1), TAIL),
            ins(1, 3, "c", ItemId::new(1, 2), TAIL),
            ins(1, 4, "d", ItemId::new(1, 3), TAIL),
            Operation::delete(ItemId::new(1, 5), ItemId::new(1, 2)),
            Operation::delete(ItemId::new(1, 6), ItemId::new(1, 3)),
        ]);

        client.collect_item(&ItemId::new(1, 2));
        assert_eq!(client.collected_successor(&ItemId::new(1, 2)), ItemId::new(1, 3));
        client.collect_item(&ItemId::new(1, 3));
        assert_eq!(client.collected_successor(&ItemId::new(1, 2)), ItemId::new(1, 4));
        assert_eq!(client.collected_successor(&ItemId::new(1, 3)), ItemId::new(1, 4));
        assert_eq!(client.collected_successor(&ItemId::new(5, 5)), TAIL);
    }

    #[test]
    fn test_observer_sees_each_effect() {
        let mut client = Client::new(9);
        let mut effects = Vec::new();
        client.apply_ops_with(
            vec![
                Operation::delete(ItemId::new(1, 2), ItemId::new(1, 1)),
                ins(1, 1, "ab", HEAD, TAIL),
            ],
            |c, _, effect| effects.push((effect.clone(), c.text())),
        );

        assert_eq!(
            effects,
            vec![
                (Effect::Inserted(ItemId::new(1, 1)), "ab".to_string()),
                (
                    Effect::Deleted {
                        target: ItemId::new(1, 1),
                        removed: 2
                    },
                    String::new()
                ),
            ]
        );
    }

    #[test]
    fn test_next_id_is_monotonic() {
        let mut client = Client::new(4);
        assert_eq!(client.next_id(), ItemId::new(4, 1));
        assert_eq!(client.next_id(), ItemId::new(4, 2));
        assert_eq!(client.sequence(), 2);
    }
}

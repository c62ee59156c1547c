//! Operation store: the replica's log of applied operations

use super::state_vector::StateVector;
use crate::crdt::text::{ItemId, Operation, ReplicaId};
use std::collections::BTreeMap;

/// Every applied operation, indexed by replica then sequence
#[derive(Debug, Clone, Default)]
pub struct OperationStore {
    ops: BTreeMap<ReplicaId, BTreeMap<u64, Operation>>,
}

impl OperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied operation
    pub fn insert(&mut self, op: Operation) {
        let id = op.id();
        self.ops.entry(id.replica).or_default().insert(id.seq, op);
    }

    pub fn get(&self, id: &ItemId) -> Option<&Operation> {
        self.ops.get(&id.replica).and_then(|log| log.get(&id.seq))
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Drop an operation from the log (log compaction)
    pub fn remove(&mut self, id: &ItemId) -> Option<Operation> {
        let log = self.ops.get_mut(&id.replica)?;
        let removed = log.remove(&id.seq);
        if log.is_empty() {
            self.ops.remove(&id.replica);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.ops.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// All stored operations, by replica then sequence
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.values().flat_map(BTreeMap::values)
    }

    /// Operations the holder of `other` has not observed yet
    ///
    /// Everything above `other`'s recorded maximum per replica, plus anything
    /// listed in its gap set.
    pub fn missing_since(&self, other: &StateVector) -> Vec<Operation> {
        let mut missing = Vec::new();
        for (&replica, log) in &self.ops {
            let seen = other.get(replica);
            for gap in other
                .gaps()
                .range(ItemId::new(replica, 0)..=ItemId::new(replica, seen))
            {
                if let Some(op) = log.get(&gap.seq) {
                    missing.push(op.clone());
                }
            }
            missing.extend(log.range(seen.saturating_add(1)..).map(|(_, op)| op.clone()));
        }
        missing
    }
}

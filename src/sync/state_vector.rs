//! State vector: per-replica logical clock with explicit gaps
//!
//! `clocks[r]` is the highest sequence applied from replica `r`. Sequences
//! can arrive out of order (an op may sit in a buffer while later ops from
//! the same replica apply), so every sequence skipped over is recorded in the
//! gap set. A gap id is still "new" when it finally arrives.

use crate::crdt::text::{ItemId, ReplicaId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a replica has observed from every other replica
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVector {
    clocks: BTreeMap<ReplicaId, u64>,
    #[serde(default)]
    gaps: BTreeSet<ItemId>,
}

impl StateVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence seen from `replica` (0 if none)
    pub fn get(&self, replica: ReplicaId) -> u64 {
        self.clocks.get(&replica).copied().unwrap_or(0)
    }

    /// Whether an operation with this id still has to be applied
    pub fn is_new(&self, id: &ItemId) -> bool {
        id.seq > self.get(id.replica) || self.gaps.contains(id)
    }

    /// Whether an operation with this id has been applied
    ///
    /// Sentinels count as seen.
    pub fn has_seen(&self, id: &ItemId) -> bool {
        id.is_sentinel() || !self.is_new(id)
    }

    /// Record that `(replica, seq)` has been applied
    ///
    /// Jumping more than one past the current maximum records every skipped
    /// sequence as a gap; filling a gap removes it.
    pub fn update(&mut self, replica: ReplicaId, seq: u64) {
        let current = self.get(replica);
        if seq > current {
            for missing in current + 1..seq {
                self.gaps.insert(ItemId::new(replica, missing));
            }
            self.clocks.insert(replica, seq);
        } else {
            self.gaps.remove(&ItemId::new(replica, seq));
        }
    }

    /// Pointwise maximum with another vector
    ///
    /// A gap survives only if the id is unseen on both sides.
    pub fn merge(&mut self, other: &StateVector) {
        let unseen_by_other = |id: &ItemId| other.is_new(id);
        let mut gaps: BTreeSet<ItemId> = self
            .gaps
            .iter()
            .filter(|id| unseen_by_other(id))
            .copied()
            .collect();
        for id in &other.gaps {
            if self.is_new(id) {
                gaps.insert(*id);
            }
        }
        // Sequences only the other side reached are known to us now, minus
        // its own gaps (already carried over above).
        for (&replica, &seq) in &other.clocks {
            let current = self.get(replica);
            if seq > current {
                self.clocks.insert(replica, seq);
            }
        }
        self.gaps = gaps;
    }

    /// Highest sequence `s` such that every sequence `1..=s` from `replica`
    /// has been applied
    pub fn contiguous(&self, replica: ReplicaId) -> u64 {
        let max = self.get(replica);
        self.gaps
            .range(ItemId::new(replica, 0)..=ItemId::new(replica, u64::MAX))
            .next()
            .map(|first_gap| first_gap.seq - 1)
            .unwrap_or(max)
    }

    /// Ids known to be missing
    pub fn gaps(&self) -> &BTreeSet<ItemId> {
        &self.gaps
    }

    pub(crate) fn set_gaps(&mut self, gaps: BTreeSet<ItemId>) {
        self.gaps = gaps;
    }

    /// Replicas with at least one applied operation
    pub fn replicas(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.clocks.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReplicaId, u64)> + '_ {
        self.clocks.iter().map(|(&r, &s)| (r, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_update() {
        let mut sv = StateVector::new();
        assert!(sv.is_new(&ItemId::new(1, 1)));

        sv.update(1, 1);
        assert!(!sv.is_new(&ItemId::new(1, 1)));
        assert!(sv.is_new(&ItemId::new(1, 2)));
        assert_eq!(sv.get(1), 1);
        assert_eq!(sv.get(2), 0);
    }

    #[test]
    fn test_jump_records_gaps() {
        let mut sv = StateVector::new();
        sv.update(1, 1);
        sv.update(1, 4);

        assert_eq!(sv.get(1), 4);
        assert!(sv.is_new(&ItemId::new(1, 2)));
        assert!(sv.is_new(&ItemId::new(1, 3)));
        assert!(!sv.is_new(&ItemId::new(1, 4)));
        assert_eq!(sv.contiguous(1), 1);

        sv.update(1, 2);
        assert!(!sv.is_new(&ItemId::new(1, 2)));
        assert_eq!(sv.contiguous(1), 2);

        sv.update(1, 3);
        assert!(sv.gaps().is_empty());
        assert_eq!(sv.contiguous(1), 4);
    }

    #[test]
    fn test_sentinels_are_seen() {
        let sv = StateVector::new();
        assert!(sv.has_seen(&crate::crdt::text::HEAD));
        assert!(sv.has_seen(&crate::crdt::text::TAIL));
        assert!(!sv.has_seen(&ItemId::new(1, 1)));
    }

    #[test]
    fn test_merge_pointwise_max() {
        let mut a = StateVector::new();
        a.update(1, 5);
        a.update(2, 1);

        let mut b = StateVector::new();
        b.update(1, 3);
        b.update(2, 4);
        b.update(3, 2);

        a.merge(&b);
        assert_eq!(a.get(1), 5);
        assert_eq!(a.get(2), 4);
        assert_eq!(a.get(3), 2);
    }

    #[test]
    fn test_merge_keeps_only_common_gaps() {
        let mut a = StateVector::new();
        a.update(1, 3); // gaps 1:1, 1:2

        let mut b = StateVector::new();
        b.update(1, 1);
        b.update(1, 2);

        a.merge(&b);
        assert!(a.gaps().is_empty());
        assert_eq!(a.get(1), 3);

        let mut c = StateVector::new();
        c.update(2, 2); // gap 2:1
        let mut d = StateVector::new();
        d.merge(&c);
        assert!(d.is_new(&ItemId::new(2, 1)));
        assert!(!d.is_new(&ItemId::new(2, 2)));
    }

    #[test]
    fn test_serialization() {
        let mut sv = StateVector::new();
        sv.update(7, 3);
        let json = serde_json::to_string(&sv).unwrap();
        let back: StateVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sv);
    }
}

//! Safe-vector calculator
//!
//! Collects the state vectors peers report and reduces them (together with
//! the local vector) to the frontier every replica is known to have
//! observed. Only contiguous prefixes count: a replica with a gap below some
//! sequence has not observed everything up to it.

use crate::crdt::text::{ItemId, ReplicaId};
use crate::sync::StateVector;
use std::collections::{BTreeMap, BTreeSet};

/// Frontier observed by every participating replica
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SafePoint {
    vector: BTreeMap<ReplicaId, u64>,
    /// Every participant's own operations, as of its report, are below the
    /// frontier
    pub stable: bool,
}

impl SafePoint {
    /// Safe sequence for `replica`
    pub fn get(&self, replica: ReplicaId) -> u64 {
        self.vector.get(&replica).copied().unwrap_or(0)
    }

    /// Whether the operation `id` has been observed by everyone
    pub fn covers(&self, id: &ItemId) -> bool {
        id.is_sentinel() || id.seq <= self.get(id.replica)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReplicaId, u64)> + '_ {
        self.vector.iter().map(|(&r, &s)| (r, s))
    }
}

/// Peer state vectors reported so far
#[derive(Debug, Clone, Default)]
pub struct SafeVectorCalculator {
    expected_peers: usize,
    peers: BTreeMap<ReplicaId, StateVector>,
}

impl SafeVectorCalculator {
    pub fn new(expected_peers: usize) -> Self {
        Self {
            expected_peers,
            peers: BTreeMap::new(),
        }
    }

    /// Record what `peer` has observed
    ///
    /// Reports only ever move forward: a stale report arriving late is merged
    /// rather than allowed to replace a newer one.
    pub fn record(&mut self, peer: ReplicaId, vector: &StateVector) {
        self.peers
            .entry(peer)
            .and_modify(|known| known.merge(vector))
            .or_insert_with(|| vector.clone());
    }

    /// Forget a peer that has left the session
    pub fn remove(&mut self, peer: ReplicaId) -> Option<StateVector> {
        self.peers.remove(&peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn expected_peers(&self) -> usize {
        self.expected_peers
    }

    pub fn set_expected_peers(&mut self, expected: usize) {
        self.expected_peers = expected;
    }

    /// Every expected peer has reported
    pub fn is_ready(&self) -> bool {
        self.peers.len() >= self.expected_peers
    }

    /// Pointwise minimum over the local vector and every peer vector
    ///
    /// `None` until every expected peer has reported; a safe point computed
    /// from a partial set of peers would be too large.
    pub fn compute(&self, local_id: ReplicaId, local: &StateVector) -> Option<SafePoint> {
        if !self.is_ready() {
            return None;
        }

        let participants: Vec<(ReplicaId, &StateVector)> = std::iter::once((local_id, local))
            .chain(
                self.peers
                    .iter()
                    .filter(|(id, _)| **id != local_id)
                    .map(|(&id, v)| (id, v)),
            )
            .collect();

        let replicas: BTreeSet<ReplicaId> = participants
            .iter()
            .flat_map(|(_, v)| v.replicas().collect::<Vec<_>>())
            .collect();

        let vector: BTreeMap<ReplicaId, u64> = replicas
            .into_iter()
            .map(|replica| {
                let min = participants
                    .iter()
                    .map(|(_, v)| v.contiguous(replica))
                    .min()
                    .unwrap_or(0);
                (replica, min)
            })
            .collect();

        let stable = participants.iter().all(|(id, v)| {
            vector.get(id).copied().unwrap_or(0) >= v.get(*id)
        });

        Some(SafePoint { vector, stable })
    }
}

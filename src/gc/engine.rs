//! Incremental mark/sweep engine
//!
//! A pass runs `Idle -> Mark -> Sweep -> Compact -> Idle`, handling at most
//! `batch_size` items per [`GcEngine::step`], so a long document is collected
//! over many scheduler turns while edits keep arriving in between. Nothing
//! read in one batch is trusted in the next: sweep re-checks every marked
//! item against the live document before unlinking it.
//!
//! An item is collectible when it is tombstoned, nothing surviving
//! references it, and every delete recorded on it is covered by the safe
//! point. A pass only starts from a stable safe point (see
//! [`SafePoint::stable`]); any operation still in flight was then authored by
//! a replica that had already seen the tombstone, so it can only name the
//! tombstone as a right origin, which the insert handler tolerates.

use super::safe_vector::{SafePoint, SafeVectorCalculator};
use crate::client::Client;
use crate::config::ReplicaConfig;
use crate::crdt::text::{Document, Item, ItemId, HEAD, TAIL};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Idle,
    Mark,
    Sweep,
    Compact,
}

/// Counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Items visited during mark
    pub examined: usize,
    /// Items unlinked during sweep
    pub collected: usize,
    /// Operations removed from the log
    pub compacted: usize,
}

/// What one call to [`GcEngine::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcStep {
    /// Preconditions not met (disabled, peers missing, or unstable safe point)
    Waiting,
    /// A batch ran; the pass continues in this phase
    Continue(GcPhase),
    /// The pass completed
    Done(GcStats),
}

#[derive(Debug, Clone)]
pub struct GcEngine {
    phase: GcPhase,
    batch_size: usize,
    enabled: bool,
    safe: SafePoint,
    cursor: Option<ItemId>,
    marked: VecDeque<ItemId>,
    compact_queue: Vec<ItemId>,
    /// Operations of collected items not yet covered by a safe point
    pending: BTreeSet<ItemId>,
    stats: GcStats,
    last_pass: Option<GcStats>,
}

impl GcEngine {
    pub fn new(config: &ReplicaConfig) -> Self {
        Self {
            phase: GcPhase::Idle,
            batch_size: config.gc_batch_size.max(1),
            enabled: config.gc_enabled,
            safe: SafePoint::default(),
            cursor: None,
            marked: VecDeque::new(),
            compact_queue: Vec::new(),
            pending: BTreeSet::new(),
            stats: GcStats::default(),
            last_pass: None,
        }
    }

    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    /// Counters of the most recent completed pass
    pub fn last_pass(&self) -> Option<GcStats> {
        self.last_pass
    }

    /// Log entries waiting for the safe point to catch up
    pub fn pending_compaction(&self) -> usize {
        self.pending.len()
    }

    /// Abandon the current pass and forget queued work
    ///
    /// Called when the replica is replaced wholesale (snapshot load).
    pub fn reset(&mut self) {
        self.phase = GcPhase::Idle;
        self.cursor = None;
        self.marked.clear();
        self.compact_queue.clear();
        self.pending.clear();
        self.stats = GcStats::default();
    }

    /// Run one batch
    pub fn step(&mut self, client: &mut Client, peers: &SafeVectorCalculator) -> GcStep {
        if !self.enabled {
            return GcStep::Waiting;
        }
        match self.phase {
            GcPhase::Idle => {
                let Some(safe) = peers.compute(client.replica_id(), client.state_vector()) else {
                    trace!(
                        reported = peers.peer_count(),
                        expected = peers.expected_peers(),
                        "gc waiting for peer vectors"
                    );
                    return GcStep::Waiting;
                };
                if !safe.stable {
                    trace!("gc waiting for a stable safe point");
                    return GcStep::Waiting;
                }
                self.safe = safe;
                self.stats = GcStats::default();
                self.cursor = client.document().next(&HEAD);
                self.transition(GcPhase::Mark);
                self.mark(client.document())
            }
            GcPhase::Mark => self.mark(client.document()),
            GcPhase::Sweep => self.sweep(client),
            GcPhase::Compact => self.compact(client),
        }
    }

    /// Step until the current (or a new) pass completes
    ///
    /// Returns `None` when a pass cannot start.
    pub fn run_to_completion(
        &mut self,
        client: &mut Client,
        peers: &SafeVectorCalculator,
    ) -> Option<GcStats> {
        loop {
            match self.step(client, peers) {
                GcStep::Waiting => return None,
                GcStep::Continue(_) => continue,
                GcStep::Done(stats) => return Some(stats),
            }
        }
    }

    fn mark(&mut self, doc: &Document) -> GcStep {
        let mut examined = 0;
        while examined < self.batch_size {
            let Some(id) = self.cursor else {
                break;
            };
            if id == TAIL {
                self.cursor = None;
                break;
            }
            let Some(item) = doc.get(&id) else {
                debug!(item = %id, "mark cursor vanished; ending mark early");
                self.cursor = None;
                break;
            };
            if Self::collectible(doc, item, &self.safe) {
                self.marked.push_back(id);
            }
            self.cursor = item.right;
            examined += 1;
        }
        self.stats.examined += examined;

        if self.cursor.is_none() {
            debug!(marked = self.marked.len(), "mark complete");
            self.transition(GcPhase::Sweep);
        }
        GcStep::Continue(self.phase)
    }

    fn sweep(&mut self, client: &mut Client) -> GcStep {
        for _ in 0..self.batch_size {
            let Some(id) = self.marked.pop_front() else {
                break;
            };
            let still_collectible = client
                .document()
                .get(&id)
                .is_some_and(|item| Self::collectible(client.document(), item, &self.safe));
            if !still_collectible {
                continue;
            }
            if let Some(item) = client.collect_item(&id) {
                // Targets this item kept alive may be free now
                for target in item.content.references() {
                    let freed = client
                        .document()
                        .get(&target)
                        .is_some_and(|t| Self::collectible(client.document(), t, &self.safe));
                    if freed && !self.marked.contains(&target) {
                        self.marked.push_back(target);
                    }
                }
                self.pending.insert(item.id);
                self.pending.extend(item.deleted_by);
                self.stats.collected += 1;
            }
        }

        if self.marked.is_empty() {
            self.pending.extend(client.orphaned_deletes.drain(..));
            self.compact_queue = self.pending.iter().copied().collect();
            debug!(
                collected = self.stats.collected,
                queued = self.compact_queue.len(),
                "sweep complete"
            );
            self.transition(GcPhase::Compact);
        }
        GcStep::Continue(self.phase)
    }

    fn compact(&mut self, client: &mut Client) -> GcStep {
        for _ in 0..self.batch_size {
            let Some(id) = self.compact_queue.pop() else {
                break;
            };
            if !self.safe.covers(&id) {
                continue;
            }
            if client.store.remove(&id).is_some() {
                self.stats.compacted += 1;
            }
            self.pending.remove(&id);
        }

        if !self.compact_queue.is_empty() {
            return GcStep::Continue(self.phase);
        }

        self.transition(GcPhase::Idle);
        info!(
            examined = self.stats.examined,
            collected = self.stats.collected,
            compacted = self.stats.compacted,
            pending = self.pending.len(),
            "gc pass complete"
        );
        self.last_pass = Some(self.stats);
        GcStep::Done(self.stats)
    }

    fn collectible(doc: &Document, item: &Item, safe: &SafePoint) -> bool {
        !item.id.is_sentinel()
            && item.deleted
            && !item.deleted_by.is_empty()
            && item.deleted_by.iter().all(|d| safe.covers(d))
            && !doc.is_referenced(&item.id)
    }

    fn transition(&mut self, to: GcPhase) {
        debug!(from = ?self.phase, ?to, "gc phase");
        self.phase = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::text::{Content, Operation};
    use std::collections::BTreeMap;

    fn config(batch: usize) -> ReplicaConfig {
        ReplicaConfig {
            gc_batch_size: batch,
            ..ReplicaConfig::with_replica(1)
        }
    }

    /// Replica 1 with "abc" typed as three items, then "b" deleted, and a
    /// peer that has seen all of it
    fn settled() -> (Client, SafeVectorCalculator) {
        let mut client = Client::new(1);
        client.local_insert(0, "a", None).unwrap();
        client.local_insert(1, "b", None).unwrap();
        client.local_insert(2, "c", None).unwrap();
        client.local_delete(1, 1).unwrap();

        let mut peers = SafeVectorCalculator::new(1);
        peers.record(2, client.state_vector());
        (client, peers)
    }

    #[test]
    fn test_waits_for_expected_peers() {
        let mut client = Client::new(1);
        let peers = SafeVectorCalculator::new(1);
        let mut engine = GcEngine::new(&config(8));

        assert_eq!(engine.step(&mut client, &peers), GcStep::Waiting);
        assert_eq!(engine.phase(), GcPhase::Idle);
    }

    #[test]
    fn test_disabled_engine_never_runs() {
        let (mut client, peers) = settled();
        let mut engine = GcEngine::new(&ReplicaConfig {
            gc_enabled: false,
            ..config(8)
        });
        assert_eq!(engine.run_to_completion(&mut client, &peers), None);
        assert_eq!(client.document().item_count(), 5);
    }

    #[test]
    fn test_full_pass_collects_tombstone_and_compacts_log() {
        let (mut client, peers) = settled();
        let ops_before = client.store().len();
        let mut engine = GcEngine::new(&config(256));

        let stats = engine.run_to_completion(&mut client, &peers).unwrap();
        assert_eq!(stats.collected, 1);
        assert_eq!(stats.compacted, 2);
        assert_eq!(client.store().len(), ops_before - 2);
        assert_eq!(client.text(), "ac");
        assert_eq!(client.document().item_count(), 4);
        assert!(client.blocks().is_consistent(client.document()));
        assert_eq!(engine.pending_compaction(), 0);
    }

    #[test]
    fn test_small_batches_span_many_steps() {
        let (mut client, peers) = settled();
        let mut engine = GcEngine::new(&config(1));

        let mut steps = 0;
        let stats = loop {
            steps += 1;
            match engine.step(&mut client, &peers) {
                GcStep::Done(stats) => break stats,
                GcStep::Continue(_) => {}
                GcStep::Waiting => panic!("gc should be able to run"),
            }
        };
        assert!(steps > 3);
        assert_eq!(stats.collected, 1);
        assert_eq!(client.text(), "ac");
    }

    #[test]
    fn test_edits_between_batches_converge() {
        let mut a = Client::new(1);
        let mut b = Client::new(2);
        for (offset, text) in ["a", "b", "c", "d"].into_iter().enumerate() {
            a.local_insert(offset, text, None).unwrap();
        }
        a.local_delete(1, 1).unwrap();
        a.local_delete(1, 1).unwrap();
        b.apply_ops(a.get_missing_ops(b.state_vector()));
        assert_eq!(b.text(), "ad");

        let mut peers = SafeVectorCalculator::new(1);
        peers.record(2, b.state_vector());

        // Authored after b reported: "X" sits right before the tombstone "b"
        let tombstone = ItemId::new(1, 2);
        let mut remote = b.local_insert(1, "X", None).unwrap();
        assert!(matches!(&remote[0], Operation::Insert(op) if op.right_origin == tombstone));
        remote.extend(b.local_delete(2, 1).unwrap());
        let mut remote = Some(remote);

        let mut engine = GcEngine::new(&config(1));
        let mut local_done = false;
        let stats = loop {
            match engine.step(&mut a, &peers) {
                GcStep::Done(stats) => break stats,
                GcStep::Continue(phase) => {
                    if !local_done {
                        a.local_insert(a.len(), "e", None).unwrap();
                        a.local_delete(0, 1).unwrap();
                        local_done = true;
                    }
                    if phase == GcPhase::Sweep {
                        if let Some(ops) = remote.take() {
                            assert!(a.document().contains(&tombstone));
                            assert!(a.apply_ops(ops).is_clean());
                        }
                    }
                    assert!(a.blocks().is_consistent(a.document()));
                }
                GcStep::Waiting => panic!("gc should be able to run"),
            }
        };

        assert!(remote.is_none());
        assert_eq!(stats.collected, 2);
        assert!(!a.document().contains(&tombstone));

        b.apply_ops(a.get_missing_ops(b.state_vector()));
        a.apply_ops(b.get_missing_ops(a.state_vector()));
        assert_eq!(a.text(), "Xe");
        assert_eq!(b.text(), a.text());
        assert_eq!(a.state_vector(), b.state_vector());
        assert!(a.blocks().is_consistent(a.document()));
        assert!(b.blocks().is_consistent(b.document()));
    }

    #[test]
    fn test_unstable_safe_point_waits() {
        let (mut client, peers) = settled();
        // Authored after the peer's report: the peer has not seen it
        client.local_insert(2, "d", None).unwrap();

        let mut engine = GcEngine::new(&config(8));
        assert_eq!(engine.step(&mut client, &peers), GcStep::Waiting);
        assert_eq!(client.document().item_count(), 6);
    }

    #[test]
    fn test_referenced_tombstone_survives_until_reference_removed() {
        let mut client = Client::new(1);
        client.local_insert(0, "x", None).unwrap();
        let target = ItemId::new(1, 1);

        let reference = ItemId::new(1, 2);
        let mut refs = BTreeMap::new();
        refs.insert("link".to_string(), target);
        client.apply_ops(vec![Operation::insert(
            reference,
            Content::ObjectRef { refs },
            target,
            TAIL,
        )]);
        client.local_delete(0, 1).unwrap();

        let mut peers = SafeVectorCalculator::new(1);
        peers.record(2, client.state_vector());
        let mut engine = GcEngine::new(&config(8));

        let stats = engine.run_to_completion(&mut client, &peers).unwrap();
        assert_eq!(stats.collected, 0);
        assert!(client.document().contains(&target));

        let delete_ref = client.next_id();
        client.apply_ops(vec![Operation::delete(delete_ref, reference)]);
        peers.record(2, client.state_vector());

        let stats = engine.run_to_completion(&mut client, &peers).unwrap();
        assert_eq!(stats.collected, 2);
        assert!(!client.document().contains(&target));
        assert!(!client.document().contains(&reference));
    }

    #[test]
    fn test_uncovered_delete_is_not_collected() {
        let (mut client, _) = settled();
        let mut peers = SafeVectorCalculator::new(1);
        // Peer has the inserts but not the delete (1:4)
        let mut partial = crate::sync::StateVector::new();
        for seq in 1..=3 {
            partial.update(1, seq);
        }
        peers.record(2, &partial);

        let mut engine = GcEngine::new(&config(8));
        assert_eq!(engine.step(&mut client, &peers), GcStep::Waiting);
        assert_eq!(client.document().item_count(), 5);
    }
}

//! Delete handling

use super::{Client, DropReason, Effect, Outcome};
use crate::crdt::text::{DeleteOp, Operation};
use crate::sync::BufferKind;
use tracing::debug;

impl Client {
    /// Tombstone the target of a delete
    ///
    /// Deleting an item twice (concurrent deletes from two replicas) records
    /// both operations but only the first one changes the visible text.
    pub(crate) fn handle_delete(&mut self, op: &DeleteOp) -> Outcome {
        if op.target.is_sentinel() {
            return Outcome::Dropped(DropReason::InvalidAnchor(op.target));
        }

        let Some(item) = self.document.get_mut(&op.target) else {
            if self.state.has_seen(&op.target) {
                // Target already collected: it was deleted everywhere.
                debug!(op = %op.id, target = %op.target, "delete of collected item");
                self.record(Operation::Delete(op.clone()));
                self.orphaned_deletes.push(op.id);
                return Outcome::Applied(Effect::Unchanged);
            }
            return self.park(BufferKind::Target, op.target, Operation::Delete(op.clone()));
        };

        let len = item.visible_len();
        let was_visible = item.delete(op.id);
        let removed = if was_visible { len } else { 0 };
        if was_visible {
            self.blocks.on_delete(&self.document, &op.target, removed);
        }

        self.record(Operation::Delete(op.clone()));
        if was_visible {
            Outcome::Applied(Effect::Deleted {
                target: op.target,
                removed,
            })
        } else {
            Outcome::Applied(Effect::Unchanged)
        }
    }

    fn record(&mut self, op: Operation) {
        let id = op.id();
        self.store.insert(op);
        self.state.update(id.replica, id.seq);
    }
}

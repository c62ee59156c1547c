//! Insert handling

use super::{Client, DropReason, Effect, Outcome};
use crate::crdt::text::conflict::{self, Placement};
use crate::crdt::text::{Document, InsertOp, Operation, HEAD, TAIL};
use crate::sync::BufferKind;

impl Client {
    /// Integrate a remote or local insert
    ///
    /// The origin must be linked before anything else is decided. A missing
    /// origin that was never seen parks the insert; one that was seen and
    /// then collected cannot be recovered and the insert is dropped.
    pub(crate) fn handle_insert(&mut self, op: &InsertOp) -> Outcome {
        let invalid = if op.id.is_sentinel() {
            Some(op.id)
        } else if op.origin == TAIL {
            Some(TAIL)
        } else if op.right_origin == HEAD {
            Some(HEAD)
        } else {
            None
        };
        if let Some(anchor) = invalid {
            return Outcome::Dropped(DropReason::InvalidAnchor(anchor));
        }

        if !self.document.contains(&op.origin) {
            if self.state.has_seen(&op.origin) {
                return Outcome::Dropped(DropReason::OriginCollected(op.origin));
            }
            return self.park(BufferKind::Origin, op.origin, Operation::Insert(op.clone()));
        }

        let successor = if !self.document.contains(&op.right_origin)
            && self.state.has_seen(&op.right_origin)
        {
            Some(self.collected_successor(&op.right_origin))
        } else {
            None
        };

        let left = match conflict::resolve(&self.document, op, successor) {
            Placement::After(left) => left,
            Placement::RightOriginMissing => {
                return self.park(
                    BufferKind::Right,
                    op.right_origin,
                    Operation::Insert(op.clone()),
                );
            }
        };

        let item = {
            let neighbor = self.document.next(&left).unwrap_or(TAIL);
            match (self.document.get(&left), self.document.get(&neighbor)) {
                (Some(origin), Some(right)) => Document::create_item(origin, op, right),
                _ => {
                    return Outcome::Dropped(DropReason::Internal(format!(
                        "resolved origin {} is not linked",
                        left
                    )))
                }
            }
        };

        if let Err(e) = self.document.link_after(left, item) {
            return Outcome::Dropped(DropReason::Internal(e.to_string()));
        }
        if let Err(e) = self.blocks.on_insert(&mut self.document, op.id) {
            return Outcome::Dropped(DropReason::Internal(e.to_string()));
        }

        self.store.insert(Operation::Insert(op.clone()));
        self.state.update(op.id.replica, op.id.seq);
        Outcome::Applied(Effect::Inserted(op.id))
    }
}

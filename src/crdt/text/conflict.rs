//! Conflict resolution for concurrent inserts (YATA)
//!
//! An insert declares the two neighbors its author saw. Other replicas may
//! already hold concurrent inserts between those neighbors. The resolver scans
//! that region left to right and decides after which item the new one goes,
//! using only information every replica has, so every replica decides the
//! same way without another round of communication.
//!
//! Rules while scanning an item `o` between `origin` and `right_origin`:
//! - `o` shares our origin: if `o.id < op.id`, `o` goes first and the true
//!   origin advances to it. Otherwise, if `o` also shares our right origin we
//!   stop, we go first.
//! - `o`'s origin lies inside the region already scanned: `o` is nested in a
//!   subtree we have already decided to pass. We pass it too unless its
//!   origin is still among the undecided (conflicting) items.
//! - otherwise `o` belongs to a subtree that started after our position; stop.

use super::document::Document;
use super::id::{ItemId, TAIL};
use super::operation::InsertOp;
use std::collections::HashSet;

/// Where an insert goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Link the new item right after this item (the true origin)
    After(ItemId),
    /// The declared right origin is not in the chain yet
    RightOriginMissing,
}

/// Decide the true origin of `op`
///
/// `op.origin` must already be in the document. `successor` stands in for a
/// declared right origin that was garbage-collected: it is the first linked
/// item that followed it when it was unlinked, so the scan stops exactly
/// where a replica still holding the tombstone stops.
pub fn resolve(doc: &Document, op: &InsertOp, successor: Option<ItemId>) -> Placement {
    let bound = match successor {
        _ if doc.contains(&op.right_origin) => op.right_origin,
        Some(successor) if doc.contains(&successor) => successor,
        _ => return Placement::RightOriginMissing,
    };

    let mut true_origin = op.origin;
    let mut before_origin: HashSet<ItemId> = HashSet::new();
    let mut conflicting: HashSet<ItemId> = HashSet::new();
    let mut cursor = doc.next(&op.origin);

    while let Some(id) = cursor {
        if id == bound || id == TAIL {
            break;
        }
        let Some(o) = doc.get(&id) else {
            break;
        };

        before_origin.insert(id);
        conflicting.insert(id);

        if o.origin == op.origin {
            if id < op.id {
                true_origin = id;
                conflicting.clear();
            } else if o.right_origin == op.right_origin {
                break;
            }
        } else if before_origin.contains(&o.origin) {
            if !conflicting.contains(&o.origin) {
                true_origin = id;
                conflicting.clear();
            }
        } else {
            break;
        }

        cursor = o.right;
    }

    Placement::After(true_origin)
}

//! Item: The fundamental building block of the Text CRDT
//!
//! Each item represents a run of content with:
//! - Unique ID
//! - Content
//! - Declared origins (neighbors at authoring time) for conflict resolution
//! - Resolved chain links (neighbors in this replica's document)
//! - Deleted flag (tombstone)

use super::content::Content;
use super::id::ItemId;
use super::operation::InsertOp;
use crate::crdt::fractional_index::FractionalIndex;
use serde::{Deserialize, Serialize};

/// A single item in the text CRDT
///
/// Items form a doubly-linked chain from `HEAD` to `TAIL`. The chain links
/// (`left`, `right`) are identifiers into the document arena, never
/// references, so unlinking an item cannot leave anything dangling.
///
/// `origin` and `right_origin` keep what the author saw. They never change
/// after creation and are what later concurrent inserts are compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier for this item
    pub id: ItemId,

    /// The carried content
    pub content: Content,

    /// Item this was inserted after, as declared by its author
    pub origin: ItemId,

    /// Item this was inserted before, as declared by its author
    pub right_origin: ItemId,

    /// Resolved left neighbor in the chain (None only for HEAD)
    pub left: Option<ItemId>,

    /// Resolved right neighbor in the chain (None only for TAIL)
    pub right: Option<ItemId>,

    /// Whether this item has been deleted
    pub deleted: bool,

    /// Delete operations that targeted this item
    #[serde(default)]
    pub deleted_by: Vec<ItemId>,

    /// Block this item belongs to (maintained by the block index)
    #[serde(default)]
    pub block: Option<FractionalIndex>,
}

impl Item {
    /// Create a new, unlinked item
    pub fn new(id: ItemId, content: Content, origin: ItemId, right_origin: ItemId) -> Self {
        Self {
            id,
            content,
            origin,
            right_origin,
            left: None,
            right: None,
            deleted: false,
            deleted_by: Vec::new(),
            block: None,
        }
    }

    /// Create the item an insert operation describes
    pub fn from_op(op: &InsertOp) -> Self {
        Self::new(op.id, op.content.clone(), op.origin, op.right_origin)
    }

    /// Create a sentinel
    pub(crate) fn sentinel(id: ItemId) -> Self {
        Self::new(id, Content::NoContent, id, id)
    }

    /// Get the length of this item's content
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Check if this item has no visible-capable content
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Characters this item contributes to the visible text
    pub fn visible_len(&self) -> usize {
        if self.deleted {
            0
        } else {
            self.content.len()
        }
    }

    /// Mark this item as deleted by `op`
    ///
    /// Returns true when the item was visible before.
    pub fn delete(&mut self, op: ItemId) -> bool {
        if !self.deleted_by.contains(&op) {
            self.deleted_by.push(op);
        }
        let was_visible = !self.deleted;
        self.deleted = true;
        was_visible
    }
}

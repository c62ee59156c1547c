//! Document structure: the linked chain of items
//!
//! Items live in an arena keyed by their [`ItemId`]. The chain is expressed
//! through the `left`/`right` ids stored on each item and is always a single
//! acyclic path from `HEAD` to `TAIL`. The document also keeps the reverse
//! reference index for `ObjectRef` content, which the garbage collector
//! consults before reclaiming a tombstone.

use super::content::Content;
use super::id::{ItemId, HEAD, TAIL};
use super::item::Item;
use super::operation::InsertOp;
use crate::error::{Result, SyncError};
use std::collections::{HashMap, HashSet};

/// Linked sequence of items bounded by the two sentinels
#[derive(Debug, Clone)]
pub struct Document {
    items: HashMap<ItemId, Item>,
    /// target <- sources, for every surviving ObjectRef item
    references: HashMap<ItemId, HashSet<ItemId>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document: `HEAD <-> TAIL`
    pub fn new() -> Self {
        let mut head = Item::sentinel(HEAD);
        let mut tail = Item::sentinel(TAIL);
        head.right = Some(TAIL);
        tail.left = Some(HEAD);

        let mut items = HashMap::new();
        items.insert(HEAD, head);
        items.insert(TAIL, tail);

        Self {
            items,
            references: HashMap::new(),
        }
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    /// Number of items, sentinels included
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Right neighbor of `id` in the chain
    pub fn next(&self, id: &ItemId) -> Option<ItemId> {
        self.items.get(id).and_then(|item| item.right)
    }

    /// Left neighbor of `id` in the chain
    pub fn prev(&self, id: &ItemId) -> Option<ItemId> {
        self.items.get(id).and_then(|item| item.left)
    }

    /// Walk right from `from` (inclusive) until `target` is found
    ///
    /// Linear in the distance walked. Callers start from a nearby cached
    /// item (a block representative) rather than from `HEAD`.
    pub fn traverse(&self, from: ItemId, target: ItemId) -> Option<&Item> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let item = self.items.get(&id)?;
            if id == target {
                return Some(item);
            }
            cursor = item.right;
        }
        None
    }

    /// Build (but do not link) the item for an insert
    ///
    /// `origin` and `right_origin` are the resolved neighbors; the op's own
    /// declared origins are kept on the item.
    pub fn create_item(origin: &Item, op: &InsertOp, right_origin: &Item) -> Item {
        let mut item = Item::from_op(op);
        item.left = Some(origin.id);
        item.right = Some(right_origin.id);
        item
    }

    /// Link `item` directly after `left`, in front of `left`'s current right
    /// neighbor
    pub fn link_after(&mut self, left: ItemId, mut item: Item) -> Result<()> {
        if left == TAIL {
            return Err(SyncError::InvalidState("cannot link after TAIL".to_string()));
        }
        let right = self
            .items
            .get(&left)
            .ok_or(SyncError::UnknownItem(left))?
            .right
            .ok_or(SyncError::UnknownItem(left))?;

        let id = item.id;
        item.left = Some(left);
        item.right = Some(right);

        for target in item.content.references() {
            self.references.entry(target).or_default().insert(id);
        }
        self.items.insert(id, item);

        if let Some(l) = self.items.get_mut(&left) {
            l.right = Some(id);
        }
        if let Some(r) = self.items.get_mut(&right) {
            r.left = Some(id);
        }
        Ok(())
    }

    /// Remove an item from the chain, bridging its neighbors
    ///
    /// Its outgoing reference edges are dropped with it. Sentinels are never
    /// unlinked.
    pub fn unlink(&mut self, id: &ItemId) -> Option<Item> {
        if id.is_sentinel() {
            return None;
        }
        let item = self.items.remove(id)?;
        let (left, right) = (item.left, item.right);

        if let Some(l) = left.and_then(|l| self.items.get_mut(&l)) {
            l.right = right;
        }
        if let Some(r) = right.and_then(|r| self.items.get_mut(&r)) {
            r.left = left;
        }

        for target in item.content.references() {
            if let Some(sources) = self.references.get_mut(&target) {
                sources.remove(id);
                if sources.is_empty() {
                    self.references.remove(&target);
                }
            }
        }
        Some(item)
    }

    /// Whether any surviving item references `id`
    pub fn is_referenced(&self, id: &ItemId) -> bool {
        self.references
            .get(id)
            .is_some_and(|sources| !sources.is_empty())
    }

    /// Iterate the chain from `HEAD` to `TAIL`, sentinels included
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            doc: self,
            cursor: Some(HEAD),
        }
    }

    /// Iterate the chain starting at `from` (inclusive)
    pub fn iter_from(&self, from: ItemId) -> Iter<'_> {
        Iter {
            doc: self,
            cursor: Some(from),
        }
    }

    /// Visible text: every non-deleted text item in chain order
    pub fn text(&self) -> String {
        let mut out = String::new();
        for item in self.iter() {
            if item.deleted {
                continue;
            }
            if let Content::Text { text, .. } = &item.content {
                out.push_str(text);
            }
        }
        out
    }

    /// Number of visible characters
    pub fn visible_len(&self) -> usize {
        self.iter().map(Item::visible_len).sum()
    }

    /// Number of visible characters strictly before `id`
    pub fn offset_of(&self, id: &ItemId) -> Option<usize> {
        let mut offset = 0;
        for item in self.iter() {
            if item.id == *id {
                return Some(offset);
            }
            offset += item.visible_len();
        }
        None
    }
}

/// Chain-order iterator over document items
pub struct Iter<'a> {
    doc: &'a Document,
    cursor: Option<ItemId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let item = self.doc.items.get(&id)?;
        self.cursor = item.right;
        Some(item)
    }
}

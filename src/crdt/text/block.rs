//! Block index: a line-granularity overlay over the item chain
//!
//! A block is the run of items that ends with one newline item (its
//! representative). The last block is terminated by `TAIL`. Each block
//! caches the number of visible characters of its members (representative
//! included), which turns offset lookups into a walk over blocks followed by
//! a short walk inside one line.
//!
//! Block ids are [`FractionalIndex`] keys, so a block created by a newline
//! gets an id between its neighbors and nothing is ever renumbered.
//!
//! ```text
//! HEAD  a  b  \n  c  \n  d  TAIL
//!       [ block 1 ]  [b2]  [ block 3 ]
//! ```

use super::document::Document;
use super::id::{ItemId, HEAD, TAIL};
use crate::crdt::fractional_index::FractionalIndex;
use crate::error::{ConversionError, Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A line of the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: FractionalIndex,
    pub left: Option<FractionalIndex>,
    pub right: Option<FractionalIndex>,
    /// Visible characters of all members
    pub size: usize,
    /// Terminating newline item (`TAIL` for the last block)
    pub representative: ItemId,
    /// The representative newline has been tombstoned
    pub deleted: bool,
}

/// Result of a block-level offset lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPosition {
    /// Block the offset falls into
    pub block: FractionalIndex,
    /// Offset left to walk inside that block
    pub remainder: usize,
    /// Representative of the previous block (or `HEAD`); item-level walking
    /// starts right after it
    pub anchor: ItemId,
}

/// Item-level position: `offset` characters into `item`
///
/// `offset == item.visible_len()` means the boundary right after the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub item: ItemId,
    pub offset: usize,
}

/// Chain of blocks mirroring the document at line granularity
#[derive(Debug, Clone)]
pub struct BlockIndex {
    blocks: BTreeMap<FractionalIndex, Block>,
    by_representative: HashMap<ItemId, FractionalIndex>,
    first: FractionalIndex,
}

impl BlockIndex {
    /// Index an empty document: one block terminated by `TAIL`
    pub fn new(doc: &mut Document) -> Self {
        let first = FractionalIndex::first();
        let block = Block {
            id: first.clone(),
            left: None,
            right: None,
            size: 0,
            representative: TAIL,
            deleted: false,
        };
        if let Some(tail) = doc.get_mut(&TAIL) {
            tail.block = Some(first.clone());
        }

        let mut blocks = BTreeMap::new();
        blocks.insert(first.clone(), block);
        let mut by_representative = HashMap::new();
        by_representative.insert(TAIL, first.clone());

        Self {
            blocks,
            by_representative,
            first,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: &FractionalIndex) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Blocks in document order
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Block terminated by `representative`, if it is one
    pub fn block_of_representative(&self, representative: &ItemId) -> Option<&Block> {
        self.by_representative
            .get(representative)
            .and_then(|id| self.blocks.get(id))
    }

    /// Total visible characters
    pub fn total_size(&self) -> usize {
        self.blocks.values().map(|b| b.size).sum()
    }

    /// Register a freshly linked item
    ///
    /// The item joins the block of its right neighbor. A newline splits that
    /// block: everything from the start of the block up to the newline moves
    /// into a new block placed in front of it.
    pub fn on_insert(&mut self, doc: &mut Document, id: ItemId) -> Result<()> {
        let (right, visible, is_newline) = {
            let item = doc.get(&id).ok_or(SyncError::UnknownItem(id))?;
            let right = item.right.ok_or(SyncError::UnknownItem(id))?;
            (right, item.visible_len(), item.content.is_newline() && !item.deleted)
        };
        let block_id = doc
            .get(&right)
            .and_then(|r| r.block.clone())
            .ok_or_else(|| SyncError::InvalidState(format!("item {} has no block", right)))?;

        if let Some(item) = doc.get_mut(&id) {
            item.block = Some(block_id.clone());
        }
        if let Some(block) = self.blocks.get_mut(&block_id) {
            block.size += visible;
        }

        if is_newline {
            self.split(doc, &block_id, id)?;
        }
        Ok(())
    }

    fn split(
        &mut self,
        doc: &mut Document,
        old_id: &FractionalIndex,
        newline: ItemId,
    ) -> Result<()> {
        let old_left = self
            .blocks
            .get(old_id)
            .ok_or_else(|| SyncError::InvalidState(format!("unknown block {}", old_id)))?
            .left
            .clone();
        let new_id = FractionalIndex::between(old_left.as_ref(), Some(old_id));

        // Move the head of the old block, newline included, into the new one
        let mut moved = 0;
        let mut cursor = Some(newline);
        while let Some(current) = cursor {
            if current == HEAD {
                break;
            }
            let Some(item) = doc.get_mut(&current) else {
                break;
            };
            if item.block.as_ref() != Some(old_id) {
                break;
            }
            item.block = Some(new_id.clone());
            moved += item.visible_len();
            cursor = item.left;
        }

        if let Some(left_id) = &old_left {
            if let Some(left) = self.blocks.get_mut(left_id) {
                left.right = Some(new_id.clone());
            }
        }
        if let Some(old) = self.blocks.get_mut(old_id) {
            old.left = Some(new_id.clone());
            old.size -= moved;
        }
        self.blocks.insert(
            new_id.clone(),
            Block {
                id: new_id.clone(),
                left: old_left,
                right: Some(old_id.clone()),
                size: moved,
                representative: newline,
                deleted: false,
            },
        );
        self.by_representative.insert(newline, new_id.clone());
        if self.first == *old_id && self.blocks.get(&new_id).is_some_and(|b| b.left.is_none()) {
            self.first = new_id;
        }
        Ok(())
    }

    /// Account for an item that just became invisible
    pub fn on_delete(&mut self, doc: &Document, id: &ItemId, removed_len: usize) {
        let Some(block_id) = doc.get(id).and_then(|item| item.block.clone()) else {
            return;
        };
        if let Some(block) = self.blocks.get_mut(&block_id) {
            block.size = block.size.saturating_sub(removed_len);
            if block.representative == *id {
                block.deleted = true;
            }
        }
    }

    /// Account for an item the garbage collector has just unlinked
    ///
    /// `left` is the unlinked item's former left neighbor. When the item was
    /// a representative, its block's size folds into the next one. Blocks hold
    /// no attributes; line formatting stays on the newline items.
    pub fn on_collect(&mut self, doc: &mut Document, id: &ItemId, left: Option<ItemId>) {
        let Some(block_id) = self.by_representative.remove(id) else {
            return;
        };
        let Some(block) = self.blocks.remove(&block_id) else {
            return;
        };
        let Some(next_id) = block.right.clone() else {
            return;
        };

        let mut cursor = left;
        while let Some(current) = cursor {
            if current == HEAD {
                break;
            }
            let Some(item) = doc.get_mut(&current) else {
                break;
            };
            if item.block.as_ref() != Some(&block_id) {
                break;
            }
            item.block = Some(next_id.clone());
            cursor = item.left;
        }

        if let Some(next) = self.blocks.get_mut(&next_id) {
            next.size += block.size;
            next.left = block.left.clone();
        }
        match &block.left {
            Some(left_id) => {
                if let Some(prev) = self.blocks.get_mut(left_id) {
                    prev.right = Some(next_id.clone());
                }
            }
            None => self.first = next_id,
        }
    }

    /// Find the block containing `target` characters past the start of `from`
    ///
    /// Walks the block chain accumulating sizes and stops at the first block
    /// where the running sum meets or exceeds the target.
    pub fn traverse(&self, from: &FractionalIndex, target: usize) -> Result<BlockPosition> {
        let mut anchor = self
            .blocks
            .get(from)
            .and_then(|b| b.left.as_ref())
            .and_then(|l| self.blocks.get(l))
            .map(|b| b.representative)
            .unwrap_or(HEAD);
        let mut cumulative = 0;
        let mut cursor = Some(from.clone());

        while let Some(id) = cursor {
            let block = self
                .blocks
                .get(&id)
                .ok_or_else(|| SyncError::InvalidState(format!("unknown block {}", id)))?;
            if cumulative + block.size >= target {
                return Ok(BlockPosition {
                    block: id,
                    remainder: target - cumulative,
                    anchor,
                });
            }
            cumulative += block.size;
            anchor = block.representative;
            cursor = block.right.clone();
        }

        Err(ConversionError::OffsetOutOfBounds {
            offset: target,
            length: cumulative,
        }
        .into())
    }

    /// Resolve a document offset to an item-level cursor
    ///
    /// The returned item is always visible (or `HEAD`), so it is a safe
    /// origin for a new insert.
    pub fn cursor_at(&self, doc: &Document, offset: usize) -> Result<Cursor> {
        let position = self.traverse(&self.first, offset)?;
        let mut remaining = position.remainder;

        if remaining == 0 {
            let mut current = position.anchor;
            while current != HEAD {
                let item = doc.get(&current).ok_or(SyncError::UnknownItem(current))?;
                if !item.deleted {
                    break;
                }
                current = item.left.ok_or(SyncError::UnknownItem(current))?;
            }
            let len = doc.get(&current).map(|i| i.visible_len()).unwrap_or(0);
            return Ok(Cursor {
                item: current,
                offset: len,
            });
        }

        let mut cursor = doc.next(&position.anchor);
        while let Some(id) = cursor {
            if id == TAIL {
                break;
            }
            let item = doc.get(&id).ok_or(SyncError::UnknownItem(id))?;
            let len = item.visible_len();
            if remaining <= len {
                return Ok(Cursor {
                    item: id,
                    offset: remaining,
                });
            }
            remaining -= len;
            cursor = item.right;
        }

        Err(ConversionError::OffsetOutOfBounds {
            offset,
            length: self.total_size(),
        }
        .into())
    }

    /// Visible characters before `id`: left block sizes plus a walk inside
    /// the item's own block
    pub fn offset_of(&self, doc: &Document, id: &ItemId) -> Result<usize> {
        let block_id = doc
            .get(id)
            .ok_or(SyncError::UnknownItem(*id))?
            .block
            .clone()
            .ok_or(SyncError::UnknownItem(*id))?;

        let mut offset = 0;
        let mut anchor = HEAD;
        let mut cursor = Some(self.first.clone());
        while let Some(current) = cursor {
            if current == block_id {
                break;
            }
            let block = self
                .blocks
                .get(&current)
                .ok_or_else(|| SyncError::InvalidState(format!("unknown block {}", current)))?;
            offset += block.size;
            anchor = block.representative;
            cursor = block.right.clone();
        }

        let mut cursor = doc.next(&anchor);
        while let Some(current) = cursor {
            if current == *id {
                return Ok(offset);
            }
            let item = doc.get(&current).ok_or(SyncError::UnknownItem(current))?;
            offset += item.visible_len();
            cursor = item.right;
        }
        Err(SyncError::UnknownItem(*id))
    }

    /// Recompute every block from the chain and compare with the cache
    pub fn is_consistent(&self, doc: &Document) -> bool {
        let mut sizes: HashMap<FractionalIndex, usize> = HashMap::new();
        for item in doc.iter().skip(1) {
            let Some(block) = &item.block else {
                return false;
            };
            *sizes.entry(block.clone()).or_default() += item.visible_len();
        }

        let mut chained = Vec::new();
        let mut cursor = Some(self.first.clone());
        while let Some(id) = cursor {
            let Some(block) = self.blocks.get(&id) else {
                return false;
            };
            chained.push(id.clone());
            cursor = block.right.clone();
        }
        let ordered: Vec<_> = self.blocks.keys().cloned().collect();

        chained == ordered
            && self
                .blocks
                .values()
                .all(|b| sizes.get(&b.id).copied().unwrap_or(0) == b.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::text::{Content, Item};

    struct Fixture {
        doc: Document,
        blocks: BlockIndex,
        seq: u64,
        last: ItemId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut doc = Document::new();
            let blocks = BlockIndex::new(&mut doc);
            Self {
                doc,
                blocks,
                seq: 0,
                last: HEAD,
            }
        }

        fn append(&mut self, text: &str) -> ItemId {
            self.seq += 1;
            let id = ItemId::new(1, self.seq);
            let item = Item::new(id, Content::text(text), self.last, TAIL);
            self.doc.link_after(self.last, item).unwrap();
            self.blocks.on_insert(&mut self.doc, id).unwrap();
            self.last = id;
            id
        }
    }

    #[test]
    fn test_empty_document_has_one_block() {
        let fx = Fixture::new();
        assert_eq!(fx.blocks.len(), 1);
        assert_eq!(fx.blocks.total_size(), 0);
        assert_eq!(fx.blocks.cursor_at(&fx.doc, 0).unwrap(), Cursor { item: HEAD, offset: 0 });
    }

    #[test]
    fn test_newlines_split_blocks() {
        let mut fx = Fixture::new();
        fx.append("ab");
        let nl = fx.append("\n");
        fx.append("cd");

        assert_eq!(fx.blocks.len(), 2);
        let sizes: Vec<usize> = fx.blocks.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![3, 2]);
        assert_eq!(fx.blocks.block_of_representative(&nl).unwrap().size, 3);
        assert!(fx.blocks.is_consistent(&fx.doc));
    }

    #[test]
    fn test_newline_in_middle_of_line() {
        let mut fx = Fixture::new();
        let ab = fx.append("ab");
        fx.append("cd");

        // Insert a newline between "ab" and "cd"
        let id = ItemId::new(2, 1);
        let item = Item::new(id, Content::text("\n"), ab, TAIL);
        fx.doc.link_after(ab, item).unwrap();
        fx.blocks.on_insert(&mut fx.doc, id).unwrap();

        let sizes: Vec<usize> = fx.blocks.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![3, 2]);
        assert!(fx.blocks.is_consistent(&fx.doc));
    }

    #[test]
    fn test_traverse_finds_block() {
        let mut fx = Fixture::new();
        fx.append("abc");
        let nl = fx.append("\n");
        fx.append("de");

        let first = FractionalIndex::first();
        let start = fx.blocks.iter().next().unwrap().id.clone();

        let pos = fx.blocks.traverse(&start, 2).unwrap();
        assert_eq!(pos.remainder, 2);
        assert_eq!(pos.anchor, HEAD);

        let pos = fx.blocks.traverse(&start, 5).unwrap();
        assert_eq!(pos.block, first);
        assert_eq!(pos.remainder, 1);
        assert_eq!(pos.anchor, nl);

        assert!(fx.blocks.traverse(&start, 7).is_err());
    }

    #[test]
    fn test_cursor_at_inside_and_between_items() {
        let mut fx = Fixture::new();
        let abc = fx.append("abc");
        let nl = fx.append("\n");
        let de = fx.append("de");

        assert_eq!(fx.blocks.cursor_at(&fx.doc, 1).unwrap(), Cursor { item: abc, offset: 1 });
        assert_eq!(fx.blocks.cursor_at(&fx.doc, 3).unwrap(), Cursor { item: abc, offset: 3 });
        assert_eq!(fx.blocks.cursor_at(&fx.doc, 4).unwrap(), Cursor { item: nl, offset: 1 });
        assert_eq!(fx.blocks.cursor_at(&fx.doc, 6).unwrap(), Cursor { item: de, offset: 2 });
        assert!(fx.blocks.cursor_at(&fx.doc, 7).is_err());
    }

    #[test]
    fn test_cursor_skips_back_over_deleted_anchor() {
        let mut fx = Fixture::new();
        let abc = fx.append("abc");
        let nl = fx.append("\n");
        fx.append("de");

        fx.doc.get_mut(&nl).unwrap().delete(ItemId::new(9, 1));
        fx.blocks.on_delete(&fx.doc, &nl, 1);

        assert!(fx.blocks.block_of_representative(&nl).unwrap().deleted);
        assert_eq!(fx.blocks.cursor_at(&fx.doc, 3).unwrap(), Cursor { item: abc, offset: 3 });
        assert!(fx.blocks.is_consistent(&fx.doc));
    }

    #[test]
    fn test_offset_of() {
        let mut fx = Fixture::new();
        fx.append("abc");
        fx.append("\n");
        let de = fx.append("de");
        let f = fx.append("f");

        assert_eq!(fx.blocks.offset_of(&fx.doc, &de).unwrap(), 4);
        assert_eq!(fx.blocks.offset_of(&fx.doc, &f).unwrap(), 6);
    }

    #[test]
    fn test_collecting_representative_merges_into_next_block() {
        let mut fx = Fixture::new();
        fx.append("abc");
        let nl = fx.append("\n");
        fx.append("de");

        fx.doc.get_mut(&nl).unwrap().delete(ItemId::new(9, 1));
        fx.blocks.on_delete(&fx.doc, &nl, 1);
        let left = fx.doc.prev(&nl);
        fx.doc.unlink(&nl);
        fx.blocks.on_collect(&mut fx.doc, &nl, left);

        assert_eq!(fx.blocks.len(), 1);
        assert_eq!(fx.blocks.total_size(), 5);
        assert!(fx.blocks.is_consistent(&fx.doc));
        assert_eq!(fx.doc.text(), "abcde");
    }
}

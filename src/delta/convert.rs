//! Delta conversion layer
//!
//! Editor → operations: every step is resolved against the replica as it
//! stands after the previous step, and each produced operation is applied
//! immediately, so offsets always refer to the live document.
//!
//! Items are never edited in place. Touching the inside of an item re-inserts
//! the parts that stay (with their attributes) right after it and then
//! deletes the original; inserts are emitted before the delete so a replica
//! replaying them in order never sees the text shrink and grow back.
//!
//! Operations → editor: each applied operation becomes one delta computed
//! right after it is integrated, a retain to the item's offset followed by
//! the insert or delete.

use super::{EditorDelta, StepKind};
use crate::client::{ApplyReport, Client, Effect};
use crate::crdt::text::{merge_attributes, Attributes, Content, ItemId, Operation, TAIL};
use crate::error::{Result, SyncError};

/// Turn an editor delta into operations, applying them to `client`
pub fn editor_delta_to_ops(client: &mut Client, delta: &EditorDelta) -> Result<Vec<Operation>> {
    delta.validate(client.len())?;

    let mut ops = Vec::new();
    let mut offset = 0;
    for (index, step) in delta.ops.iter().enumerate() {
        match step.kind(index)? {
            StepKind::Retain(len, None) => offset += len,
            StepKind::Retain(len, Some(attributes)) => {
                format_range(client, offset, len, attributes, &mut ops)?;
                offset += len;
            }
            StepKind::Insert(text, attributes) => {
                insert_text(client, offset, text, attributes, &mut ops)?;
                offset += text.chars().count();
            }
            StepKind::Delete(len) => delete_range(client, offset, len, &mut ops)?,
        }
    }
    Ok(ops)
}

/// Editor delta for an operation that has just been applied
///
/// Must be called while the document reflects exactly that operation.
pub fn op_to_editor_delta(client: &Client, effect: &Effect) -> Result<Option<EditorDelta>> {
    match effect {
        Effect::Inserted(id) => {
            let item = client
                .document()
                .get(id)
                .ok_or(SyncError::UnknownItem(*id))?;
            let Some(text) = item.content.as_text().filter(|_| item.visible_len() > 0) else {
                return Ok(None);
            };
            let offset = client.blocks().offset_of(client.document(), id)?;
            Ok(Some(
                EditorDelta::new()
                    .retain(offset)
                    .insert(text, item.content.attributes().cloned()),
            ))
        }
        Effect::Deleted { target, removed } if *removed > 0 => {
            let offset = client.blocks().offset_of(client.document(), target)?;
            Ok(Some(EditorDelta::new().retain(offset).delete(*removed)))
        }
        Effect::Deleted { .. } | Effect::Unchanged => Ok(None),
    }
}

/// Apply remote operations and collect the editor deltas they produce
pub fn remote_ops_to_editor_deltas(
    client: &mut Client,
    ops: Vec<Operation>,
) -> Result<(ApplyReport, Vec<EditorDelta>)> {
    let mut deltas = Vec::new();
    let mut failure = None;
    let report = client.apply_ops_with(ops, |client, _, effect| {
        if failure.is_some() {
            return;
        }
        match op_to_editor_delta(client, effect) {
            Ok(Some(delta)) => deltas.push(delta),
            Ok(None) => {}
            Err(e) => failure = Some(e),
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok((report, deltas)),
    }
}

/// Insert `text` at `offset`, newlines as their own items
fn insert_text(
    client: &mut Client,
    offset: usize,
    text: &str,
    attributes: Option<&Attributes>,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let cursor = client.blocks().cursor_at(client.document(), offset)?;
    let item = client
        .document()
        .get(&cursor.item)
        .ok_or(SyncError::UnknownItem(cursor.item))?;
    let len = item.visible_len();

    if cursor.offset == len {
        let mut origin = cursor.item;
        for line in split_lines(text) {
            let content = Content::formatted(line, attributes.cloned());
            origin = insert_after(client, origin, content, ops)?;
        }
        return Ok(());
    }

    // Inside an item: left part, new text, right part, then drop the original
    let original = item.content.clone();
    let target = cursor.item;
    let mut origin = target;
    if let Some(left) = original.slice(0, cursor.offset) {
        origin = insert_after(client, origin, left, ops)?;
    }
    for line in split_lines(text) {
        let content = Content::formatted(line, attributes.cloned());
        origin = insert_after(client, origin, content, ops)?;
    }
    if let Some(right) = original.slice(cursor.offset, len) {
        insert_after(client, origin, right, ops)?;
    }
    delete_item(client, target, ops)
}

/// Delete `len` characters starting at `offset`
fn delete_range(
    client: &mut Client,
    offset: usize,
    len: usize,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let mut remaining = len;
    while remaining > 0 {
        let (target, start, item_len) = char_at(client, offset)?;
        let take = remaining.min(item_len - start);
        let original = client
            .document()
            .get(&target)
            .ok_or(SyncError::UnknownItem(target))?
            .content
            .clone();

        let mut origin = target;
        if let Some(left) = original.slice(0, start) {
            origin = insert_after(client, origin, left, ops)?;
        }
        if let Some(right) = original.slice(start + take, item_len) {
            insert_after(client, origin, right, ops)?;
        }
        delete_item(client, target, ops)?;
        remaining -= take;
    }
    Ok(())
}

/// Merge `attributes` into the formatting of `len` characters at `offset`
fn format_range(
    client: &mut Client,
    offset: usize,
    len: usize,
    attributes: &Attributes,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let mut position = offset;
    let end = offset + len;
    while position < end {
        let (target, start, item_len) = char_at(client, position)?;
        let take = (end - position).min(item_len - start);
        let original = client
            .document()
            .get(&target)
            .ok_or(SyncError::UnknownItem(target))?
            .content
            .clone();

        let merged = merge_attributes(original.attributes(), attributes);
        if merged.as_ref() == original.attributes() {
            position += take;
            continue;
        }

        let mut origin = target;
        if let Some(left) = original.slice(0, start) {
            origin = insert_after(client, origin, left, ops)?;
        }
        if let Some(Content::Text { text, .. }) = original.slice(start, start + take) {
            origin = insert_after(client, origin, Content::formatted(text, merged), ops)?;
        }
        if let Some(right) = original.slice(start + take, item_len) {
            insert_after(client, origin, right, ops)?;
        }
        delete_item(client, target, ops)?;
        position += take;
    }
    Ok(())
}

/// Visible item holding the character at `offset`, the character's index
/// inside it, and the item's length
fn char_at(client: &Client, offset: usize) -> Result<(ItemId, usize, usize)> {
    let cursor = client.blocks().cursor_at(client.document(), offset + 1)?;
    let len = client
        .document()
        .get(&cursor.item)
        .ok_or(SyncError::UnknownItem(cursor.item))?
        .visible_len();
    Ok((cursor.item, cursor.offset - 1, len))
}

fn insert_after(
    client: &mut Client,
    origin: ItemId,
    content: Content,
    ops: &mut Vec<Operation>,
) -> Result<ItemId> {
    let id = client.next_id();
    let right_origin = client.document().next(&origin).unwrap_or(TAIL);
    let op = Operation::insert(id, content, origin, right_origin);
    client.apply_local(op.clone())?;
    ops.push(op);
    Ok(id)
}

fn delete_item(client: &mut Client, target: ItemId, ops: &mut Vec<Operation>) -> Result<()> {
    let op = Operation::delete(client.next_id(), target);
    client.apply_local(op.clone())?;
    ops.push(op);
    Ok(())
}

/// "ab\ncd\n" -> ["ab", "\n", "cd", "\n"]
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive('\n').flat_map(|line| {
        match line.strip_suffix('\n') {
            Some(body) if !body.is_empty() => vec![body, "\n"],
            Some(_) => vec!["\n"],
            None => vec![line],
        }
    })
}

impl Client {
    /// Insert `text` at `offset` as a local edit
    pub fn local_insert(
        &mut self,
        offset: usize,
        text: &str,
        attributes: Option<Attributes>,
    ) -> Result<Vec<Operation>> {
        let delta = EditorDelta::new().retain(offset).insert(text, attributes);
        editor_delta_to_ops(self, &delta)
    }

    /// Delete `len` characters at `offset` as a local edit
    pub fn local_delete(&mut self, offset: usize, len: usize) -> Result<Vec<Operation>> {
        let delta = EditorDelta::new().retain(offset).delete(len);
        editor_delta_to_ops(self, &delta)
    }

    /// Apply formatting to `len` characters at `offset` as a local edit
    pub fn local_format(
        &mut self,
        offset: usize,
        len: usize,
        attributes: Attributes,
    ) -> Result<Vec<Operation>> {
        let delta = EditorDelta::new().retain(offset).format(len, attributes);
        editor_delta_to_ops(self, &delta)
    }

    /// The whole document as an insert-only delta
    ///
    /// Adjacent items with the same formatting are joined into one step.
    pub fn to_editor_delta(&self) -> EditorDelta {
        let mut delta = EditorDelta::new();
        for item in self.document().iter() {
            if item.deleted {
                continue;
            }
            let Content::Text { text, attributes } = &item.content else {
                continue;
            };
            if let Some(last) = delta.ops.last_mut() {
                if last.attributes == *attributes {
                    if let Some(serde_json::Value::String(joined)) = last.insert.as_mut() {
                        joined.push_str(text);
                        continue;
                    }
                }
            }
            delta = delta.insert(text.clone(), attributes.clone());
        }
        delta
    }
}

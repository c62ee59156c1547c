//! Item content: what an item carries besides its position

use super::id::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Formatting metadata attached to text (bold, italic, header level, ...)
///
/// Open string-keyed map. A `null` value in an attribute *change* removes the
/// key, mirroring the rich-text editor's delta semantics.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Content of a document item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Content {
    /// Formatted text run
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },

    /// Sentinel marker only
    NoContent,

    /// Named cross-references to other items, for structured data
    ObjectRef { refs: BTreeMap<String, ItemId> },

    /// Opaque bytes
    Binary { bytes: Vec<u8> },

    /// Length-only placeholder
    Marker { length: usize },
}

impl Content {
    /// Plain text with no attributes
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text {
            text: text.into(),
            attributes: None,
        }
    }

    /// Text with attributes (empty attribute maps are normalized to `None`)
    pub fn formatted(text: impl Into<String>, attributes: Option<Attributes>) -> Self {
        Content::Text {
            text: text.into(),
            attributes: attributes.filter(|a| !a.is_empty()),
        }
    }

    /// Number of characters this content contributes to the visible text
    ///
    /// Only text is visible; structured content never reaches the editor.
    pub fn len(&self) -> usize {
        match self {
            Content::Text { text, .. } => text.chars().count(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Content::Text { attributes, .. } => attributes.as_ref(),
            _ => None,
        }
    }

    /// A single newline item opens a new block in the block index.
    pub fn is_newline(&self) -> bool {
        matches!(self, Content::Text { text, .. } if text == "\n")
    }

    /// Items referenced by this content
    pub fn references(&self) -> impl Iterator<Item = ItemId> + '_ {
        let refs = match self {
            Content::ObjectRef { refs } => Some(refs.values().copied()),
            _ => None,
        };
        refs.into_iter().flatten()
    }

    /// Character range `start..end` of a text content, keeping its attributes
    ///
    /// Returns `None` for non-text content or an empty range.
    pub fn slice(&self, start: usize, end: usize) -> Option<Content> {
        let Content::Text { text, attributes } = self else {
            return None;
        };
        if start >= end {
            return None;
        }
        let fragment: String = text.chars().skip(start).take(end - start).collect();
        if fragment.is_empty() {
            return None;
        }
        Some(Content::Text {
            text: fragment,
            attributes: attributes.clone(),
        })
    }
}

/// Apply an attribute change on top of existing attributes
///
/// Keys mapped to `null` in `change` are removed. Returns `None` when the
/// result is empty.
pub fn merge_attributes(base: Option<&Attributes>, change: &Attributes) -> Option<Attributes> {
    let mut merged = base.cloned().unwrap_or_default();
    for (key, value) in change {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

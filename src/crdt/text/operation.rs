//! Operations: the immutable unit of replication
//!
//! Operations are what replicas exchange. They are immutable once created and
//! idempotent to re-apply: the state vector filters repeats.

use super::content::Content;
use super::id::ItemId;
use serde::{Deserialize, Serialize};

/// Insert a new item between two neighbors as seen by the author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOp {
    pub id: ItemId,
    pub content: Content,
    /// Left neighbor at authoring time
    pub origin: ItemId,
    /// Right neighbor at authoring time
    pub right_origin: ItemId,
}

/// Tombstone an existing item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOp {
    pub id: ItemId,
    pub target: ItemId,
}

/// A replicated operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    Insert(InsertOp),
    Delete(DeleteOp),
}

impl Operation {
    pub fn insert(id: ItemId, content: Content, origin: ItemId, right_origin: ItemId) -> Self {
        Operation::Insert(InsertOp {
            id,
            content,
            origin,
            right_origin,
        })
    }

    pub fn delete(id: ItemId, target: ItemId) -> Self {
        Operation::Delete(DeleteOp { id, target })
    }

    /// Identifier of the operation (and of the item an insert creates)
    pub fn id(&self) -> ItemId {
        match self {
            Operation::Insert(op) => op.id,
            Operation::Delete(op) => op.id,
        }
    }

    /// Identifiers that must be present before this operation can apply
    pub fn dependencies(&self) -> Vec<ItemId> {
        match self {
            Operation::Insert(op) => vec![op.origin, op.right_origin],
            Operation::Delete(op) => vec![op.target],
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Operation::Insert(_))
    }
}

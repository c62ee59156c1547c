//! Item ID: Unique identifier for text items
//!
//! Each item in the text CRDT has a unique ID composed of:
//! - Replica ID: Identifies the replica that created the item
//! - Sequence: Per-replica counter assigned by the originating replica

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Replica identifier
///
/// `0` and `u64::MAX` are reserved for the document sentinels.
pub type ReplicaId = u64;

/// Unique identifier for a text item (and for the operation that created it)
///
/// Ordered by replica first, then sequence. This total order is the
/// tie-breaker the conflict resolver uses for concurrent inserts: the lower
/// id ends up further left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    /// Replica that created this item
    pub replica: ReplicaId,

    /// Sequence number on that replica (starts at 1)
    pub seq: u64,
}

/// Left sentinel, the minimum possible id
pub const HEAD: ItemId = ItemId { replica: 0, seq: 0 };

/// Right sentinel, the maximum possible id
pub const TAIL: ItemId = ItemId {
    replica: u64::MAX,
    seq: u64::MAX,
};

impl ItemId {
    /// Create a new item ID
    pub fn new(replica: ReplicaId, seq: u64) -> Self {
        Self { replica, seq }
    }

    /// Check if this is one of the two sentinels
    pub fn is_sentinel(&self) -> bool {
        *self == HEAD || *self == TAIL
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.replica.cmp(&other.replica) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            other => other,
        }
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            HEAD => write!(f, "HEAD"),
            TAIL => write!(f, "TAIL"),
            _ => write!(f, "{}:{}", self.replica, self.seq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_ordering() {
        let id1 = ItemId::new(1, 10);
        let id2 = ItemId::new(1, 20);
        let id3 = ItemId::new(2, 5);

        // Same replica: ordered by sequence
        assert!(id1 < id2);

        // Different replicas: replica takes precedence
        assert!(id2 < id3);
        assert!(id1 < id3);
    }

    #[test]
    fn test_sentinels_bound_everything() {
        let id = ItemId::new(42, 7);

        assert!(HEAD < id);
        assert!(id < TAIL);
        assert!(HEAD.is_sentinel());
        assert!(TAIL.is_sentinel());
        assert!(!id.is_sentinel());
    }

    #[test]
    fn test_display() {
        assert_eq!(ItemId::new(3, 9).to_string(), "3:9");
        assert_eq!(HEAD.to_string(), "HEAD");
        assert_eq!(TAIL.to_string(), "TAIL");
    }

    #[test]
    fn test_serialization() {
        let id = ItemId::new(7, 42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"replica":7,"seq":42}"#);

        let back: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

//! Error types for SyncText
//!
//! Missing causal dependencies are not errors: operations waiting on an
//! identifier are buffered and reported as [`crate::client::Outcome::Buffered`].
//! Everything here is something the caller has to act on.

use crate::crdt::text::ItemId;
use crate::facade::EditorState;
use thiserror::Error;

/// Result type for SyncText operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the replicated text core
#[derive(Error, Debug)]
pub enum SyncError {
    /// The facade is busy with another kind of edit; retry or defer.
    #[error("editor occupied: currently {state:?}")]
    EditorOccupied { state: EditorState },

    /// An editor delta could not be turned into operations (or back).
    #[error("delta conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    /// An identifier that must exist in the document does not.
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    /// A facade transition was requested from the wrong state.
    #[error("invalid editor state: {0}")]
    InvalidState(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Malformed or unsupported editor delta shapes
///
/// These indicate that the editor and the replica disagree about the document
/// and are always propagated to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("offset {offset} out of bounds (length: {length})")]
    OffsetOutOfBounds { offset: usize, length: usize },

    #[error("range {start}..{end} out of bounds (length: {length})")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        length: usize,
    },

    /// Only string inserts are supported at the editor boundary.
    #[error("unsupported insert value: {0}")]
    UnsupportedInsert(String),

    /// A step carried none (or more than one) of insert/delete/retain.
    #[error("invalid delta step at index {0}")]
    InvalidStep(usize),
}

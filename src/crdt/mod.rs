//! CRDT (Conflict-free Replicated Data Types) implementations
//!
//! This module contains the replicated text sequence and the ordering keys
//! used by its block overlay.
//!
//! # References
//!
//! - "Near Real-Time Peer-to-Peer Shared Editing on Extensible Data Types" (YATA)
//! - "A comprehensive study of CRDTs" by Marc Shapiro et al.

pub mod fractional_index;
pub mod text;

pub use fractional_index::FractionalIndex;
pub use text::{Content, Document, Item, ItemId, Operation};

//! Text CRDT: YATA-style replicated sequence
//!
//! The pieces, leaves first:
//! - [`ItemId`]: `(replica, seq)` identifiers with a total order
//! - [`Content`] and [`Item`]: what the document is made of
//! - [`Operation`]: the immutable replication unit
//! - [`Document`]: the item chain between `HEAD` and `TAIL`
//! - [`conflict`]: placement of concurrent inserts
//! - [`BlockIndex`]: line overlay for offset lookups

pub mod block;
pub mod conflict;
mod content;
mod document;
mod id;
mod item;
mod operation;

pub use block::{Block, BlockIndex, BlockPosition, Cursor};
pub use conflict::Placement;
pub use content::{merge_attributes, Attributes, Content};
pub use document::Document;
pub use id::{ItemId, ReplicaId, HEAD, TAIL};
pub use item::Item;
pub use operation::{DeleteOp, InsertOp, Operation};

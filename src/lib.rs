//! SyncText Core - replicated rich-text engine
//!
//! This is the Rust core of SyncText, compiled to both native and WASM.
//! It implements:
//! - A YATA sequence of items with tombstones and a line-level block index
//! - State vectors and dependency buffers for causal delivery
//! - Incremental garbage collection behind a cross-replica safe point
//! - Conversion between editor deltas and replicated operations
//! - An editor facade arbitrating user, remote, AI and storage writers
//!
//! # Examples
//!
//! ```rust
//! use synctext_core::{Editor, EditorDelta, ReplicaConfig};
//!
//! let mut alice = Editor::new(ReplicaConfig::with_replica(1)).unwrap();
//! let mut bob = Editor::new(ReplicaConfig::with_replica(2)).unwrap();
//!
//! let typed = EditorDelta::new().insert("Hello", None);
//! let ops = alice.handle_local_operations(&typed).unwrap().operations;
//!
//! let update = bob.handle_remote_operations(ops).unwrap();
//! assert_eq!(bob.text(), "Hello");
//! assert_eq!(update.deltas[0].apply("").unwrap(), "Hello");
//! ```

pub mod client;
pub mod config;
pub mod crdt;
pub mod delta;
pub mod error;
pub mod facade;
pub mod gc;
pub mod protocol;
pub mod storage;
pub mod sync;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use client::{ApplyReport, Client, DropReason, Effect, Outcome};
pub use config::ReplicaConfig;
pub use crdt::text::{Content, ItemId, Operation, ReplicaId, HEAD, TAIL};
pub use delta::{DeltaStep, EditorDelta};
pub use error::{ConversionError, Result, SyncError};
pub use facade::{Editor, EditorState, LocalUpdate, RemoteUpdate, SyncOutcome};
pub use protocol::SyncMessage;
pub use storage::Snapshot;
pub use sync::StateVector;

//! Causality bookkeeping for the replicated text
//!
//! - [`StateVector`]: what has been applied, per replica, with gaps
//! - [`OperationStore`]: the log of applied operations
//! - [`BufferStore`]: operations waiting for a missing dependency

pub mod buffer;
pub mod state_vector;
pub mod store;

pub use buffer::{BufferKind, BufferStore, BufferedEntry};
pub use state_vector::StateVector;
pub use store::OperationStore;

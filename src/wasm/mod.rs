//! WASM bindings for SyncText
//!
//! This module provides JavaScript-friendly bindings for the editor facade.
//! Everything crosses the boundary as JSON strings.

#[cfg(feature = "wasm")]
pub mod bindings;

#[cfg(feature = "wasm")]
pub mod utils;

// Re-export main types
#[cfg(feature = "wasm")]
pub use bindings::WasmEditor;

//! JavaScript bindings for the SyncText editor facade

use super::utils::{to_js_error, to_json};
use crate::config::ReplicaConfig;
use crate::crdt::text::Operation;
use crate::delta::EditorDelta;
use crate::facade::{Editor, RemoteUpdate};
use crate::protocol::{decode_operations, SyncMessage};
use crate::storage::Snapshot;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// What the editor has to apply after a call
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteView<'a> {
    deltas: &'a [EditorDelta],
    applied: usize,
    buffered: usize,
    dropped: usize,
    deferred: usize,
}

impl<'a> From<&'a RemoteUpdate> for RemoteView<'a> {
    fn from(update: &'a RemoteUpdate) -> Self {
        Self {
            deltas: &update.deltas,
            applied: update.report.applied.len(),
            buffered: update.report.buffered.len(),
            dropped: update.report.dropped_count(),
            deferred: update.deferred,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocalView<'a> {
    operations: &'a [Operation],
    flushed: RemoteView<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncView<'a> {
    reply: Option<&'a SyncMessage>,
    update: RemoteView<'a>,
}

/// JavaScript-friendly wrapper for the editor facade
#[wasm_bindgen]
pub struct WasmEditor {
    inner: Editor,
}

#[wasm_bindgen]
impl WasmEditor {
    /// Create an editor from a JSON config (`"{}"` for defaults)
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: String) -> Result<WasmEditor, JsValue> {
        let config = ReplicaConfig::from_json(&config_json).map_err(to_js_error)?;
        let inner = Editor::new(config).map_err(to_js_error)?;
        Ok(Self { inner })
    }

    /// Replica id as a decimal string (u64 does not fit a JS number)
    #[wasm_bindgen(js_name = replicaId)]
    pub fn replica_id(&self) -> String {
        self.inner.replica_id().to_string()
    }

    /// Current facade state
    #[wasm_bindgen(js_name = state)]
    pub fn state(&self) -> String {
        format!("{:?}", self.inner.state())
    }

    /// Apply a user edit; returns operations to broadcast and deltas from
    /// flushed remote operations
    #[wasm_bindgen(js_name = handleLocalOperations)]
    pub fn handle_local_operations(&mut self, delta_json: String) -> Result<String, JsValue> {
        let delta = EditorDelta::from_json(&delta_json).map_err(to_js_error)?;
        let update = self
            .inner
            .handle_local_operations(&delta)
            .map_err(to_js_error)?;
        to_json(&LocalView {
            operations: &update.operations,
            flushed: RemoteView::from(&update.flushed),
        })
    }

    /// Apply a JSON array of operations from peers
    #[wasm_bindgen(js_name = handleRemoteOperations)]
    pub fn handle_remote_operations(&mut self, ops_json: String) -> Result<String, JsValue> {
        let ops = decode_operations(&ops_json).map_err(to_js_error)?;
        let update = self
            .inner
            .handle_remote_operations(ops)
            .map_err(to_js_error)?;
        to_json(&RemoteView::from(&update))
    }

    /// Apply deferred remote operations
    #[wasm_bindgen(js_name = flushDeferred)]
    pub fn flush_deferred(&mut self) -> Result<String, JsValue> {
        let update = self.inner.flush_deferred().map_err(to_js_error)?;
        to_json(&RemoteView::from(&update))
    }

    #[wasm_bindgen(js_name = beginAiWriting)]
    pub fn begin_ai_writing(&mut self) -> Result<(), JsValue> {
        self.inner.begin_ai_writing().map_err(to_js_error)
    }

    /// Apply an AI edit; returns the operations to broadcast
    #[wasm_bindgen(js_name = handleAiOperations)]
    pub fn handle_ai_operations(&mut self, delta_json: String) -> Result<String, JsValue> {
        let delta = EditorDelta::from_json(&delta_json).map_err(to_js_error)?;
        let ops = self
            .inner
            .handle_ai_operations(&delta)
            .map_err(to_js_error)?;
        to_json(&ops)
    }

    #[wasm_bindgen(js_name = finishAiWriting)]
    pub fn finish_ai_writing(&mut self) -> Result<String, JsValue> {
        let update = self.inner.finish_ai_writing().map_err(to_js_error)?;
        to_json(&RemoteView::from(&update))
    }

    /// Get the visible text
    #[wasm_bindgen(js_name = text)]
    pub fn text(&self) -> String {
        self.inner.text()
    }

    /// Whole document as an editor delta
    #[wasm_bindgen(js_name = toDelta)]
    pub fn to_delta(&self) -> Result<String, JsValue> {
        to_json(&self.inner.client().to_editor_delta())
    }

    /// Export the durable state as JSON
    #[wasm_bindgen(js_name = snapshot)]
    pub fn snapshot(&self) -> Result<String, JsValue> {
        self.inner.snapshot().to_json().map_err(to_js_error)
    }

    /// Replace the replica with a snapshot; returns the document delta
    #[wasm_bindgen(js_name = load)]
    pub fn load(&mut self, snapshot_json: String) -> Result<String, JsValue> {
        let snapshot = Snapshot::from_json(&snapshot_json).map_err(to_js_error)?;
        let delta = self
            .inner
            .load_from_storage(snapshot)
            .map_err(to_js_error)?;
        to_json(&delta)
    }

    #[wasm_bindgen(js_name = syncRequest)]
    pub fn sync_request(&self) -> Result<String, JsValue> {
        self.inner.sync_request().encode().map_err(to_js_error)
    }

    /// Handle a sync message; returns an optional reply and editor deltas
    #[wasm_bindgen(js_name = handleSyncMessage)]
    pub fn handle_sync_message(&mut self, message_json: String) -> Result<String, JsValue> {
        let message = SyncMessage::decode(&message_json).map_err(to_js_error)?;
        let outcome = self
            .inner
            .handle_sync_message(message)
            .map_err(to_js_error)?;
        to_json(&SyncView {
            reply: outcome.reply.as_ref(),
            update: RemoteView::from(&outcome.update),
        })
    }

    /// Run garbage collection to completion; returns items collected
    #[wasm_bindgen(js_name = collectGarbage)]
    pub fn collect_garbage(&mut self) -> usize {
        self.inner
            .collect_garbage()
            .map(|stats| stats.collected)
            .unwrap_or(0)
    }
}

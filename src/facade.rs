//! Editor facade
//!
//! Serializes the three writers of a replica (the local user, remote peers
//! and an AI writer) plus loading from storage. Exactly one of them owns the
//! replica at a time:
//!
//! ```text
//!            handle_local_operations        handle_remote_operations
//!   Free ─────────────► UserEditing ──► Free ───────► RemoteDelta ──► Free
//!    │ begin_ai_writing                    finish_ai_writing
//!    └──────────────────► AiWriting ──────────────────────────────► Free
//!    │ load_from_storage
//!    └──────────────────► LoadingFromStorage ─────────────────────► Free
//! ```
//!
//! Local edits are addressed by offset into the editor's current text, so a
//! local edit arriving while something else owns the replica is refused with
//! [`SyncError::EditorOccupied`]. Remote operations are addressed by id and
//! can wait: they are deferred and applied the next time the facade returns
//! to `Free` (after a local edit, at the end of AI writing, or on
//! [`Editor::flush_deferred`]).

use crate::client::{ApplyReport, Client};
use crate::config::ReplicaConfig;
use crate::crdt::text::{Operation, ReplicaId};
use crate::delta::convert::remote_ops_to_editor_deltas;
use crate::delta::{editor_delta_to_ops, EditorDelta};
use crate::error::{Result, SyncError};
use crate::gc::{GcEngine, GcStats, GcStep, SafeVectorCalculator};
use crate::protocol::SyncMessage;
use crate::storage::Snapshot;
use crate::sync::StateVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Who currently owns the replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorState {
    Free,
    UserEditing,
    RemoteDelta,
    AiWriting,
    LoadingFromStorage,
}

/// Result of applying remote operations
#[derive(Debug, Clone, Default)]
pub struct RemoteUpdate {
    /// Deltas for the editor, to apply in order
    pub deltas: Vec<EditorDelta>,
    pub report: ApplyReport,
    /// Operations set aside because the editor was busy
    pub deferred: usize,
}

impl RemoteUpdate {
    fn absorb(&mut self, other: RemoteUpdate) {
        self.deltas.extend(other.deltas);
        self.report.applied.extend(other.report.applied);
        self.report.buffered = other.report.buffered;
        self.report.stale += other.report.stale;
        self.report.dropped.extend(other.report.dropped);
        self.deferred = other.deferred;
    }
}

/// Result of a local edit
#[derive(Debug, Clone, Default)]
pub struct LocalUpdate {
    /// Operations to broadcast to peers
    pub operations: Vec<Operation>,
    /// Deferred remote operations applied once the edit finished
    pub flushed: RemoteUpdate,
}

/// What a sync message produced
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Message to send back to the sender
    pub reply: Option<SyncMessage>,
    pub update: RemoteUpdate,
}

pub struct Editor {
    client: Client,
    state: EditorState,
    deferred: Vec<Operation>,
    peers: SafeVectorCalculator,
    gc: GcEngine,
    config: ReplicaConfig,
}

impl Editor {
    pub fn new(config: ReplicaConfig) -> Result<Self> {
        let client = Client::from_config(&config)?;
        Ok(Self {
            client,
            state: EditorState::Free,
            deferred: Vec::new(),
            peers: SafeVectorCalculator::new(config.expected_peers),
            gc: GcEngine::new(&config),
            config,
        })
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.client.replica_id()
    }

    pub fn text(&self) -> String {
        self.client.text()
    }

    /// Remote operations waiting for the editor to become free
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Apply an edit made by the local user
    pub fn handle_local_operations(&mut self, delta: &EditorDelta) -> Result<LocalUpdate> {
        self.enter(EditorState::UserEditing)?;
        let result = editor_delta_to_ops(&mut self.client, delta);
        self.state = EditorState::Free;

        let operations = result?;
        let flushed = self.flush_deferred()?;
        Ok(LocalUpdate {
            operations,
            flushed,
        })
    }

    /// Apply operations received from peers
    ///
    /// Deferred (not refused) while someone else owns the replica.
    pub fn handle_remote_operations(&mut self, ops: Vec<Operation>) -> Result<RemoteUpdate> {
        if self.state != EditorState::Free {
            self.deferred.extend(ops);
            debug!(
                state = ?self.state,
                deferred = self.deferred.len(),
                "deferring remote operations"
            );
            return Ok(RemoteUpdate {
                deferred: self.deferred.len(),
                ..RemoteUpdate::default()
            });
        }

        self.state = EditorState::RemoteDelta;
        let result = remote_ops_to_editor_deltas(&mut self.client, ops);
        self.state = EditorState::Free;

        let (report, deltas) = result?;
        Ok(RemoteUpdate {
            deltas,
            report,
            deferred: 0,
        })
    }

    /// Apply every deferred remote operation
    pub fn flush_deferred(&mut self) -> Result<RemoteUpdate> {
        if self.state != EditorState::Free {
            return Err(self.occupied());
        }
        let mut update = RemoteUpdate::default();
        if self.deferred.is_empty() {
            return Ok(update);
        }
        let ops = std::mem::take(&mut self.deferred);
        debug!(count = ops.len(), "flushing deferred remote operations");
        update.absorb(self.handle_remote_operations(ops)?);
        Ok(update)
    }

    pub fn begin_ai_writing(&mut self) -> Result<()> {
        self.enter(EditorState::AiWriting)
    }

    /// Apply an edit made by the AI writer; only valid between begin and
    /// finish
    pub fn handle_ai_operations(&mut self, delta: &EditorDelta) -> Result<Vec<Operation>> {
        if self.state != EditorState::AiWriting {
            return Err(SyncError::InvalidState(format!(
                "AI operations while {:?}",
                self.state
            )));
        }
        editor_delta_to_ops(&mut self.client, delta)
    }

    /// Hand the replica back and apply what was deferred meanwhile
    pub fn finish_ai_writing(&mut self) -> Result<RemoteUpdate> {
        if self.state != EditorState::AiWriting {
            return Err(SyncError::InvalidState(format!(
                "finish AI writing while {:?}",
                self.state
            )));
        }
        self.state = EditorState::Free;
        self.flush_deferred()
    }

    /// Replace the replica with a stored snapshot
    ///
    /// Returns the whole document as a delta for initialising the editor.
    pub fn load_from_storage(&mut self, snapshot: Snapshot) -> Result<EditorDelta> {
        self.enter(EditorState::LoadingFromStorage)?;
        let restored = Client::restore(snapshot);
        self.state = EditorState::Free;

        self.client = restored?;
        self.gc.reset();
        if !self.deferred.is_empty() {
            self.flush_deferred()?;
        }
        Ok(self.client.to_editor_delta())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.client.snapshot()
    }

    /// Record what a peer has observed (input to the safe vector)
    pub fn record_peer_vector(&mut self, peer: ReplicaId, vector: &StateVector) {
        if peer != self.replica_id() {
            self.peers.record(peer, vector);
        }
    }

    /// Run one garbage-collection batch
    ///
    /// Does nothing while the replica is owned by someone.
    pub fn collect_garbage_step(&mut self) -> GcStep {
        if self.state != EditorState::Free {
            return GcStep::Waiting;
        }
        self.gc.step(&mut self.client, &self.peers)
    }

    /// Run garbage collection until the pass completes
    pub fn collect_garbage(&mut self) -> Option<GcStats> {
        if self.state != EditorState::Free {
            return None;
        }
        self.gc.run_to_completion(&mut self.client, &self.peers)
    }

    /// Message opening an anti-entropy round with a peer
    pub fn sync_request(&self) -> SyncMessage {
        SyncMessage::StateVector {
            replica: self.replica_id(),
            vector: self.client.state_vector().clone(),
        }
    }

    /// Answer or apply a sync message from a peer
    pub fn handle_sync_message(&mut self, message: SyncMessage) -> Result<SyncOutcome> {
        match message {
            SyncMessage::StateVector { replica, vector } => {
                self.record_peer_vector(replica, &vector);
                Ok(SyncOutcome {
                    reply: Some(SyncMessage::Operations {
                        replica: self.replica_id(),
                        ops: self.client.get_missing_ops(&vector),
                        vector: self.client.state_vector().clone(),
                    }),
                    update: RemoteUpdate::default(),
                })
            }
            SyncMessage::Operations {
                replica,
                ops,
                vector,
            } => {
                self.record_peer_vector(replica, &vector);
                let update = self.handle_remote_operations(ops)?;
                Ok(SyncOutcome {
                    reply: None,
                    update,
                })
            }
        }
    }

    fn enter(&mut self, next: EditorState) -> Result<()> {
        if self.state != EditorState::Free {
            return Err(self.occupied());
        }
        self.state = next;
        Ok(())
    }

    fn occupied(&self) -> SyncError {
        warn!(state = ?self.state, "editor occupied");
        SyncError::EditorOccupied { state: self.state }
    }
}

//! Sync protocol messages
//!
//! Two messages are enough for anti-entropy between a pair of replicas:
//! a replica announces what it has seen (`StateVector`) and the other answers
//! with everything missing from it (`Operations`), attaching its own vector so
//! the receiver can answer in turn and record the sender's progress for
//! garbage collection. Transport is someone else's job; messages travel as
//! JSON text.

use crate::crdt::text::{Operation, ReplicaId};
use crate::error::{Result, SyncError};
use crate::sync::StateVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncMessage {
    /// "This is what I have seen"
    StateVector {
        replica: ReplicaId,
        vector: StateVector,
    },
    /// Operations the receiver is missing, and the sender's own vector
    Operations {
        replica: ReplicaId,
        ops: Vec<Operation>,
        vector: StateVector,
    },
}

impl SyncMessage {
    /// Replica that sent the message
    pub fn sender(&self) -> ReplicaId {
        match self {
            SyncMessage::StateVector { replica, .. } => *replica,
            SyncMessage::Operations { replica, .. } => *replica,
        }
    }

    pub fn vector(&self) -> &StateVector {
        match self {
            SyncMessage::StateVector { vector, .. } => vector,
            SyncMessage::Operations { vector, .. } => vector,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let message: Self = serde_json::from_str(text)
            .map_err(|e| SyncError::Protocol(format!("malformed sync message: {e}")))?;
        if message.sender() == 0 || message.sender() == u64::MAX {
            return Err(SyncError::Protocol(format!(
                "reserved sender id {}",
                message.sender()
            )));
        }
        Ok(message)
    }
}

/// Encode a batch of operations on their own (e.g. a live broadcast)
pub fn encode_operations(ops: &[Operation]) -> Result<String> {
    Ok(serde_json::to_string(ops)?)
}

pub fn decode_operations(text: &str) -> Result<Vec<Operation>> {
    serde_json::from_str(text)
        .map_err(|e| SyncError::Protocol(format!("malformed operations: {e}")))
}

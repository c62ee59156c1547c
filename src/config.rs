//! Replica configuration.

use serde::{Deserialize, Serialize};

use crate::crdt::text::{ReplicaId, HEAD, TAIL};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Explicit replica id; drawn at random when absent
    pub replica_id: Option<ReplicaId>,
    /// Peer state vectors required before garbage collection may run
    pub expected_peers: usize,
    /// Items examined per garbage-collection batch
    pub gc_batch_size: usize,
    pub gc_enabled: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            replica_id: None,
            expected_peers: 1,
            gc_batch_size: 256,
            gc_enabled: true,
        }
    }
}

impl ReplicaConfig {
    pub fn with_replica(replica_id: ReplicaId) -> Self {
        Self {
            replica_id: Some(replica_id),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SyncError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gc_batch_size == 0 {
            return Err(SyncError::Config("gc_batch_size must be at least 1".into()));
        }
        if let Some(id) = self.replica_id {
            if id == HEAD.replica || id == TAIL.replica {
                return Err(SyncError::Config(format!("replica id {id} is reserved")));
            }
        }
        Ok(())
    }

    /// The configured replica id, or a fresh random one
    pub fn resolve_replica_id(&self) -> ReplicaId {
        self.replica_id.unwrap_or_else(random_replica_id)
    }
}

/// Random replica id from a v4 UUID, never one of the reserved values
pub fn random_replica_id() -> ReplicaId {
    loop {
        let (high, low) = uuid::Uuid::new_v4().as_u64_pair();
        let id = high ^ low;
        if id != HEAD.replica && id != TAIL.replica {
            return id;
        }
    }
}

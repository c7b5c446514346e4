// src/store/memory.rs
use anyhow::Result;
use log::debug;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AgentIdentity, SnapshotStore};

/// Process-local store, used by the simulation and in tests. Clones share the
/// same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<String, JsonValue>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, identity: &AgentIdentity) -> Result<Option<JsonValue>> {
        Ok(self.snapshots.read().await.get(identity.as_str()).cloned())
    }

    async fn save(&self, identity: &AgentIdentity, snapshot: JsonValue) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(identity.as_str().to_string(), snapshot);
        debug!("MemorySnapshotStore: saved snapshot for '{}'", identity);
        Ok(())
    }
}

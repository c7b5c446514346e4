// src/store/mod.rs
//! Snapshot persistence for the learning agents.
//!
//! A store holds exactly one JSON snapshot per agent identity and replaces it
//! wholesale on save (last writer wins). Callers treat a failed `load` as a
//! cold start, except for [`MalformedSnapshot`], which means something is
//! stored but cannot be decoded.

pub mod file;
pub mod memory;
pub mod postgres;

use anyhow::Result;
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use postgres::PgSnapshotStore;

/// Key under which an agent's snapshot is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentIdentity(String);

impl AgentIdentity {
    pub const SCHEDULER: &'static str = "q_learning";
    pub const STYLE_BANDIT: &'static str = "thompson_sampling";

    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// `{namespace}:{name}`, or just `name` when the namespace is empty.
    pub fn namespaced(namespace: Option<&str>, name: &str) -> Self {
        match namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(ns) => Self(format!("{}:{}", ns, name)),
            None => Self::new(name),
        }
    }

    pub fn scheduler(namespace: Option<&str>) -> Self {
        Self::namespaced(namespace, Self::SCHEDULER)
    }

    pub fn style_bandit(namespace: Option<&str>) -> Self {
        Self::namespaced(namespace, Self::STYLE_BANDIT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored snapshot exists but is not valid JSON.
#[derive(Debug)]
pub struct MalformedSnapshot {
    pub identity: AgentIdentity,
    pub source: serde_json::Error,
}

impl fmt::Display for MalformedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot for '{}' is not valid JSON: {}", self.identity, self.source)
    }
}

impl std::error::Error for MalformedSnapshot {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved for `identity` yet. Undecodable
    /// content comes back as an error wrapping [`MalformedSnapshot`].
    fn load(
        &self,
        identity: &AgentIdentity,
    ) -> impl Future<Output = Result<Option<JsonValue>>> + Send;

    fn save(
        &self,
        identity: &AgentIdentity,
        snapshot: JsonValue,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Store selected at runtime from configuration.
pub enum SnapshotBackend {
    Memory(MemorySnapshotStore),
    File(FileSnapshotStore),
    Postgres(PgSnapshotStore),
}

impl SnapshotBackend {
    pub fn describe(&self) -> String {
        match self {
            SnapshotBackend::Memory(_) => "in-memory".to_string(),
            SnapshotBackend::File(store) => format!("file ({})", store.dir().display()),
            SnapshotBackend::Postgres(_) => "postgres (rl_state)".to_string(),
        }
    }
}

impl SnapshotStore for SnapshotBackend {
    async fn load(&self, identity: &AgentIdentity) -> Result<Option<JsonValue>> {
        match self {
            SnapshotBackend::Memory(store) => store.load(identity).await,
            SnapshotBackend::File(store) => store.load(identity).await,
            SnapshotBackend::Postgres(store) => store.load(identity).await,
        }
    }

    async fn save(&self, identity: &AgentIdentity, snapshot: JsonValue) -> Result<()> {
        match self {
            SnapshotBackend::Memory(store) => store.save(identity, snapshot).await,
            SnapshotBackend::File(store) => store.save(identity, snapshot).await,
            SnapshotBackend::Postgres(store) => store.save(identity, snapshot).await,
        }
    }
}

// src/store/postgres.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value as JsonValue;

use super::{AgentIdentity, SnapshotStore};
use crate::utils::db_connect::PgPool;

const CREATE_RL_STATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS public.rl_state (
    agent_type   TEXT PRIMARY KEY,
    snapshot     JSONB NOT NULL,
    version      INTEGER NOT NULL DEFAULT 1,
    last_updated TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

/// Row metadata for a stored snapshot, for reporting.
#[derive(Debug, Clone)]
pub struct SnapshotRecordInfo {
    pub agent_type: String,
    pub version: i32,
    pub last_updated: DateTime<Utc>,
}

/// Snapshots in `public.rl_state`, one row per agent identity.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        conn.execute(CREATE_RL_STATE_TABLE, &[])
            .await
            .context("Failed to create rl_state table")?;
        debug!("rl_state table is present");
        Ok(())
    }

    pub async fn record_info(&self, identity: &AgentIdentity) -> Result<Option<SnapshotRecordInfo>> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        let row_opt = conn
            .query_opt(
                "SELECT agent_type, version, last_updated FROM public.rl_state WHERE agent_type = $1",
                &[&identity.as_str()],
            )
            .await
            .context("Failed to query rl_state metadata")?;

        Ok(row_opt.map(|row| SnapshotRecordInfo {
            agent_type: row.get("agent_type"),
            version: row.get("version"),
            last_updated: row.get("last_updated"),
        }))
    }
}

impl SnapshotStore for PgSnapshotStore {
    async fn load(&self, identity: &AgentIdentity) -> Result<Option<JsonValue>> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        let row_opt = conn
            .query_opt(
                "SELECT snapshot FROM public.rl_state WHERE agent_type = $1",
                &[&identity.as_str()],
            )
            .await
            .with_context(|| format!("Failed to load snapshot for '{}'", identity))?;

        Ok(row_opt.map(|row| row.get::<_, JsonValue>(0)))
    }

    async fn save(&self, identity: &AgentIdentity, snapshot: JsonValue) -> Result<()> {
        let conn = self.pool.get().await.context("Failed to get DB connection")?;
        let version: i32 = conn
            .query_one(
                "INSERT INTO public.rl_state (agent_type, snapshot, version, last_updated)
                 VALUES ($1, $2, 1, CURRENT_TIMESTAMP)
                 ON CONFLICT (agent_type) DO UPDATE
                 SET snapshot = EXCLUDED.snapshot,
                     version = public.rl_state.version + 1,
                     last_updated = CURRENT_TIMESTAMP
                 RETURNING version",
                &[&identity.as_str(), &snapshot],
            )
            .await
            .with_context(|| format!("Failed to save snapshot for '{}'", identity))?
            .get(0);

        info!("Saved snapshot for '{}' to rl_state (version {})", identity, version);
        Ok(())
    }
}

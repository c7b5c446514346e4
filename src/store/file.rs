// src/store/file.rs
use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value as JsonValue;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{AgentIdentity, MalformedSnapshot, SnapshotStore};

/// One `<identity>.json` file per agent inside `dir`.
///
/// Saves write a sibling temp file and rename it over the target, so a reader
/// sees either the previous snapshot or the new one, never a partial write.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, identity: &AgentIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(identity.as_str())))
    }
}

/// Reversible file name for an identity. The namespace separator ':' becomes
/// '.', so a literal '.' (and any other byte outside `[A-Za-z0-9_-]`) is
/// written as `%XX`.
fn file_stem(identity: &str) -> String {
    let mut stem = String::with_capacity(identity.len());
    for byte in identity.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => stem.push(byte as char),
            b':' => stem.push('.'),
            other => stem.push_str(&format!("%{:02X}", other)),
        }
    }
    stem
}

impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, identity: &AgentIdentity) -> Result<Option<JsonValue>> {
        let path = self.path_for(identity);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot file at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|source| MalformedSnapshot {
                identity: identity.clone(),
                source,
            })
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        Ok(Some(value))
    }

    async fn save(&self, identity: &AgentIdentity, snapshot: JsonValue) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create snapshot dir {}", self.dir.display()))?;

        let path = self.path_for(identity);
        let tmp_path = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .context("Failed to encode snapshot as JSON")?;

        tokio::fs::write(&tmp_path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }

        info!(
            "Saved snapshot for '{}' to {} ({} bytes)",
            identity,
            path.display(),
            bytes.len()
        );
        Ok(())
    }
}

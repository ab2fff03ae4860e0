// src/state.rs
//! Durable per-target baseline (`status.json`).
//!
//! The whole map is loaded once per run and rewritten once per run. Loading
//! never fails: a missing or unreadable file means "start fresh". Saving goes
//! through a sibling temp file and a rename so readers see either the old or
//! the new file, never a torn one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::fingerprint::FingerprintSet;

/// URL -> record. Sorted so the file diffs cleanly between runs.
pub type StatusMap = BTreeMap<String, TargetRecord>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub last_markup_digest: String,
    pub last_text_digest: String,
    pub last_image_digest: String,
    /// Full normalized text, kept so keyword flips survive a restart.
    pub last_visible_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    /// Keys written by newer versions or other tools; carried over untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TargetRecord {
    pub fn new(
        fingerprints: FingerprintSet,
        visible_text: String,
        in_stock: Option<bool>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            last_markup_digest: fingerprints.markup_digest,
            last_text_digest: fingerprints.text_digest,
            last_image_digest: fingerprints.image_digest,
            last_visible_text: visible_text,
            in_stock,
            checked_at: Some(checked_at),
            extra: Map::new(),
        }
    }

    /// Carry unknown keys over from the record this one replaces.
    pub fn inherit_extra(mut self, previous: Option<&TargetRecord>) -> Self {
        if let Some(prev) = previous {
            self.extra = prev.extra.clone();
        }
        self
    }

    pub fn fingerprints(&self) -> FingerprintSet {
        FingerprintSet {
            markup_digest: self.last_markup_digest.clone(),
            text_digest: self.last_text_digest.clone(),
            image_digest: self.last_image_digest.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> StatusMap {
        match fs::read(&self.path).await {
            Ok(bytes) => parse_status(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no status file yet, starting fresh");
                StatusMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "status read failed, starting fresh: {e:#}");
                StatusMap::new()
            }
        }
    }

    pub async fn save(&self, status: &StatusMap) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(status).context("serialize status")?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create state dir {}", dir.display()))?;
        }

        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp)
            .await
            .with_context(|| format!("create {}", tmp.display()))?;
        file.write_all(&bytes).await.context("write status")?;
        file.sync_all().await.context("fsync status")?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;

        tracing::debug!(path = %self.path.display(), targets = status.len(), "status saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "status.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Tolerant parse: garbage yields an empty map, and individual records that
/// are missing required fields are dropped (treated as never observed).
pub fn parse_status(bytes: &[u8]) -> StatusMap {
    let top: Map<String, Value> = match serde_json::from_slice(bytes) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("status file unparseable, starting fresh: {e}");
            return StatusMap::new();
        }
    };

    let mut out = StatusMap::new();
    for (url, value) in top {
        match serde_json::from_value::<TargetRecord>(value) {
            Ok(record) => {
                out.insert(url, record);
            }
            Err(e) => tracing::warn!(%url, "dropping incomplete target record: {e}"),
        }
    }
    out
}

//! Append-only persistence for `stats-report` envelopes
//!
//! Layout: `<dir>/<room>/<name>.jsonl`, one [`StatsSnapshot`] per line. Room
//! and report names are peer supplied and sanitized before touching the disk.

use crate::{Error, Result};
use duet_core::paths::sanitize_component;
use duet_core::stats::StatsSnapshot;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Directory-backed report store
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Store reports under `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a report lands in
    pub fn report_path(&self, room_id: &str, name: &str) -> PathBuf {
        let file = format!("{}.jsonl", sanitize_component(name));
        self.dir.join(sanitize_component(room_id)).join(file)
    }

    /// Append `samples` to the report, returning its path
    pub async fn append(
        &self,
        room_id: &str,
        name: &str,
        samples: &[StatsSnapshot],
    ) -> Result<PathBuf> {
        let path = self.report_path(room_id, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut lines = String::new();
        for sample in samples {
            lines.push_str(&serde_json::to_string(sample)?);
            lines.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::ReportError(format!("{}: {}", path.display(), e)))?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;

        info!(
            room_id,
            name,
            samples = samples.len(),
            path = %path.display(),
            "Stats report stored"
        );
        Ok(path)
    }
}

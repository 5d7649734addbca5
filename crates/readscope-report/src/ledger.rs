//! JSON-lines export ledger.
//!
//! One [`ExportRow`] per line, appended in submission order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use readscope_core::report::ExportRow;
use readscope_core::traits::ResultSink;

/// Append-only ledger file.
pub struct JsonlLedger {
    path: PathBuf,
    // Serializes appends from concurrent submissions.
    write_lock: Mutex<()>,
}

impl JsonlLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every row. A missing file is an empty ledger; unparsable lines
    /// are skipped with a warning.
    pub fn read_rows(&self) -> Result<Vec<ExportRow>> {
        read_rows(&self.path)
    }
}

/// Load every row of the ledger at `path`.
pub fn read_rows(path: &Path) -> Result<Vec<ExportRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ledger: {}", path.display()))?;

    let mut rows = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ExportRow>(line) {
            Ok(row) => rows.push(row),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "skipping malformed ledger line"
            ),
        }
    }
    Ok(rows)
}

#[async_trait]
impl ResultSink for JsonlLedger {
    async fn record(&self, row: &ExportRow) -> Result<()> {
        let mut line = serde_json::to_string(row).context("failed to serialize export row")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open ledger: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), name = %row.name, "appended export row");
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use flowrun_core::error::{FlowError, Result};
use flowrun_core::traits::Ledger;
use flowrun_core::types::LedgerEntry;

/// Append-only cost ledger stored as JSON Lines.
pub struct JsonlLedger {
    path: PathBuf,
    // Serializes appends so lines from concurrent runs never interleave.
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

    /// Read every entry back. A missing file is an empty ledger; corrupt lines
    /// are skipped.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = lineno + 1, error = %e, "Skipping corrupt ledger line"),
            }
        }
        Ok(entries)
    }

    async fn write_line(&self, line: String) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

impl Ledger for JsonlLedger {
    fn append(&self, entry: LedgerEntry) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            self.write_line(line)
                .await
                .map_err(|e| FlowError::LedgerWrite(format!("{}: {}", self.path.display(), e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowrun_core::types::{FlowId, LedgerStatus};

    fn entry(flow_id: i64, status: LedgerStatus) -> LedgerEntry {
        LedgerEntry {
            flow_id: FlowId(flow_id),
            provider: "openai".into(),
            role: "writer".into(),
            input_tokens: 100,
            output_tokens: 20,
            cost: 0.003,
            latency_ms: 420,
            status,
            error: match status {
                LedgerStatus::Failed => Some("HTTP 500: boom".into()),
                LedgerStatus::Success => None,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(tmp.path().join("nested/ledger.jsonl"));

        assert!(ledger.entries().await.unwrap().is_empty());

        ledger.append(entry(1, LedgerStatus::Success)).await.unwrap();
        ledger.append(entry(1, LedgerStatus::Failed)).await.unwrap();

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, LedgerStatus::Success);
        assert_eq!(entries[1].error.as_deref(), Some("HTTP 500: boom"));

        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");
        let ledger = JsonlLedger::new(&path);
        ledger.append(entry(2, LedgerStatus::Success)).await.unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        std::fs::write(&path, raw).unwrap();
        ledger.append(entry(3, LedgerStatus::Success)).await.unwrap();

        let ids: Vec<i64> = ledger.entries().await.unwrap().iter().map(|e| e.flow_id.0).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_unwritable_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let ledger = JsonlLedger::new(blocker.join("ledger.jsonl"));

        let err = ledger.append(entry(1, LedgerStatus::Success)).await.unwrap_err();
        assert!(matches!(err, FlowError::LedgerWrite(_)));
        assert!(!err.is_fatal());
    }
}

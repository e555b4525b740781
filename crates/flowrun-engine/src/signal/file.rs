use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::debug;

use flowrun_core::error::{FlowError, Result};
use flowrun_core::traits::StatusSignaler;
use flowrun_core::types::{FlowId, FlowStatus};

/// Extension of every status file.
pub const STATUS_FILE_EXT: &str = "json";

/// Durable status signaler.
///
/// One pretty-printed JSON file per flow, `{dir}/{flow_id}.json`, fully
/// overwritten on every update. Writes are not atomic and not coordinated
/// across processes. The directory is created on first use.
pub struct FileSignaler {
    dir: PathBuf,
}

impl FileSignaler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the status file for a flow.
    pub fn path_for(&self, flow_id: FlowId) -> PathBuf {
        self.dir.join(format!("{}.{}", flow_id, STATUS_FILE_EXT))
    }

    fn delivery_error(&self, e: impl std::fmt::Display) -> FlowError {
        FlowError::SignalDelivery {
            channel: self.name().to_string(),
            message: e.to_string(),
        }
    }
}

impl StatusSignaler for FileSignaler {
    fn name(&self) -> &str {
        "file"
    }

    fn notify_status(&self, flow_id: FlowId, status: FlowStatus) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let text = serde_json::to_string_pretty(&status)?;
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| self.delivery_error(e))?;

            let path = self.path_for(flow_id);
            tokio::fs::write(&path, text)
                .await
                .map_err(|e| self.delivery_error(e))?;

            debug!(flow_id = %flow_id, path = %path.display(), "Status file written");
            Ok(())
        })
    }

    fn get_status(&self, flow_id: FlowId) -> BoxFuture<'_, Result<FlowStatus>> {
        Box::pin(async move {
            let path = self.path_for(flow_id);
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(t) => t,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(FlowError::NotFound(format!("status for flow {}", flow_id)));
                }
                Err(e) => return Err(e.into()),
            };
            Ok(serde_json::from_str(&text)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrun_core::types::FlowState;

    #[tokio::test]
    async fn test_roundtrip_every_field() {
        let tmp = tempfile::tempdir().unwrap();
        let signaler = FileSignaler::new(tmp.path().join("status"));

        let status = FlowStatus::new(FlowId(12), FlowState::Failed)
            .with_last_node("writer")
            .with_error("Generation failed: rate limited");
        signaler.notify_status(FlowId(12), status.clone()).await.unwrap();

        let loaded = signaler.get_status(FlowId(12)).await.unwrap();
        assert_eq!(loaded, status);
        assert_eq!(loaded.updated_at, status.updated_at);
    }

    #[tokio::test]
    async fn test_file_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let signaler = FileSignaler::new(tmp.path());
        let status = FlowStatus::new(FlowId(7), FlowState::Running);
        signaler.notify_status(FlowId(7), status).await.unwrap();

        let path = tmp.path().join("7.json");
        assert_eq!(signaler.path_for(FlowId(7)), path);
        let text = std::fs::read_to_string(&path).unwrap();
        // Pretty-printed
        assert!(text.contains("\n  \"flowId\": 7"));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let signaler = FileSignaler::new(tmp.path());

        let mut status = FlowStatus::new(FlowId(3), FlowState::Running).with_last_node("a");
        signaler.notify_status(FlowId(3), status.clone()).await.unwrap();
        status.advance(FlowState::Completed);
        signaler.notify_status(FlowId(3), status.clone()).await.unwrap();

        assert_eq!(signaler.get_status(FlowId(3)).await.unwrap(), status);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let signaler = FileSignaler::new(tmp.path().join("never-created"));
        let err = signaler.get_status(FlowId(99)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_delivery_error() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = tmp.path().join("blocked");
        std::fs::write(&blocker, "x").unwrap();

        let signaler = FileSignaler::new(&blocker);
        let err = signaler
            .notify_status(FlowId(1), FlowStatus::new(FlowId(1), FlowState::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::SignalDelivery { ref channel, .. } if channel == "file"));
        assert!(!err.is_fatal());
    }
}

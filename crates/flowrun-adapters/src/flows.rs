use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tracing::debug;

use flowrun_core::error::{FlowError, Result};
use flowrun_core::traits::FlowStore;
use flowrun_core::types::{Flow, FlowId};

/// Flow store that reads one JSON `Flow` record per file: `{dir}/{id}.json`.
pub struct DirFlowStore {
    dir: PathBuf,
}

impl DirFlowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, flow_id: FlowId) -> PathBuf {
        self.dir.join(format!("{}.json", flow_id))
    }

    /// Load the full record, not just its graph.
    pub async fn load(&self, flow_id: FlowId) -> Result<Flow> {
        let path = self.path_for(flow_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FlowError::NotFound(format!("flow {}", flow_id)));
            }
            Err(e) => return Err(e.into()),
        };

        let flow: Flow = serde_json::from_str(&content)
            .map_err(|e| FlowError::Parse(format!("{}: {}", path.display(), e)))?;
        if flow.id != flow_id {
            debug!(flow_id = %flow_id, record_id = %flow.id, "Flow record id differs from file name");
        }
        Ok(flow)
    }
}

impl FlowStore for DirFlowStore {
    fn fetch(&self, flow_id: FlowId) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(self.load(flow_id).await?.raw_graph()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_inline_graph() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "7.json",
            json!({"id": 7, "name": "demo", "graph": {"nodes": [], "edges": []}}),
        );

        let store = DirFlowStore::new(tmp.path());
        let raw = store.fetch(FlowId(7)).await.unwrap();
        let graph: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(graph, json!({"nodes": [], "edges": []}));
    }

    #[tokio::test]
    async fn test_fetch_text_graph_is_returned_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let text = r#"{"nodes": [{"id": "a", "type": "agent"}]}"#;
        write(
            tmp.path(),
            "8.json",
            json!({"id": 8, "name": "text", "graph": text, "status": "draft", "createdAt": "2024-03-01T10:00:00Z"}),
        );

        let store = DirFlowStore::new(tmp.path());
        assert_eq!(store.fetch(FlowId(8)).await.unwrap(), text);

        let flow = store.load(FlowId(8)).await.unwrap();
        assert_eq!(flow.name, "text");
        assert_eq!(flow.status.as_deref(), Some("draft"));
        assert!(flow.created_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_flow() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirFlowStore::new(tmp.path());
        let err = store.fetch(FlowId(99)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_undecodable_record() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("3.json"), "{ nope").unwrap();
        let store = DirFlowStore::new(tmp.path());
        let err = store.fetch(FlowId(3)).await.unwrap_err();
        assert!(matches!(err, FlowError::Parse(_)));
    }
}

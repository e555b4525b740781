use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use flowrun_adapters::{DirFlowStore, JsonlLedger};
use flowrun_core::config::EngineConfig;
use flowrun_core::hub::Hub;
use flowrun_core::traits::StatusSignaler;
use flowrun_core::types::{FlowId, FlowState, GenerationFailure, LedgerStatus, Usage};
use flowrun_engine::{EngineServices, FileSignaler, FlowEngine, FlowJournal, HubSignaler, StatusQuery};
use flowrun_test_utils::{ScriptedGenerator, StaticCredentials};

struct Fixture {
    engine: FlowEngine,
    hub: Arc<Hub>,
    ledger: Arc<JsonlLedger>,
    durable: Arc<FileSignaler>,
}

fn write_flow(dir: &Path, id: i64, graph: serde_json::Value) {
    std::fs::create_dir_all(dir).unwrap();
    let record = json!({"id": id, "name": format!("flow {}", id), "graph": graph});
    std::fs::write(dir.join(format!("{}.json", id)), record.to_string()).unwrap();
}

fn fixture(root: &Path, generator: ScriptedGenerator) -> Fixture {
    let hub = Arc::new(Hub::default());
    let ledger = Arc::new(JsonlLedger::new(root.join("ledger/costs.jsonl")));
    let durable = Arc::new(FileSignaler::new(root.join("status")));

    let services = EngineServices {
        flows: Arc::new(DirFlowStore::new(root.join("flows"))),
        credentials: Arc::new(StaticCredentials::new().with("openai", "sk-test")),
        generator: Arc::new(generator),
        ledger: ledger.clone(),
        hub: hub.clone(),
        durable: durable.clone(),
        live: Arc::new(HubSignaler::new(hub.clone())),
    };

    Fixture {
        engine: FlowEngine::new(services, &EngineConfig::default()),
        hub,
        ledger,
        durable,
    }
}

fn agent(id: &str, prompt: &str) -> serde_json::Value {
    json!({"id": id, "type": "agent", "data": {"label": id, "role": "writer", "prompt": prompt, "provider": "openai"}})
}

#[tokio::test]
async fn stored_flow_runs_against_file_backends() {
    let tmp = tempfile::tempdir().unwrap();
    write_flow(
        &tmp.path().join("flows"),
        5,
        json!({"nodes": [agent("A", "pa"), agent("B", "pb")], "edges": [{"source": "A", "target": "B"}]}),
    );
    let generator = ScriptedGenerator::new()
        .succeed("pa", "alpha", Usage::new(100, 50, 0.01))
        .succeed("pb", "beta", Usage::new(200, 80, 0.02));
    let f = fixture(tmp.path(), generator);

    let cancel = CancellationToken::new();
    let journal = FlowJournal::new(tmp.path().join("journal"), 2).start(f.hub.clone(), cancel.clone());

    let summary = f.engine.execute_flow(FlowId(5)).await.unwrap();
    assert_eq!(summary.status, FlowState::Completed);
    let total = summary.total_usage();
    assert_eq!((total.input_tokens, total.output_tokens), (300, 130));

    // The status file is what a restarted process would read back.
    let query = StatusQuery::new(Arc::new(FileSignaler::new(f.durable.dir())));
    let status = query.status(FlowId(5)).await.unwrap();
    assert_eq!(status.status, FlowState::Completed);
    assert_eq!(status.last_node.as_deref(), Some("B"));
    assert!(f.durable.dir().join("5.json").exists());

    let rows = f.ledger.entries().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == LedgerStatus::Success));

    cancel.cancel();
    journal.await.unwrap();
    let journal_file = std::fs::read_dir(tmp.path().join("journal"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let lines = std::fs::read_to_string(journal_file).unwrap();
    assert!(lines.lines().any(|l| l.contains("FLOW_STARTED")));
    assert_eq!(lines.lines().filter(|l| l.contains("NODE_STARTED")).count(), 2);
}

#[tokio::test]
async fn failed_node_is_billed_and_recorded_as_failed() {
    let tmp = tempfile::tempdir().unwrap();
    write_flow(&tmp.path().join("flows"), 6, json!({"nodes": [agent("A", "pa")]}));
    let generator = ScriptedGenerator::new().fail(
        "pa",
        GenerationFailure::new("HTTP 502: bad gateway").with_usage(Usage::new(12, 0, 0.001)),
    );
    let f = fixture(tmp.path(), generator);

    let err = f.engine.execute_flow(FlowId(6)).await.unwrap_err();
    assert!(err.to_string().contains("bad gateway"));

    let rows = f.ledger.entries().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, LedgerStatus::Failed);
    assert_eq!(rows[0].input_tokens, 12);

    let status = f.durable.get_status(FlowId(6)).await.unwrap();
    assert_eq!(status.status, FlowState::Failed);
    assert!(status.error.unwrap().contains("bad gateway"));
}

#[tokio::test]
async fn missing_flow_file_leaves_no_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let f = fixture(tmp.path(), ScriptedGenerator::new());

    let err = f.engine.execute_flow(FlowId(404)).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!f.durable.dir().exists());
    assert!(f.ledger.entries().await.unwrap().is_empty());
}

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use flowrun_core::config::{EngineConfig, GatewayConfig};
use flowrun_core::hub::Hub;
use flowrun_core::message::LifecycleMessage;
use flowrun_core::traits::StatusSignaler;
use flowrun_core::types::FlowId;
use flowrun_engine::{EngineServices, FileSignaler, FlowEngine, HubSignaler, StatusQuery};
use flowrun_gateway::GatewayServer;
use flowrun_test_utils::{MemoryFlowStore, MemoryLedger, ScriptedGenerator, StaticCredentials};

/// Serve the gateway on an ephemeral port. Returns its address and the hub.
async fn serve(tmp: &tempfile::TempDir, shutdown: CancellationToken) -> (String, Arc<Hub>) {
    let hub = Arc::new(Hub::default());
    let durable: Arc<dyn StatusSignaler> = Arc::new(FileSignaler::new(tmp.path()));
    let services = EngineServices {
        flows: Arc::new(MemoryFlowStore::new()),
        credentials: Arc::new(StaticCredentials::new()),
        generator: Arc::new(ScriptedGenerator::new()),
        ledger: Arc::new(MemoryLedger::new()),
        hub: hub.clone(),
        durable: durable.clone(),
        live: Arc::new(HubSignaler::new(hub.clone())),
    };
    let engine = Arc::new(FlowEngine::new(services, &EngineConfig::default()));
    let app = GatewayServer::new(GatewayConfig::default(), engine, StatusQuery::new(durable)).router();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });
    (addr, hub)
}

async fn wait_for_observers(hub: &Hub, expected: usize) {
    for _ in 0..200 {
        if hub.observer_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("observer count stuck at {}, expected {}", hub.observer_count(), expected);
}

#[tokio::test]
async fn websocket_forwards_filtered_messages_and_detaches() {
    let tmp = tempfile::tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let (addr, hub) = serve(&tmp, shutdown.clone()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws?flow_id=1", addr))
        .await
        .unwrap();
    wait_for_observers(&hub, 1).await;

    // Another flow's message is held back; ours arrives as a text frame.
    hub.publish(&LifecycleMessage::flow_started(FlowId(2))).unwrap();
    hub.publish(&LifecycleMessage::node_started(FlowId(1), "a", "Write")).unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = frame else {
        panic!("expected a text frame, got {:?}", frame);
    };
    let message = LifecycleMessage::decode(text.as_str().as_bytes()).unwrap().unwrap();
    assert_eq!(message.flow_id(), FlowId(1));
    assert_eq!(message.node_id(), Some("a"));

    ws.close(None).await.unwrap();
    wait_for_observers(&hub, 0).await;
    shutdown.cancel();
}

#[tokio::test]
async fn websocket_without_filter_sees_every_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let (addr, hub) = serve(&tmp, shutdown.clone()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    wait_for_observers(&hub, 1).await;

    hub.publish(&LifecycleMessage::flow_started(FlowId(7))).unwrap();
    hub.publish(&LifecycleMessage::flow_completed(FlowId(8), 3)).unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            let message = LifecycleMessage::decode(text.as_str().as_bytes()).unwrap().unwrap();
            seen.push(message.flow_id());
        }
    }
    assert_eq!(seen, vec![FlowId(7), FlowId(8)]);

    // Dropping the socket without a close frame still detaches.
    drop(ws);
    wait_for_observers(&hub, 0).await;
    shutdown.cancel();
}

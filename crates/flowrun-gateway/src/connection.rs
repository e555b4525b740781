use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use flowrun_core::hub::Hub;
use flowrun_core::types::FlowId;

/// Handle a single WebSocket observer.
///
/// The connection is one hub observer for its whole life. Every payload the
/// hub delivers is forwarded as a text frame, optionally only those whose
/// `payload.flowId` matches `filter`. Inbound frames are only used for
/// ping/pong and close.
pub async fn handle_connection(ws: WebSocket, hub: Arc<Hub>, filter: Option<FlowId>) {
    let (ws_tx, mut ws_rx) = ws.split();
    let ws_tx = Arc::new(Mutex::new(ws_tx));

    let mut observer = hub.attach();
    let observer_id = observer.id();

    let forward_tx = ws_tx.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(payload) = observer.recv().await {
            if !matches_flow(&payload, filter) {
                continue;
            }
            let text = match std::str::from_utf8(&payload) {
                Ok(t) => t.to_string(),
                Err(_) => {
                    warn!("Dropping non-UTF-8 hub payload");
                    continue;
                }
            };
            let mut tx = forward_tx.lock().await;
            if tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Close(_) => break,
            Message::Ping(data) => {
                let mut tx = ws_tx.lock().await;
                let _ = tx.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    forward_task.abort();
    hub.detach(observer_id);
    debug!(observer = %observer_id, "Connection closed");
}

/// Whether a hub payload belongs to `filter`'s flow. No filter matches all.
pub(crate) fn matches_flow(payload: &[u8], filter: Option<FlowId>) -> bool {
    let Some(flow_id) = filter else {
        return true;
    };
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v["payload"]["flowId"].as_i64())
        .is_some_and(|id| id == flow_id.0)
}

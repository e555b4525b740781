use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use flowrun_core::error::{FlowError, Result};
use flowrun_core::hub::Hub;
use flowrun_core::message::LifecycleMessage;
use flowrun_core::traits::StatusSignaler;
use flowrun_core::types::{FlowId, FlowStatus};

/// Live status signaler.
///
/// Keeps the latest status per flow for the lifetime of the process and
/// pushes every update to hub observers as a `FLOW_STATUS` message.
pub struct HubSignaler {
    statuses: RwLock<HashMap<FlowId, FlowStatus>>,
    hub: Arc<Hub>,
}

impl HubSignaler {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            hub,
        }
    }

    /// Number of flows with a recorded status.
    pub async fn len(&self) -> usize {
        self.statuses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.statuses.read().await.is_empty()
    }
}

impl StatusSignaler for HubSignaler {
    fn name(&self) -> &str {
        "live"
    }

    fn notify_status(&self, flow_id: FlowId, status: FlowStatus) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let message = LifecycleMessage::flow_status(status.clone());
            self.statuses.write().await.insert(flow_id, status);

            // The map is authoritative; the push is best effort.
            match self.hub.publish(&message) {
                Ok(report) => {
                    debug!(flow_id = %flow_id, delivered = report.delivered, "FLOW_STATUS pushed");
                }
                Err(e) => {
                    warn!(flow_id = %flow_id, error = %e, "Failed to push FLOW_STATUS");
                }
            }
            Ok(())
        })
    }

    fn get_status(&self, flow_id: FlowId) -> BoxFuture<'_, Result<FlowStatus>> {
        Box::pin(async move {
            self.statuses
                .read()
                .await
                .get(&flow_id)
                .cloned()
                .ok_or_else(|| FlowError::NotFound(format!("status for flow {}", flow_id)))
        })
    }
}

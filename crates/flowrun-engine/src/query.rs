use std::sync::Arc;

use flowrun_core::config::QueryBackend;
use flowrun_core::error::Result;
use flowrun_core::traits::StatusSignaler;
use flowrun_core::types::{FlowId, FlowStatus};

/// Pull-based status lookup.
///
/// Lets a consumer that missed live pushes recover the last known status of
/// a flow without replaying history.
#[derive(Clone)]
pub struct StatusQuery {
    backend: Arc<dyn StatusSignaler>,
}

impl StatusQuery {
    pub fn new(backend: Arc<dyn StatusSignaler>) -> Self {
        Self { backend }
    }

    /// Pick the durable or live signaler as configured.
    pub fn select(
        backend: QueryBackend,
        durable: Arc<dyn StatusSignaler>,
        live: Arc<dyn StatusSignaler>,
    ) -> Self {
        match backend {
            QueryBackend::Durable => Self::new(durable),
            QueryBackend::Live => Self::new(live),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Latest status of a flow, or `FlowError::NotFound`.
    pub async fn status(&self, flow_id: FlowId) -> Result<FlowStatus> {
        self.backend.get_status(flow_id).await
    }
}

use std::sync::Arc;

use flowrun_core::config::GatewayConfig;
use flowrun_core::hub::Hub;
use flowrun_engine::{FlowEngine, StatusQuery};

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: Arc<FlowEngine>,
    pub hub: Arc<Hub>,
    pub query: StatusQuery,
}

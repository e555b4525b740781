use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use flowrun_core::config::GatewayConfig;
use flowrun_engine::{FlowEngine, StatusQuery};

use crate::routes;
use crate::state::AppState;

/// HTTP + WebSocket gateway built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: Arc<FlowEngine>, query: StatusQuery) -> Self {
        let hub = engine.hub().clone();
        Self {
            state: Arc::new(AppState {
                config,
                engine,
                hub,
                query,
            }),
        }
    }

    /// The full route table, ready to serve or to drive in tests.
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket
            .route("/ws", get(routes::ws_handler))
            // REST API
            .route("/api/health", get(routes::health))
            .route("/api/flows/{id}/status", get(routes::flow_status))
            .route("/api/flows/{id}/execute", post(routes::execute_flow))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = self.router();
        let bind = &self.state.config.bind;

        let listener = TcpListener::bind(bind).await?;
        info!(bind = %bind, query = self.state.query.backend_name(), "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use flowrun_core::config::EngineConfig;
use flowrun_core::error::{FlowError, Result};
use flowrun_core::hub::Hub;
use flowrun_core::message::LifecycleMessage;
use flowrun_core::traits::{CredentialStore, FlowStore, GenerationService, Ledger, StatusSignaler};
use flowrun_core::types::{
    FlowId, FlowState, FlowStatus, GenerationRequest, LedgerEntry, LedgerStatus, Usage,
};

use super::node::Node;
use super::FlowGraph;

/// Result of executing a single agent node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutcome {
    pub node_id: String,
    pub provider: String,
    /// The generated text.
    pub output: String,
    pub usage: Usage,
    /// Wall-clock time of the generation call.
    pub latency_ms: u64,
}

/// Result of a flow that ran to completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub flow_id: FlowId,
    pub status: FlowState,
    /// Per-node results in execution order.
    pub nodes: Vec<NodeOutcome>,
    pub execution_time_ms: u64,
}

impl ExecutionSummary {
    pub fn total_usage(&self) -> Usage {
        self.nodes.iter().fold(Usage::default(), |acc, n| {
            Usage::new(
                acc.input_tokens + n.usage.input_tokens,
                acc.output_tokens + n.usage.output_tokens,
                acc.cost + n.usage.cost,
            )
        })
    }
}

/// Wall-clock milliseconds since `start`, rounded up. A run that did anything
/// never reports zero.
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_micros().div_ceil(1000).max(1) as u64
}

/// External collaborators and signaling channels the engine runs against.
///
/// Built once at startup and shared; the engine holds no global state.
#[derive(Clone)]
pub struct EngineServices {
    pub flows: Arc<dyn FlowStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub generator: Arc<dyn GenerationService>,
    pub ledger: Arc<dyn Ledger>,
    pub hub: Arc<Hub>,
    /// Written first on every transition.
    pub durable: Arc<dyn StatusSignaler>,
    /// Notified after the durable signaler, best effort.
    pub live: Arc<dyn StatusSignaler>,
}

/// Executes flows node by node.
///
/// A run is one sequential thread of control: agent nodes execute in array
/// order, each one fully finished before the next starts. The first hard
/// failure aborts the run; nothing is retried or rolled back. Lifecycle
/// messages go to the hub and every status transition is written to the
/// durable signaler, then the live one. Failures on either side channel
/// (hub, signalers, ledger) are logged and never change the outcome.
///
/// Two concurrent runs of the same flow id are not prevented here.
pub struct FlowEngine {
    services: EngineServices,
    providers: HashSet<String>,
}

impl FlowEngine {
    pub fn new(services: EngineServices, config: &EngineConfig) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|p| p.trim().to_lowercase())
            .collect();
        Self {
            services,
            providers,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.services.hub
    }

    pub fn is_known_provider(&self, provider: &str) -> bool {
        self.providers.contains(&provider.trim().to_lowercase())
    }

    /// Load, parse, and run a stored flow.
    ///
    /// Load and parse failures are returned before anything is emitted or
    /// signaled. Once the run has started, an abort emits `FLOW_FAILED`,
    /// records FAILED on both signalers, and returns the aborting error.
    pub async fn execute_flow(&self, flow_id: FlowId) -> Result<ExecutionSummary> {
        let raw = self.services.flows.fetch(flow_id).await?;
        let graph = FlowGraph::parse(&raw)?;
        self.run_graph(flow_id, &graph).await
    }

    /// Run an already parsed graph under `flow_id`.
    pub async fn run_graph(&self, flow_id: FlowId, graph: &FlowGraph) -> Result<ExecutionSummary> {
        let start = Instant::now();
        info!(flow_id = %flow_id, nodes = graph.nodes.len(), "Flow started");

        self.emit(LifecycleMessage::flow_started(flow_id));
        let mut status = FlowStatus::new(flow_id, FlowState::Running);
        self.signal(&status).await;

        let mut outcomes = Vec::new();
        let result = self.run_nodes(flow_id, graph, &mut status, &mut outcomes).await;
        let execution_time_ms = elapsed_ms(start);

        match result {
            Ok(()) => {
                info!(flow_id = %flow_id, execution_time_ms, "Flow completed");
                self.emit(LifecycleMessage::flow_completed(flow_id, execution_time_ms));
                status.advance(FlowState::Completed);
                self.signal(&status).await;

                Ok(ExecutionSummary {
                    flow_id,
                    status: FlowState::Completed,
                    nodes: outcomes,
                    execution_time_ms,
                })
            }
            Err(e) => {
                let text = e.to_string();
                error!(flow_id = %flow_id, error = %text, "Flow failed");
                self.emit(LifecycleMessage::flow_failed(flow_id, text.clone()));
                status.advance(FlowState::Failed);
                status.error = Some(text);
                self.signal(&status).await;
                Err(e)
            }
        }
    }

    async fn run_nodes(
        &self,
        flow_id: FlowId,
        graph: &FlowGraph,
        status: &mut FlowStatus,
        outcomes: &mut Vec<NodeOutcome>,
    ) -> Result<()> {
        for node in &graph.nodes {
            if !node.is_agent() {
                debug!(flow_id = %flow_id, node_id = %node.id, kind = %node.kind, "Skipping non-agent node");
                continue;
            }

            info!(flow_id = %flow_id, node_id = %node.id, label = %node.label(), "Executing node");
            self.emit(LifecycleMessage::node_started(flow_id, &node.id, node.label()));
            status.last_node = Some(node.id.clone());
            status.advance(FlowState::Running);
            self.signal(status).await;

            outcomes.push(self.run_node(flow_id, node).await?);
        }
        Ok(())
    }

    async fn run_node(&self, flow_id: FlowId, node: &Node) -> Result<NodeOutcome> {
        let provider = node.data.provider.clone();
        let secret = self.resolve_credential(&provider).await?;
        if !self.is_known_provider(&provider) {
            return Err(FlowError::UnsupportedProvider(provider));
        }

        let request = GenerationRequest {
            role: node.data.role.clone(),
            prompt: node.data.prompt.clone(),
            secret,
            provider: provider.clone(),
        };

        let started = Instant::now();
        let result = self.services.generator.execute(request).await;
        let latency_ms = elapsed_ms(started);

        let (usage, failure) = match &result {
            Ok(generation) => (generation.usage, None),
            Err(failure) => (failure.usage, Some(failure.message.clone())),
        };

        // Reported even on failure: tokens may have been consumed.
        self.emit(LifecycleMessage::node_completed(flow_id, &node.id, usage));

        let entry = LedgerEntry {
            flow_id,
            provider: provider.clone(),
            role: node.data.role.clone(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost: usage.cost,
            latency_ms,
            status: if failure.is_none() {
                LedgerStatus::Success
            } else {
                LedgerStatus::Failed
            },
            error: failure,
            created_at: Utc::now(),
        };
        if let Err(e) = self.services.ledger.append(entry).await {
            warn!(flow_id = %flow_id, node_id = %node.id, error = %e, "Ledger write failed");
        }

        match result {
            Ok(generation) => {
                debug!(flow_id = %flow_id, node_id = %node.id, latency_ms, "Node complete");
                Ok(NodeOutcome {
                    node_id: node.id.clone(),
                    provider,
                    output: generation.text,
                    usage,
                    latency_ms,
                })
            }
            Err(failure) => {
                error!(flow_id = %flow_id, node_id = %node.id, error = %failure, "Node failed");
                Err(failure.into())
            }
        }
    }

    async fn resolve_credential(&self, provider: &str) -> Result<String> {
        match self.services.credentials.get(provider).await {
            Ok(Some(secret)) if !secret.is_empty() => Ok(secret),
            Ok(_) => Err(FlowError::MissingCredential(provider.to_string())),
            Err(e) if e.is_not_found() => Err(FlowError::MissingCredential(provider.to_string())),
            Err(e) => Err(e),
        }
    }

    fn emit(&self, message: LifecycleMessage) {
        match self.services.hub.publish(&message) {
            Ok(report) if report.dropped > 0 => {
                warn!(
                    flow_id = %message.flow_id(),
                    kind = message.kind(),
                    dropped = report.dropped,
                    "Lifecycle message dropped for slow observers"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(flow_id = %message.flow_id(), kind = message.kind(), error = %e, "Failed to publish lifecycle message");
            }
        }
    }

    /// Durable first, then live. Failures are logged only.
    async fn signal(&self, status: &FlowStatus) {
        for signaler in [&self.services.durable, &self.services.live] {
            if let Err(e) = signaler.notify_status(status.flow_id, status.clone()).await {
                warn!(
                    flow_id = %status.flow_id,
                    channel = signaler.name(),
                    error = %e,
                    "Status signal failed"
                );
            }
        }
    }
}

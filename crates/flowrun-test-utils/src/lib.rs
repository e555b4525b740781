//! In-memory and scripted stand-ins for every engine collaborator.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use flowrun_core::error::{FlowError, Result};
use flowrun_core::hub::Observer;
use flowrun_core::message::LifecycleMessage;
use flowrun_core::traits::{CredentialStore, FlowStore, GenerationService, Ledger, StatusSignaler};
use flowrun_core::types::*;

/// Flow store backed by a map of raw graph texts.
#[derive(Default)]
pub struct MemoryFlowStore {
    flows: HashMap<FlowId, String>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(mut self, flow_id: i64, raw: impl Into<String>) -> Self {
        self.flows.insert(FlowId(flow_id), raw.into());
        self
    }

    pub fn with_graph(self, flow_id: i64, graph: serde_json::Value) -> Self {
        self.with_raw(flow_id, graph.to_string())
    }
}

impl FlowStore for MemoryFlowStore {
    fn fetch(&self, flow_id: FlowId) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.flows
                .get(&flow_id)
                .cloned()
                .ok_or_else(|| FlowError::NotFound(format!("flow {}", flow_id)))
        })
    }
}

/// Credential store backed by a fixed map.
#[derive(Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: &str, secret: &str) -> Self {
        self.secrets.insert(provider.to_string(), secret.to_string());
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn get(&self, provider: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let secret = self.secrets.get(provider).cloned();
        Box::pin(async move { Ok(secret) })
    }
}

/// Generation service that answers from a script keyed by prompt.
///
/// Unscripted prompts succeed with the text "ok" and zero usage.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: HashMap<String, std::result::Result<Generation, GenerationFailure>>,
    latency: Option<Duration>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful reply for `prompt`.
    pub fn succeed(mut self, prompt: &str, text: &str, usage: Usage) -> Self {
        self.script.insert(
            prompt.to_string(),
            Ok(Generation {
                text: text.to_string(),
                usage,
            }),
        );
        self
    }

    /// Script a failure for `prompt`.
    pub fn fail(mut self, prompt: &str, failure: GenerationFailure) -> Self {
        self.script.insert(prompt.to_string(), Err(failure));
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Requests received so far, in order.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl GenerationService for ScriptedGenerator {
    fn execute(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, std::result::Result<Generation, GenerationFailure>> {
        Box::pin(async move {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let reply = self.script.get(&request.prompt).cloned().unwrap_or_else(|| {
                Ok(Generation {
                    text: "ok".to_string(),
                    usage: Usage::default(),
                })
            });
            self.calls.lock().unwrap().push(request);
            reply
        })
    }
}

/// Ledger that keeps entries in memory.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl Ledger for MemoryLedger {
    fn append(&self, entry: LedgerEntry) -> BoxFuture<'_, Result<()>> {
        self.entries.lock().unwrap().push(entry);
        Box::pin(async { Ok(()) })
    }
}

/// Ledger whose every append fails.
#[derive(Default)]
pub struct FailingLedger;

impl Ledger for FailingLedger {
    fn append(&self, _entry: LedgerEntry) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Err(FlowError::LedgerWrite("ledger offline".to_string())) })
    }
}

/// Status signaler whose every notify fails and which never has a status.
#[derive(Default)]
pub struct FailingSignaler;

impl StatusSignaler for FailingSignaler {
    fn name(&self) -> &str {
        "broken"
    }

    fn notify_status(&self, _flow_id: FlowId, _status: FlowStatus) -> BoxFuture<'_, Result<()>> {
        Box::pin(async {
            Err(FlowError::SignalDelivery {
                channel: "broken".to_string(),
                message: "unavailable".to_string(),
            })
        })
    }

    fn get_status(&self, flow_id: FlowId) -> BoxFuture<'_, Result<FlowStatus>> {
        Box::pin(async move { Err(FlowError::NotFound(format!("status for flow {}", flow_id))) })
    }
}

/// Decode everything currently queued for an observer.
///
/// Unknown kinds and undecodable payloads are skipped.
pub fn drain_messages(observer: &mut Observer) -> Vec<LifecycleMessage> {
    let mut messages = Vec::new();
    while let Some(payload) = observer.try_recv() {
        if let Ok(Some(message)) = LifecycleMessage::decode(&payload) {
            messages.push(message);
        }
    }
    messages
}

/// Wire kinds of a message list, in order.
pub fn kinds(messages: &[LifecycleMessage]) -> Vec<&'static str> {
    messages.iter().map(|m| m.kind()).collect()
}

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Flow store: persisted flows, looked up by id.
pub trait FlowStore: Send + Sync + 'static {
    /// Raw graph text of a flow. `FlowError::NotFound` if no such flow.
    fn fetch(&self, flow_id: FlowId) -> BoxFuture<'_, Result<String>>;
}

/// Credential store: provider secrets.
pub trait CredentialStore: Send + Sync + 'static {
    /// Secret for a provider, or `None` if none is stored.
    fn get(&self, provider: &str) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Generation service: runs a role + prompt against a provider.
///
/// Any timeout on the call is the implementation's responsibility; the engine
/// waits for as long as this future takes.
pub trait GenerationService: Send + Sync + 'static {
    fn execute(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, std::result::Result<Generation, GenerationFailure>>;
}

/// Cost ledger: append-only per-node outcome rows.
pub trait Ledger: Send + Sync + 'static {
    fn append(&self, entry: LedgerEntry) -> BoxFuture<'_, Result<()>>;
}

/// Status signaler: publishes and serves the latest status of each flow.
pub trait StatusSignaler: Send + Sync + 'static {
    /// Channel name used in logs and delivery errors (e.g., "live", "file").
    fn name(&self) -> &str;

    /// Record `status` as the latest status of `flow_id`.
    fn notify_status(&self, flow_id: FlowId, status: FlowStatus) -> BoxFuture<'_, Result<()>>;

    /// Latest status of `flow_id`. `FlowError::NotFound` if none was recorded.
    fn get_status(&self, flow_id: FlowId) -> BoxFuture<'_, Result<FlowStatus>>;
}

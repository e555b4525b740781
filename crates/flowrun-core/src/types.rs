use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Numeric flow identifier, unique within one flow store.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub i64);

impl FlowId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl From<i64> for FlowId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for FlowId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serde helpers for RFC3339 timestamps with nanosecond precision.
///
/// Always writes nine fractional digits and a `Z` suffix so the text form
/// parses back to the identical instant.
pub mod rfc3339_nanos {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub fn serialize<S: Serializer>(
        ts: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Lifecycle state of one flow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Completed | FlowState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Within one execution the state only moves forward
    /// (PENDING → RUNNING → COMPLETED | FAILED). RUNNING is reachable from
    /// anywhere because a new execution of the same flow resets it.
    pub fn can_transition_to(&self, next: FlowState) -> bool {
        match (self, next) {
            (_, FlowState::Running) => true,
            (FlowState::Pending, FlowState::Pending) => true,
            (FlowState::Running, FlowState::Completed | FlowState::Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Pending => "PENDING",
            FlowState::Running => "RUNNING",
            FlowState::Completed => "COMPLETED",
            FlowState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known status of a flow, as held by every status signaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatus {
    pub flow_id: FlowId,
    pub status: FlowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_node: Option<String>,
    #[serde(with = "rfc3339_nanos")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowStatus {
    pub fn new(flow_id: FlowId, status: FlowState) -> Self {
        Self {
            flow_id,
            status,
            last_node: None,
            updated_at: Utc::now(),
            error: None,
        }
    }

    pub fn with_last_node(mut self, node_id: impl Into<String>) -> Self {
        self.last_node = Some(node_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Move to `next`, stamping the update time. Last node and error are kept.
    pub fn advance(&mut self, next: FlowState) {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                flow_id = %self.flow_id,
                from = %self.status,
                to = %next,
                "Non-monotonic flow status transition"
            );
        }
        self.status = next;
        self.updated_at = Utc::now();
    }
}

/// A stored flow record, owned by the external flow store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    #[serde(default)]
    pub name: String,
    /// The persisted graph: either raw JSON text or an inline JSON object.
    pub graph: serde_json::Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Flow {
    /// The graph as raw text, ready for the graph parser.
    pub fn raw_graph(&self) -> String {
        match &self.graph {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Token and cost figures reported by the generation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost: f64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64, cost: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cost,
        }
    }
}

/// One call to the generation service.
#[derive(Clone)]
pub struct GenerationRequest {
    pub role: String,
    pub prompt: String,
    pub secret: String,
    pub provider: String,
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("role", &self.role)
            .field("prompt", &self.prompt)
            .field("secret", &"<redacted>")
            .field("provider", &self.provider)
            .finish()
    }
}

/// Successful output of the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
}

/// A failed generation call. Carries any usage consumed before the failure
/// so it can still be billed.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFailure {
    pub message: String,
    pub usage: Usage,
}

impl GenerationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

impl std::fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GenerationFailure {}

impl From<GenerationFailure> for FlowError {
    fn from(failure: GenerationFailure) -> Self {
        FlowError::Generation(failure.message)
    }
}

/// Outcome recorded in a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Success,
    Failed,
}

/// One immutable cost/outcome row per node attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub flow_id: FlowId,
    pub provider: String,
    pub role: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub latency_ms: u64,
    pub status: LedgerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "rfc3339_nanos")]
    pub created_at: DateTime<Utc>,
}

//! Lifecycle message protocol.
//!
//! Every message travels as a two-field envelope `{"type": KIND, "payload": {...}}`.
//! The payload always carries `flowId` and an RFC3339 nanosecond `timestamp`;
//! the remaining fields depend on the kind. Messages are built once through
//! the constructors below and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{rfc3339_nanos, FlowId, FlowStatus, Usage};

pub const FLOW_STARTED: &str = "FLOW_STARTED";
pub const NODE_STARTED: &str = "NODE_STARTED";
pub const NODE_COMPLETED: &str = "NODE_COMPLETED";
pub const FLOW_COMPLETED: &str = "FLOW_COMPLETED";
pub const FLOW_FAILED: &str = "FLOW_FAILED";
/// Legacy kind pushed by the hub-backed status signaler.
pub const FLOW_STATUS: &str = "FLOW_STATUS";

const KNOWN_KINDS: [&str; 6] = [
    FLOW_STARTED,
    NODE_STARTED,
    NODE_COMPLETED,
    FLOW_COMPLETED,
    FLOW_FAILED,
    FLOW_STATUS,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum LifecycleMessage {
    FlowStarted {
        flow_id: FlowId,
        #[serde(with = "rfc3339_nanos")]
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        flow_id: FlowId,
        #[serde(with = "rfc3339_nanos")]
        timestamp: DateTime<Utc>,
        node_id: String,
        label: String,
    },
    NodeCompleted {
        flow_id: FlowId,
        #[serde(with = "rfc3339_nanos")]
        timestamp: DateTime<Utc>,
        node_id: String,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    },
    FlowCompleted {
        flow_id: FlowId,
        #[serde(with = "rfc3339_nanos")]
        timestamp: DateTime<Utc>,
        execution_time_ms: u64,
    },
    FlowFailed {
        flow_id: FlowId,
        #[serde(with = "rfc3339_nanos")]
        timestamp: DateTime<Utc>,
        error: String,
    },
    FlowStatus(StatusPayload),
}

/// Payload of the legacy `FLOW_STATUS` kind: the status fields plus a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(flatten)]
    pub status: FlowStatus,
    #[serde(with = "rfc3339_nanos")]
    pub timestamp: DateTime<Utc>,
}

/// Envelope view used for tolerant decoding.
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[allow(dead_code)]
    payload: serde_json::Value,
}

impl LifecycleMessage {
    pub fn flow_started(flow_id: FlowId) -> Self {
        Self::FlowStarted {
            flow_id,
            timestamp: Utc::now(),
        }
    }

    pub fn node_started(
        flow_id: FlowId,
        node_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self::NodeStarted {
            flow_id,
            timestamp: Utc::now(),
            node_id: node_id.into(),
            label: label.into(),
        }
    }

    pub fn node_completed(flow_id: FlowId, node_id: impl Into<String>, usage: Usage) -> Self {
        Self::NodeCompleted {
            flow_id,
            timestamp: Utc::now(),
            node_id: node_id.into(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost: usage.cost,
        }
    }

    pub fn flow_completed(flow_id: FlowId, execution_time_ms: u64) -> Self {
        Self::FlowCompleted {
            flow_id,
            timestamp: Utc::now(),
            execution_time_ms,
        }
    }

    pub fn flow_failed(flow_id: FlowId, error: impl Into<String>) -> Self {
        Self::FlowFailed {
            flow_id,
            timestamp: Utc::now(),
            error: error.into(),
        }
    }

    pub fn flow_status(status: FlowStatus) -> Self {
        Self::FlowStatus(StatusPayload {
            status,
            timestamp: Utc::now(),
        })
    }

    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FlowStarted { .. } => FLOW_STARTED,
            Self::NodeStarted { .. } => NODE_STARTED,
            Self::NodeCompleted { .. } => NODE_COMPLETED,
            Self::FlowCompleted { .. } => FLOW_COMPLETED,
            Self::FlowFailed { .. } => FLOW_FAILED,
            Self::FlowStatus(_) => FLOW_STATUS,
        }
    }

    pub fn flow_id(&self) -> FlowId {
        match self {
            Self::FlowStarted { flow_id, .. }
            | Self::NodeStarted { flow_id, .. }
            | Self::NodeCompleted { flow_id, .. }
            | Self::FlowCompleted { flow_id, .. }
            | Self::FlowFailed { flow_id, .. } => *flow_id,
            Self::FlowStatus(p) => p.status.flow_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::FlowStarted { timestamp, .. }
            | Self::NodeStarted { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::FlowCompleted { timestamp, .. }
            | Self::FlowFailed { timestamp, .. } => *timestamp,
            Self::FlowStatus(p) => p.timestamp,
        }
    }

    /// Node id for node-level kinds.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. } | Self::NodeCompleted { node_id, .. } => {
                Some(node_id)
            }
            _ => None,
        }
    }

    pub fn is_flow_level(&self) -> bool {
        matches!(
            self,
            Self::FlowStarted { .. } | Self::FlowCompleted { .. } | Self::FlowFailed { .. }
        )
    }

    /// Serialize to the wire envelope.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a wire envelope.
    ///
    /// Returns `Ok(None)` for a well-formed envelope of a kind this version
    /// does not know, so consumers can skip future kinds.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let envelope: RawEnvelope = serde_json::from_slice(bytes)?;
        if !KNOWN_KINDS.contains(&envelope.kind.as_str()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FlowState;

    fn envelope(msg: &LifecycleMessage) -> serde_json::Value {
        serde_json::from_slice(&msg.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_envelope_has_exactly_two_fields() {
        let json = envelope(&LifecycleMessage::flow_started(FlowId(1)));
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(json["type"], "FLOW_STARTED");
        assert_eq!(json["payload"]["flowId"], 1);
        assert!(json["payload"]["timestamp"].is_string());
    }

    #[test]
    fn test_node_completed_payload_fields() {
        let msg = LifecycleMessage::node_completed(FlowId(9), "a", Usage::new(100, 50, 0.01));
        let json = envelope(&msg);
        assert_eq!(json["type"], "NODE_COMPLETED");
        let p = &json["payload"];
        assert_eq!(p["nodeId"], "a");
        assert_eq!(p["inputTokens"], 100);
        assert_eq!(p["outputTokens"], 50);
        assert_eq!(p["cost"], 0.01);
    }

    #[test]
    fn test_flow_level_payloads() {
        let json = envelope(&LifecycleMessage::flow_completed(FlowId(2), 1500));
        assert_eq!(json["payload"]["executionTimeMs"], 1500);

        let json = envelope(&LifecycleMessage::flow_failed(FlowId(2), "Unsupported provider: Foo"));
        assert_eq!(json["type"], "FLOW_FAILED");
        assert_eq!(json["payload"]["error"], "Unsupported provider: Foo");

        let json = envelope(&LifecycleMessage::node_started(FlowId(2), "n1", "Research"));
        assert_eq!(json["payload"]["label"], "Research");
    }

    #[test]
    fn test_flow_status_kind_flattens_status() {
        let status = FlowStatus::new(FlowId(4), FlowState::Running).with_last_node("x");
        let msg = LifecycleMessage::flow_status(status.clone());
        let json = envelope(&msg);
        assert_eq!(json["type"], "FLOW_STATUS");
        assert_eq!(json["payload"]["flowId"], 4);
        assert_eq!(json["payload"]["status"], "RUNNING");
        assert_eq!(json["payload"]["lastNode"], "x");
        assert!(json["payload"]["timestamp"].is_string());

        let decoded = LifecycleMessage::decode(&msg.encode().unwrap()).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.flow_id(), FlowId(4));
    }

    #[test]
    fn test_decode_tolerates_unknown_kind() {
        let bytes = br#"{"type":"NODE_RETRIED","payload":{"flowId":1,"attempt":2}}"#;
        assert!(LifecycleMessage::decode(bytes).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(LifecycleMessage::decode(b"not json").is_err());
    }

    #[test]
    fn test_accessors() {
        let msg = LifecycleMessage::node_started(FlowId(5), "n2", "Writer");
        assert_eq!(msg.kind(), NODE_STARTED);
        assert_eq!(msg.flow_id(), FlowId(5));
        assert_eq!(msg.node_id(), Some("n2"));
        assert!(!msg.is_flow_level());
        assert!(LifecycleMessage::flow_started(FlowId(5)).is_flow_level());
    }
}

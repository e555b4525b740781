use serde::{Deserialize, Serialize};

/// An edge connecting two nodes in a flow graph.
///
/// Edges are kept for display and validation only; execution follows the
/// node array order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    /// Whether both endpoints name nodes accepted by `known`.
    pub fn connects(&self, known: impl Fn(&str) -> bool) -> bool {
        known(&self.source) && known(&self.target)
    }
}

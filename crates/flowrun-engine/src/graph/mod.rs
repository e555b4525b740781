//! Flow graph model, parser, and executor.
//!
//! A flow is stored as a node list plus an edge list. The executor runs the
//! agent nodes one after another in array order; edges are parsed and checked
//! but do not influence scheduling.

pub mod edge;
pub mod executor;
pub mod node;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use flowrun_core::error::{FlowError, Result};

pub use edge::Edge;
pub use executor::{EngineServices, ExecutionSummary, FlowEngine, NodeOutcome};
pub use node::{Node, NodeData, AGENT_NODE};

/// A parsed flow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl FlowGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Parse a flow's persisted graph text.
    ///
    /// Fails with `FlowError::Parse` on malformed JSON or duplicate node ids.
    pub fn parse(raw: &str) -> Result<Self> {
        let graph: FlowGraph =
            serde_json::from_str(raw).map_err(|e| FlowError::Parse(e.to_string()))?;

        let mut seen = HashSet::new();
        for node in &graph.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(FlowError::Parse(format!("duplicate node id '{}'", node.id)));
            }
        }

        let dangling = graph.dangling_edges().count();
        if dangling > 0 {
            debug!(dangling, "Flow graph has edges to unknown nodes");
        }

        Ok(graph)
    }

    /// Agent nodes in execution (array) order.
    pub fn agent_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_agent())
    }

    /// Edges whose source or target is not a node of this graph.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(|e| !e.connects(|id| self.nodes.iter().any(|n| n.id == id)))
    }
}

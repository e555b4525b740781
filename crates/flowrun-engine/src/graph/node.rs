use serde::{Deserialize, Serialize};

/// Node type that invokes the generation service. Every other type is
/// decoration and is skipped by the engine.
pub const AGENT_NODE: &str = "agent";

/// A node in a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within its flow.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: NodeData,
}

/// Agent settings carried by a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub provider: String,
}

impl Node {
    /// Create a node of an arbitrary type with empty data.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data: NodeData::default(),
        }
    }

    /// Create an agent node.
    pub fn agent(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let mut node = Self::new(id, AGENT_NODE);
        node.data.provider = provider.into();
        node
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = label.into();
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.data.role = role.into();
        self
    }

    /// Set the prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.data.prompt = prompt.into();
        self
    }

    pub fn is_agent(&self) -> bool {
        self.kind == AGENT_NODE
    }

    /// Label for display, falling back to the node id.
    pub fn label(&self) -> &str {
        if self.data.label.is_empty() {
            &self.id
        } else {
            &self.data.label
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = Node::agent("n1", "openai")
            .with_label("Research")
            .with_role("researcher")
            .with_prompt("Find sources.");

        assert_eq!(node.id, "n1");
        assert!(node.is_agent());
        assert_eq!(node.label(), "Research");
        assert_eq!(node.data.role, "researcher");
        assert_eq!(node.data.prompt, "Find sources.");
        assert_eq!(node.data.provider, "openai");
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let node = Node::new("note-1", "comment");
        assert!(!node.is_agent());
        assert_eq!(node.label(), "note-1");
    }

    #[test]
    fn test_deserialize_with_missing_data() {
        let node: Node = serde_json::from_str(r#"{"id": "g", "type": "group"}"#).unwrap();
        assert_eq!(node.kind, "group");
        assert_eq!(node.data, NodeData::default());
    }
}

pub mod graph;
pub mod journal;
pub mod query;
pub mod signal;

pub use graph::{
    Edge, EngineServices, ExecutionSummary, FlowEngine, FlowGraph, Node, NodeData, NodeOutcome,
};
pub use journal::FlowJournal;
pub use query::StatusQuery;
pub use signal::{FileSignaler, HubSignaler};

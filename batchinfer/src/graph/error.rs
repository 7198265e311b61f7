use thiserror::Error;

use crate::layer::{InferError, ParseError};

/// Lifecycle state of a [`RuntimeGraph`](crate::RuntimeGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum GraphState {
    Uninitialized,
    Initialized,
    Built,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Load(#[from] anyhow::Error),
    #[error("node `{node}`: operator type `{op_type}` is not registered")]
    UnregisteredOperator { node: String, op_type: String },
    #[error("node `{node}` ({op_type}): {source}")]
    LayerCreation {
        node: String,
        op_type: String,
        #[source]
        source: ParseError,
    },
    #[error("duplicate node name `{0}`")]
    DuplicateNode(String),
    #[error("node `{node}` declares {count} outputs; only one is supported")]
    UnsupportedOutputs { node: String, count: usize },
    #[error("operand `{operand}` is produced by both `{first}` and `{second}`")]
    DuplicateProducer {
        operand: String,
        first: String,
        second: String,
    },
    #[error("node `{node}` consumes operand `{operand}` which has no producer")]
    MissingProducer { node: String, operand: String },
    #[error("graph has no node named `{0}`")]
    MissingNode(String),
    #[error("graph contains a cycle")]
    Cycle,
    #[error("node `{0}` is not connected to the rest of the graph")]
    Disconnected(String),
    #[error("operand `{operand}` has unsupported shape {shape:?}")]
    UnsupportedShape { operand: String, shape: Vec<i64> },
    #[error("graph is {found:?}, expected {expected:?}")]
    InvalidState {
        expected: GraphState,
        found: GraphState,
    },
    #[error("input batch has {actual} tensors, graph expects {expected}")]
    BatchMismatch { expected: usize, actual: usize },
    #[error("node `{node}` failed: {source}")]
    Infer {
        node: String,
        #[source]
        source: InferError,
    },
}

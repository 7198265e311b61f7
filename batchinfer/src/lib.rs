//! Batch inference runtime for PNNX-style operator graphs.
pub mod logging;

pub mod graph;
pub mod layer;
mod ops;
pub mod registry;
pub mod runtime;
pub mod tensor;

pub use graph::{
    Attribute, GraphError, GraphState, ModelDesc, ModelLoader, NodeDesc, Operand, OperandDesc,
    OperatorNode, Parameter, RuntimeGraph,
};
pub use layer::{InferError, Layer, ParseError, RegistryError};
pub use ops::{DetectAttrLayout, YoloDetectLayer};
pub use registry::{builtin_registry, LayerFactory, LayerRegistry};
pub use runtime::{GraphConfig, TraceEvent};
pub use tensor::{Random, Tensor};

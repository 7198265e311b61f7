pub mod desc;
mod error;
mod node;
mod operand;
mod pnnx;
mod runtime_graph;
mod topo;

pub use desc::{AttrDType, Attribute, ModelDesc, NodeDesc, OperandDesc, Parameter};
pub use error::{GraphError, GraphState};
pub use node::{NodeId, OperandId, OperatorNode, INPUT_OP, OUTPUT_OP};
pub use operand::Operand;
pub use pnnx::ModelLoader;
pub use runtime_graph::RuntimeGraph;

use std::collections::BTreeMap;
use std::fmt;

use crate::graph::desc::{Attribute, NodeDesc, Parameter};
use crate::layer::Layer;

pub type NodeId = usize;
pub type OperandId = usize;

/// Op type of the pass-through graph source.
pub const INPUT_OP: &str = "pnnx.Input";
/// Op type of the pass-through graph sink.
pub const OUTPUT_OP: &str = "pnnx.Output";

/// Graph vertex: one operator instance and its resolved layer.
pub struct OperatorNode {
    name: String,
    op_type: String,
    params: BTreeMap<String, Parameter>,
    attrs: BTreeMap<String, Attribute>,
    input_names: Vec<String>,
    input_shapes: Vec<Vec<i64>>,
    output_name: Option<String>,
    output_shape: Vec<i64>,
    pub(crate) inputs: Vec<OperandId>,
    pub(crate) output: Option<OperandId>,
    pub(crate) consumers: Vec<NodeId>,
    pub(crate) layer: Option<Box<dyn Layer>>,
}

impl OperatorNode {
    pub(crate) fn from_desc(desc: NodeDesc) -> Self {
        let output = desc.outputs.into_iter().next();
        Self {
            name: desc.name,
            op_type: desc.op_type,
            params: desc.params,
            attrs: desc.attrs,
            input_names: desc.inputs.iter().map(|input| input.name.clone()).collect(),
            input_shapes: desc.inputs.into_iter().map(|input| input.shape).collect(),
            output_shape: output
                .as_ref()
                .map(|operand| operand.shape.clone())
                .unwrap_or_default(),
            output_name: output.map(|operand| operand.name),
            inputs: Vec::new(),
            output: None,
            consumers: Vec::new(),
            layer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn params(&self) -> &BTreeMap<String, Parameter> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&Parameter> {
        self.params.get(key)
    }

    pub fn attrs(&self) -> &BTreeMap<String, Attribute> {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&Attribute> {
        self.attrs.get(key)
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Declared batch-first shapes of the inputs, in input order.
    pub fn input_shapes(&self) -> &[Vec<i64>] {
        &self.input_shapes
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    pub fn output_shape(&self) -> &[i64] {
        &self.output_shape
    }

    pub fn layer(&self) -> Option<&dyn Layer> {
        self.layer.as_deref()
    }

    pub fn layer_mut(&mut self) -> Option<&mut (dyn Layer + 'static)> {
        self.layer.as_deref_mut()
    }

    /// Whether this node is a pass-through source or sink.
    pub fn is_passthrough(&self) -> bool {
        self.op_type == INPUT_OP || self.op_type == OUTPUT_OP
    }
}

impl fmt::Debug for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorNode")
            .field("name", &self.name)
            .field("op_type", &self.op_type)
            .field("inputs", &self.input_names)
            .field("output", &self.output_name)
            .field("has_layer", &self.layer.is_some())
            .finish()
    }
}

impl fmt::Display for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output_name {
            Some(output) => write!(
                f,
                "{} {}({}) >> {}",
                self.op_type,
                self.name,
                self.input_names.join(","),
                output
            ),
            None => write!(
                f,
                "{} {}({})",
                self.op_type,
                self.name,
                self.input_names.join(",")
            ),
        }
    }
}

//! In-memory model description handed from a loader to the graph.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Typed operator parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Parameter {
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f32>),
}

impl Parameter {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Parameter::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Parameter::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Parameter::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            Parameter::IntArray(values) => Some(values),
            _ => None,
        }
    }

    /// Float array view; integer arrays are widened.
    pub fn as_float_array(&self) -> Option<Vec<f32>> {
        match self {
            Parameter::FloatArray(values) => Some(values.clone()),
            Parameter::IntArray(values) => Some(values.iter().map(|v| *v as f32).collect()),
            _ => None,
        }
    }
}

/// Element type of an attribute payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrDType {
    F32,
}

impl AttrDType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            AttrDType::F32 => 4,
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "f32" => Ok(AttrDType::F32),
            other => Err(anyhow!("unsupported attribute dtype {}", other)),
        }
    }
}

/// Named constant tensor (weights, biases, anchors) attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub dtype: AttrDType,
    pub shape: Vec<usize>,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Attribute {
    /// Encode `values` as a little-endian f32 payload.
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Self {
        let le_bits = values
            .iter()
            .map(|value| value.to_bits().to_le())
            .collect::<Vec<u32>>();
        Self {
            dtype: AttrDType::F32,
            shape,
            data: bytemuck::cast_slice(&le_bits).to_vec(),
        }
    }

    /// Decode the little-endian payload as `f32` values.
    pub fn get_f32(&self) -> Result<Vec<f32>> {
        if self.dtype != AttrDType::F32 {
            return Err(anyhow!("attribute dtype {:?} is not f32", self.dtype));
        }
        if self.data.len() % 4 != 0 {
            return Err(anyhow!(
                "attribute payload of {} bytes is not a multiple of 4",
                self.data.len()
            ));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|chunk| f32::from_bits(u32::from_le(bytemuck::pod_read_unaligned(chunk))))
            .collect())
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Operand reference as declared on a node: name and batch-first shape,
/// `-1` marking an unknown dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandDesc {
    pub name: String,
    #[serde(default)]
    pub shape: Vec<i64>,
}

impl OperandDesc {
    pub fn new(name: impl Into<String>, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDesc {
    pub op_type: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<OperandDesc>,
    #[serde(default)]
    pub outputs: Vec<OperandDesc>,
    #[serde(default)]
    pub params: BTreeMap<String, Parameter>,
    #[serde(default)]
    pub attrs: BTreeMap<String, Attribute>,
}

impl NodeDesc {
    pub fn new(op_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: BTreeMap::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, shape: Vec<i64>) -> Self {
        self.inputs.push(OperandDesc::new(name, shape));
        self
    }

    pub fn output(mut self, name: impl Into<String>, shape: Vec<i64>) -> Self {
        self.outputs.push(OperandDesc::new(name, shape));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: Parameter) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn attr(mut self, key: impl Into<String>, attr: Attribute) -> Self {
        self.attrs.insert(key.into(), attr);
        self
    }
}

/// Complete model: nodes in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDesc {
    pub nodes: Vec<NodeDesc>,
}

impl ModelDesc {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).with_context(|| "parse model description json")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("read model description {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "serialize model description")
    }
}

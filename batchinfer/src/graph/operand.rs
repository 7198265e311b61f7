use anyhow::Result;

use crate::graph::node::NodeId;
use crate::tensor::{known_dims, per_sample, Tensor};

/// Named data slot: one tensor per batch element.
#[derive(Debug, Clone)]
pub struct Operand {
    name: String,
    shape: Vec<i64>,
    pub(crate) datas: Vec<Tensor<f32>>,
    pub(crate) producer: Option<NodeId>,
    pub(crate) consumers: Vec<NodeId>,
}

impl Operand {
    pub fn new(name: impl Into<String>, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            shape,
            datas: Vec::new(),
            producer: None,
            consumers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared batch-first shape; `-1` marks an unknown dimension.
    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn datas(&self) -> &[Tensor<f32>] {
        &self.datas
    }

    pub fn producer(&self) -> Option<NodeId> {
        self.producer
    }

    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    /// Declared batch size, if known.
    pub fn batch(&self) -> Option<usize> {
        self.shape
            .first()
            .and_then(|dim| usize::try_from(*dim).ok())
    }

    /// Per-sample physical layout and raw shape, when every dimension after
    /// the batch is known. The batch itself may be unknown.
    pub fn sample_shape(&self) -> Option<([usize; 3], Vec<usize>)> {
        let (_, sample) = self.shape.split_first()?;
        let mut dims = known_dims(sample)?;
        dims.insert(0, 0);
        per_sample(&dims)
            .ok()
            .map(|(_, layout, raw)| (layout, raw))
    }

    /// Pre-allocate one tensor per batch element.
    ///
    /// Only fully known shapes are allocated; correctly shaped tensors are
    /// kept, tensors whose raw shape differs are reshaped in place. Operands
    /// with an unknown dimension keep empty slots for the producer to fill.
    pub fn allocate(&mut self) -> Result<()> {
        let dims = match known_dims(&self.shape) {
            Some(dims) => dims,
            None => return Ok(()),
        };
        let (batch, layout, raw) = per_sample(&dims)?;
        self.datas.resize_with(batch, Tensor::empty);
        for tensor in &mut self.datas {
            if tensor.shapes() == layout {
                if tensor.raw_shapes() != raw.as_slice() {
                    tensor.reshape(&raw)?;
                }
            } else if tensor.size() == layout.iter().product::<usize>() && !tensor.is_empty() {
                tensor.reshape(&raw)?;
            } else {
                *tensor = Tensor::from_shapes(&raw)?;
            }
        }
        Ok(())
    }
}

//! Kernel contract shared by every operator implementation.
mod error;
pub(crate) mod params;

pub use error::{InferError, ParseError, RegistryError};

use crate::tensor::Tensor;

/// Batched operator kernel.
///
/// `inputs[i]` is the batch of the node's `i`-th input operand, in declared
/// order, and `outputs` holds one slot per batch element. Slots may arrive
/// empty (the layer allocates them) or pre-allocated (the layer checks the
/// shape and fills them in place).
pub trait Layer: Send + Sync {
    fn layer_name(&self) -> &str;

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError>;

    fn weights(&self) -> Result<&[Tensor<f32>], InferError> {
        Err(unsupported(self.layer_name(), "weights"))
    }

    fn bias(&self) -> Result<&[Tensor<f32>], InferError> {
        Err(unsupported(self.layer_name(), "bias"))
    }

    fn set_weights(&mut self, _values: &[f32]) -> Result<(), InferError> {
        Err(unsupported(self.layer_name(), "set_weights"))
    }

    fn set_bias(&mut self, _values: &[f32]) -> Result<(), InferError> {
        Err(unsupported(self.layer_name(), "set_bias"))
    }

    /// Replace the weights from tensors laid out like [`Layer::weights`].
    fn set_weight_tensors(&mut self, tensors: &[Tensor<f32>]) -> Result<(), InferError> {
        let values = flatten_like(self.layer_name(), self.weights()?, tensors)?;
        self.set_weights(&values)
    }

    /// Replace the bias from tensors laid out like [`Layer::bias`].
    fn set_bias_tensors(&mut self, tensors: &[Tensor<f32>]) -> Result<(), InferError> {
        let values = flatten_like(self.layer_name(), self.bias()?, tensors)?;
        self.set_bias(&values)
    }
}

fn flatten_like(
    layer: &str,
    current: &[Tensor<f32>],
    tensors: &[Tensor<f32>],
) -> Result<Vec<f32>, InferError> {
    let mismatch = |expected, actual| InferError::ParameterSizeMismatch {
        layer: layer.to_string(),
        expected,
        actual,
    };
    if current.len() != tensors.len() {
        return Err(mismatch(current.len(), tensors.len()));
    }
    let mut values = Vec::with_capacity(current.iter().map(Tensor::size).sum());
    for (slot, tensor) in current.iter().zip(tensors) {
        if slot.size() != tensor.size() {
            return Err(mismatch(slot.size(), tensor.size()));
        }
        values.extend_from_slice(tensor.data());
    }
    Ok(values)
}

fn unsupported(layer: &str, operation: &str) -> InferError {
    InferError::Unsupported {
        layer: layer.to_string(),
        operation: operation.to_string(),
    }
}

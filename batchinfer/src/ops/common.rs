use rayon::prelude::*;

use crate::layer::InferError;
use crate::tensor::Tensor;

/// Validate the batched input/output contract shared by every layer.
///
/// Requires `arity` inputs (any number when `None`), each holding one
/// non-empty tensor per output slot.
pub(crate) fn check_batch(
    layer: &str,
    inputs: &[&[Tensor<f32>]],
    outputs: &[Tensor<f32>],
    arity: Option<usize>,
) -> Result<(), InferError> {
    if inputs.is_empty() || outputs.is_empty() {
        return Err(InferError::InputEmpty {
            layer: layer.to_string(),
        });
    }
    if let Some(expected) = arity {
        if inputs.len() != expected {
            return Err(InferError::InputOutputSizeMismatch {
                layer: layer.to_string(),
                input: inputs.len(),
                output: expected,
            });
        }
    }
    for batch in inputs {
        if batch.len() != outputs.len() {
            return Err(InferError::InputOutputSizeMismatch {
                layer: layer.to_string(),
                input: batch.len(),
                output: outputs.len(),
            });
        }
        if batch.iter().any(Tensor::is_empty) {
            return Err(InferError::InputEmpty {
                layer: layer.to_string(),
            });
        }
    }
    Ok(())
}

/// Allocate an empty output slot, or check a pre-allocated one.
pub(crate) fn ensure_output(
    layer: &str,
    output: &mut Tensor<f32>,
    index: usize,
    shape: [usize; 3],
) -> Result<(), InferError> {
    if output.is_empty() {
        *output = Tensor::new(shape[0], shape[1], shape[2]);
        return Ok(());
    }
    if output.shapes() != shape {
        return Err(InferError::OutputSizeError {
            layer: layer.to_string(),
            index,
        });
    }
    Ok(())
}

/// Like [`ensure_output`], but a fresh slot takes the input's raw shape.
pub(crate) fn ensure_output_like(
    layer: &str,
    output: &mut Tensor<f32>,
    index: usize,
    input: &Tensor<f32>,
) -> Result<(), InferError> {
    if output.is_empty() {
        *output = input.clone();
        return Ok(());
    }
    ensure_output(layer, output, index, input.shapes())
}

/// Run `f` for each batch element in parallel.
pub(crate) fn for_each_sample<F>(outputs: &mut [Tensor<f32>], f: F) -> Result<(), InferError>
where
    F: Fn(usize, &mut Tensor<f32>) -> Result<(), InferError> + Send + Sync,
{
    outputs
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(index, output)| f(index, output))
}

pub(crate) fn unary_map(input: &Tensor<f32>, output: &mut Tensor<f32>, f: impl Fn(f32) -> f32) {
    for (out_slot, value) in output.data_mut().iter_mut().zip(input.data()) {
        *out_slot = f(*value);
    }
}

pub(crate) fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

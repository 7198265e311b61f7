use crate::graph::OperatorNode;
use crate::layer::params::int;
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output_like, for_each_sample};
use crate::tensor::Tensor;

/// Softmax along one dimension. `dim` counts the batch dimension, so `1` is
/// the first per-sample dimension and `-1` the last.
pub(crate) struct SoftmaxLayer {
    dim: i64,
}

impl SoftmaxLayer {
    pub(crate) fn new(dim: i64) -> Self {
        Self { dim }
    }

    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let dim = int(node, "dim").ok_or(ParseError::MissingDim)?;
        Ok(Box::new(Self::new(dim)))
    }

    /// Per-sample axis for a tensor with `rank` logical dimensions.
    fn axis(&self, rank: usize) -> Option<usize> {
        let full_rank = rank as i64 + 1;
        let dim = if self.dim < 0 { self.dim + full_rank } else { self.dim };
        if dim < 1 || dim >= full_rank {
            return None;
        }
        Some(dim as usize - 1)
    }
}

impl Layer for SoftmaxLayer {
    fn layer_name(&self) -> &str {
        "Softmax"
    }

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError> {
        check_batch(self.layer_name(), inputs, outputs, Some(1))?;
        let batch = inputs[0];
        for_each_sample(outputs, |index, output| {
            let input = &batch[index];
            ensure_output_like(self.layer_name(), output, index, input)?;

            let mut raw = input.raw_shapes().to_vec();
            let axis = self.axis(raw.len()).ok_or_else(|| InferError::InvalidDim {
                layer: self.layer_name().to_string(),
                dim: self.dim,
            })?;
            raw.resize(3, 1);
            let inner: usize = raw[axis + 1..].iter().product();
            let outer: usize = raw[..axis].iter().product();
            let axis_size = raw[axis];

            let values = input.data();
            let out = output.data_mut();
            for o in 0..outer {
                for i in 0..inner {
                    let at = |a: usize| o * axis_size * inner + a * inner + i;
                    let max = (0..axis_size)
                        .map(|a| values[at(a)])
                        .fold(f32::MIN, f32::max);
                    let mut sum = 0.0f32;
                    for a in 0..axis_size {
                        let e = (values[at(a)] - max).exp();
                        out[at(a)] = e;
                        sum += e;
                    }
                    for a in 0..axis_size {
                        out[at(a)] /= sum;
                    }
                }
            }
            Ok(())
        })
    }
}

use crate::graph::OperatorNode;
use crate::layer::params::int;
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, for_each_sample};
use crate::tensor::Tensor;

/// NCHW rank the flatten bounds are normalized against.
const TOTAL_DIMS: i64 = 4;

/// `torch.flatten` over the non-batch dimensions of an NCHW tensor.
pub(crate) struct FlattenLayer {
    start_dim: usize,
    end_dim: usize,
}

impl FlattenLayer {
    pub(crate) fn new(start_dim: i64, end_dim: i64) -> Result<Self, ParseError> {
        let start = if start_dim < 0 { TOTAL_DIMS + start_dim } else { start_dim };
        let end = if end_dim < 0 { TOTAL_DIMS + end_dim } else { end_dim };
        if end <= start {
            return Err(ParseError::invalid(
                "end_dim",
                format!("end dim {} must be greater than start dim {}", end, start),
            ));
        }
        if start < 1 || end > 3 {
            return Err(ParseError::invalid(
                "start_dim",
                format!("flatten range {}..={} must lie within 1..=3", start, end),
            ));
        }
        Ok(Self {
            start_dim: start as usize,
            end_dim: end as usize,
        })
    }

    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let start_dim = int(node, "start_dim").ok_or(ParseError::MissingDim)?;
        let end_dim = int(node, "end_dim").ok_or(ParseError::MissingDim)?;
        Ok(Box::new(Self::new(start_dim, end_dim)?))
    }

    fn target_shape(&self, input: &Tensor<f32>) -> Vec<usize> {
        let [channels, rows, cols] = input.shapes();
        match (self.start_dim, self.end_dim) {
            (1, 3) => vec![channels * rows * cols],
            (2, 3) => vec![channels, rows * cols],
            _ => vec![channels * rows, cols],
        }
    }
}

impl Layer for FlattenLayer {
    fn layer_name(&self) -> &str {
        "Flatten"
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
            let size_error = || InferError::OutputSizeError {
                layer: self.layer_name().to_string(),
                index,
            };
            if output.is_empty() {
                *output = input.clone();
            } else {
                output.fill_from(input.data()).map_err(|_| size_error())?;
            }
            output
                .reshape(&self.target_shape(input))
                .map_err(|_| size_error())
        })
    }
}

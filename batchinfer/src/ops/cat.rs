use crate::graph::OperatorNode;
use crate::layer::params::int;
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output, for_each_sample};
use crate::tensor::Tensor;

/// Channel concatenation of every input operand.
pub(crate) struct CatLayer;

impl CatLayer {
    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let dim = int(node, "dim").ok_or(ParseError::MissingDim)?;
        let dim = if dim < 0 { dim + 4 } else { dim };
        if dim != 1 {
            return Err(ParseError::invalid(
                "dim",
                format!("concatenation along dim {} is not supported", dim),
            ));
        }
        Ok(Box::new(Self))
    }
}

impl Layer for CatLayer {
    fn layer_name(&self) -> &str {
        "Cat"
    }

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError> {
        check_batch(self.layer_name(), inputs, outputs, None)?;
        for_each_sample(outputs, |index, output| {
            let [_, rows, cols] = inputs[0][index].shapes();
            let mut channels = 0;
            for (operand, batch) in inputs.iter().enumerate() {
                let shape = batch[index].shapes();
                if shape[1] != rows || shape[2] != cols {
                    return Err(InferError::InputShapeMismatch {
                        layer: self.layer_name().to_string(),
                        index: operand,
                    });
                }
                channels += shape[0];
            }
            ensure_output(self.layer_name(), output, index, [channels, rows, cols])?;

            let mut offset = 0;
            let out = output.data_mut();
            for batch in inputs {
                let data = batch[index].data();
                out[offset..offset + data.len()].copy_from_slice(data);
                offset += data.len();
            }
            Ok(())
        })
    }
}

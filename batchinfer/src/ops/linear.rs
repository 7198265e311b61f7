use crate::graph::OperatorNode;
use crate::layer::params::{attr_f32, bool_param, usize_param};
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output, for_each_sample};
use crate::tensor::Tensor;

/// `y = x W^T + b` applied along the last dimension.
pub(crate) struct LinearLayer {
    in_features: usize,
    out_features: usize,
    weights: Vec<Tensor<f32>>,
    bias: Vec<Tensor<f32>>,
}

impl LinearLayer {
    pub(crate) fn new(in_features: usize, out_features: usize, use_bias: bool) -> Self {
        Self {
            in_features,
            out_features,
            weights: vec![Tensor::new_2d(out_features, in_features)],
            bias: if use_bias {
                vec![Tensor::new_1d(out_features)]
            } else {
                Vec::new()
            },
        }
    }

    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let in_features = usize_param(node, "in_features").ok_or(ParseError::MissingInFeatures)?;
        let out_features =
            usize_param(node, "out_features").ok_or(ParseError::MissingOutFeatures)?;
        let use_bias = bool_param(node, "bias").ok_or(ParseError::MissingUseBias)?;
        if in_features == 0 || out_features == 0 {
            return Err(ParseError::invalid(
                "out_features",
                "feature counts must be greater than zero",
            ));
        }

        let mut layer = Self::new(in_features, out_features, use_bias);
        let (_, weights) =
            attr_f32(node, "weight").ok_or_else(|| ParseError::MissingWeight("weight".into()))?;
        layer
            .set_weights(&weights)
            .map_err(|err| ParseError::invalid("weight", err.to_string()))?;
        if use_bias {
            let (_, bias) =
                attr_f32(node, "bias").ok_or_else(|| ParseError::MissingBias("bias".into()))?;
            layer
                .set_bias(&bias)
                .map_err(|err| ParseError::invalid("bias", err.to_string()))?;
        }
        Ok(Box::new(layer))
    }

    fn size_mismatch(&self, expected: usize, actual: usize) -> InferError {
        InferError::ParameterSizeMismatch {
            layer: self.layer_name().to_string(),
            expected,
            actual,
        }
    }
}

impl Layer for LinearLayer {
    fn layer_name(&self) -> &str {
        "Linear"
    }

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError> {
        check_batch(self.layer_name(), inputs, outputs, Some(1))?;
        let batch = inputs[0];
        let weight = self.weights[0].data();
        let bias = self.bias.first().map(|b| b.data());
        for_each_sample(outputs, |index, output| {
            let input = &batch[index];
            let [channels, rows, cols] = input.shapes();
            if cols != self.in_features {
                return Err(InferError::InputShapeMismatch {
                    layer: self.layer_name().to_string(),
                    index,
                });
            }
            if output.is_empty() {
                let mut raw = input.raw_shapes().to_vec();
                if let Some(last) = raw.last_mut() {
                    *last = self.out_features;
                }
                *output = Tensor::from_shapes(&raw).map_err(|_| InferError::OutputSizeError {
                    layer: self.layer_name().to_string(),
                    index,
                })?;
            }
            ensure_output(
                self.layer_name(),
                output,
                index,
                [channels, rows, self.out_features],
            )?;

            let values = input.data();
            let out = output.data_mut();
            for row in 0..channels * rows {
                let x = &values[row * cols..(row + 1) * cols];
                for o in 0..self.out_features {
                    let w = &weight[o * cols..(o + 1) * cols];
                    let dot = x.iter().zip(w).map(|(a, b)| a * b).sum::<f32>();
                    out[row * self.out_features + o] = dot + bias.map_or(0.0, |b| b[o]);
                }
            }
            Ok(())
        })
    }

    fn weights(&self) -> Result<&[Tensor<f32>], InferError> {
        Ok(&self.weights)
    }

    fn bias(&self) -> Result<&[Tensor<f32>], InferError> {
        Ok(&self.bias)
    }

    /// Row-major `[out_features, in_features]` weights.
    fn set_weights(&mut self, values: &[f32]) -> Result<(), InferError> {
        let expected = self.in_features * self.out_features;
        if values.len() != expected {
            return Err(self.size_mismatch(expected, values.len()));
        }
        self.weights[0].data_mut().copy_from_slice(values);
        Ok(())
    }

    fn set_bias(&mut self, values: &[f32]) -> Result<(), InferError> {
        if self.bias.is_empty() {
            return Err(InferError::Unsupported {
                layer: self.layer_name().to_string(),
                operation: "set_bias".to_string(),
            });
        }
        if values.len() != self.out_features {
            return Err(self.size_mismatch(self.out_features, values.len()));
        }
        self.bias[0].data_mut().copy_from_slice(values);
        Ok(())
    }
}

use crate::graph::OperatorNode;
use crate::layer::params::{float_pair, str_param};
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output, for_each_sample};
use crate::tensor::Tensor;

/// Nearest-neighbour upsampling by integral factors.
pub(crate) struct UpsampleLayer {
    scale_h: usize,
    scale_w: usize,
}

impl UpsampleLayer {
    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let mode = str_param(node, "mode").ok_or(ParseError::MissingResizeMode)?;
        if mode != "nearest" {
            return Err(ParseError::invalid(
                "mode",
                format!("resize mode {} is not supported", mode),
            ));
        }
        let [scale_h, scale_w] = float_pair(node, "scale_factor").ok_or(ParseError::MissingScale)?;
        let integral = |scale: f32| scale >= 1.0 && scale.fract() == 0.0;
        if !integral(scale_h) || !integral(scale_w) {
            return Err(ParseError::invalid(
                "scale_factor",
                format!("scale ({}, {}) must be a positive integer", scale_h, scale_w),
            ));
        }
        Ok(Box::new(Self {
            scale_h: scale_h as usize,
            scale_w: scale_w as usize,
        }))
    }
}

impl Layer for UpsampleLayer {
    fn layer_name(&self) -> &str {
        "Upsample"
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
            let [channels, rows, cols] = input.shapes();
            let (out_h, out_w) = (rows * self.scale_h, cols * self.scale_w);
            ensure_output(self.layer_name(), output, index, [channels, out_h, out_w])?;
            for c in 0..channels {
                let plane = input.slice(c);
                let out = output.slice_mut(c);
                for oh in 0..out_h {
                    let src = &plane[(oh / self.scale_h) * cols..(oh / self.scale_h + 1) * cols];
                    for ow in 0..out_w {
                        out[oh * out_w + ow] = src[ow / self.scale_w];
                    }
                }
            }
            Ok(())
        })
    }
}

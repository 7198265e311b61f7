//! Spatial pooling over each channel plane.
use crate::graph::OperatorNode;
use crate::layer::params::{bool_param, pair};
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output, for_each_sample};
use crate::tensor::Tensor;

/// Average pooling to a fixed `(output_h, output_w)`.
///
/// Uses `stride = floor(in / out)` and `pool = in - (out - 1) * stride` per
/// axis.
pub(crate) struct AdaptiveAvgPoolLayer {
    output_h: usize,
    output_w: usize,
}

impl AdaptiveAvgPoolLayer {
    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let [output_h, output_w] = pair(node, "output_size").ok_or(ParseError::MissingOutputHW)?;
        if output_h == 0 || output_w == 0 {
            return Err(ParseError::invalid(
                "output_size",
                "output size must be greater than zero",
            ));
        }
        Ok(Box::new(Self { output_h, output_w }))
    }
}

impl Layer for AdaptiveAvgPoolLayer {
    fn layer_name(&self) -> &str {
        "AdaptiveAveragePooling"
    }

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError> {
        check_batch(self.layer_name(), inputs, outputs, Some(1))?;
        for (index, output) in outputs.iter().enumerate() {
            if !output.is_empty()
                && (output.rows() != self.output_h || output.cols() != self.output_w)
            {
                return Err(InferError::OutputSizeError {
                    layer: self.layer_name().to_string(),
                    index,
                });
            }
        }

        let batch = inputs[0];
        for_each_sample(outputs, |index, output| {
            let input = &batch[index];
            let [channels, in_h, in_w] = input.shapes();
            let stride_h = in_h / self.output_h;
            let stride_w = in_w / self.output_w;
            if stride_h == 0 || stride_w == 0 {
                return Err(InferError::InputShapeMismatch {
                    layer: self.layer_name().to_string(),
                    index,
                });
            }
            let pool_h = in_h - (self.output_h - 1) * stride_h;
            let pool_w = in_w - (self.output_w - 1) * stride_w;
            ensure_output(
                self.layer_name(),
                output,
                index,
                [channels, self.output_h, self.output_w],
            )?;

            let pool_size = (pool_h * pool_w) as f32;
            for c in 0..channels {
                let plane = input.slice(c);
                let out = output.slice_mut(c);
                for oh in 0..self.output_h {
                    for ow in 0..self.output_w {
                        let (r0, c0) = (oh * stride_h, ow * stride_w);
                        let mut sum = 0.0f32;
                        for r in r0..r0 + pool_h {
                            sum += plane[r * in_w + c0..r * in_w + c0 + pool_w]
                                .iter()
                                .sum::<f32>();
                        }
                        out[oh * self.output_w + ow] = sum / pool_size;
                    }
                }
            }
            Ok(())
        })
    }
}

/// Max pooling; padded positions never win.
pub(crate) struct MaxPoolLayer {
    kernel: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
}

impl MaxPoolLayer {
    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let kernel = pair(node, "kernel_size").ok_or(ParseError::MissingKernel)?;
        let stride = pair(node, "stride").ok_or(ParseError::MissingStride)?;
        let padding = pair(node, "padding").ok_or(ParseError::MissingPadding)?;
        if node.param("dilation").is_some() {
            let dilation = pair(node, "dilation").ok_or(ParseError::MissingDilation)?;
            if dilation != [1, 1] {
                return Err(ParseError::invalid("dilation", "only dilation 1 is supported"));
            }
        }
        if bool_param(node, "ceil_mode").unwrap_or(false) {
            return Err(ParseError::invalid("ceil_mode", "ceil mode is not supported"));
        }
        if kernel.contains(&0) || stride.contains(&0) {
            return Err(ParseError::invalid(
                "kernel_size",
                "kernel and stride must be greater than zero",
            ));
        }
        Ok(Box::new(Self {
            kernel,
            stride,
            padding,
        }))
    }
}

impl Layer for MaxPoolLayer {
    fn layer_name(&self) -> &str {
        "MaxPooling"
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
            let [channels, in_h, in_w] = input.shapes();
            let padded_h = in_h + 2 * self.padding[0];
            let padded_w = in_w + 2 * self.padding[1];
            if padded_h < self.kernel[0] || padded_w < self.kernel[1] {
                return Err(InferError::InputShapeMismatch {
                    layer: self.layer_name().to_string(),
                    index,
                });
            }
            let out_h = (padded_h - self.kernel[0]) / self.stride[0] + 1;
            let out_w = (padded_w - self.kernel[1]) / self.stride[1] + 1;
            ensure_output(self.layer_name(), output, index, [channels, out_h, out_w])?;

            for c in 0..channels {
                let plane = input.slice(c);
                let out = output.slice_mut(c);
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let mut max = f32::NEG_INFINITY;
                        for kh in 0..self.kernel[0] {
                            let r = (oh * self.stride[0] + kh) as isize - self.padding[0] as isize;
                            if r < 0 || r as usize >= in_h {
                                continue;
                            }
                            for kw in 0..self.kernel[1] {
                                let col =
                                    (ow * self.stride[1] + kw) as isize - self.padding[1] as isize;
                                if col < 0 || col as usize >= in_w {
                                    continue;
                                }
                                max = max.max(plane[r as usize * in_w + col as usize]);
                            }
                        }
                        out[oh * out_w + ow] = max;
                    }
                }
            }
            Ok(())
        })
    }
}

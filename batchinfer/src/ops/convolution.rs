use crate::graph::OperatorNode;
use crate::layer::params::{attr_f32, bool_param, pair, str_param, usize_param};
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output, for_each_sample};
use crate::tensor::Tensor;

/// Hyper-parameters of a 2-D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConvParams {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub groups: usize,
    pub use_bias: bool,
}

impl ConvParams {
    /// Pointwise-style convolution with unit stride and no padding.
    pub(crate) fn plain(in_channels: usize, out_channels: usize, kernel: [usize; 2]) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride: [1, 1],
            padding: [0, 0],
            dilation: [1, 1],
            groups: 1,
            use_bias: true,
        }
    }

    fn weight_len(&self) -> usize {
        self.out_channels * (self.in_channels / self.groups) * self.kernel[0] * self.kernel[1]
    }
}

/// Grouped, strided, dilated 2-D convolution with zero padding.
///
/// Weights are kept as one `(in_channels / groups, kh, kw)` tensor per output
/// channel and biases as one single-element tensor per output channel.
pub(crate) struct ConvolutionLayer {
    params: ConvParams,
    weights: Vec<Tensor<f32>>,
    bias: Vec<Tensor<f32>>,
}

impl ConvolutionLayer {
    pub(crate) fn new(params: ConvParams) -> Result<Self, ParseError> {
        if params.in_channels == 0 || params.out_channels == 0 {
            return Err(ParseError::invalid(
                "out_channels",
                "channel counts must be greater than zero",
            ));
        }
        if params.groups == 0
            || params.in_channels % params.groups != 0
            || params.out_channels % params.groups != 0
        {
            return Err(ParseError::invalid(
                "groups",
                format!(
                    "{} groups do not divide {} input and {} output channels",
                    params.groups, params.in_channels, params.out_channels
                ),
            ));
        }
        if params.kernel.contains(&0) || params.stride.contains(&0) || params.dilation.contains(&0)
        {
            return Err(ParseError::invalid(
                "kernel_size",
                "kernel, stride and dilation must be greater than zero",
            ));
        }
        let per_group = params.in_channels / params.groups;
        let weights = (0..params.out_channels)
            .map(|_| Tensor::from_shapes(&[per_group, params.kernel[0], params.kernel[1]]))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|err| ParseError::invalid("kernel_size", err.to_string()))?;
        let bias = if params.use_bias {
            (0..params.out_channels).map(|_| Tensor::new_1d(1)).collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            params,
            weights,
            bias,
        })
    }

    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        let in_channels = usize_param(node, "in_channels").ok_or(ParseError::MissingInChannel)?;
        let out_channels =
            usize_param(node, "out_channels").ok_or(ParseError::MissingOutChannel)?;
        let kernel = pair(node, "kernel_size").ok_or(ParseError::MissingKernel)?;
        let stride = pair(node, "stride").ok_or(ParseError::MissingStride)?;
        let padding = pair(node, "padding").ok_or(ParseError::MissingPadding)?;
        let dilation = pair(node, "dilation").ok_or(ParseError::MissingDilation)?;
        let groups = usize_param(node, "groups").ok_or(ParseError::MissingGroups)?;
        let use_bias = bool_param(node, "bias").ok_or(ParseError::MissingUseBias)?;
        let padding_mode = str_param(node, "padding_mode").ok_or(ParseError::MissingPaddingMode)?;
        if padding_mode != "zeros" {
            return Err(ParseError::invalid(
                "padding_mode",
                format!("padding mode {} is not supported", padding_mode),
            ));
        }

        let mut layer = Self::new(ConvParams {
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            dilation,
            groups,
            use_bias,
        })?;
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

    pub(crate) fn params(&self) -> &ConvParams {
        &self.params
    }

    pub(crate) fn output_hw(&self, in_h: usize, in_w: usize) -> Option<(usize, usize)> {
        let p = &self.params;
        let extent = |input: usize, axis: usize| {
            let padded = input + 2 * p.padding[axis];
            let span = p.dilation[axis] * (p.kernel[axis] - 1) + 1;
            padded
                .checked_sub(span)
                .map(|rest| rest / p.stride[axis] + 1)
        };
        Some((extent(in_h, 0)?, extent(in_w, 1)?))
    }

    /// Convolve one sample into a pre-shaped output.
    pub(crate) fn convolve(&self, input: &Tensor<f32>, output: &mut Tensor<f32>) {
        let p = &self.params;
        let [_, in_h, in_w] = input.shapes();
        let [_, out_h, out_w] = output.shapes();
        let in_per_group = p.in_channels / p.groups;
        let out_per_group = p.out_channels / p.groups;
        for oc in 0..p.out_channels {
            let group = oc / out_per_group;
            let kernel = self.weights[oc].data();
            let bias = self.bias.get(oc).map(|b| b.index(0)).unwrap_or(0.0);
            let out = output.slice_mut(oc);
            out.fill(bias);
            for icl in 0..in_per_group {
                let plane = input.slice(group * in_per_group + icl);
                for kh in 0..p.kernel[0] {
                    for kw in 0..p.kernel[1] {
                        let weight = kernel[(icl * p.kernel[0] + kh) * p.kernel[1] + kw];
                        for oh in 0..out_h {
                            let ih = (oh * p.stride[0] + kh * p.dilation[0]) as isize
                                - p.padding[0] as isize;
                            if ih < 0 || ih as usize >= in_h {
                                continue;
                            }
                            let row = &plane[ih as usize * in_w..(ih as usize + 1) * in_w];
                            for ow in 0..out_w {
                                let iw = (ow * p.stride[1] + kw * p.dilation[1]) as isize
                                    - p.padding[1] as isize;
                                if iw < 0 || iw as usize >= in_w {
                                    continue;
                                }
                                out[oh * out_w + ow] += weight * row[iw as usize];
                            }
                        }
                    }
                }
            }
        }
    }

    fn size_mismatch(&self, expected: usize, actual: usize) -> InferError {
        InferError::ParameterSizeMismatch {
            layer: self.layer_name().to_string(),
            expected,
            actual,
        }
    }
}

impl Layer for ConvolutionLayer {
    fn layer_name(&self) -> &str {
        "Convolution"
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
            let shape_error = || InferError::InputShapeMismatch {
                layer: self.layer_name().to_string(),
                index,
            };
            let [channels, in_h, in_w] = input.shapes();
            if channels != self.params.in_channels {
                return Err(shape_error());
            }
            let (out_h, out_w) = self.output_hw(in_h, in_w).ok_or_else(shape_error)?;
            ensure_output(
                self.layer_name(),
                output,
                index,
                [self.params.out_channels, out_h, out_w],
            )?;
            self.convolve(input, output);
            Ok(())
        })
    }

    fn weights(&self) -> Result<&[Tensor<f32>], InferError> {
        Ok(&self.weights)
    }

    fn bias(&self) -> Result<&[Tensor<f32>], InferError> {
        Ok(&self.bias)
    }

    /// Flat `[out, in / groups, kh, kw]` weights, split per output channel.
    fn set_weights(&mut self, values: &[f32]) -> Result<(), InferError> {
        let expected = self.params.weight_len();
        if values.len() != expected {
            return Err(self.size_mismatch(expected, values.len()));
        }
        let per_kernel = expected / self.params.out_channels;
        for (kernel, chunk) in self.weights.iter_mut().zip(values.chunks_exact(per_kernel)) {
            kernel.data_mut().copy_from_slice(chunk);
        }
        Ok(())
    }

    fn set_bias(&mut self, values: &[f32]) -> Result<(), InferError> {
        if !self.params.use_bias {
            return Err(InferError::Unsupported {
                layer: self.layer_name().to_string(),
                operation: "set_bias".to_string(),
            });
        }
        if values.len() != self.params.out_channels {
            return Err(self.size_mismatch(self.params.out_channels, values.len()));
        }
        for (bias, value) in self.bias.iter_mut().zip(values) {
            bias.fill(*value);
        }
        Ok(())
    }
}

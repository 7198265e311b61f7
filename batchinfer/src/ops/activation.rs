use crate::graph::OperatorNode;
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output_like, for_each_sample, sigmoid, unary_map};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActivationKind {
    Relu,
    Sigmoid,
    Silu,
}

impl ActivationKind {
    fn name(self) -> &'static str {
        match self {
            ActivationKind::Relu => "ReLU",
            ActivationKind::Sigmoid => "Sigmoid",
            ActivationKind::Silu => "SiLU",
        }
    }

    fn apply(self, value: f32) -> f32 {
        match self {
            ActivationKind::Relu => value.max(0.0),
            ActivationKind::Sigmoid => sigmoid(value),
            ActivationKind::Silu => value * sigmoid(value),
        }
    }
}

/// Elementwise activation; the output keeps the input shape.
pub(crate) struct ActivationLayer {
    kind: ActivationKind,
}

impl ActivationLayer {
    pub(crate) fn new(kind: ActivationKind) -> Self {
        Self { kind }
    }

    pub(crate) fn relu(_node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        Ok(Box::new(Self::new(ActivationKind::Relu)))
    }

    pub(crate) fn sigmoid(_node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        Ok(Box::new(Self::new(ActivationKind::Sigmoid)))
    }

    pub(crate) fn silu(_node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        Ok(Box::new(Self::new(ActivationKind::Silu)))
    }
}

impl Layer for ActivationLayer {
    fn layer_name(&self) -> &str {
        self.kind.name()
    }

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError> {
        check_batch(self.layer_name(), inputs, outputs, Some(1))?;
        let batch = inputs[0];
        let kind = self.kind;
        for_each_sample(outputs, |index, output| {
            let input = &batch[index];
            ensure_output_like(self.layer_name(), output, index, input)?;
            unary_map(input, output, |value| kind.apply(value));
            Ok(())
        })
    }
}

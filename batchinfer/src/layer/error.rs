use thiserror::Error;

/// Failure while building a layer from its node's parameters and attributes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing or invalid parameter `dim`")]
    MissingDim,
    #[error("missing or invalid parameter `output_size`")]
    MissingOutputHW,
    #[error("missing or invalid parameter `kernel_size`")]
    MissingKernel,
    #[error("missing or invalid parameter `stride`")]
    MissingStride,
    #[error("missing or invalid parameter `padding`")]
    MissingPadding,
    #[error("missing or invalid parameter `dilation`")]
    MissingDilation,
    #[error("missing or invalid parameter `groups`")]
    MissingGroups,
    #[error("missing or invalid parameter `in_channels`")]
    MissingInChannel,
    #[error("missing or invalid parameter `out_channels`")]
    MissingOutChannel,
    #[error("missing or invalid parameter `bias`")]
    MissingUseBias,
    #[error("missing or invalid parameter `padding_mode`")]
    MissingPaddingMode,
    #[error("missing or invalid parameter `in_features`")]
    MissingInFeatures,
    #[error("missing or invalid parameter `out_features`")]
    MissingOutFeatures,
    #[error("missing or invalid parameter `expr`")]
    MissingExpr,
    #[error("missing or invalid parameter `scale_factor`")]
    MissingScale,
    #[error("missing or invalid parameter `mode`")]
    MissingResizeMode,
    #[error("missing weight attribute `{0}`")]
    MissingWeight(String),
    #[error("missing bias attribute `{0}`")]
    MissingBias(String),
    #[error("missing strides attribute `{0}`")]
    MissingStrides(String),
    #[error("missing anchor grid attribute `{0}`")]
    MissingAnchorGrids(String),
    #[error("missing grid attribute `{0}`")]
    MissingGrids(String),
    #[error("invalid `{param}`: {reason}")]
    Invalid { param: String, reason: String },
}

impl ParseError {
    pub(crate) fn invalid(param: &str, reason: impl Into<String>) -> Self {
        ParseError::Invalid {
            param: param.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure of a layer's forward call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferError {
    #[error("{layer}: input batch is empty")]
    InputEmpty { layer: String },
    #[error("{layer}: input batch size {input} does not match output batch size {output}")]
    InputOutputSizeMismatch {
        layer: String,
        input: usize,
        output: usize,
    },
    #[error("{layer}: output tensor {index} has the wrong shape")]
    OutputSizeError { layer: String, index: usize },
    #[error("{layer}: input tensor {index} has an unexpected shape")]
    InputShapeMismatch { layer: String, index: usize },
    #[error("{layer}: dimension {dim} is out of range")]
    InvalidDim { layer: String, dim: i64 },
    #[error("{layer}: expected {expected} parameter values, got {actual}")]
    ParameterSizeMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error("{layer}: {operation} is not supported")]
    Unsupported { layer: String, operation: String },
}

/// Failure to add a factory to a layer registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("layer type `{0}` is already registered")]
    Duplicate(String),
}

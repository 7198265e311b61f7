mod activation;
mod cat;
mod common;
mod convolution;
mod expression;
mod flatten;
mod linear;
mod pooling;
pub(crate) mod registry;
mod softmax;
mod upsample;
mod yolo_detect;

pub use yolo_detect::{DetectAttrLayout, YoloDetectLayer};

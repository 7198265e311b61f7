use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ops::activation::ActivationLayer;
use crate::ops::cat::CatLayer;
use crate::ops::convolution::ConvolutionLayer;
use crate::ops::expression::ExpressionLayer;
use crate::ops::flatten::FlattenLayer;
use crate::ops::linear::LinearLayer;
use crate::ops::pooling::{AdaptiveAvgPoolLayer, MaxPoolLayer};
use crate::ops::softmax::SoftmaxLayer;
use crate::ops::upsample::UpsampleLayer;
use crate::ops::yolo_detect::YoloDetectLayer;
use crate::registry::LayerFactory;

/// Built-in op types and their factories.
pub(crate) static ENTRIES: Lazy<Vec<(&'static str, LayerFactory)>> = Lazy::new(|| {
    let entries: Vec<(&'static str, LayerFactory)> = vec![
        ("nn.ReLU", Arc::new(ActivationLayer::relu)),
        ("F.relu", Arc::new(ActivationLayer::relu)),
        ("nn.Sigmoid", Arc::new(ActivationLayer::sigmoid)),
        ("F.sigmoid", Arc::new(ActivationLayer::sigmoid)),
        ("nn.SiLU", Arc::new(ActivationLayer::silu)),
        ("F.silu", Arc::new(ActivationLayer::silu)),
        ("torch.flatten", Arc::new(FlattenLayer::create)),
        ("nn.Softmax", Arc::new(SoftmaxLayer::create)),
        ("F.softmax", Arc::new(SoftmaxLayer::create)),
        ("nn.AdaptiveAvgPool2d", Arc::new(AdaptiveAvgPoolLayer::create)),
        ("nn.MaxPool2d", Arc::new(MaxPoolLayer::create)),
        ("nn.Linear", Arc::new(LinearLayer::create)),
        ("nn.Conv2d", Arc::new(ConvolutionLayer::create)),
        ("torch.cat", Arc::new(CatLayer::create)),
        ("pnnx.Expression", Arc::new(ExpressionLayer::create)),
        ("nn.Upsample", Arc::new(UpsampleLayer::create)),
        ("models.yolo.Detect", Arc::new(YoloDetectLayer::create)),
    ];
    entries
});

//! YOLOv5 detection head (`models.yolo.Detect`).
//!
//! Each stage runs a 1x1 convolution over its feature map, applies a sigmoid
//! and decodes box centres and sizes against the stage's grid and anchor
//! grid. The stages are stacked row-wise into a single
//! `(1, sum(na * ny * nx), classes + 5)` tensor per batch element.
use crate::graph::OperatorNode;
use crate::layer::params::attr_f32;
use crate::layer::{InferError, Layer, ParseError};
use crate::ops::common::{check_batch, ensure_output, for_each_sample, sigmoid};
use crate::ops::convolution::{ConvParams, ConvolutionLayer};
use crate::tensor::Tensor;

/// Attribute names a detection head reads its constants from.
///
/// `conv_weight` and `conv_bias` are templates where `{}` is replaced with the
/// stage index. The default matches PNNX exports of yolov5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectAttrLayout {
    pub strides: String,
    pub anchor_grids: Vec<String>,
    pub grids: Vec<String>,
    pub conv_weight: String,
    pub conv_bias: String,
}

impl Default for DetectAttrLayout {
    fn default() -> Self {
        Self {
            strides: "pnnx_5".to_string(),
            anchor_grids: vec!["pnnx_4".into(), "pnnx_2".into(), "pnnx_0".into()],
            grids: vec!["pnnx_6".into(), "pnnx_3".into(), "pnnx_1".into()],
            conv_weight: "m.{}.weight".to_string(),
            conv_bias: "m.{}.bias".to_string(),
        }
    }
}

impl DetectAttrLayout {
    fn weight_name(&self, stage: usize) -> String {
        self.conv_weight.replace("{}", &stage.to_string())
    }

    fn bias_name(&self, stage: usize) -> String {
        self.conv_bias.replace("{}", &stage.to_string())
    }
}

struct DetectStage {
    stride: f32,
    /// `(na * ny * nx, 2)` row-major.
    anchor_grid: Vec<f32>,
    /// `(na * ny * nx, 2)` row-major.
    grid: Vec<f32>,
    conv: ConvolutionLayer,
}

pub struct YoloDetectLayer {
    num_anchors: usize,
    num_classes: usize,
    stages: Vec<DetectStage>,
}

/// Read a `[1, na, ny, nx, 2]` grid attribute as `(na * ny * nx, 2)` rows.
fn read_grid(
    node: &OperatorNode,
    name: &str,
    num_anchors: &mut Option<usize>,
    missing: impl Fn(String) -> ParseError,
) -> Result<Vec<f32>, ParseError> {
    let (shape, values) = attr_f32(node, name).ok_or_else(|| missing(name.to_string()))?;
    if shape.len() != 5 || shape[0] != 1 || shape[4] != 2 {
        return Err(ParseError::invalid(
            name,
            format!("grid shape {:?} must be [1, na, ny, nx, 2]", shape),
        ));
    }
    match *num_anchors {
        None if shape[1] == 0 => {
            return Err(ParseError::invalid(name, "number of anchors must be positive"))
        }
        None => *num_anchors = Some(shape[1]),
        Some(na) if na != shape[1] => {
            return Err(ParseError::invalid(
                name,
                format!("expected {} anchors, found {}", na, shape[1]),
            ))
        }
        Some(_) => {}
    }
    Ok(values)
}

impl YoloDetectLayer {
    /// Factory reading attributes through `layout`.
    pub fn factory(
        layout: DetectAttrLayout,
    ) -> impl Fn(&OperatorNode) -> Result<Box<dyn Layer>, ParseError> + Send + Sync + 'static {
        move |node| Ok(Box::new(Self::from_node(node, &layout)?) as Box<dyn Layer>)
    }

    pub(crate) fn create(node: &OperatorNode) -> Result<Box<dyn Layer>, ParseError> {
        Ok(Box::new(Self::from_node(node, &DetectAttrLayout::default())?))
    }

    pub fn from_node(node: &OperatorNode, layout: &DetectAttrLayout) -> Result<Self, ParseError> {
        let (stride_shape, strides) = attr_f32(node, &layout.strides)
            .ok_or_else(|| ParseError::MissingStrides(layout.strides.clone()))?;
        if stride_shape.is_empty() || strides.is_empty() {
            return Err(ParseError::MissingStrides(layout.strides.clone()));
        }
        let stage_count = strides.len();
        if node.input_names().len() != stage_count {
            return Err(ParseError::invalid(
                &layout.strides,
                format!(
                    "{} strides but the node has {} inputs",
                    stage_count,
                    node.input_names().len()
                ),
            ));
        }
        if layout.anchor_grids.len() < stage_count || layout.grids.len() < stage_count {
            return Err(ParseError::invalid(
                &layout.strides,
                format!("attribute layout does not name grids for {} stages", stage_count),
            ));
        }

        let mut num_anchors = None;
        let mut anchor_grids = Vec::with_capacity(stage_count);
        for name in &layout.anchor_grids[..stage_count] {
            anchor_grids.push(read_grid(
                node,
                name,
                &mut num_anchors,
                ParseError::MissingAnchorGrids,
            )?);
        }
        let mut grids = Vec::with_capacity(stage_count);
        for name in &layout.grids[..stage_count] {
            grids.push(read_grid(node, name, &mut num_anchors, ParseError::MissingGrids)?);
        }
        let num_anchors = num_anchors
            .ok_or_else(|| ParseError::MissingAnchorGrids(layout.anchor_grids[0].clone()))?;

        let mut num_classes = None;
        let mut stages = Vec::with_capacity(stage_count);
        for (stage, ((stride, anchor_grid), grid)) in strides
            .into_iter()
            .zip(anchor_grids)
            .zip(grids)
            .enumerate()
        {
            let weight_name = layout.weight_name(stage);
            let (shape, weights) = attr_f32(node, &weight_name)
                .ok_or_else(|| ParseError::MissingWeight(weight_name.clone()))?;
            if shape.len() != 4 {
                return Err(ParseError::invalid(
                    &weight_name,
                    format!("convolution weight shape {:?} must have 4 dims", shape),
                ));
            }
            let out_channels = shape[0];
            if out_channels % num_anchors != 0 || out_channels / num_anchors <= 5 {
                return Err(ParseError::invalid(
                    &weight_name,
                    format!(
                        "{} output channels do not split into {} anchors of at least one class",
                        out_channels, num_anchors
                    ),
                ));
            }
            let classes = out_channels / num_anchors - 5;
            if *num_classes.get_or_insert(classes) != classes {
                return Err(ParseError::invalid(
                    &weight_name,
                    "stages disagree on the number of classes",
                ));
            }

            let params = ConvParams::plain(shape[1], out_channels, [shape[2], shape[3]]);
            let mut conv = ConvolutionLayer::new(params)?;
            conv.set_weights(&weights)
                .map_err(|err| ParseError::invalid(&weight_name, err.to_string()))?;
            let bias_name = layout.bias_name(stage);
            let (_, bias) = attr_f32(node, &bias_name)
                .ok_or_else(|| ParseError::MissingBias(bias_name.clone()))?;
            conv.set_bias(&bias)
                .map_err(|err| ParseError::invalid(&bias_name, err.to_string()))?;

            stages.push(DetectStage {
                stride,
                anchor_grid,
                grid,
                conv,
            });
        }

        Ok(Self {
            num_anchors,
            num_classes: num_classes.unwrap_or(0),
            stages,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_anchors(&self) -> usize {
        self.num_anchors
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }
}

impl Layer for YoloDetectLayer {
    fn layer_name(&self) -> &str {
        "YoloDetect"
    }

    fn forward(
        &self,
        inputs: &[&[Tensor<f32>]],
        outputs: &mut [Tensor<f32>],
    ) -> Result<(), InferError> {
        check_batch(self.layer_name(), inputs, outputs, Some(self.stages.len()))?;
        let info = self.num_classes + 5;
        for_each_sample(outputs, |index, output| {
            let shape_error = |stage| InferError::InputShapeMismatch {
                layer: self.layer_name().to_string(),
                index: stage,
            };

            let mut features = Vec::with_capacity(self.stages.len());
            for (stage, detect) in self.stages.iter().enumerate() {
                let input = &inputs[stage][index];
                let [channels, rows, cols] = input.shapes();
                if channels != detect.conv.params().in_channels {
                    return Err(shape_error(stage));
                }
                let (h, w) = detect
                    .conv
                    .output_hw(rows, cols)
                    .ok_or_else(|| shape_error(stage))?;
                if detect.grid.len() != self.num_anchors * h * w * 2
                    || detect.anchor_grid.len() != detect.grid.len()
                {
                    return Err(shape_error(stage));
                }
                let mut feature = Tensor::new(detect.conv.params().out_channels, h, w);
                detect.conv.convolve(input, &mut feature);
                features.push(feature);
            }

            let total_rows = features
                .iter()
                .map(|feature| self.num_anchors * feature.rows() * feature.cols())
                .sum::<usize>();
            ensure_output(self.layer_name(), output, index, [1, total_rows, info])?;

            let out = output.data_mut();
            let mut row_offset = 0;
            for (detect, feature) in self.stages.iter().zip(&features) {
                let plane = feature.rows() * feature.cols();
                let values = feature.data();
                for anchor in 0..self.num_anchors {
                    for p in 0..plane {
                        let cell = anchor * plane + p;
                        let start = (row_offset + cell) * info;
                        let row = &mut out[start..start + info];
                        for (k, slot) in row.iter_mut().enumerate() {
                            *slot = sigmoid(values[(anchor * info + k) * plane + p]);
                        }
                        for k in 0..2 {
                            row[k] = (row[k] * 2.0 + detect.grid[cell * 2 + k]) * detect.stride;
                            let wh = row[k + 2] * 2.0;
                            row[k + 2] = wh * wh * detect.anchor_grid[cell * 2 + k];
                        }
                    }
                }
                row_offset += self.num_anchors * plane;
            }
            Ok(())
        })
    }
}

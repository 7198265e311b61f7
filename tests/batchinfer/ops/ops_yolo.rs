use std::sync::Arc;

use anyhow::Result;
use batchinfer::{
    DetectAttrLayout, GraphError, LayerRegistry, ModelDesc, NodeDesc, ParseError, RuntimeGraph,
    YoloDetectLayer,
};

use crate::common::{self, INPUT, OUTPUT};

const LN_3: f32 = 1.098_612_3;

/// One stage over a 2x2 feature map, one anchor and one class.
fn single_stage(names: &DetectAttrLayout, out_channels: usize) -> NodeDesc {
    let weight = names.conv_weight.replace("{}", "0");
    let bias = names.conv_bias.replace("{}", "0");
    let mut bias_values = vec![0.0; out_channels];
    if let Some(last) = bias_values.last_mut() {
        *last = LN_3;
    }
    NodeDesc::new("models.yolo.Detect", "detect")
        .attr(&names.strides, common::f32_attr(&[1], &[8.0]))
        .attr(
            &names.anchor_grids[0],
            common::f32_attr(&[1, 1, 2, 2, 2], &[10.0, 13.0, 10.0, 13.0, 10.0, 13.0, 10.0, 13.0]),
        )
        .attr(
            &names.grids[0],
            common::f32_attr(&[1, 1, 2, 2, 2], &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
        )
        .attr(weight, common::f32_attr(&[out_channels, 1, 1, 1], &vec![0.0; out_channels]))
        .attr(bias, common::f32_attr(&[out_channels], &bias_values))
}

fn single_stage_desc(detect: NodeDesc) -> ModelDesc {
    common::single_op_desc(detect, vec![1, 1, 2, 2], vec![1, 4, 6])
}

fn expected_single_stage() -> Vec<f32> {
    let mut rows = Vec::new();
    for (gx, gy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
        rows.extend([(1.0 + gx) * 8.0, (1.0 + gy) * 8.0, 10.0, 13.0, 0.5, 0.75]);
    }
    rows
}

#[test]
fn detect_decodes_single_stage() -> Result<()> {
    let layout = DetectAttrLayout::default();
    let mut graph = common::build_desc(single_stage_desc(single_stage(&layout, 6)))?;
    let batch = vec![common::iota(&[1, 2, 2])?; 2];
    let outputs = graph.forward(&batch, false)?;
    assert_eq!(outputs.len(), 2);
    for output in &outputs {
        assert_eq!(output.shapes(), [1, 4, 6]);
        common::assert_close(output.data(), &expected_single_stage(), 1e-5)?;
    }
    Ok(())
}

#[test]
fn detect_stacks_stages() -> Result<()> {
    let layout = DetectAttrLayout::default();
    let detect = single_stage(&layout, 6)
        .attr("pnnx_5", common::f32_attr(&[2], &[8.0, 16.0]))
        .attr("pnnx_2", common::f32_attr(&[1, 1, 1, 1, 2], &[30.0, 40.0]))
        .attr("pnnx_3", common::f32_attr(&[1, 1, 1, 1, 2], &[0.0, 0.0]))
        .attr("m.1.weight", common::f32_attr(&[6, 1, 1, 1], &[0.0; 6]))
        .attr("m.1.bias", common::f32_attr(&[6], &[0.0; 6]));
    let pool = NodeDesc::new("nn.MaxPool2d", "pool")
        .param("kernel_size", common::int(2))
        .param("stride", common::int(2))
        .param("padding", common::int(0));
    let desc = ModelDesc {
        nodes: vec![
            common::input_node("p3", vec![1, 1, 2, 2]),
            pool.input("p3", vec![1, 1, 2, 2]).output("p4", vec![1, 1, 1, 1]),
            detect
                .input("p3", vec![1, 1, 2, 2])
                .input("p4", vec![1, 1, 1, 1])
                .output("y", vec![1, 5, 6]),
            common::output_node("y", vec![1, 5, 6]),
        ],
    };
    let mut graph = common::build_desc(desc)?;
    assert_eq!(graph.topo_order(), vec![INPUT, "pool", "detect", OUTPUT]);

    let outputs = graph.forward(&[common::iota(&[1, 2, 2])?], false)?;
    let mut expected = expected_single_stage();
    expected.extend([16.0, 16.0, 30.0, 40.0, 0.5, 0.5]);
    common::assert_close(outputs[0].data(), &expected, 1e-5)?;
    Ok(())
}

#[test]
fn detect_rejects_bad_attributes() {
    let layout = DetectAttrLayout::default();

    let mut no_strides = single_stage(&layout, 6);
    no_strides.attrs.remove("pnnx_5");
    let mut no_grid = single_stage(&layout, 6);
    no_grid.attrs.remove("pnnx_6");

    let cases: [(NodeDesc, fn(&ParseError) -> bool); 4] = [
        (no_strides, |err| matches!(err, ParseError::MissingStrides(name) if name == "pnnx_5")),
        (no_grid, |err| matches!(err, ParseError::MissingGrids(name) if name == "pnnx_6")),
        (single_stage(&layout, 5), |err| matches!(err, ParseError::Invalid { .. })),
        (
            single_stage(&layout, 6).attr("pnnx_5", common::f32_attr(&[2], &[8.0, 16.0])),
            |err| matches!(err, ParseError::Invalid { .. }),
        ),
    ];
    for (detect, check) in cases {
        let err = RuntimeGraph::from_desc(single_stage_desc(detect))
            .build(INPUT, OUTPUT)
            .expect_err("bad detect attributes");
        match err {
            GraphError::LayerCreation { source, .. } => assert!(check(&source), "{source}"),
            other => panic!("unexpected error {other}"),
        }
    }
}

#[test]
fn detect_with_custom_attribute_layout() -> Result<()> {
    let layout = DetectAttrLayout {
        strides: "stride".to_string(),
        anchor_grids: vec!["anchor0".to_string()],
        grids: vec!["grid0".to_string()],
        conv_weight: "head.{}.w".to_string(),
        conv_bias: "head.{}.b".to_string(),
    };
    let desc = single_stage_desc(single_stage(&layout, 6));

    let err = RuntimeGraph::from_desc(desc.clone())
        .build(INPUT, OUTPUT)
        .expect_err("default layout looks for pnnx_5");
    assert!(matches!(err, GraphError::LayerCreation { .. }));

    let mut registry = LayerRegistry::builtin();
    assert!(registry.unregister("models.yolo.Detect").is_some());
    registry.register("models.yolo.Detect", YoloDetectLayer::factory(layout.clone()))?;
    let mut graph = RuntimeGraph::from_desc(desc).with_registry(Arc::new(registry));
    graph.build(INPUT, OUTPUT)?;

    let outputs = graph.forward(&[common::iota(&[1, 2, 2])?], false)?;
    common::assert_close(outputs[0].data(), &expected_single_stage(), 1e-5)?;

    let node = graph.node("detect").expect("detect node");
    let detect = YoloDetectLayer::from_node(node, &layout)?;
    assert_eq!(detect.num_anchors(), 1);
    assert_eq!(detect.num_classes(), 1);
    assert_eq!(detect.num_stages(), 1);
    Ok(())
}

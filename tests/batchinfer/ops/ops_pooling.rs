use anyhow::Result;
use batchinfer::{GraphError, InferError, NodeDesc, Parameter, ParseError, RuntimeGraph};

use crate::common::{self, INPUT, OUTPUT};

fn adaptive(output: &[i64]) -> NodeDesc {
    NodeDesc::new("nn.AdaptiveAvgPool2d", "avgpool").param("output_size", common::ints(output))
}

fn maxpool(kernel: i64, stride: i64, padding: i64) -> NodeDesc {
    NodeDesc::new("nn.MaxPool2d", "maxpool")
        .param("kernel_size", common::ints(&[kernel, kernel]))
        .param("stride", common::ints(&[stride, stride]))
        .param("padding", common::ints(&[padding, padding]))
        .param("dilation", common::ints(&[1, 1]))
        .param("ceil_mode", Parameter::Bool(false))
}

#[test]
fn adaptive_avg_pool_even_split() -> Result<()> {
    let outputs = common::run_single(
        adaptive(&[2, 2]),
        vec![1, 1, 4, 4],
        vec![1, 1, 2, 2],
        &[common::iota(&[1, 4, 4])?],
    )?;
    common::assert_close(outputs[0].data(), &[2.5, 4.5, 10.5, 12.5], 1e-6)?;
    Ok(())
}

#[test]
fn adaptive_avg_pool_overlapping_windows() -> Result<()> {
    let outputs = common::run_single(
        adaptive(&[2, 2]),
        vec![1, 2, 5, 5],
        vec![1, 2, 2, 2],
        &[common::iota(&[2, 5, 5])?],
    )?;
    let out = &outputs[0];
    assert!((out.at(0, 0, 0) - 6.0).abs() < 1e-6);
    assert!((out.at(0, 1, 1) - 18.0).abs() < 1e-6);
    assert!((out.at(1, 0, 0) - 31.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn adaptive_avg_pool_global() -> Result<()> {
    let batch = vec![common::iota(&[3, 2, 2])?; 2];
    let outputs = common::run_single(
        NodeDesc::new("nn.AdaptiveAvgPool2d", "gap").param("output_size", common::int(1)),
        vec![2, 3, 2, 2],
        vec![2, 3, 1, 1],
        &batch,
    )?;
    for output in &outputs {
        common::assert_close(output.data(), &[1.5, 5.5, 9.5], 1e-6)?;
    }
    Ok(())
}

#[test]
fn adaptive_avg_pool_checks_output_slots() -> Result<()> {
    let desc = common::single_op_desc(adaptive(&[2, 2]), vec![1, 1, 4, 4], vec![1, 1, 3, 3]);
    let mut graph = RuntimeGraph::from_desc(desc);
    graph.build(INPUT, OUTPUT)?;
    let err = graph
        .forward(&[common::iota(&[1, 4, 4])?], false)
        .expect_err("declared output is 3x3");
    assert!(matches!(
        err,
        GraphError::Infer {
            source: InferError::OutputSizeError { index: 0, .. },
            ..
        }
    ));

    let op = NodeDesc::new("nn.AdaptiveAvgPool2d", "avgpool");
    let desc = common::single_op_desc(op, vec![1, 1, 4, 4], vec![1, 1, 2, 2]);
    let err = RuntimeGraph::from_desc(desc)
        .build(INPUT, OUTPUT)
        .expect_err("output_size missing");
    assert!(matches!(
        err,
        GraphError::LayerCreation {
            source: ParseError::MissingOutputHW,
            ..
        }
    ));
    Ok(())
}

#[test]
fn max_pool_windows() -> Result<()> {
    let outputs = common::run_single(
        maxpool(2, 2, 0),
        vec![1, 1, 4, 4],
        vec![1, 1, 2, 2],
        &[common::iota(&[1, 4, 4])?],
    )?;
    common::assert_close(outputs[0].data(), &[5.0, 7.0, 13.0, 15.0], 0.0)?;
    Ok(())
}

#[test]
fn max_pool_padding_never_wins() -> Result<()> {
    let input = common::tensor(&[1, 2, 2], &[-4.0, -3.0, -2.0, -1.0])?;
    let outputs = common::run_single(
        maxpool(3, 1, 1),
        vec![1, 1, 2, 2],
        vec![1, 1, 2, 2],
        &[input],
    )?;
    common::assert_close(outputs[0].data(), &[-1.0, -1.0, -1.0, -1.0], 0.0)?;
    Ok(())
}

#[test]
fn max_pool_rejects_unsupported_params() {
    let ceil = maxpool(2, 2, 0).param("ceil_mode", Parameter::Bool(true));
    let dilated = maxpool(2, 2, 0).param("dilation", common::ints(&[2, 2]));
    let mut no_stride = maxpool(2, 2, 0);
    no_stride.params.remove("stride");

    let cases = [
        (ceil, "ceil_mode"),
        (dilated, "dilation"),
        (no_stride, "stride"),
    ];
    for (op, what) in cases {
        let desc = common::single_op_desc(op, vec![1, 1, 4, 4], vec![1, 1, 2, 2]);
        let err = RuntimeGraph::from_desc(desc)
            .build(INPUT, OUTPUT)
            .expect_err(what);
        assert!(matches!(err, GraphError::LayerCreation { .. }), "{what}: {err}");
    }
}

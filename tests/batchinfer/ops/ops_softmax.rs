use anyhow::Result;
use batchinfer::{GraphError, InferError, NodeDesc, RuntimeGraph};

use crate::common::{self, INPUT, OUTPUT};

fn softmax(dim: i64) -> NodeDesc {
    NodeDesc::new("F.softmax", "softmax").param("dim", common::int(dim))
}

#[test]
fn softmax_over_last_dim() -> Result<()> {
    let outputs = common::run_single(
        softmax(-1),
        vec![1, 4],
        vec![1, 4],
        &[common::tensor(&[4], &[1.0, 2.0, 3.0, 4.0])?],
    )?;
    let expected = [0.032_058_6, 0.087_144_32, 0.236_882_82, 0.643_914_3];
    common::assert_close(outputs[0].data(), &expected, 1e-6)?;
    Ok(())
}

#[test]
fn softmax_is_shift_invariant() -> Result<()> {
    let outputs = common::run_single(
        softmax(1),
        vec![2, 3],
        vec![2, 3],
        &[
            common::tensor(&[3], &[1.0, 2.0, 3.0])?,
            common::tensor(&[3], &[1001.0, 1002.0, 1003.0])?,
        ],
    )?;
    common::assert_close(outputs[0].data(), outputs[1].data(), 1e-6)?;
    assert!(outputs[1].data().iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn softmax_over_rows_of_a_matrix() -> Result<()> {
    let input = common::tensor(&[2, 3], &[0.0, 1.0, 2.0, 2.0, 1.0, 0.0])?;
    let outputs = common::run_single(softmax(1), vec![1, 2, 3], vec![1, 2, 3], &[input])?;
    let out = &outputs[0];
    for col in 0..3 {
        let sum = out.at(0, 0, col) + out.at(0, 1, col);
        assert!((sum - 1.0).abs() < 1e-6, "column {col} sums to {sum}");
    }
    assert!(out.at(0, 1, 0) > out.at(0, 0, 0));
    assert!((out.at(0, 0, 1) - 0.5).abs() < 1e-6);
    Ok(())
}

#[test]
fn softmax_over_channels() -> Result<()> {
    let input = common::iota(&[2, 2, 2])?;
    let outputs = common::run_single(softmax(1), vec![1, 2, 2, 2], vec![1, 2, 2, 2], &[input])?;
    let out = &outputs[0];
    let high = 1.0 / (1.0 + (-4.0f32).exp());
    for offset in 0..4 {
        assert!((out.index(offset) - (1.0 - high)).abs() < 1e-6);
        assert!((out.index(offset + 4) - high).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn softmax_rejects_batch_dim() -> Result<()> {
    let desc = common::single_op_desc(softmax(0), vec![1, 4], vec![1, 4]);
    let mut graph = RuntimeGraph::from_desc(desc);
    graph.build(INPUT, OUTPUT)?;
    let err = graph
        .forward(&[common::tensor(&[4], &[1.0, 2.0, 3.0, 4.0])?], false)
        .expect_err("dim 0 is the batch");
    assert!(matches!(
        err,
        GraphError::Infer {
            source: InferError::InvalidDim { dim: 0, .. },
            ..
        }
    ));
    Ok(())
}

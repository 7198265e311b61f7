use anyhow::Result;
use batchinfer::{GraphError, NodeDesc, Operand, RuntimeGraph};

use crate::common::{self, INPUT, OUTPUT};

fn relu_graph(shape: Vec<i64>) -> Result<RuntimeGraph> {
    common::build_single(NodeDesc::new("nn.ReLU", "relu"), shape.clone(), shape)
}

#[test]
fn allocates_four_dim_operands_per_sample() -> Result<()> {
    let graph = relu_graph(vec![4, 3, 32, 32])?;
    for name in ["0", "1"] {
        let operand = graph.operand(name).expect("operand exists");
        assert_eq!(operand.batch(), Some(4));
        assert_eq!(operand.datas().len(), 4);
        for tensor in operand.datas() {
            assert_eq!(tensor.shapes(), [3, 32, 32]);
            assert_eq!(tensor.raw_shapes(), &[3, 32, 32]);
            assert!(tensor.data().iter().all(|v| *v == 0.0));
        }
    }
    Ok(())
}

#[test]
fn allocates_lower_rank_operands_with_raw_shapes() -> Result<()> {
    let graph = relu_graph(vec![2, 5, 7])?;
    let operand = graph.operand("0").expect("operand exists");
    assert_eq!(operand.datas().len(), 2);
    assert_eq!(operand.datas()[0].shapes(), [1, 5, 7]);
    assert_eq!(operand.datas()[0].raw_shapes(), &[5, 7]);

    let graph = relu_graph(vec![2, 6])?;
    let operand = graph.operand("1").expect("operand exists");
    assert_eq!(operand.datas()[1].shapes(), [1, 1, 6]);
    assert_eq!(operand.datas()[1].raw_shapes(), &[6]);
    Ok(())
}

#[test]
fn unknown_dims_leave_slots_empty() -> Result<()> {
    let graph = relu_graph(vec![-1, 3])?;
    let operand = graph.operand("0").expect("operand exists");
    assert_eq!(operand.batch(), None);
    assert_eq!(operand.sample_shape(), Some(([1, 1, 3], vec![3])));
    assert!(operand.datas().is_empty());

    let graph = relu_graph(vec![2, -1, 8, 8])?;
    let operand = graph.operand("1").expect("operand exists");
    assert_eq!(operand.batch(), Some(2));
    assert!(operand.sample_shape().is_none());
    assert!(operand.datas().is_empty());
    Ok(())
}

#[test]
fn rejects_unsupported_ranks() -> Result<()> {
    for shape in [vec![1, 2, 3, 4, 5], vec![3]] {
        let desc = common::single_op_desc(NodeDesc::new("nn.ReLU", "relu"), shape.clone(), shape);
        let mut graph = RuntimeGraph::from_desc(desc);
        let err = graph.build(INPUT, OUTPUT).expect_err("unsupported rank");
        assert!(matches!(err, GraphError::UnsupportedShape { .. }), "{err}");
    }
    Ok(())
}

#[test]
fn operand_records_producer_and_consumers() -> Result<()> {
    let graph = relu_graph(vec![1, 4])?;
    let input = graph.operand("0").expect("input operand");
    let producer = input.producer().expect("input has a producer");
    assert_eq!(graph.nodes()[producer].name(), INPUT);
    let consumers = input
        .consumers()
        .iter()
        .map(|&id| graph.nodes()[id].name())
        .collect::<Vec<_>>();
    assert_eq!(consumers, vec!["relu"]);
    assert!(graph.operand("missing").is_none());
    Ok(())
}

#[test]
fn allocate_is_idempotent() -> Result<()> {
    let mut operand = Operand::new("x", vec![3, 2, 4]);
    operand.allocate()?;
    operand.allocate()?;
    assert_eq!(operand.datas().len(), 3);
    assert_eq!(operand.sample_shape(), Some(([1, 2, 4], vec![2, 4])));
    for tensor in operand.datas() {
        assert_eq!(tensor.raw_shapes(), &[2, 4]);
    }

    let mut unknown = Operand::new("y", vec![-1, 4]);
    unknown.allocate()?;
    assert!(unknown.datas().is_empty());
    Ok(())
}

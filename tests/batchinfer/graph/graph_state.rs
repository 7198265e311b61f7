use anyhow::Result;
use batchinfer::{GraphError, GraphState, ModelDesc, NodeDesc, ParseError, RuntimeGraph, Tensor};

use crate::common::{self, INPUT, OUTPUT};

fn relu_desc() -> ModelDesc {
    common::single_op_desc(NodeDesc::new("nn.ReLU", "relu"), vec![1, 4], vec![1, 4])
}

#[test]
fn graph_state_transitions() -> Result<()> {
    let mut graph = RuntimeGraph::from_desc(relu_desc());
    assert_eq!(graph.graph_state(), GraphState::Uninitialized);

    graph.init()?;
    assert_eq!(graph.graph_state(), GraphState::Initialized);
    graph.init()?;
    assert_eq!(graph.graph_state(), GraphState::Initialized);

    graph.build(INPUT, OUTPUT)?;
    assert_eq!(graph.graph_state(), GraphState::Built);
    assert_eq!(graph.input_name(), Some(INPUT));
    assert_eq!(graph.output_name(), Some(OUTPUT));
    Ok(())
}

#[test]
fn graph_build_runs_init() -> Result<()> {
    let mut graph = RuntimeGraph::from_desc(relu_desc());
    graph.build(INPUT, OUTPUT)?;
    assert_eq!(graph.graph_state(), GraphState::Built);
    assert!(graph.node("relu").and_then(|node| node.layer()).is_some());
    assert!(graph.node(INPUT).and_then(|node| node.layer()).is_none());
    Ok(())
}

#[test]
fn graph_second_build_is_noop() -> Result<()> {
    let mut graph = common::build_desc(relu_desc())?;
    let order = graph
        .topo_order()
        .iter()
        .map(|name| name.to_string())
        .collect::<Vec<_>>();

    graph.build(INPUT, OUTPUT)?;
    graph.build("relu", OUTPUT)?;
    assert_eq!(graph.graph_state(), GraphState::Built);
    assert_eq!(graph.input_name(), Some(INPUT));
    assert_eq!(graph.topo_order(), order);
    Ok(())
}

#[test]
fn graph_forward_requires_build() -> Result<()> {
    let mut graph = RuntimeGraph::from_desc(relu_desc());
    graph.init()?;
    let err = graph
        .forward(&[Tensor::new_1d(4)], false)
        .expect_err("forward before build must fail");
    assert!(matches!(
        err,
        GraphError::InvalidState {
            expected: GraphState::Built,
            found: GraphState::Initialized
        }
    ));
    Ok(())
}

#[test]
fn graph_unregistered_operator_fails_init() -> Result<()> {
    let op = NodeDesc::new("nn.Mystery", "mystery");
    let desc = common::single_op_desc(op, vec![1, 4], vec![1, 4]);
    let mut graph = RuntimeGraph::from_desc(desc);
    let err = graph.init().expect_err("unknown op type must fail");
    assert!(matches!(
        err,
        GraphError::UnregisteredOperator { ref node, ref op_type }
            if node == "mystery" && op_type == "nn.Mystery"
    ));
    assert_eq!(graph.graph_state(), GraphState::Uninitialized);

    let err = graph
        .build(INPUT, OUTPUT)
        .expect_err("build must surface init failure");
    assert!(matches!(err, GraphError::UnregisteredOperator { .. }));
    assert_eq!(graph.graph_state(), GraphState::Uninitialized);
    Ok(())
}

#[test]
fn graph_layer_creation_failure_fails_init() -> Result<()> {
    let flatten = NodeDesc::new("torch.flatten", "flatten").param("start_dim", common::int(1));
    let desc = common::single_op_desc(flatten, vec![1, 2, 3, 4], vec![1, 24]);
    let mut graph = RuntimeGraph::from_desc(desc);
    let err = graph.init().expect_err("missing end_dim must fail");
    assert!(matches!(
        err,
        GraphError::LayerCreation {
            source: ParseError::MissingDim,
            ..
        }
    ));
    assert_eq!(graph.graph_state(), GraphState::Uninitialized);
    Ok(())
}

#[test]
fn graph_rejects_duplicate_nodes_and_multi_outputs() -> Result<()> {
    let mut desc = relu_desc();
    desc.nodes.push(
        NodeDesc::new("nn.ReLU", "relu")
            .input("1", vec![1, 4])
            .output("2", vec![1, 4]),
    );
    let err = RuntimeGraph::from_desc(desc).init().expect_err("duplicate name");
    assert!(matches!(err, GraphError::DuplicateNode(ref name) if name == "relu"));

    let split = NodeDesc::new("nn.ReLU", "relu")
        .output("a", vec![1, 4])
        .output("b", vec![1, 4]);
    let desc = ModelDesc {
        nodes: vec![common::input_node("0", vec![1, 4]), split.input("0", vec![1, 4])],
    };
    let err = RuntimeGraph::from_desc(desc).init().expect_err("two outputs");
    assert!(matches!(err, GraphError::UnsupportedOutputs { count: 2, .. }));
    Ok(())
}

#[test]
fn graph_build_with_unknown_node_keeps_initialized() -> Result<()> {
    let mut graph = RuntimeGraph::from_desc(relu_desc());
    let err = graph.build("missing", OUTPUT).expect_err("unknown input node");
    assert!(matches!(err, GraphError::MissingNode(ref name) if name == "missing"));
    assert_eq!(graph.graph_state(), GraphState::Initialized);

    graph.build(INPUT, OUTPUT)?;
    assert_eq!(graph.graph_state(), GraphState::Built);
    Ok(())
}

#[test]
fn graph_empty_description_fails() -> Result<()> {
    let mut graph = RuntimeGraph::from_desc(ModelDesc::default());
    assert!(matches!(graph.init(), Err(GraphError::Load(_))));
    assert_eq!(graph.graph_state(), GraphState::Uninitialized);
    Ok(())
}

use std::collections::HashMap;

use anyhow::Result;
use batchinfer::{GraphError, ModelDesc, NodeDesc, RuntimeGraph};

use crate::common::{self, INPUT, OUTPUT};

/// input -> (relu, sigmoid) -> add -> output
fn diamond_nodes() -> Vec<NodeDesc> {
    let shape = vec![1, 2, 2, 2];
    vec![
        common::input_node("x", shape.clone()),
        NodeDesc::new("nn.ReLU", "relu")
            .input("x", shape.clone())
            .output("a", shape.clone()),
        NodeDesc::new("nn.Sigmoid", "sigmoid")
            .input("x", shape.clone())
            .output("b", shape.clone()),
        NodeDesc::new("pnnx.Expression", "add")
            .param("expr", common::string("add(@0,@1)"))
            .input("a", shape.clone())
            .input("b", shape.clone())
            .output("y", shape.clone()),
        common::output_node("y", shape),
    ]
}

fn assert_respects_edges(graph: &RuntimeGraph) -> Result<()> {
    let order = graph.topo_order();
    assert_eq!(order.len(), graph.nodes().len());
    let position = order
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.to_string(), idx))
        .collect::<HashMap<_, _>>();
    assert_eq!(position.len(), order.len());
    for node in graph.nodes() {
        for input in node.input_names() {
            let operand = graph
                .operand(input)
                .ok_or_else(|| anyhow::anyhow!("missing operand {}", input))?;
            let producer = &graph.nodes()[operand.producer().unwrap()];
            assert!(position[producer.name()] < position[node.name()]);
        }
    }
    Ok(())
}

fn relu() -> NodeDesc {
    NodeDesc::new("nn.ReLU", "relu")
}

#[test]
fn topo_order_follows_declaration_on_ties() -> Result<()> {
    let graph = common::build_desc(ModelDesc {
        nodes: diamond_nodes(),
    })?;
    assert_eq!(
        graph.topo_order(),
        vec![INPUT, "relu", "sigmoid", "add", OUTPUT]
    );
    assert_respects_edges(&graph)
}

#[test]
fn topo_order_handles_reverse_declaration() -> Result<()> {
    let mut nodes = diamond_nodes();
    nodes.reverse();
    let graph = common::build_desc(ModelDesc { nodes })?;
    assert_eq!(graph.topo_order().first(), Some(&INPUT));
    assert_eq!(graph.topo_order().last(), Some(&OUTPUT));
    assert_respects_edges(&graph)
}

#[test]
fn topo_records_consumers() -> Result<()> {
    let graph = common::build_desc(ModelDesc {
        nodes: diamond_nodes(),
    })?;
    let x = graph.operand("x").unwrap();
    let consumers = x
        .consumers()
        .iter()
        .map(|&id| graph.nodes()[id].name())
        .collect::<Vec<_>>();
    assert_eq!(consumers, vec!["relu", "sigmoid"]);
    Ok(())
}

#[test]
fn build_rejects_cycles() -> Result<()> {
    let shape = vec![1, 4];
    let desc = ModelDesc {
        nodes: vec![
            common::input_node("x", shape.clone()),
            NodeDesc::new("pnnx.Expression", "a")
                .param("expr", common::string("add(@0,@1)"))
                .input("x", shape.clone())
                .input("b_out", shape.clone())
                .output("a_out", shape.clone()),
            NodeDesc::new("nn.ReLU", "b")
                .input("a_out", shape.clone())
                .output("b_out", shape.clone()),
            common::output_node("a_out", shape),
        ],
    };
    let mut graph = RuntimeGraph::from_desc(desc);
    let err = graph.build(INPUT, OUTPUT).expect_err("cycle must be rejected");
    assert!(matches!(err, GraphError::Cycle));
    Ok(())
}

#[test]
fn build_rejects_missing_and_duplicate_producers() -> Result<()> {
    let shape = vec![1, 4];
    let desc = common::single_op_desc(relu(), shape.clone(), shape.clone());
    let mut nodes = desc.nodes;
    nodes.insert(
        2,
        NodeDesc::new("nn.Sigmoid", "orphan")
            .input("nowhere", shape.clone())
            .output("2", shape.clone()),
    );
    let err = RuntimeGraph::from_desc(ModelDesc { nodes })
        .build(INPUT, OUTPUT)
        .expect_err("missing producer");
    assert!(matches!(
        err,
        GraphError::MissingProducer { ref node, ref operand }
            if node == "orphan" && operand == "nowhere"
    ));

    let desc = common::single_op_desc(relu(), shape.clone(), shape.clone());
    let mut nodes = desc.nodes;
    nodes.insert(
        2,
        NodeDesc::new("nn.Sigmoid", "twin")
            .input("0", shape.clone())
            .output("1", shape),
    );
    let err = RuntimeGraph::from_desc(ModelDesc { nodes })
        .build(INPUT, OUTPUT)
        .expect_err("duplicate producer");
    assert!(matches!(
        err,
        GraphError::DuplicateProducer { ref first, ref second, .. }
            if first == "relu" && second == "twin"
    ));
    Ok(())
}

#[test]
fn build_rejects_dangling_nodes() -> Result<()> {
    let shape = vec![1, 4];
    let mut desc = common::single_op_desc(relu(), shape.clone(), shape.clone());
    desc.nodes.push(
        NodeDesc::new("nn.Sigmoid", "dangling")
            .input("0", shape.clone())
            .output("unused", shape),
    );
    let err = RuntimeGraph::from_desc(desc)
        .build(INPUT, OUTPUT)
        .expect_err("dangling node");
    assert!(matches!(err, GraphError::Disconnected(ref name) if name == "dangling"));
    Ok(())
}

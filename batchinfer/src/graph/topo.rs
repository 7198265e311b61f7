use std::collections::VecDeque;

use crate::graph::node::{NodeId, OperatorNode};

/// Kahn ordering over `consumers` edges.
///
/// Zero in-degree nodes are seeded in declaration order and consumers are
/// released in the order they were recorded. Returns `None` on a cycle.
pub(crate) fn topo_sort(nodes: &[OperatorNode]) -> Option<Vec<NodeId>> {
    let n = nodes.len();
    let mut in_degree = vec![0usize; n];
    for node in nodes {
        for &consumer in &node.consumers {
            in_degree[consumer] += 1;
        }
    }

    let mut queue = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| id)
        .collect::<VecDeque<_>>();
    let mut order = Vec::with_capacity(n);
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for &consumer in &nodes[id].consumers {
            in_degree[consumer] -= 1;
            if in_degree[consumer] == 0 {
                queue.push_back(consumer);
            }
        }
    }

    if order.len() == n {
        Some(order)
    } else {
        None
    }
}

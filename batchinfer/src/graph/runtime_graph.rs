//! Executable operator graph.
//!
//! A [`RuntimeGraph`] moves through three states. `init` turns the model
//! description into [`OperatorNode`]s and resolves one layer per node through
//! the [`LayerRegistry`]. `build` wires operands between producers and
//! consumers, computes the execution order and pre-allocates operand slots.
//! `forward` then runs every layer once per call over the whole batch.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use rayon::ThreadPool;

use crate::graph::desc::ModelDesc;
use crate::graph::error::{GraphError, GraphState};
use crate::graph::node::{NodeId, OperandId, OperatorNode};
use crate::graph::operand::Operand;
use crate::graph::pnnx::ModelLoader;
use crate::graph::topo::topo_sort;
use crate::layer::InferError;
use crate::registry::{builtin_registry, LayerRegistry};
use crate::runtime::{log_trace_event, GraphConfig, TraceEvent};
use crate::tensor::Tensor;

enum GraphSource {
    Files { param: PathBuf, bin: PathBuf },
    Desc(ModelDesc),
}

pub struct RuntimeGraph {
    source: GraphSource,
    registry: Arc<LayerRegistry>,
    config: GraphConfig,
    pool: Option<ThreadPool>,
    state: GraphState,
    nodes: Vec<OperatorNode>,
    node_ids: HashMap<String, NodeId>,
    operands: Vec<Operand>,
    operand_ids: HashMap<String, OperandId>,
    input_node: Option<NodeId>,
    output_node: Option<NodeId>,
    topo: Vec<NodeId>,
    trace: Vec<TraceEvent>,
}

impl RuntimeGraph {
    /// Graph loaded from a `.param` / `.bin` pair when `init` runs.
    pub fn new(param_path: impl Into<PathBuf>, bin_path: impl Into<PathBuf>) -> Self {
        Self::with_source(GraphSource::Files {
            param: param_path.into(),
            bin: bin_path.into(),
        })
    }

    /// Graph built from an in-memory description.
    pub fn from_desc(desc: ModelDesc) -> Self {
        Self::with_source(GraphSource::Desc(desc))
    }

    fn with_source(source: GraphSource) -> Self {
        Self {
            source,
            registry: builtin_registry(),
            config: GraphConfig::default(),
            pool: None,
            state: GraphState::Uninitialized,
            nodes: Vec::new(),
            node_ids: HashMap::new(),
            operands: Vec::new(),
            operand_ids: HashMap::new(),
            input_node: None,
            output_node: None,
            topo: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<LayerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph_state(&self) -> GraphState {
        self.state
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Create nodes and resolve their layers.
    ///
    /// On failure the graph stays `Uninitialized`. Calling `init` on an
    /// initialized graph does nothing.
    pub fn init(&mut self) -> Result<(), GraphError> {
        if self.state != GraphState::Uninitialized {
            return Ok(());
        }
        self.init_nodes().map_err(|err| {
            match &err {
                GraphError::UnregisteredOperator { .. } => crate::critical!(init, "{}", err),
                _ => crate::error!(init, "{}", err),
            }
            err
        })
    }

    fn init_nodes(&mut self) -> Result<(), GraphError> {
        let desc = match &self.source {
            GraphSource::Files { param, bin } => ModelLoader::open(param, bin)?.into_desc(),
            GraphSource::Desc(desc) => desc.clone(),
        };
        if desc.nodes.is_empty() {
            return Err(anyhow::anyhow!("model description has no nodes").into());
        }

        let mut nodes = Vec::with_capacity(desc.nodes.len());
        let mut node_ids = HashMap::with_capacity(desc.nodes.len());
        for node_desc in desc.nodes {
            if node_ids.contains_key(&node_desc.name) {
                return Err(GraphError::DuplicateNode(node_desc.name));
            }
            let outputs = node_desc.outputs.len();
            let mut node = OperatorNode::from_desc(node_desc);
            if outputs > 1 || (!node.is_passthrough() && outputs != 1) {
                return Err(GraphError::UnsupportedOutputs {
                    node: node.name().to_string(),
                    count: outputs,
                });
            }
            if !node.is_passthrough() {
                let layer = match self.registry.create(&node) {
                    None => {
                        return Err(GraphError::UnregisteredOperator {
                            node: node.name().to_string(),
                            op_type: node.op_type().to_string(),
                        })
                    }
                    Some(result) => result.map_err(|source| GraphError::LayerCreation {
                        node: node.name().to_string(),
                        op_type: node.op_type().to_string(),
                        source,
                    })?,
                };
                node.layer = Some(layer);
            }
            node_ids.insert(node.name().to_string(), nodes.len());
            nodes.push(node);
        }

        if self.pool.is_none() {
            self.pool = self.config.build_pool()?;
        }
        crate::trace!(init, "{} nodes", nodes.len());
        self.nodes = nodes;
        self.node_ids = node_ids;
        self.state = GraphState::Initialized;
        Ok(())
    }

    /// Wire edges, order nodes and allocate operands.
    ///
    /// Runs `init` first if needed. Building an already built graph does
    /// nothing.
    pub fn build(&mut self, input: &str, output: &str) -> Result<(), GraphError> {
        if self.state == GraphState::Built {
            if self.input_name() != Some(input) || self.output_name() != Some(output) {
                crate::warning!(
                    build,
                    "graph already built for {:?} -> {:?}; ignoring {} -> {}",
                    self.input_name(),
                    self.output_name(),
                    input,
                    output
                );
            }
            return Ok(());
        }
        self.init()?;
        self.build_edges(input, output).map_err(|err| {
            crate::error!(build, "{}", err);
            err
        })
    }

    fn build_edges(&mut self, input: &str, output: &str) -> Result<(), GraphError> {
        let input_id = self.node_id(input)?;
        let output_id = self.node_id(output)?;

        for node in &mut self.nodes {
            node.inputs.clear();
            node.output = None;
            node.consumers.clear();
        }
        let mut operands: Vec<Operand> = Vec::new();
        let mut operand_ids: HashMap<String, OperandId> = HashMap::new();

        for id in 0..self.nodes.len() {
            let Some(name) = self.nodes[id].output_name().map(str::to_string) else {
                continue;
            };
            if let Some(&existing) = operand_ids.get(&name) {
                let first = operands[existing]
                    .producer
                    .map(|producer| self.nodes[producer].name().to_string())
                    .unwrap_or_default();
                return Err(GraphError::DuplicateProducer {
                    operand: name,
                    first,
                    second: self.nodes[id].name().to_string(),
                });
            }
            let mut operand = Operand::new(name.clone(), self.nodes[id].output_shape().to_vec());
            operand.producer = Some(id);
            operand_ids.insert(name, operands.len());
            self.nodes[id].output = Some(operands.len());
            operands.push(operand);
        }

        for id in 0..self.nodes.len() {
            let names = self.nodes[id].input_names().to_vec();
            for name in names {
                let operand_id = *operand_ids.get(&name).ok_or_else(|| {
                    GraphError::MissingProducer {
                        node: self.nodes[id].name().to_string(),
                        operand: name.clone(),
                    }
                })?;
                self.nodes[id].inputs.push(operand_id);
                let operand = &mut operands[operand_id];
                if !operand.consumers.contains(&id) {
                    operand.consumers.push(id);
                }
                if let Some(producer) = operand.producer {
                    let consumers = &mut self.nodes[producer].consumers;
                    if !consumers.contains(&id) {
                        consumers.push(id);
                    }
                }
            }
        }

        let topo = topo_sort(&self.nodes).ok_or(GraphError::Cycle)?;

        for (id, node) in self.nodes.iter().enumerate() {
            if id == input_id || id == output_id {
                continue;
            }
            if node.inputs.is_empty() || node.consumers.is_empty() {
                return Err(GraphError::Disconnected(node.name().to_string()));
            }
        }
        if self.nodes[input_id].output.is_none() {
            return Err(GraphError::Disconnected(input.to_string()));
        }
        let output_node = &self.nodes[output_id];
        if output_node.output.is_none() && output_node.inputs.is_empty() {
            return Err(GraphError::Disconnected(output.to_string()));
        }

        for operand in &mut operands {
            let rank = operand.shape().len();
            if rank == 0 {
                continue;
            }
            if !(2..=4).contains(&rank) {
                return Err(GraphError::UnsupportedShape {
                    operand: operand.name().to_string(),
                    shape: operand.shape().to_vec(),
                });
            }
            operand
                .allocate()
                .with_context(|| format!("allocate operand {}", operand.name()))?;
        }

        crate::trace!(
            build,
            "{} nodes, {} operands, input {} output {}",
            self.nodes.len(),
            operands.len(),
            input,
            output
        );
        self.operands = operands;
        self.operand_ids = operand_ids;
        self.input_node = Some(input_id);
        self.output_node = Some(output_id);
        self.topo = topo;
        self.state = GraphState::Built;
        Ok(())
    }

    fn node_id(&self, name: &str) -> Result<NodeId, GraphError> {
        self.node_ids
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::MissingNode(name.to_string()))
    }

    /// Run every layer in execution order and return the output batch.
    ///
    /// `debug` records a [`TraceEvent`] per executed node; results are the
    /// same either way.
    pub fn forward(
        &mut self,
        inputs: &[Tensor<f32>],
        debug: bool,
    ) -> Result<Vec<Tensor<f32>>, GraphError> {
        if self.state != GraphState::Built {
            return Err(GraphError::InvalidState {
                expected: GraphState::Built,
                found: self.state,
            });
        }
        self.run(inputs, debug).map_err(|err| {
            crate::error!(forward, "{}", err);
            err
        })
    }

    fn run(&mut self, inputs: &[Tensor<f32>], debug: bool) -> Result<Vec<Tensor<f32>>, GraphError> {
        let input_id = self.input_node.ok_or(GraphError::InvalidState {
            expected: GraphState::Built,
            found: self.state,
        })?;
        let output_id = self.output_node.ok_or(GraphError::InvalidState {
            expected: GraphState::Built,
            found: self.state,
        })?;
        self.load_inputs(input_id, inputs)?;

        let record = debug || self.config.trace;
        if record {
            self.trace.clear();
        }
        for pos in 0..self.topo.len() {
            let id = self.topo[pos];
            if id == input_id {
                continue;
            }
            let node = &self.nodes[id];
            let (Some(layer), Some(out_id)) = (node.layer(), node.output) else {
                continue;
            };
            let batch = node
                .inputs
                .first()
                .map(|&operand| self.operands[operand].datas.len())
                .unwrap_or(0);

            let mut outputs = std::mem::take(&mut self.operands[out_id].datas);
            outputs.resize_with(batch, Tensor::empty);
            let input_refs = node
                .inputs
                .iter()
                .map(|&operand| self.operands[operand].datas.as_slice())
                .collect::<Vec<_>>();

            let start = Instant::now();
            let result = match &self.pool {
                Some(pool) => pool.install(|| layer.forward(&input_refs, &mut outputs)),
                None => layer.forward(&input_refs, &mut outputs),
            };
            let elapsed = start.elapsed();
            let result = result.and_then(|_| {
                check_outputs(&self.operands[out_id], &outputs, batch, layer.layer_name())
            });
            self.operands[out_id].datas = outputs;
            result.map_err(|source| GraphError::Infer {
                node: node.name().to_string(),
                source,
            })?;

            if record {
                let event = TraceEvent::new(pos, node.name(), node.op_type(), batch, elapsed);
                if debug {
                    log_trace_event(&event);
                }
                self.trace.push(event);
            }
            crate::trace!(forward, node = node, "batch={}", batch);
        }

        let output = &self.nodes[output_id];
        let result_id = output
            .output
            .or_else(|| output.inputs.first().copied())
            .ok_or_else(|| GraphError::Disconnected(output.name().to_string()))?;
        Ok(self.operands[result_id].datas.clone())
    }

    fn load_inputs(&mut self, input_id: NodeId, inputs: &[Tensor<f32>]) -> Result<(), GraphError> {
        let node = &self.nodes[input_id];
        let operand_id = node
            .output
            .ok_or_else(|| GraphError::Disconnected(node.name().to_string()))?;
        let operand = &mut self.operands[operand_id];
        if let Some(expected) = operand.batch() {
            if expected != inputs.len() {
                return Err(GraphError::BatchMismatch {
                    expected,
                    actual: inputs.len(),
                });
            }
        }
        if let Some((layout, _)) = operand.sample_shape() {
            if let Some(index) = inputs.iter().position(|tensor| tensor.shapes() != layout) {
                return Err(GraphError::Infer {
                    node: node.name().to_string(),
                    source: InferError::InputShapeMismatch {
                        layer: node.name().to_string(),
                        index,
                    },
                });
            }
        }
        operand.datas.resize_with(inputs.len(), Tensor::empty);
        for (slot, input) in operand.datas.iter_mut().zip(inputs) {
            if !slot.copy_from(input) {
                *slot = input.clone();
            }
        }
        Ok(())
    }

    /// Node names in execution order; empty before `build`.
    pub fn topo_order(&self) -> Vec<&str> {
        self.topo
            .iter()
            .map(|&id| self.nodes[id].name())
            .collect()
    }

    pub fn nodes(&self) -> &[OperatorNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&OperatorNode> {
        self.node_ids.get(name).map(|&id| &self.nodes[id])
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut OperatorNode> {
        let id = *self.node_ids.get(name)?;
        self.nodes.get_mut(id)
    }

    pub fn operand(&self, name: &str) -> Option<&Operand> {
        self.operand_ids.get(name).map(|&id| &self.operands[id])
    }

    pub fn input_name(&self) -> Option<&str> {
        self.input_node.map(|id| self.nodes[id].name())
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_node.map(|id| self.nodes[id].name())
    }

    /// Events recorded by the last traced forward.
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    pub fn trace_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(&self.trace).with_context(|| "serialize trace")
    }
}

fn check_outputs(
    operand: &Operand,
    outputs: &[Tensor<f32>],
    batch: usize,
    layer: &str,
) -> Result<(), InferError> {
    let mismatch = |index| InferError::OutputSizeError {
        layer: layer.to_string(),
        index,
    };
    if outputs.len() != batch {
        return Err(mismatch(outputs.len().min(batch)));
    }
    if let Some(expected) = operand.batch() {
        if expected != batch {
            return Err(mismatch(0));
        }
    }
    if let Some((layout, _)) = operand.sample_shape() {
        if let Some(index) = outputs.iter().position(|tensor| tensor.shapes() != layout) {
            return Err(mismatch(index));
        }
    }
    Ok(())
}

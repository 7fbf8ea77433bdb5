//! Inference rule: fills pending layer parameters from what their
//! predecessors produce.
//!
//! Producers form a directed graph: inputs, layers and block exits. A layer
//! is fed by the previous layer of its block; the first layer of a block is
//! fed by inputs targeting the block and by the exits of upstream blocks.
//! A pending parameter takes the dimension every predecessor agrees on.
//!
//! Only accepted entities take part. A walk that reaches a block which lost
//! a layer, a block that was never accepted, or an unfed node while some
//! input was lost ends without a verdict: the rejection already explains it.

use crate::graph::{EntityRef, NetworkDefinition};
use crate::schema::DimKind;
use crate::validation::{Diagnostic, FieldError, ReferenceError, Subject, Violation};
use crate::value::AttrValue;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Producer {
    Input(i64),
    Layer { block: i64, index: i64 },
    BlockExit(i64),
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::Input(id) => write!(f, "Input {}", id),
            Producer::Layer { block, index } => write!(f, "Layer {}.{}", block, index),
            Producer::BlockExit(id) => write!(f, "Block {} exit", id),
        }
    }
}

/// An inferred value ready to be written back into the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub block: i64,
    pub index: i64,
    pub param: String,
    pub value: i64,
}

#[derive(Debug, Default)]
pub struct ProducerGraph {
    graph: DiGraph<Producer, ()>,
    nodes: HashMap<Producer, NodeIndex>,
}

impl ProducerGraph {
    pub fn build(network: &NetworkDefinition) -> Self {
        let mut pg = Self::default();

        for id in network.inputs.keys() {
            pg.node(Producer::Input(*id));
        }

        for (block_id, layers) in &network.layers {
            let upstream = network.blocks.get(block_id).map(|b| b.connections.as_slice()).unwrap_or_default();
            let chain: Vec<Producer> = layers.keys().map(|index| Producer::Layer { block: *block_id, index: *index }).collect();
            for pair in chain.windows(2) {
                pg.connect(pair[0], pair[1]);
            }
            if let (Some(first), Some(last)) = (chain.first(), chain.last()) {
                for c in upstream {
                    pg.connect(Producer::BlockExit(*c), *first);
                }
                pg.connect(*last, Producer::BlockExit(*block_id));
            }
        }

        for block in network.blocks.values() {
            if network.block_layers(block.id).next().is_some() {
                continue;
            }
            let exit = Producer::BlockExit(block.id);
            pg.node(exit);
            match block.subblocks.last() {
                Some(last) => pg.connect(Producer::BlockExit(*last), exit),
                None => {
                    for c in &block.connections {
                        pg.connect(Producer::BlockExit(*c), exit);
                    }
                }
            }
        }

        for input in network.inputs.values() {
            for target in &input.connections {
                let consumer = match *target {
                    EntityRef::Layer { block, index } => Producer::Layer { block, index },
                    EntityRef::Block(block) => match network.block_layers(block).next() {
                        Some(first) => Producer::Layer { block, index: first.index },
                        None => Producer::BlockExit(block),
                    },
                    _ => continue,
                };
                pg.connect(Producer::Input(input.id), consumer);
            }
        }

        pg
    }

    fn node(&mut self, producer: Producer) -> NodeIndex {
        *self.nodes.entry(producer).or_insert_with(|| self.graph.add_node(producer))
    }

    fn connect(&mut self, from: Producer, to: Producer) {
        let (a, b) = (self.node(from), self.node(to));
        self.graph.update_edge(a, b, ());
    }

    /// Direct predecessors, sorted.
    pub fn predecessors(&self, producer: Producer) -> Vec<Producer> {
        let Some(idx) = self.nodes.get(&producer) else { return Vec::new() };
        let mut preds: Vec<Producer> = self
            .graph
            .neighbors_directed(*idx, Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        preds.sort();
        preds
    }

    pub fn node_count(&self) -> usize { self.graph.node_count() }
}

/// Why a walk failed, and where.
#[derive(Debug, Clone, PartialEq)]
enum WalkError {
    NoProducer(Producer),
    Cycle(Vec<Producer>),
    TooDeep(Vec<Producer>),
    Ambiguous(Producer, Vec<(Producer, i64)>),
    /// The producers upstream of this node are not all known.
    Unknown(Producer),
}

struct Walker<'a> {
    network: &'a NetworkDefinition,
    graph: &'a ProducerGraph,
    max_depth: usize,
    memo: HashMap<(Producer, DimKind), i64>,
    stack: Vec<Producer>,
}

impl<'a> Walker<'a> {
    /// The dimension flowing into `node`.
    fn incoming(&mut self, node: Producer, kind: DimKind) -> Result<i64, WalkError> {
        if let Some(value) = self.memo.get(&(node, kind)) {
            return Ok(*value);
        }
        if self.unknown(node) {
            return Err(WalkError::Unknown(node));
        }
        if let Some(pos) = self.stack.iter().position(|p| *p == node) {
            let mut path = self.stack[pos..].to_vec();
            path.push(node);
            return Err(WalkError::Cycle(path));
        }
        // The stack never holds a node twice, so it stays below the node count
        // on its own; the limit only caps recursion on very large graphs.
        if self.stack.len() >= self.max_depth {
            let mut path = self.stack.clone();
            path.push(node);
            return Err(WalkError::TooDeep(path));
        }

        self.stack.push(node);
        let result = self.gather(node, kind);
        self.stack.pop();

        if let Ok(value) = result {
            self.memo.insert((node, kind), value);
        }
        result
    }

    /// Whether the accepted entities cannot tell what feeds `node`.
    fn unknown(&self, node: Producer) -> bool {
        match node {
            Producer::Input(_) => false,
            Producer::Layer { block, .. } | Producer::BlockExit(block) => {
                !self.network.blocks.contains_key(&block) || self.network.is_incomplete(block)
            }
        }
    }

    fn gather(&mut self, node: Producer, kind: DimKind) -> Result<i64, WalkError> {
        let preds = self.graph.predecessors(node);
        if preds.is_empty() {
            return Err(if self.network.lost_inputs() { WalkError::Unknown(node) } else { WalkError::NoProducer(node) });
        }

        let mut candidates: SmallVec<[(Producer, i64); 4]> = SmallVec::new();
        for pred in preds {
            let value = self.output(pred, kind)?;
            candidates.push((pred, value));
        }

        let first = candidates[0].1;
        if candidates.iter().all(|(_, v)| *v == first) {
            Ok(first)
        } else {
            Err(WalkError::Ambiguous(node, candidates.into_vec()))
        }
    }

    /// The dimension `node` produces.
    fn output(&mut self, node: Producer, kind: DimKind) -> Result<i64, WalkError> {
        match node {
            Producer::Input(id) => {
                let shape = self.network.inputs.get(&id).map(|i| i.shape.as_slice()).unwrap_or_default();
                let dim = match kind {
                    DimKind::Features => shape.last(),
                    DimKind::Channels => shape.first(),
                };
                dim.and_then(AttrValue::as_int).ok_or(WalkError::NoProducer(node))
            }
            Producer::Layer { block, index } => {
                let layer = self.network.layer(block, index).ok_or(WalkError::Unknown(node))?;
                if let Some(dim) = layer.declared_output() {
                    return Ok(dim);
                }
                // Normalization layers hand their own input dimension on.
                match layer.param_int(layer.layer_type.input_param()) {
                    Some(dim) => Ok(dim),
                    None => self.incoming(node, layer.layer_type.input_dim_kind()),
                }
            }
            Producer::BlockExit(_) => self.incoming(node, kind),
        }
    }
}

/// Resolves every pending layer parameter. Failures are reported on the
/// layer that owns the parameter; a failure that belongs to another pending
/// layer upstream is reported there only.
pub fn infer(network: &NetworkDefinition, max_depth: usize) -> (Vec<Resolution>, Vec<Diagnostic>) {
    let graph = ProducerGraph::build(network);
    let mut walker = Walker { network, graph: &graph, max_depth, memo: HashMap::new(), stack: Vec::new() };
    let mut resolutions = Vec::new();
    let mut diagnostics = Vec::new();

    for layer in network.all_layers() {
        let me = Producer::Layer { block: layer.block_id, index: layer.index };
        let subject = Subject::layer(layer.block_id, layer.index);
        let input_param = layer.layer_type.input_param();

        for (name, slot) in &layer.params {
            if !slot.is_pending() {
                continue;
            }
            let field = format!("params.{}", name);
            if name != input_param {
                diagnostics.push(Diagnostic::new(subject.clone(), FieldError::MissingRequired { field }));
                continue;
            }

            match walker.incoming(me, layer.layer_type.input_dim_kind()) {
                Ok(value) => resolutions.push(Resolution {
                    block: layer.block_id,
                    index: layer.index,
                    param: name.clone(),
                    value,
                }),
                Err(err) => {
                    if let Some(violation) = describe(me, &field, err, max_depth) {
                        diagnostics.push(Diagnostic { subject: subject.clone(), violation });
                    }
                }
            }
        }
    }

    (resolutions, diagnostics)
}

fn owned_elsewhere(me: Producer, at: Producer) -> bool { matches!(at, Producer::Layer { .. }) && at != me }

fn describe(me: Producer, field: &str, err: WalkError, max_depth: usize) -> Option<Violation> {
    let labels = |path: &[Producer]| path.iter().map(ToString::to_string).collect::<Vec<_>>();
    let field = field.to_string();
    let violation: Violation = match err {
        WalkError::NoProducer(at) if owned_elsewhere(me, at) => return None,
        WalkError::NoProducer(_) => FieldError::MissingRequired { field }.into(),
        WalkError::Ambiguous(at, _) if owned_elsewhere(me, at) => return None,
        WalkError::Ambiguous(_, candidates) => ReferenceError::AmbiguousInference {
            field,
            candidates: candidates.iter().map(|(p, v)| format!("{}={}", p, v)).collect(),
        }
        .into(),
        WalkError::Cycle(path) => ReferenceError::CyclicInference { field, path: labels(&path) }.into(),
        WalkError::TooDeep(path) => ReferenceError::InferenceTooDeep { field, limit: max_depth, path: labels(&path) }.into(),
        WalkError::Unknown(_) => return None,
    };
    Some(violation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Block, EntityAttrs, Input, Layer};
    use crate::schema::LayerType;
    use crate::validation::{FieldTable, Slot};

    fn layer(block: i64, index: i64, ty: LayerType, params: &[(&str, Option<i64>)]) -> Layer {
        let params: FieldTable = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.map_or(Slot::Pending, |v| Slot::Value(AttrValue::Int(v)))))
            .collect();
        Layer {
            block_id: block,
            index,
            layer_type: ty,
            skip_connections: vec![],
            flags: vec![],
            params,
            attrs: EntityAttrs::default(),
        }
    }

    fn block(id: i64, connections: Vec<i64>) -> Block {
        Block { id, block_type: 0, connections, subblocks: vec![], flags: vec![], attrs: EntityAttrs::default() }
    }

    fn network(blocks: Vec<Block>, layers: Vec<Layer>) -> NetworkDefinition {
        let mut net = NetworkDefinition::new();
        for b in blocks {
            net.blocks.insert(b.id, b);
        }
        for l in layers {
            net.layers.entry(l.block_id).or_default().insert(l.index, l);
        }
        net
    }

    fn kinds(diagnostics: &[Diagnostic]) -> Vec<&'static str> {
        diagnostics.iter().map(|d| d.violation.kind_name()).collect()
    }

    #[test]
    fn test_previous_layer_feeds_the_next() {
        let net = network(
            vec![block(0, vec![])],
            vec![
                layer(0, 0, LayerType::Linear, &[("out_features", Some(64)), ("in_features", Some(10))]),
                layer(0, 1, LayerType::Linear, &[("out_features", Some(32)), ("in_features", None)]),
            ],
        );
        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(diagnostics.is_empty());
        assert_eq!(resolutions, vec![Resolution { block: 0, index: 1, param: "in_features".into(), value: 64 }]);
    }

    #[test]
    fn test_lonely_layer_has_no_producer() {
        let net = network(
            vec![block(0, vec![])],
            vec![layer(0, 0, LayerType::Linear, &[("out_features", Some(64)), ("in_features", None)])],
        );
        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(resolutions.is_empty());
        assert_eq!(kinds(&diagnostics), vec!["MissingRequired"]);
        assert_eq!(diagnostics[0].code(), "02-0.0-params.in_features");
    }

    #[test]
    fn test_input_shape_feeds_first_layer_by_dimension_kind() {
        let mut net = network(
            vec![block(0, vec![]), block(1, vec![])],
            vec![
                layer(0, 0, LayerType::Linear, &[("out_features", Some(8)), ("in_features", None)]),
                layer(1, 0, LayerType::Conv2d, &[("out_channels", Some(8)), ("in_channels", None)]),
            ],
        );
        for (id, target) in [(0, 0), (1, 1)] {
            net.inputs.insert(
                id,
                Input {
                    id,
                    shape: vec![AttrValue::Int(3), AttrValue::Int(28)],
                    connections: vec![EntityRef::Block(target)],
                    attrs: EntityAttrs::default(),
                },
            );
        }
        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(diagnostics.is_empty());
        let values: Vec<_> = resolutions.iter().map(|r| (r.block, r.value)).collect();
        assert_eq!(values, vec![(0, 28), (1, 3)]);
    }

    #[test]
    fn test_norm_layer_passes_dimension_through_and_across_blocks() {
        let net = network(
            vec![block(0, vec![]), block(1, vec![0])],
            vec![
                layer(0, 0, LayerType::Lstm, &[("hidden_size", Some(16)), ("input_size", Some(4))]),
                layer(0, 1, LayerType::BatchNorm1d, &[("num_features", None)]),
                layer(1, 0, LayerType::Linear, &[("out_features", Some(2)), ("in_features", None)]),
            ],
        );
        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(resolutions.iter().map(|r| r.value).collect::<Vec<_>>(), vec![16, 16]);
    }

    #[test]
    fn test_disagreeing_predecessors_are_ambiguous() {
        let net = network(
            vec![block(0, vec![]), block(1, vec![]), block(2, vec![0, 1])],
            vec![
                layer(0, 0, LayerType::Linear, &[("out_features", Some(8)), ("in_features", Some(1))]),
                layer(1, 0, LayerType::Linear, &[("out_features", Some(9)), ("in_features", Some(1))]),
                layer(2, 0, LayerType::Linear, &[("out_features", Some(2)), ("in_features", None)]),
            ],
        );
        let (_, diagnostics) = infer(&net, 64);
        assert_eq!(kinds(&diagnostics), vec!["AmbiguousInference"]);
        let message = diagnostics[0].violation.to_string();
        assert!(message.contains("Block 0 exit=8") && message.contains("Block 1 exit=9"), "{}", message);
    }

    #[test]
    fn test_cycle_of_pass_through_layers_is_reported() {
        let net = network(
            vec![block(0, vec![1]), block(1, vec![0])],
            vec![
                layer(0, 0, LayerType::BatchNorm1d, &[("num_features", None)]),
                layer(1, 0, LayerType::GroupNorm, &[("num_groups", Some(2)), ("num_features", None)]),
            ],
        );
        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(resolutions.is_empty());
        assert_eq!(kinds(&diagnostics), vec!["CyclicInference", "CyclicInference"]);
    }

    #[test]
    fn test_depth_limit_has_its_own_violation() {
        // Block 0 holds the producer, blocks 1..=5 are empty pass-throughs, block 6 consumes.
        let blocks: Vec<Block> = (0..7).map(|id| block(id, if id == 0 { vec![] } else { vec![id - 1] })).collect();
        let net = network(
            blocks,
            vec![
                layer(0, 0, LayerType::Linear, &[("out_features", Some(4)), ("in_features", Some(4))]),
                layer(6, 0, LayerType::Linear, &[("out_features", Some(2)), ("in_features", None)]),
            ],
        );

        let (resolutions, diagnostics) = infer(&net, 3);
        assert!(resolutions.is_empty());
        assert_eq!(kinds(&diagnostics), vec!["InferenceTooDeep"]);
        assert!(diagnostics[0].violation.to_string().contains("depth limit 3"));

        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(diagnostics.is_empty());
        assert_eq!(resolutions[0].value, 4);
    }

    #[test]
    fn test_chain_of_norm_layers_resolves_in_order() {
        let layers: Vec<Layer> = (0..6)
            .map(|i| match i {
                0 => layer(0, 0, LayerType::Linear, &[("out_features", Some(4)), ("in_features", Some(4))]),
                _ => layer(0, i, LayerType::BatchNorm1d, &[("num_features", None)]),
            })
            .collect();
        let (resolutions, diagnostics) = infer(&network(vec![block(0, vec![])], layers), 2);
        assert!(diagnostics.is_empty());
        assert!(resolutions.iter().all(|r| r.value == 4));
        assert_eq!(resolutions.len(), 5);
    }

    #[test]
    fn test_empty_block_forwards_its_upstream() {
        let net = network(
            vec![block(0, vec![]), block(1, vec![0]), block(2, vec![1])],
            vec![
                layer(0, 0, LayerType::Linear, &[("out_features", Some(12)), ("in_features", Some(1))]),
                layer(2, 0, LayerType::Linear, &[("out_features", Some(2)), ("in_features", None)]),
            ],
        );
        let (resolutions, _) = infer(&net, 64);
        assert_eq!(resolutions[0].value, 12);
    }

    #[test]
    fn test_long_acyclic_chain_fits_the_default_limit() {
        // Block i is fed by block i + 1; only the last block declares a width,
        // so the first walk crosses every block.
        let blocks: Vec<Block> = (0..41).map(|id| block(id, if id == 40 { vec![] } else { vec![id + 1] })).collect();
        let layers: Vec<Layer> = (0..41)
            .map(|id| match id {
                40 => layer(40, 0, LayerType::Linear, &[("out_features", Some(6)), ("in_features", Some(6))]),
                _ => layer(id, 0, LayerType::BatchNorm1d, &[("num_features", None)]),
            })
            .collect();
        let net = network(blocks, layers);

        let (resolutions, diagnostics) = infer(&net, crate::config::DEFAULT_MAX_INFERENCE_DEPTH);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(resolutions.len(), 40);
        assert!(resolutions.iter().all(|r| r.value == 6));
    }

    #[test]
    fn test_walk_into_a_block_that_lost_a_layer_stays_silent() {
        let mut net = network(
            vec![block(0, vec![]), block(1, vec![0])],
            vec![
                layer(0, 0, LayerType::Linear, &[("out_features", Some(8)), ("in_features", Some(8))]),
                layer(0, 2, LayerType::BatchNorm1d, &[("num_features", None)]),
                layer(1, 0, LayerType::Linear, &[("out_features", Some(2)), ("in_features", None)]),
            ],
        );
        net.rejected.insert(EntityRef::Layer { block: 0, index: 1 });

        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(resolutions.is_empty());
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_unrelated_blocks_still_infer_beside_a_rejection() {
        let mut net = network(
            vec![block(0, vec![]), block(1, vec![0])],
            vec![
                layer(0, 0, LayerType::Linear, &[("out_features", Some(8)), ("in_features", Some(8))]),
                layer(1, 0, LayerType::Linear, &[("out_features", Some(2)), ("in_features", None)]),
            ],
        );
        net.rejected.insert(EntityRef::Layer { block: 5, index: 0 });
        net.rejected.insert(EntityRef::MemoryBuffer(0));

        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(diagnostics.is_empty());
        assert_eq!(resolutions, vec![Resolution { block: 1, index: 0, param: "in_features".into(), value: 8 }]);
    }

    #[test]
    fn test_lost_input_silences_an_unfed_layer() {
        let mut net = network(
            vec![block(0, vec![])],
            vec![layer(0, 0, LayerType::Linear, &[("out_features", Some(4)), ("in_features", None)])],
        );
        net.rejected.insert(EntityRef::Input(0));

        let (resolutions, diagnostics) = infer(&net, 64);
        assert!(resolutions.is_empty());
        assert!(diagnostics.is_empty());
    }
}

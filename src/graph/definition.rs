//! definition.rs
//! The network definition: a draft while the builder fills it, frozen once
//! the integrity checker reports nothing.

use super::entity::{AuxEntity, Block, EntityAttrs, EntityRef, Input, Layer, LinkRecord, Output, Reference};
use crate::display::dump;
use crate::schema::EntityCategory;
use crate::validation::{Advisory, Slot, Subject};
use crate::value::AttrValue;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;

/// Every accepted entity of one network, keyed for deterministic enumeration:
/// blocks by id, layers by block then index, the rest by id, links in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkDefinition {
    pub blocks: BTreeMap<i64, Block>,
    pub layers: BTreeMap<i64, BTreeMap<i64, Layer>>,
    pub inputs: BTreeMap<i64, Input>,
    pub outputs: BTreeMap<i64, Output>,
    /// Memory buffers, predictors, comparators, novelty modules, intrinsic
    /// rewards, policy heads and plasticity rule definitions.
    pub aux: BTreeMap<EntityCategory, BTreeMap<i64, AuxEntity>>,
    pub links: Vec<LinkRecord>,
    pub meta: BTreeMap<String, AttrValue>,
    /// Identities that were declared but rejected by the builder. References
    /// to them are not reported again as dangling.
    #[serde(skip)]
    pub(crate) rejected: BTreeSet<EntityRef>,
    /// Categories with at least one entity rejected before its identity
    /// could be read.
    #[serde(skip)]
    pub(crate) unidentified: BTreeSet<EntityCategory>,
    /// Blocks that lost a layer whose index could not be read.
    #[serde(skip)]
    pub(crate) partial_blocks: BTreeSet<i64>,
}

impl NetworkDefinition {
    pub fn new() -> Self { Self::default() }

    pub fn layer(&self, block: i64, index: i64) -> Option<&Layer> { self.layers.get(&block)?.get(&index) }

    /// Layers of one block, ordered by index.
    pub fn block_layers(&self, block: i64) -> impl Iterator<Item = &Layer> {
        self.layers.get(&block).into_iter().flat_map(|l| l.values())
    }

    pub fn all_layers(&self) -> impl Iterator<Item = &Layer> { self.layers.values().flat_map(|l| l.values()) }

    pub fn aux_entities(&self, category: EntityCategory) -> impl Iterator<Item = &AuxEntity> {
        self.aux.get(&category).into_iter().flat_map(|m| m.values())
    }

    /// Whether an accepted entity answers to `target`.
    pub fn contains(&self, target: &EntityRef) -> bool {
        match *target {
            EntityRef::Block(id) => self.blocks.contains_key(&id),
            EntityRef::Layer { block, index } => self.layer(block, index).is_some(),
            EntityRef::Input(id) => self.inputs.contains_key(&id),
            EntityRef::Output(id) => self.outputs.contains_key(&id),
            other => match (self.aux.get(&other.category()), other.plain_id()) {
                (Some(entities), Some(id)) => entities.contains_key(&id),
                _ => false,
            },
        }
    }

    /// Whether the accepted layers of `block` may miss one that was declared.
    pub fn is_incomplete(&self, block: i64) -> bool {
        let span = EntityRef::Layer { block, index: i64::MIN }..=EntityRef::Layer { block, index: i64::MAX };
        self.unidentified.contains(&EntityCategory::Layer)
            || self.partial_blocks.contains(&block)
            || self.rejected.range(span).next().is_some()
    }

    /// Whether some declared input did not make it into the draft.
    pub fn lost_inputs(&self) -> bool {
        self.unidentified.contains(&EntityCategory::Input)
            || self.rejected.iter().any(|r| matches!(r, EntityRef::Input(_)))
    }

    /// Whether `target` was declared at all, accepted or not.
    pub fn declares(&self, target: &EntityRef) -> bool { self.contains(target) || self.rejected.contains(target) }

    pub fn entity_count(&self) -> usize {
        self.blocks.len()
            + self.all_layers().count()
            + self.inputs.len()
            + self.outputs.len()
            + self.aux.values().map(BTreeMap::len).sum::<usize>()
    }

    /// Every entity and link record with its subject, in enumeration order.
    pub fn subjects(&self) -> Vec<(Subject, &EntityAttrs)> {
        let mut out: Vec<(Subject, &EntityAttrs)> = Vec::with_capacity(self.entity_count() + self.links.len());
        out.extend(self.blocks.values().map(|b| (Subject::entity(EntityCategory::Block, b.id), &b.attrs)));
        out.extend(self.all_layers().map(|l| (Subject::layer(l.block_id, l.index), &l.attrs)));
        out.extend(self.inputs.values().map(|i| (Subject::entity(EntityCategory::Input, i.id), &i.attrs)));
        out.extend(self.outputs.values().map(|o| (Subject::entity(EntityCategory::Output, o.id), &o.attrs)));
        for entities in self.aux.values() {
            out.extend(entities.values().map(|e| (Subject::entity(e.category, e.id), &e.attrs)));
        }
        out.extend(
            self.links
                .iter()
                .map(|l| (Subject::Link { kind: l.link.kind(), position: l.position }, &l.attrs)),
        );
        out
    }

    /// Every extracted reference, tagged with the subject holding it.
    pub fn references(&self) -> impl Iterator<Item = (Subject, &Reference)> {
        self.subjects()
            .into_iter()
            .flat_map(|(subject, attrs)| attrs.references.iter().map(move |r| (subject.clone(), r)))
    }

    /// Field or parameter slots still waiting for inference.
    pub fn pending(&self) -> Vec<(Subject, String)> {
        let mut out = Vec::new();
        for (subject, attrs) in self.subjects() {
            for (name, slot) in &attrs.fields {
                if slot.is_pending() {
                    out.push((subject.clone(), name.clone()));
                }
            }
        }
        for layer in self.all_layers() {
            for (name, slot) in &layer.params {
                if slot.is_pending() {
                    out.push((Subject::layer(layer.block_id, layer.index), format!("params.{}", name)));
                }
            }
        }
        out
    }

    /// Writes an inferred value into a pending layer parameter.
    pub(crate) fn resolve_param(&mut self, block: i64, index: i64, param: &str, value: i64) -> bool {
        let Some(layer) = self.layers.get_mut(&block).and_then(|l| l.get_mut(&index)) else { return false };
        match layer.params.get_mut(param) {
            Some(slot) if slot.is_pending() => {
                *slot = Slot::Value(AttrValue::Int(value));
                true
            }
            _ => false,
        }
    }

    pub(crate) fn freeze(mut self, advisories: Vec<Advisory>) -> FrozenNetwork {
        self.rejected.clear();
        self.unidentified.clear();
        self.partial_blocks.clear();
        FrozenNetwork { network: self, advisories }
    }
}

/// A network definition that passed every check. Shared access only.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenNetwork {
    network: NetworkDefinition,
    advisories: Vec<Advisory>,
}

impl FrozenNetwork {
    /// Stable, sorted text rendering. Identical input gives identical text.
    pub fn dump(&self) -> String { dump::render(&self.network) }

    /// Pretty JSON with sorted keys.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(&self.network)?;
        serde_json::to_string_pretty(&value)
    }

    /// Non-fatal notes gathered while building, e.g. extension attributes.
    pub fn advisories(&self) -> &[Advisory] { &self.advisories }

    pub fn into_inner(self) -> NetworkDefinition { self.network }
}

impl Deref for FrozenNetwork {
    type Target = NetworkDefinition;
    fn deref(&self) -> &NetworkDefinition { &self.network }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LayerType;
    use crate::validation::FieldTable;

    fn layer(block: i64, index: i64) -> Layer {
        Layer {
            block_id: block,
            index,
            layer_type: LayerType::Linear,
            skip_connections: vec![],
            flags: vec![],
            params: FieldTable::new(),
            attrs: EntityAttrs::default(),
        }
    }

    #[test]
    fn test_layers_enumerate_by_block_then_index() {
        let mut def = NetworkDefinition::new();
        for (b, i) in [(1, 0), (0, 2), (0, 0)] {
            def.layers.entry(b).or_default().insert(i, layer(b, i));
        }
        let order: Vec<_> = def.all_layers().map(|l| (l.block_id, l.index)).collect();
        assert_eq!(order, vec![(0, 0), (0, 2), (1, 0)]);
        assert!(def.contains(&EntityRef::Layer { block: 0, index: 2 }));
        assert!(!def.contains(&EntityRef::Layer { block: 0, index: 1 }));
    }

    #[test]
    fn test_resolve_param_only_fills_pending_slots() {
        let mut def = NetworkDefinition::new();
        let mut l = layer(0, 0);
        l.params.insert("in_features".into(), Slot::Pending);
        l.params.insert("out_features".into(), Slot::Value(AttrValue::Int(4)));
        def.layers.entry(0).or_default().insert(0, l);

        assert_eq!(def.pending().len(), 1);
        assert!(def.resolve_param(0, 0, "in_features", 8));
        assert!(!def.resolve_param(0, 0, "out_features", 8));
        assert!(def.pending().is_empty());
        assert_eq!(def.layer(0, 0).unwrap().param_int("in_features"), Some(8));
    }

    #[test]
    fn test_rejected_identities_count_as_declared() {
        let mut def = NetworkDefinition::new();
        def.rejected.insert(EntityRef::Predictor(3));
        assert!(!def.contains(&EntityRef::Predictor(3)));
        assert!(def.declares(&EntityRef::Predictor(3)));
    }

    #[test]
    fn test_block_is_incomplete_only_when_it_lost_a_layer() {
        let mut def = NetworkDefinition::new();
        def.rejected.insert(EntityRef::Layer { block: 1, index: 4 });
        def.rejected.insert(EntityRef::Block(2));
        def.partial_blocks.insert(3);
        assert!(!def.is_incomplete(0));
        assert!(def.is_incomplete(1));
        assert!(!def.is_incomplete(2));
        assert!(def.is_incomplete(3));
        assert!(!def.lost_inputs());

        def.unidentified.insert(EntityCategory::Layer);
        def.unidentified.insert(EntityCategory::Input);
        assert!(def.is_incomplete(0));
        assert!(def.lost_inputs());
    }
}

//! entity.rs
//! Typed IR entities. Each one keeps its validated field table, the
//! cross-entity references extracted from it and its extension bag.

use crate::schema::{flags, EntityCategory, LayerType, LinkKind};
use crate::validation::{Extensions, FieldTable, Slot, Subject};
use crate::value::AttrValue;
use serde::Serialize;
use std::fmt;

/// A typed pointer from one entity to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityRef {
    Block(i64),
    Layer { block: i64, index: i64 },
    Input(i64),
    Output(i64),
    MemoryBuffer(i64),
    Predictor(i64),
    Comparator(i64),
    NoveltyModule(i64),
    IntrinsicReward(i64),
    PolicyHead(i64),
    PlasticityRule(i64),
}

impl EntityRef {
    /// Reference to an entity identified by a plain id. Layers need two
    /// coordinates, so `Layer` yields `None`.
    pub fn of(category: EntityCategory, id: i64) -> Option<Self> {
        Some(match category {
            EntityCategory::Block => EntityRef::Block(id),
            EntityCategory::Layer => return None,
            EntityCategory::Input => EntityRef::Input(id),
            EntityCategory::Output => EntityRef::Output(id),
            EntityCategory::MemoryBuffer => EntityRef::MemoryBuffer(id),
            EntityCategory::Predictor => EntityRef::Predictor(id),
            EntityCategory::Comparator => EntityRef::Comparator(id),
            EntityCategory::NoveltyModule => EntityRef::NoveltyModule(id),
            EntityCategory::IntrinsicReward => EntityRef::IntrinsicReward(id),
            EntityCategory::PolicyHead => EntityRef::PolicyHead(id),
            EntityCategory::PlasticityRuleDef => EntityRef::PlasticityRule(id),
        })
    }

    pub fn category(&self) -> EntityCategory {
        match self {
            EntityRef::Block(_) => EntityCategory::Block,
            EntityRef::Layer { .. } => EntityCategory::Layer,
            EntityRef::Input(_) => EntityCategory::Input,
            EntityRef::Output(_) => EntityCategory::Output,
            EntityRef::MemoryBuffer(_) => EntityCategory::MemoryBuffer,
            EntityRef::Predictor(_) => EntityCategory::Predictor,
            EntityRef::Comparator(_) => EntityCategory::Comparator,
            EntityRef::NoveltyModule(_) => EntityCategory::NoveltyModule,
            EntityRef::IntrinsicReward(_) => EntityCategory::IntrinsicReward,
            EntityRef::PolicyHead(_) => EntityCategory::PolicyHead,
            EntityRef::PlasticityRule(_) => EntityCategory::PlasticityRuleDef,
        }
    }

    /// The id of a non-layer reference.
    pub fn plain_id(&self) -> Option<i64> {
        match *self {
            EntityRef::Layer { .. } => None,
            EntityRef::Block(id)
            | EntityRef::Input(id)
            | EntityRef::Output(id)
            | EntityRef::MemoryBuffer(id)
            | EntityRef::Predictor(id)
            | EntityRef::Comparator(id)
            | EntityRef::NoveltyModule(id)
            | EntityRef::IntrinsicReward(id)
            | EntityRef::PolicyHead(id)
            | EntityRef::PlasticityRule(id) => Some(id),
        }
    }

    /// The diagnostic subject naming the referenced entity.
    pub fn subject(&self) -> Subject {
        match (*self, self.plain_id()) {
            (EntityRef::Layer { block, index }, _) => Subject::layer(block, index),
            (other, Some(id)) => Subject::entity(other.category(), id),
            (_, None) => Subject::Graph,
        }
    }

    /// The block a block or layer reference lives in.
    pub fn block_id(&self) -> Option<i64> {
        match self {
            EntityRef::Block(b) | EntityRef::Layer { block: b, .. } => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Layer { block, index } => write!(f, "Layer {}.{}", block, index),
            _ => match self.plain_id() {
                Some(id) => write!(f, "{} {}", self.category(), id),
                None => write!(f, "{}", self.category()),
            },
        }
    }
}

/// A reference found in one of an entity's fields. `field` is the path to
/// it, e.g. `connections[1]` or `shape_references.src`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub field: String,
    pub target: EntityRef,
}

/// The parts every entity carries regardless of category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityAttrs {
    pub fields: FieldTable,
    pub references: Vec<Reference>,
    #[serde(skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl EntityAttrs {
    pub fn get(&self, name: &str) -> Option<&AttrValue> { self.fields.get(name).and_then(Slot::value) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: i64,
    pub block_type: i64,
    /// Upstream blocks feeding this one.
    pub connections: Vec<i64>,
    pub subblocks: Vec<i64>,
    pub flags: Vec<String>,
    pub attrs: EntityAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub block_id: i64,
    pub index: i64,
    pub layer_type: LayerType,
    /// Indices of earlier layers in the same block.
    pub skip_connections: Vec<i64>,
    pub flags: Vec<String>,
    pub params: FieldTable,
    pub attrs: EntityAttrs,
}

impl Layer {
    pub fn param(&self, name: &str) -> Option<&AttrValue> { self.params.get(name).and_then(Slot::value) }

    pub fn param_int(&self, name: &str) -> Option<i64> { self.param(name).and_then(AttrValue::as_int) }

    pub fn has_flag(&self, flag: &str) -> bool { self.flags.iter().any(|f| f == flag) }

    pub fn entity_ref(&self) -> EntityRef { EntityRef::Layer { block: self.block_id, index: self.index } }

    /// The dimension this layer produces, when it declares one itself.
    /// A bidirectional LSTM concatenates both directions; `None` when that
    /// doubling does not fit an `i64`.
    pub fn declared_output(&self) -> Option<i64> {
        let dim = self.param_int(self.layer_type.output_param()?)?;
        if self.layer_type == LayerType::Lstm && self.has_flag(flags::BIDIRECTIONAL) {
            dim.checked_mul(2)
        } else {
            Some(dim)
        }
    }

    /// The declared output parameter whose value cannot be turned into an
    /// output dimension, with that value.
    pub fn overflowing_output(&self) -> Option<(&'static str, i64)> {
        let name = self.layer_type.output_param()?;
        let dim = self.param_int(name)?;
        self.declared_output().is_none().then_some((name, dim))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Input {
    pub id: i64,
    pub shape: Vec<AttrValue>,
    /// Blocks or layers this input feeds.
    pub connections: Vec<EntityRef>,
    pub attrs: EntityAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub id: i64,
    /// Blocks or layers this output reads from.
    pub connections: Vec<EntityRef>,
    pub attrs: EntityAttrs,
}

/// Memory buffers, predictors, comparators, novelty modules, intrinsic
/// rewards, policy heads and plasticity rule definitions share one shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuxEntity {
    pub category: EntityCategory,
    pub id: i64,
    pub attrs: EntityAttrs,
}

/// Endpoints of a link record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Link {
    SignalRoute { source: EntityRef, target: EntityRef },
    RecurrentConnection { from: EntityRef, to: EntityRef },
    ShapeConditional { layer: EntityRef },
}

impl Link {
    pub fn kind(&self) -> LinkKind {
        match self {
            Link::SignalRoute { .. } => LinkKind::SignalRoute,
            Link::RecurrentConnection { .. } => LinkKind::RecurrentConnection,
            Link::ShapeConditional { .. } => LinkKind::ShapeConditional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    /// Index in the input list of its kind.
    pub position: usize,
    pub link: Link,
    pub attrs: EntityAttrs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttrValue;

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(EntityRef::Layer { block: 0, index: 2 }.to_string(), "Layer 0.2");
        assert_eq!(EntityRef::MemoryBuffer(4).to_string(), "MemoryBuffer 4");
        assert_eq!(EntityRef::of(EntityCategory::Layer, 1), None);
        assert_eq!(EntityRef::of(EntityCategory::PlasticityRuleDef, 1).map(|r| r.category()), Some(EntityCategory::PlasticityRuleDef));
    }

    #[test]
    fn test_bidirectional_lstm_doubles_output() {
        let mut layer = Layer {
            block_id: 0,
            index: 0,
            layer_type: LayerType::Lstm,
            skip_connections: vec![],
            flags: vec![],
            params: FieldTable::new(),
            attrs: EntityAttrs::default(),
        };
        layer.params.insert("hidden_size".into(), Slot::Value(AttrValue::Int(32)));
        assert_eq!(layer.declared_output(), Some(32));
        layer.flags.push("bidirectional".into());
        assert_eq!(layer.declared_output(), Some(64));
        assert_eq!(layer.overflowing_output(), None);

        layer.params.insert("hidden_size".into(), Slot::Value(AttrValue::Int(i64::MAX)));
        assert_eq!(layer.declared_output(), None);
        assert_eq!(layer.overflowing_output(), Some(("hidden_size", i64::MAX)));
    }
}

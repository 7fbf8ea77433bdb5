//! raw.rs
//! The input contract: a network description as loose attribute maps.

use crate::schema::{EntityCategory, LinkKind};
use crate::value::{AttrValue, RawAttrs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One network description as delivered by a front-end. Every list is
/// optional in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNetwork {
    pub blocks: Vec<RawAttrs>,
    pub layers: Vec<RawAttrs>,
    pub inputs: Vec<RawAttrs>,
    pub outputs: Vec<RawAttrs>,
    pub memory_buffers: Vec<RawAttrs>,
    pub predictors: Vec<RawAttrs>,
    pub comparators: Vec<RawAttrs>,
    pub novelty_modules: Vec<RawAttrs>,
    pub intrinsic_rewards: Vec<RawAttrs>,
    pub policy_heads: Vec<RawAttrs>,
    pub plasticity_rules: Vec<RawAttrs>,
    pub signal_routes: Vec<RawAttrs>,
    pub recurrent_connections: Vec<RawAttrs>,
    pub shape_conditionals: Vec<RawAttrs>,
    pub meta: BTreeMap<String, AttrValue>,
}

impl RawNetwork {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(s) }

    /// The raw list for an auxiliary category. Blocks, layers, inputs and
    /// outputs have their own fields and yield `None`.
    pub fn aux(&self, category: EntityCategory) -> Option<&[RawAttrs]> {
        let list = match category {
            EntityCategory::MemoryBuffer => &self.memory_buffers,
            EntityCategory::Predictor => &self.predictors,
            EntityCategory::Comparator => &self.comparators,
            EntityCategory::NoveltyModule => &self.novelty_modules,
            EntityCategory::IntrinsicReward => &self.intrinsic_rewards,
            EntityCategory::PolicyHead => &self.policy_heads,
            EntityCategory::PlasticityRuleDef => &self.plasticity_rules,
            _ => return None,
        };
        Some(list)
    }

    pub fn links(&self, kind: LinkKind) -> &[RawAttrs] {
        match kind {
            LinkKind::SignalRoute => &self.signal_routes,
            LinkKind::RecurrentConnection => &self.recurrent_connections,
            LinkKind::ShapeConditional => &self.shape_conditionals,
        }
    }

    /// Number of entities and link records in the description.
    pub fn len(&self) -> usize {
        let aux: usize = EntityCategory::ALL.iter().filter_map(|c| self.aux(*c)).map(<[_]>::len).sum();
        let links: usize = LinkKind::ALL.iter().map(|k| self.links(*k).len()).sum();
        self.blocks.len() + self.layers.len() + self.inputs.len() + self.outputs.len() + aux + links
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_default_to_empty() {
        let raw = RawNetwork::from_json_str(r#"{"layers": [{"block_id": 0, "layer_idx": 0, "type": 1}]}"#).unwrap();
        assert_eq!(raw.len(), 1);
        assert!(raw.blocks.is_empty());
        assert_eq!(raw.layers[0]["type"], AttrValue::Int(1));
        assert!(raw.aux(EntityCategory::Block).is_none());
    }

    #[test]
    fn test_attribute_order_is_preserved() {
        let raw = RawNetwork::from_json_str(r#"{"blocks": [{"z": 1, "a": 2, "id": 0}]}"#).unwrap();
        let keys: Vec<_> = raw.blocks[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "id"]);
    }
}

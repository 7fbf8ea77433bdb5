//! refs.rs
//! Extraction of cross-entity references from validated field tables.
//!
//! A reference is written one of three ways: a bare integer (its kind comes
//! from the field it sits in), a `[block, layer]` pair, or a map carrying one
//! of the reference keys below. Nested shape structures are searched
//! recursively; every map holding a reference key counts.

use super::entity::{EntityRef, Reference};
use crate::schema::{reward_source_category, EntityCategory};
use crate::validation::{FieldError, FieldTable, Slot};
use crate::value::AttrValue;
use std::collections::BTreeMap;

const REFERENCE_KEYS: &[(&str, EntityCategory)] = &[
    ("block", EntityCategory::Block),
    ("input", EntityCategory::Input),
    ("output", EntityCategory::Output),
    ("memory_buffer", EntityCategory::MemoryBuffer),
    ("predictor", EntityCategory::Predictor),
    ("comparator", EntityCategory::Comparator),
    ("novelty_module", EntityCategory::NoveltyModule),
    ("intrinsic_reward", EntityCategory::IntrinsicReward),
    ("policy_head", EntityCategory::PolicyHead),
    ("plasticity_rule", EntityCategory::PlasticityRuleDef),
];

/// Fields searched recursively for reference maps.
const SCANNED_FIELDS: &[&str] = &[
    "shape_info",
    "shape_derivation",
    "shape_references",
    "shape_adapter",
    "shape_constraints",
    "reshape",
    "shared_weights",
    "input",
    "target",
    "source1",
    "source2",
];

/// How a bare integer in a reference list is read.
#[derive(Debug, Clone, Copy)]
enum IntKind {
    Of(EntityCategory),
    /// A layer index in the owning layer's block.
    SiblingLayer(i64),
}

fn list_kind(category: EntityCategory, field: &str, block: Option<i64>) -> Option<IntKind> {
    match (category, field, block) {
        (_, "connections", _) | (EntityCategory::Block, "subblocks", _) => Some(IntKind::Of(EntityCategory::Block)),
        (EntityCategory::Layer, "skip_connections", Some(b)) => Some(IntKind::SiblingLayer(b)),
        (EntityCategory::Layer, "plasticity_rules", _) => Some(IntKind::Of(EntityCategory::PlasticityRuleDef)),
        _ => None,
    }
}

/// Reads a reference map: `{block: b}`, `{block: b, layer: i}` or `{<key>: id}`.
pub fn parse_ref_map(map: &BTreeMap<String, AttrValue>) -> Option<EntityRef> {
    if let Some(block) = map.get("block").and_then(AttrValue::as_int) {
        return Some(match map.get("layer").and_then(AttrValue::as_int) {
            Some(index) => EntityRef::Layer { block, index },
            None => EntityRef::Block(block),
        });
    }
    REFERENCE_KEYS
        .iter()
        .skip(1)
        .find_map(|(key, category)| map.get(*key).and_then(AttrValue::as_int).and_then(|id| EntityRef::of(*category, id)))
}

/// Reads any accepted reference form. `default` gives the kind of a bare integer.
pub fn parse_ref(value: &AttrValue, default: Option<EntityCategory>) -> Option<EntityRef> {
    match value {
        AttrValue::Int(id) => default.and_then(|c| EntityRef::of(c, *id)),
        AttrValue::List(pair) => match pair.as_slice() {
            [AttrValue::Int(block), AttrValue::Int(index)] => Some(EntityRef::Layer { block: *block, index: *index }),
            _ => None,
        },
        AttrValue::Map(map) => parse_ref_map(map),
        _ => None,
    }
}

fn parse_list_entry(value: &AttrValue, kind: IntKind) -> Option<EntityRef> {
    match (value, kind) {
        (AttrValue::Int(index), IntKind::SiblingLayer(block)) => Some(EntityRef::Layer { block, index: *index }),
        (_, IntKind::SiblingLayer(_)) => parse_ref(value, None),
        (_, IntKind::Of(category)) => parse_ref(value, Some(category)),
    }
}

fn scan(path: &str, value: &AttrValue, out: &mut Vec<Reference>) {
    match value {
        AttrValue::Map(map) => {
            if let Some(target) = parse_ref_map(map) {
                out.push(Reference { field: path.to_string(), target });
                return;
            }
            for (key, child) in map {
                scan(&format!("{}.{}", path, key), child, out);
            }
        }
        AttrValue::List(items) => {
            for (i, child) in items.iter().enumerate() {
                scan(&format!("{}[{}]", path, i), child, out);
            }
        }
        _ => {}
    }
}

/// Collects every reference held in `fields`. `block` is the owning block
/// for layers. Malformed entries in reference lists are reported as type
/// mismatches on the entry path.
pub fn extract(category: EntityCategory, fields: &FieldTable, block: Option<i64>) -> (Vec<Reference>, Vec<FieldError>) {
    let mut refs = Vec::new();
    let mut errors = Vec::new();

    for (name, slot) in fields {
        let Slot::Value(value) = slot else { continue };
        if let Some(kind) = list_kind(category, name, block) {
            for (i, entry) in value.as_list().unwrap_or_default().iter().enumerate() {
                let path = format!("{}[{}]", name, i);
                match parse_list_entry(entry, kind) {
                    Some(target) => refs.push(Reference { field: path, target }),
                    None => errors.push(FieldError::TypeMismatch {
                        field: path,
                        expected: "entity reference".to_string(),
                        found: entry.kind_name().to_string(),
                    }),
                }
            }
        } else if SCANNED_FIELDS.contains(&name.as_str()) {
            scan(name, value, &mut refs);
        }
    }

    match category {
        EntityCategory::NoveltyModule => {
            if let Some(id) = fields.get("memory_buffer_id").and_then(Slot::value).and_then(AttrValue::as_int) {
                if id != -1 {
                    refs.push(Reference { field: "memory_buffer_id".into(), target: EntityRef::MemoryBuffer(id) });
                }
            }
        }
        EntityCategory::IntrinsicReward => {
            let int = |name: &str| fields.get(name).and_then(Slot::value).and_then(AttrValue::as_int);
            if let (Some(source_type), Some(id)) = (int("source_type"), int("source_id")) {
                if let Some(target) = reward_source_category(source_type).and_then(|c| EntityRef::of(c, id)) {
                    refs.push(Reference { field: "source_id".into(), target });
                }
            }
        }
        _ => {}
    }

    (refs, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::map;
    use rstest::rstest;

    fn table(pairs: Vec<(&str, AttrValue)>) -> FieldTable {
        pairs.into_iter().map(|(k, v)| (k.to_string(), Slot::Value(v))).collect()
    }

    #[rstest]
    #[case(AttrValue::Int(3), Some(EntityCategory::Block), Some(EntityRef::Block(3)))]
    #[case(AttrValue::Int(3), None, None)]
    #[case(AttrValue::from(vec![1i64, 2]), None, Some(EntityRef::Layer { block: 1, index: 2 }))]
    #[case(map([("block", 1i64), ("layer", 0)]), None, Some(EntityRef::Layer { block: 1, index: 0 }))]
    #[case(map([("block", 4i64)]), None, Some(EntityRef::Block(4)))]
    #[case(map([("memory_buffer", 2i64)]), None, Some(EntityRef::MemoryBuffer(2)))]
    #[case(map([("size", 2i64)]), None, None)]
    #[case(AttrValue::from("block"), Some(EntityCategory::Block), None)]
    fn test_parse_ref(#[case] raw: AttrValue, #[case] default: Option<EntityCategory>, #[case] expected: Option<EntityRef>) {
        assert_eq!(parse_ref(&raw, default), expected);
    }

    #[test]
    fn test_layer_lists_resolve_against_own_block() {
        let fields = table(vec![
            ("skip_connections", AttrValue::from(vec![0i64])),
            ("plasticity_rules", AttrValue::from(vec![5i64])),
        ]);
        let (refs, errors) = extract(EntityCategory::Layer, &fields, Some(2));
        assert!(errors.is_empty());
        let targets: Vec<_> = refs.iter().map(|r| r.target).collect();
        assert_eq!(targets, vec![EntityRef::PlasticityRule(5), EntityRef::Layer { block: 2, index: 0 }]);
    }

    #[test]
    fn test_nested_shape_maps_are_scanned() {
        let fields = table(vec![(
            "shape_references",
            map([("src", map([("block", 0i64), ("layer", 1)])), ("dims", AttrValue::from(vec![1i64]))]),
        )]);
        let (refs, _) = extract(EntityCategory::Layer, &fields, Some(0));
        assert_eq!(refs, vec![Reference { field: "shape_references.src".into(), target: EntityRef::Layer { block: 0, index: 1 } }]);
    }

    #[test]
    fn test_malformed_connection_entry_is_a_type_mismatch() {
        let fields = table(vec![("connections", AttrValue::List(vec![AttrValue::Int(1), AttrValue::from("x")]))]);
        let (refs, errors) = extract(EntityCategory::Block, &fields, None);
        assert_eq!(refs.len(), 1);
        assert_eq!(errors[0].field(), "connections[1]");
    }

    #[rstest]
    #[case(0, Some(EntityRef::Comparator(7)))]
    #[case(1, Some(EntityRef::NoveltyModule(7)))]
    #[case(2, Some(EntityRef::Predictor(7)))]
    fn test_intrinsic_reward_source(#[case] source_type: i64, #[case] expected: Option<EntityRef>) {
        let fields = table(vec![("source_type", AttrValue::Int(source_type)), ("source_id", AttrValue::Int(7))]);
        let (refs, _) = extract(EntityCategory::IntrinsicReward, &fields, None);
        assert_eq!(refs.first().map(|r| r.target), expected);
    }

    #[test]
    fn test_unset_memory_buffer_is_not_a_reference() {
        let fields = table(vec![("memory_buffer_id", AttrValue::Int(-1))]);
        assert!(extract(EntityCategory::NoveltyModule, &fields, None).0.is_empty());
    }
}

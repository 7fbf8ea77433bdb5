//! registry.rs
//! Immutable schema store: base tables plus override tables, flattened once at
//! load time into a resolved-schema table keyed by (category, concrete type).

use super::codes::{EntityCategory, LinkKind};
use super::tables;
use super::types::{BaseTable, OverrideTable, ResolvedSchema, SchemaOwner};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

pub use self::error::SchemaError;
mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum SchemaError {
        #[error("no schema registered for {category} type '{concrete}'")]
        NotFound { category: EntityCategory, concrete: String },
        #[error("no schema registered for link kind {0:?}")]
        LinkNotFound(LinkKind),
        #[error("override table '{concrete}' inherits unregistered base {base}")]
        UnknownBase { concrete: String, base: EntityCategory },
        #[error("concrete type '{concrete}' registered twice under {category}")]
        DuplicateType { category: EntityCategory, concrete: String },
    }
}

type SchemaKey = (EntityCategory, String);

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    bases: BTreeMap<EntityCategory, BaseTable>,
    overrides: BTreeMap<SchemaKey, OverrideTable>,
    links: BTreeMap<LinkKind, ResolvedSchema>,
    resolved: HashMap<SchemaKey, ResolvedSchema>,
}

static STANDARD: OnceLock<Result<SchemaRegistry, SchemaError>> = OnceLock::new();

impl SchemaRegistry {
    /// Loads the tables and resolves every (category, concrete type) pair.
    /// Nothing is merged after this point.
    pub fn load(
        bases: BTreeMap<EntityCategory, BaseTable>,
        overrides: Vec<OverrideTable>,
        links: BTreeMap<LinkKind, BaseTable>,
    ) -> Result<Self, SchemaError> {
        let mut registry = Self {
            bases,
            links: links
                .iter()
                .map(|(kind, table)| (*kind, ResolvedSchema::from_base(SchemaOwner::Link(*kind), kind.name(), table)))
                .collect(),
            ..Self::default()
        };

        for (category, base) in &registry.bases {
            let key = (*category, category.name().to_string());
            registry
                .resolved
                .insert(key, ResolvedSchema::from_base(SchemaOwner::Entity(*category), category.name(), base));
        }

        for table in overrides {
            let base = registry.bases.get(&table.inherits).ok_or_else(|| SchemaError::UnknownBase {
                concrete: table.concrete.to_string(),
                base: table.inherits,
            })?;
            let key = (table.inherits, table.concrete.to_string());
            if registry.resolved.contains_key(&key) {
                return Err(SchemaError::DuplicateType {
                    category: table.inherits,
                    concrete: table.concrete.to_string(),
                });
            }
            let merged = merge(table.inherits, base, &table);
            registry.resolved.insert(key.clone(), merged);
            registry.overrides.insert(key, table);
        }

        Ok(registry)
    }

    /// The process-wide registry built from the built-in tables.
    pub fn standard() -> Result<&'static SchemaRegistry, SchemaError> {
        STANDARD
            .get_or_init(|| Self::load(tables::base_tables(), tables::layer_overrides(), tables::link_tables()))
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn resolve(&self, category: EntityCategory, concrete: &str) -> Result<&ResolvedSchema, SchemaError> {
        self.resolved
            .get(&(category, concrete.to_string()))
            .ok_or_else(|| SchemaError::NotFound { category, concrete: concrete.to_string() })
    }

    /// The schema of a category that has no concrete refinement.
    pub fn resolve_base(&self, category: EntityCategory) -> Result<&ResolvedSchema, SchemaError> {
        self.resolve(category, category.name())
    }

    pub fn resolve_link(&self, kind: LinkKind) -> Result<&ResolvedSchema, SchemaError> {
        self.links.get(&kind).ok_or(SchemaError::LinkNotFound(kind))
    }

    pub fn base_table(&self, category: EntityCategory) -> Option<&BaseTable> { self.bases.get(&category) }

    /// Concrete types registered under a category, sorted by name.
    pub fn concrete_types(&self, category: EntityCategory) -> Vec<&str> {
        self.overrides
            .keys()
            .filter(|(c, _)| *c == category)
            .map(|(_, name)| name.as_str())
            .collect()
    }
}

/// Deep-copies the base table, applies each override attribute-wise and
/// layers the type's parameter sub-schema and flags on top.
fn merge(category: EntityCategory, base: &BaseTable, table: &OverrideTable) -> ResolvedSchema {
    let mut schema = ResolvedSchema::from_base(SchemaOwner::Entity(category), table.concrete, base);
    for (name, spec) in schema.fields.iter_mut() {
        spec.inherits = Some(name.clone());
    }

    for (name, field_override) in &table.fields {
        let spec = match schema.fields.get(*name) {
            Some(inherited) => field_override.apply(name, inherited),
            None => field_override.to_spec(),
        };
        schema.fields.insert(name.to_string(), spec);
    }

    for (name, spec) in &table.params {
        schema.params.insert(name.to_string(), spec.clone());
    }
    schema.allowed_flags.extend(table.allowed_flags.iter().map(|f| f.to_string()));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::codes::LayerType;
    use crate::schema::types::{FieldOverride, FieldSpec, FieldType};
    use crate::value::AttrValue;
    use rstest::rstest;

    fn registry() -> &'static SchemaRegistry {
        SchemaRegistry::standard().expect("built-in tables load")
    }

    #[rstest]
    #[case(LayerType::Linear)]
    #[case(LayerType::Conv1d)]
    #[case(LayerType::Conv2d)]
    #[case(LayerType::Conv3d)]
    #[case(LayerType::Lstm)]
    #[case(LayerType::BatchNorm1d)]
    #[case(LayerType::GroupNorm)]
    fn test_layer_schema_keeps_every_base_field(#[case] layer: LayerType) {
        let base = registry().base_table(EntityCategory::Layer).unwrap();
        let schema = registry().resolve(EntityCategory::Layer, layer.symbol()).unwrap();
        for name in base.fields.keys() {
            let spec = schema.field(name).unwrap_or_else(|| panic!("{} lost field {}", layer, name));
            assert_eq!(spec.inherits.as_deref(), Some(*name));
        }
        assert!(schema.param(layer.input_param()).map_or(false, |p| p.inferred));
    }

    #[test]
    fn test_norm_bias_override_changes_only_named_attributes() {
        let schema = registry().resolve(EntityCategory::Layer, "batchnorm1d").unwrap();
        let bias = schema.field("bias").unwrap();
        assert_eq!(bias.default, Some(AttrValue::Null));
        assert_eq!(bias.ty, FieldType::OptBool);
        assert!(!bias.required);

        let linear = registry().resolve(EntityCategory::Layer, "linear").unwrap();
        let bias = linear.field("bias").unwrap();
        assert_eq!(bias.ty, FieldType::Bool);
        assert_eq!(bias.default, Some(AttrValue::Bool(true)));
    }

    #[test]
    fn test_unknown_concrete_type_is_not_found() {
        let err = registry().resolve(EntityCategory::Layer, "transformer").unwrap_err();
        assert_eq!(
            err,
            SchemaError::NotFound { category: EntityCategory::Layer, concrete: "transformer".into() }
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let a = registry().resolve(EntityCategory::Layer, "conv2d").unwrap();
        let b = registry().resolve(EntityCategory::Layer, "conv2d").unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(registry().concrete_types(EntityCategory::Layer).len(), LayerType::ALL.len());
    }

    #[test]
    fn test_flags_are_layered_on_the_base_whitelist() {
        let lstm = registry().resolve(EntityCategory::Layer, "lstm").unwrap();
        assert!(lstm.allowed_flags.contains("bidirectional"));
        assert!(!lstm.allowed_flags.contains("affine"));
        let block = registry().resolve_base(EntityCategory::Block).unwrap();
        assert!(block.allowed_flags.contains("freeze"));
    }

    #[test]
    fn test_override_against_missing_base_fails_to_load() {
        let table = OverrideTable {
            concrete: "custom",
            inherits: EntityCategory::Predictor,
            fields: vec![("extra", FieldOverride::default_value(1i64).ty(FieldType::Int))],
            params: vec![("k", FieldSpec::required(FieldType::Int))],
            allowed_flags: Default::default(),
        };
        let err = SchemaRegistry::load(BTreeMap::new(), vec![table], BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownBase { .. }));
    }

    #[test]
    fn test_override_may_add_a_field_the_base_lacks() {
        let table = OverrideTable {
            concrete: "custom",
            inherits: EntityCategory::Predictor,
            fields: vec![("extra", FieldOverride::default_value(1i64).ty(FieldType::Int))],
            params: vec![],
            allowed_flags: Default::default(),
        };
        let reg = SchemaRegistry::load(tables::base_tables(), vec![table], BTreeMap::new()).unwrap();
        let schema = reg.resolve(EntityCategory::Predictor, "custom").unwrap();
        let extra = schema.field("extra").unwrap();
        assert_eq!(extra.ty, FieldType::Int);
        assert_eq!(extra.inherits, None);
        assert!(schema.field("input").unwrap().required);
    }
}

//! Field specifications and the tables they are grouped into.

use super::codes::{EntityCategory, LinkKind};
use crate::value::AttrValue;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// The type constraint of a field. A closed set, checked by one `match` in the
/// field validator rather than by inspecting values at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Str,
    OptInt,
    OptFloat,
    OptBool,
    Map,
    OptMap,
    Seq,
    OptSeq,
    /// A list of distinct strings.
    UniqueSet,
    /// An integer, or a sequence of exactly `arity` integers, or one of `symbols`.
    FixedSeq { arity: usize, symbols: &'static [&'static str] },
    /// A string drawn from a fixed set.
    OneOf(&'static [&'static str]),
}

impl FieldType {
    pub const fn fixed(arity: usize) -> Self {
        FieldType::FixedSeq { arity, symbols: &[] }
    }

    /// Whether `null` is a legal value.
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            FieldType::OptInt | FieldType::OptFloat | FieldType::OptBool | FieldType::OptMap | FieldType::OptSeq
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Str => write!(f, "string"),
            FieldType::OptInt => write!(f, "int or null"),
            FieldType::OptFloat => write!(f, "float or null"),
            FieldType::OptBool => write!(f, "bool or null"),
            FieldType::Map => write!(f, "mapping"),
            FieldType::OptMap => write!(f, "mapping or null"),
            FieldType::Seq => write!(f, "sequence"),
            FieldType::OptSeq => write!(f, "sequence or null"),
            FieldType::UniqueSet => write!(f, "set of strings"),
            FieldType::FixedSeq { arity, symbols } if symbols.is_empty() => {
                write!(f, "int or {}-sequence of ints", arity)
            }
            FieldType::FixedSeq { arity, symbols } => {
                write!(f, "int, {}-sequence of ints, or one of {:?}", arity, symbols)
            }
            FieldType::OneOf(symbols) => write!(f, "one of {:?}", symbols),
        }
    }
}

/// Declarative description of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub ty: FieldType,
    /// `None` means the field has no default.
    pub default: Option<AttrValue>,
    pub required: bool,
    /// Left pending when absent; resolved later from graph context.
    pub inferred: bool,
    /// Inclusive numeric bounds. The upper bound may be `f64::INFINITY`.
    pub range: Option<(f64, f64)>,
    /// Name of the base field this spec was inherited from.
    pub inherits: Option<String>,
}

impl FieldSpec {
    pub fn new(ty: FieldType) -> Self {
        Self { ty, default: None, required: false, inferred: false, range: None, inherits: None }
    }

    pub fn required(ty: FieldType) -> Self {
        Self { required: true, ..Self::new(ty) }
    }

    pub fn inferred(ty: FieldType) -> Self {
        Self { inferred: true, ..Self::new(ty) }
    }

    pub fn with_default(ty: FieldType, default: impl Into<AttrValue>) -> Self {
        Self { default: Some(default.into()), ..Self::new(ty) }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }
}

/// Partial replacement of an inherited field spec. Only the attributes set
/// here replace the inherited ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOverride {
    pub ty: Option<FieldType>,
    pub default: Option<Option<AttrValue>>,
    pub required: Option<bool>,
    pub inferred: Option<bool>,
    pub range: Option<Option<(f64, f64)>>,
}

impl FieldOverride {
    pub fn default_value(default: impl Into<AttrValue>) -> Self {
        Self { default: Some(Some(default.into())), ..Self::default() }
    }

    pub fn ty(mut self, ty: FieldType) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Applies the override on top of an inherited spec.
    pub fn apply(&self, name: &str, base: &FieldSpec) -> FieldSpec {
        FieldSpec {
            ty: self.ty.unwrap_or(base.ty),
            default: self.default.clone().unwrap_or_else(|| base.default.clone()),
            required: self.required.unwrap_or(base.required),
            inferred: self.inferred.unwrap_or(base.inferred),
            range: self.range.unwrap_or(base.range),
            inherits: Some(name.to_string()),
        }
    }

    /// Materializes the override as a standalone spec when the base does not
    /// declare the field.
    pub fn to_spec(&self) -> FieldSpec {
        FieldSpec {
            ty: self.ty.unwrap_or(FieldType::OptMap),
            default: self.default.clone().unwrap_or(None),
            required: self.required.unwrap_or(false),
            inferred: self.inferred.unwrap_or(false),
            range: self.range.unwrap_or(None),
            inherits: None,
        }
    }
}

/// The base field table of one entity category (or link kind).
#[derive(Debug, Clone, PartialEq)]
pub struct BaseTable {
    pub fields: IndexMap<&'static str, FieldSpec>,
    pub allowed_flags: BTreeSet<&'static str>,
}

/// A concrete-type table inheriting from a category's base table.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideTable {
    pub concrete: &'static str,
    pub inherits: EntityCategory,
    pub fields: Vec<(&'static str, FieldOverride)>,
    /// Type-specific parameter sub-schema, layered additively on `params`.
    pub params: Vec<(&'static str, FieldSpec)>,
    pub allowed_flags: BTreeSet<&'static str>,
}

/// What a resolved schema is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SchemaOwner {
    Entity(EntityCategory),
    Link(LinkKind),
}

/// The flattened field map obtained by merging a base table with overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSchema {
    pub owner: SchemaOwner,
    pub concrete: String,
    pub fields: IndexMap<String, FieldSpec>,
    pub params: IndexMap<String, FieldSpec>,
    pub allowed_flags: BTreeSet<String>,
}

impl ResolvedSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> { self.fields.get(name) }

    pub fn param(&self, name: &str) -> Option<&FieldSpec> { self.params.get(name) }

    /// Builds a schema straight from a base table, with no overrides.
    pub(crate) fn from_base(owner: SchemaOwner, concrete: &str, base: &BaseTable) -> Self {
        Self {
            owner,
            concrete: concrete.to_string(),
            fields: base.fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            params: IndexMap::new(),
            allowed_flags: base.allowed_flags.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_replaces_only_named_attributes() {
        let base = FieldSpec::with_default(FieldType::OptFloat, AttrValue::Null).range(0.0, 1.0);
        let merged = FieldOverride::default_value(0.5).apply("dropout", &base);

        assert_eq!(merged.default, Some(AttrValue::Float(0.5)));
        assert_eq!(merged.ty, FieldType::OptFloat);
        assert_eq!(merged.range, Some((0.0, 1.0)));
        assert_eq!(merged.inherits.as_deref(), Some("dropout"));
    }

    #[test]
    fn test_fixed_seq_display_names_symbols() {
        let ty = FieldType::FixedSeq { arity: 2, symbols: &["same"] };
        assert!(ty.to_string().contains("2-sequence"));
        assert!(ty.to_string().contains("same"));
    }
}

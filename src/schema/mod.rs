//! Declarative field schemas for every entity category.
//!
//! Base tables describe a category; override tables refine the Layer category
//! into concrete layer types. The `SchemaRegistry` flattens both into resolved
//! schemas once, at load time, and is read-only afterwards.
pub mod codes;
pub mod registry;
pub mod tables;
pub mod types;

pub use codes::{flags, params, reward_source_category, DimKind, EntityCategory, LayerType, LinkKind};
pub use registry::{SchemaError, SchemaRegistry};
pub use types::{BaseTable, FieldOverride, FieldSpec, FieldType, OverrideTable, ResolvedSchema, SchemaOwner};

// Library root for the network-definition core.
// Raw attribute maps go in; a frozen, fully referenced `NetworkDefinition`
// or a sorted `ValidationReport` comes out.

pub mod config;
pub mod display;
pub mod graph;
pub mod integrity;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod validation;
pub mod value;

// --- Public surface ---
pub use config::{ConfigError, LogConfig, ValidatorConfig};
pub use graph::{EntityRef, FrozenNetwork, IrBuilder, NetworkDefinition, RawNetwork};
pub use logging::{DiagnosticSink, MemorySink, NullSink, TracingSink};
pub use pipeline::{validate, validate_many, validate_path, NetworkError};
pub use schema::{EntityCategory, LayerType, SchemaError, SchemaRegistry};
pub use validation::{Diagnostic, ValidationReport};
pub use value::{AttrValue, RawAttrs};

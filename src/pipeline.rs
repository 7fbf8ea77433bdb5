//! pipeline.rs
//! Entry points for hosts: one network, a batch of networks, or a JSON file.

use crate::config::{ConfigError, ValidatorConfig};
use crate::graph::{FrozenNetwork, IrBuilder, RawNetwork};
use crate::logging::{Component, DiagnosticSink, Level};
use crate::schema::{SchemaError, SchemaRegistry};
use crate::validation::ValidationReport;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

pub use self::error::NetworkError;
mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum NetworkError {
        #[error("network is invalid: {}", .0.diagnostics.len())]
        Invalid(ValidationReport),
        #[error(transparent)]
        Config(#[from] ConfigError),
        #[error(transparent)]
        Schema(#[from] SchemaError),
        #[error("cannot read {path}: {source}")]
        Io { path: PathBuf, source: std::io::Error },
        #[error("malformed network description: {0}")]
        Json(#[from] serde_json::Error),
    }

    impl NetworkError {
        /// The validation report, when the network itself was the problem.
        pub fn report(&self) -> Option<&ValidationReport> {
            match self {
                NetworkError::Invalid(report) => Some(report),
                _ => None,
            }
        }
    }
}

/// Validates one network against the built-in schema tables.
pub fn validate(
    raw: &RawNetwork,
    config: &ValidatorConfig,
    sink: &dyn DiagnosticSink,
) -> Result<FrozenNetwork, NetworkError> {
    let registry = SchemaRegistry::standard()?;
    validate_with(registry, raw, config, sink)
}

/// Validates one network against an explicit registry.
pub fn validate_with(
    registry: &SchemaRegistry,
    raw: &RawNetwork,
    config: &ValidatorConfig,
    sink: &dyn DiagnosticSink,
) -> Result<FrozenNetwork, NetworkError> {
    IrBuilder::new(registry, sink)
        .with_max_inference_depth(config.max_inference_depth)
        .build(raw)
        .map_err(NetworkError::Invalid)
}

/// Validates independent networks in parallel. Results keep input order.
pub fn validate_many(
    raws: &[RawNetwork],
    config: &ValidatorConfig,
    sink: &dyn DiagnosticSink,
) -> Vec<Result<FrozenNetwork, NetworkError>> {
    let registry = match SchemaRegistry::standard() {
        Ok(registry) => registry,
        Err(e) => return raws.iter().map(|_| Err(NetworkError::Schema(e.clone()))).collect(),
    };
    let results: Vec<_> = raws.par_iter().map(|raw| validate_with(registry, raw, config, sink)).collect();

    let frozen = results.iter().filter(|r| r.is_ok()).count();
    sink.record(
        Level::Info,
        Component::Pipeline,
        &format!("validated {} network(s): {} frozen, {} rejected", results.len(), frozen, results.len() - frozen),
    );
    results
}

/// Reads a JSON network description from disk and validates it.
pub fn validate_path(
    path: impl AsRef<Path>,
    config: &ValidatorConfig,
    sink: &dyn DiagnosticSink,
) -> Result<FrozenNetwork, NetworkError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| NetworkError::Io { path: path.to_path_buf(), source })?;
    let raw = RawNetwork::from_json_str(&text)?;
    sink.record(Level::Debug, Component::Pipeline, &format!("loaded {}", path.display()));
    validate(&raw, config, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::value::{attrs, map, AttrValue};

    fn scenario_two() -> RawNetwork {
        RawNetwork {
            blocks: vec![attrs([("id", 0i64)])],
            layers: vec![
                attrs([
                    ("block_id", AttrValue::Int(0)),
                    ("layer_idx", AttrValue::Int(0)),
                    ("type", AttrValue::from("linear")),
                    ("params", map([("out_features", 64i64), ("in_features", 10)])),
                ]),
                attrs([
                    ("block_id", AttrValue::Int(0)),
                    ("layer_idx", AttrValue::Int(1)),
                    ("type", AttrValue::Int(1)),
                    ("params", map([("out_features", 32i64)])),
                ]),
            ],
            ..RawNetwork::default()
        }
    }

    #[test]
    fn test_validate_many_keeps_order() {
        let mut broken = scenario_two();
        broken.layers.remove(0);
        let sink = MemorySink::new();
        let results = validate_many(&[scenario_two(), broken, scenario_two()], &ValidatorConfig::default(), &sink);

        assert!(results[0].is_ok());
        assert!(results[1].as_ref().err().and_then(NetworkError::report).is_some());
        assert!(results[2].is_ok());
        assert_eq!(results[0].as_ref().unwrap().dump(), results[2].as_ref().unwrap().dump());
        assert_eq!(sink.count(Level::Info, Component::Pipeline), 1);
    }

    #[test]
    fn test_validate_path_reports_io_and_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let config = ValidatorConfig::default();

        let missing = validate_path(dir.path().join("absent.json"), &config, &sink);
        assert!(matches!(missing, Err(NetworkError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(validate_path(&bad, &config, &sink), Err(NetworkError::Json(_))));

        let good = dir.path().join("good.json");
        std::fs::write(&good, serde_json::to_string(&scenario_two()).unwrap()).unwrap();
        let frozen = validate_path(&good, &config, &sink).unwrap();
        assert_eq!(frozen.layer(0, 1).unwrap().param_int("in_features"), Some(64));
    }
}

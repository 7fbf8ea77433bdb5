//! config.rs
//! Validator configuration, loadable from JSON. Every key is optional.

use crate::logging::Level;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Recursion cap for the upstream inference walk.
pub const DEFAULT_MAX_INFERENCE_DEPTH: usize = 512;

pub use self::error::ConfigError;
mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum ConfigError {
        #[error("cannot read config {path}: {source}")]
        Io { path: PathBuf, source: std::io::Error },
        #[error("malformed config: {0}")]
        Parse(#[from] serde_json::Error),
        #[error("max_inference_depth must be at least 1")]
        ZeroDepth,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Upper bound on how far one inferred value may walk upstream.
    pub max_inference_depth: usize,
    pub logging: LogConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self { Self { max_inference_depth: DEFAULT_MAX_INFERENCE_DEPTH, logging: LogConfig::default() } }
}

impl ValidatorConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        if config.max_inference_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub default_level: Level,
    /// Per-component thresholds keyed by component name (`"IrBuilder"`, ...).
    pub component_levels: BTreeMap<String, Level>,
    pub with_target: bool,
}

impl LogConfig {
    /// The lowest threshold in effect for any component. The subscriber
    /// filter must let this level through or component overrides are lost.
    pub fn most_verbose(&self) -> Level {
        self.component_levels.values().copied().fold(self.default_level, Level::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = ValidatorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ValidatorConfig::default());
        assert_eq!(config.max_inference_depth, 512);
        assert_eq!(config.logging.default_level, Level::Info);
    }

    #[test]
    fn test_partial_logging_section() {
        let config = ValidatorConfig::from_json_str(
            r#"{"max_inference_depth": 8, "logging": {"component_levels": {"IrBuilder": "debug"}}}"#,
        )
        .unwrap();
        assert_eq!(config.max_inference_depth, 8);
        assert_eq!(config.logging.component_levels["IrBuilder"], Level::Debug);
        assert!(!config.logging.with_target);
    }

    #[test]
    fn test_most_verbose_considers_component_overrides() {
        let mut logging = LogConfig { default_level: Level::Warn, ..LogConfig::default() };
        assert_eq!(logging.most_verbose(), Level::Warn);
        logging.component_levels.insert("IrBuilder".into(), Level::Error);
        assert_eq!(logging.most_verbose(), Level::Warn);
        logging.component_levels.insert("IntegrityChecker".into(), Level::Debug);
        assert_eq!(logging.most_verbose(), Level::Debug);
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        assert!(matches!(ValidatorConfig::from_json_str(r#"{"max_inference_depth": 0}"#), Err(ConfigError::ZeroDepth)));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"logging": {{"default_level": "warn"}}}}"#).unwrap();
        let config = ValidatorConfig::from_path(file.path()).unwrap();
        assert_eq!(config.logging.default_level, Level::Warn);

        let missing = ValidatorConfig::from_path(file.path().with_extension("absent"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}

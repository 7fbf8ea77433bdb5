//! logging.rs
//! The one logging capability the core depends on, plus the host-side
//! lifecycle that wires it to `tracing`.
//!
//! Core code only sees `&dyn DiagnosticSink`. Hosts pick an implementation:
//! `TracingSink` for real output, `MemorySink` to inspect what was said,
//! `NullSink` to discard everything.

use crate::config::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

pub use self::error::LoggingError;
mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum LoggingError {
        #[error("invalid log filter: {0}")]
        Filter(#[from] tracing_subscriber::filter::ParseError),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// The parts of the core that emit log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Component {
    SchemaRegistry,
    FieldValidator,
    FlagValidator,
    IrBuilder,
    IntegrityChecker,
    Pipeline,
}

impl Component {
    pub fn name(self) -> &'static str {
        match self {
            Component::SchemaRegistry => "SchemaRegistry",
            Component::FieldValidator => "FieldValidator",
            Component::FlagValidator => "FlagValidator",
            Component::IrBuilder => "IrBuilder",
            Component::IntegrityChecker => "IntegrityChecker",
            Component::Pipeline => "Pipeline",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Where the core sends its log lines. Shared across threads by `validate_many`.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, level: Level, component: Component, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub component: Component,
    pub message: String,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self { Self::default() }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, level: Level, component: Component) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.level == level && r.component == component)
            .count()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, level: Level, component: Component, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord { level, component, message: message.to_string() });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _: Level, _: Component, _: &str) {}
}

/// Forwards records as `tracing` events carrying a `component` field, after
/// applying the per-component thresholds of a `LogConfig`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    default_level: Level,
    component_levels: BTreeMap<String, Level>,
}

impl TracingSink {
    pub fn new(config: &LogConfig) -> Self {
        Self { default_level: config.default_level, component_levels: config.component_levels.clone() }
    }

    pub fn threshold(&self, component: Component) -> Level {
        self.component_levels.get(component.name()).copied().unwrap_or(self.default_level)
    }
}

impl DiagnosticSink for TracingSink {
    fn record(&self, level: Level, component: Component, message: &str) {
        if level < self.threshold(component) {
            return;
        }
        let component = component.name();
        match level {
            Level::Trace => tracing::trace!(component, "{}", message),
            Level::Debug => tracing::debug!(component, "{}", message),
            Level::Info => tracing::info!(component, "{}", message),
            Level::Warn => tracing::warn!(component, "{}", message),
            Level::Error => tracing::error!(component, "{}", message),
        }
    }
}

/// Keeps the subscriber installed by `init` alive. Dropping it (or calling
/// `shutdown`) uninstalls the subscriber.
pub struct LoggingGuard {
    _default: DefaultGuard,
}

impl LoggingGuard {
    pub fn shutdown(self) {}
}

/// Installs a `fmt` subscriber for the calling thread. `RUST_LOG` overrides
/// the configured levels when set. Otherwise the subscriber admits the most
/// verbose configured level and `TracingSink` applies per-component thresholds.
pub fn init(config: &LogConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.most_verbose().as_str())?,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_writer(std::io::stderr)
        .finish();
    Ok(LoggingGuard { _default: tracing::subscriber::set_default(subscriber) })
}

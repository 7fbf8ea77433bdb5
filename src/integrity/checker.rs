//! The graph-wide checker: existence first, then inference.
use super::rules::existence;
use super::rules::inference::{self, Resolution};
use crate::config::DEFAULT_MAX_INFERENCE_DEPTH;
use crate::graph::NetworkDefinition;
use crate::logging::{Component, DiagnosticSink, Level};
use crate::validation::ValidationReport;

/// Runs the referential integrity passes over a draft definition.
pub struct IntegrityChecker<'a> {
    network: &'a NetworkDefinition,
    sink: &'a dyn DiagnosticSink,
    max_depth: usize,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(network: &'a NetworkDefinition, sink: &'a dyn DiagnosticSink) -> Self {
        Self { network, sink, max_depth: DEFAULT_MAX_INFERENCE_DEPTH }
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Executes the existence pass, then the inference pass over whatever
    /// the builder accepted. Walks that reach rejected or dangling producers
    /// end silently; everything else is reported.
    ///
    /// # Returns
    /// - `Ok(resolutions)` for every pending parameter that could be inferred.
    /// - `Err(report)` holding only the diagnostics found here.
    pub fn check(&self) -> Result<Vec<Resolution>, ValidationReport> {
        let mut report = ValidationReport::new();

        for diagnostic in existence::check_references(self.network) {
            self.sink.record(Level::Debug, Component::IntegrityChecker, &diagnostic.to_string());
            report.diagnostics.push(diagnostic);
        }

        let (resolutions, diagnostics) = inference::infer(self.network, self.max_depth);
        for r in &resolutions {
            self.sink.record(
                Level::Debug,
                Component::IntegrityChecker,
                &format!("inferred Layer {}.{} params.{} = {}", r.block, r.index, r.param, r.value),
            );
        }
        for diagnostic in diagnostics {
            self.sink.record(Level::Debug, Component::IntegrityChecker, &diagnostic.to_string());
            report.diagnostics.push(diagnostic);
        }

        if report.is_clean() {
            Ok(resolutions)
        } else {
            Err(report)
        }
    }
}

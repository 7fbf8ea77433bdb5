//! Defines the error types for the validation module.
use crate::schema::{EntityCategory, FieldType, LinkKind, SchemaError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// How an entity is identified in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityId {
    Id(i64),
    Layer { block: i64, index: i64 },
    /// The entity's own id was missing or malformed; this is its position in
    /// the input list instead.
    Unidentified(usize),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Id(id) => write!(f, "{}", id),
            EntityId::Layer { block, index } => write!(f, "{}.{}", block, index),
            EntityId::Unidentified(pos) => write!(f, "#{}", pos),
        }
    }
}

/// What a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Subject {
    Entity { category: EntityCategory, id: EntityId },
    Link { kind: LinkKind, position: usize },
    Graph,
}

impl Subject {
    pub fn entity(category: EntityCategory, id: i64) -> Self {
        Subject::Entity { category, id: EntityId::Id(id) }
    }

    pub fn layer(block: i64, index: i64) -> Self {
        Subject::Entity { category: EntityCategory::Layer, id: EntityId::Layer { block, index } }
    }

    /// Compact identifier: category code plus entity id (`02-0.1`, `R1-3`).
    pub fn code(&self) -> String {
        match self {
            Subject::Entity { category, id } => format!("{}-{}", category.code(), id),
            Subject::Link { kind, position } => format!("{}-{}", kind.code(), position),
            Subject::Graph => "G".to_string(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Entity { category, id } => write!(f, "{} {}", category, id),
            Subject::Link { kind, position } => write!(f, "{} #{}", kind.name(), position),
            Subject::Graph => write!(f, "graph"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("required field '{field}' is missing")]
    MissingRequired { field: String },
    #[error("field '{field}' expects {expected}, found {found}")]
    TypeMismatch { field: String, expected: String, found: String },
    #[error("field '{field}' value {value} is outside [{min}, {max}]")]
    RangeViolation { field: String, value: f64, min: f64, max: f64 },
    #[error("field '{field}' expects {expected} elements, found {found}")]
    ArityMismatch { field: String, expected: usize, found: usize },
}

impl FieldError {
    pub fn type_mismatch(field: &str, expected: FieldType, found: &str) -> Self {
        FieldError::TypeMismatch { field: field.to_string(), expected: expected.to_string(), found: found.to_string() }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldError::MissingRequired { field }
            | FieldError::TypeMismatch { field, .. }
            | FieldError::RangeViolation { field, .. }
            | FieldError::ArityMismatch { field, .. } => field,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    #[error("flag '{flag}' is not allowed here (allowed: {allowed:?})")]
    Unrecognized { flag: String, allowed: Vec<String> },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("field '{field}' references missing {target}")]
    DanglingReference { field: String, target: String },
    #[error("cannot infer '{field}': dependency cycle {}", .path.join(" -> "))]
    CyclicInference { field: String, path: Vec<String> },
    #[error("cannot infer '{field}': predecessors disagree ({})", .candidates.join(", "))]
    AmbiguousInference { field: String, candidates: Vec<String> },
    #[error("cannot infer '{field}': walk exceeds depth limit {limit} at {}", .path.join(" -> "))]
    InferenceTooDeep { field: String, limit: usize, path: Vec<String> },
    #[error("duplicate identity '{field}' {id}")]
    DuplicateId { field: String, id: String },
}

impl ReferenceError {
    pub fn field(&self) -> &str {
        match self {
            ReferenceError::DanglingReference { field, .. }
            | ReferenceError::CyclicInference { field, .. }
            | ReferenceError::AmbiguousInference { field, .. }
            | ReferenceError::InferenceTooDeep { field, .. }
            | ReferenceError::DuplicateId { field, .. } => field,
        }
    }
}

/// Any single violation the core can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Flag(#[from] FlagError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

impl Violation {
    /// The field the violation is attached to.
    pub fn field(&self) -> &str {
        match self {
            Violation::Schema(_) => "type",
            Violation::Field(e) => e.field(),
            Violation::Flag(_) => "flags",
            Violation::Reference(e) => e.field(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Violation::Schema(_) => "SchemaNotFound",
            Violation::Field(FieldError::MissingRequired { .. }) => "MissingRequired",
            Violation::Field(FieldError::TypeMismatch { .. }) => "TypeMismatch",
            Violation::Field(FieldError::RangeViolation { .. }) => "RangeViolation",
            Violation::Field(FieldError::ArityMismatch { .. }) => "ArityMismatch",
            Violation::Flag(FlagError::Unrecognized { .. }) => "Unrecognized",
            Violation::Reference(ReferenceError::DanglingReference { .. }) => "DanglingReference",
            Violation::Reference(ReferenceError::CyclicInference { .. }) => "CyclicInference",
            Violation::Reference(ReferenceError::AmbiguousInference { .. }) => "AmbiguousInference",
            Violation::Reference(ReferenceError::InferenceTooDeep { .. }) => "InferenceTooDeep",
            Violation::Reference(ReferenceError::DuplicateId { .. }) => "DuplicateId",
        }
    }
}

/// A violation attached to the entity it was found on.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub subject: Subject,
    pub violation: Violation,
}

impl Diagnostic {
    pub fn new(subject: Subject, violation: impl Into<Violation>) -> Self {
        Self { subject, violation: violation.into() }
    }

    pub fn field(&self) -> &str { self.violation.field() }

    /// Compact user-facing identifier: category code, entity id, field name.
    pub fn code(&self) -> String { format!("{}-{}", self.subject.code(), self.field()) }

    pub fn record(&self) -> DiagnosticRecord {
        DiagnosticRecord {
            code: self.code(),
            kind: self.violation.kind_name(),
            subject: self.subject.to_string(),
            field: self.field().to_string(),
            message: self.violation.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code(), self.violation.kind_name(), self.violation)
    }
}

/// Flat, serializable view of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    pub code: String,
    pub kind: &'static str,
    pub subject: String,
    pub field: String,
    pub message: String,
}

/// A non-fatal note, e.g. an attribute kept in an extension bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub subject: Subject,
    pub field: String,
    pub message: String,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}] {}", self.subject.code(), self.field, self.message)
    }
}

/// Every diagnostic and advisory produced by one validation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
    pub advisories: Vec<Advisory>,
}

impl ValidationReport {
    pub fn new() -> Self { Self::default() }

    pub fn is_clean(&self) -> bool { self.diagnostics.is_empty() }

    pub fn push(&mut self, subject: Subject, violation: impl Into<Violation>) {
        self.diagnostics.push(Diagnostic::new(subject, violation));
    }

    pub fn advise(&mut self, subject: Subject, field: impl Into<String>, message: impl Into<String>) {
        self.advisories.push(Advisory { subject, field: field.into(), message: message.into() });
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.diagnostics.extend(other.diagnostics);
        self.advisories.extend(other.advisories);
    }

    /// Orders diagnostics by subject, then field name, then kind. Subjects
    /// order by category code first and id second, so every block precedes
    /// every layer; unidentified entities follow the identified ones of their
    /// category, and link records come last. Stable, so equal keys keep
    /// discovery order.
    pub fn sort(&mut self) {
        self.diagnostics.sort_by(|a, b| {
            (&a.subject, a.field(), a.violation.kind_name()).cmp(&(&b.subject, b.field(), b.violation.kind_name()))
        });
        self.advisories
            .sort_by(|a, b| (&a.subject, a.field.as_str()).cmp(&(&b.subject, b.field.as_str())));
    }

    /// Number of diagnostics of one kind (`"MissingRequired"`, ...).
    pub fn count_of(&self, kind: &str) -> usize {
        self.diagnostics.iter().filter(|d| d.violation.kind_name() == kind).count()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> { self.diagnostics.iter().map(Diagnostic::record).collect() }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s), {} advisory note(s)", self.diagnostics.len(), self.advisories.len())?;
        for d in &self.diagnostics {
            writeln!(f, "  {}", d)?;
        }
        for a in &self.advisories {
            writeln!(f, "  note {}", a)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_code_combines_category_id_and_field() {
        let d = Diagnostic::new(
            Subject::layer(0, 1),
            FieldError::MissingRequired { field: "params.in_features".into() },
        );
        assert_eq!(d.code(), "02-0.1-params.in_features");
        assert_eq!(d.violation.kind_name(), "MissingRequired");
    }

    #[test]
    fn test_report_sorts_by_subject_then_field() {
        let mut report = ValidationReport::new();
        report.push(Subject::entity(EntityCategory::Block, 2), FieldError::MissingRequired { field: "b".into() });
        report.push(Subject::entity(EntityCategory::Block, 1), FieldError::MissingRequired { field: "z".into() });
        report.push(Subject::entity(EntityCategory::Block, 1), FieldError::MissingRequired { field: "a".into() });
        report.sort();

        let codes: Vec<_> = report.diagnostics.iter().map(Diagnostic::code).collect();
        assert_eq!(codes, vec!["01-1-a", "01-1-z", "01-2-b"]);
    }

    #[test]
    fn test_report_sorts_by_category_before_id() {
        let mut report = ValidationReport::new();
        let missing = |field: &str| FieldError::MissingRequired { field: field.into() };
        report.push(Subject::Link { kind: LinkKind::SignalRoute, position: 0 }, missing("source"));
        report.push(Subject::entity(EntityCategory::MemoryBuffer, 0), missing("size"));
        report.push(Subject::Entity { category: EntityCategory::Block, id: EntityId::Unidentified(0) }, missing("id"));
        report.push(Subject::layer(0, 1), missing("type"));
        report.push(Subject::entity(EntityCategory::Block, 9), missing("type"));
        report.sort();

        let codes: Vec<_> = report.diagnostics.iter().map(Diagnostic::code).collect();
        assert_eq!(codes, vec!["01-9-type", "01-#0-id", "02-0.1-type", "05-0-size", "R1-0-source"]);
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let e = ReferenceError::CyclicInference { field: "params.num_features".into(), path: vec!["a".into(), "b".into()] };
        assert!(e.to_string().contains("a -> b"));
    }
}

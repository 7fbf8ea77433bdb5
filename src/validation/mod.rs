//! Per-entity validation: the field and flag rules, and the diagnostic
//! taxonomy shared by every pass.
//!
//! The rules are pure functions over a resolved schema and a raw attribute
//! map. They collect every violation they find instead of stopping at the
//! first one; the IR builder attaches the results to the entity's subject.

pub use self::error::{
    Advisory, Diagnostic, DiagnosticRecord, EntityId, FieldError, FlagError, ReferenceError, Subject,
    ValidationReport, Violation,
};
pub use self::rules::fields::{check_value, validate_fields, Extensions, FieldTable, Slot, ValidatedFields};
pub use self::rules::flags::{requested_flags, validate_flags};

// --- MODULE DECLARATIONS ---
pub mod error;
mod rules {
    pub mod fields;
    pub mod flags;
}

//! The referential integrity pass.
//!
//! Runs once per network, after every entity has been built. It confirms that
//! all cross-entity references resolve and that every pending field can be
//! inferred from graph context. A definition is frozen only when this pass
//! reports nothing.

pub use self::checker::IntegrityChecker;
pub use self::rules::inference::{ProducerGraph, Resolution};

// --- MODULE DECLARATIONS ---
mod checker;
mod rules {
    pub mod existence;
    pub mod inference;
}

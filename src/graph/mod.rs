//! The intermediate representation: raw input, typed entities, the network
//! definition they are collected into, and the builder that fills it.
pub mod builder;
pub mod definition;
pub mod entity;
pub mod raw;
pub mod refs;

// Re-export key types for convenient access
pub use builder::IrBuilder;
pub use definition::{FrozenNetwork, NetworkDefinition};
pub use entity::{AuxEntity, Block, EntityAttrs, EntityRef, Input, Layer, Link, LinkRecord, Output, Reference};
pub use raw::RawNetwork;

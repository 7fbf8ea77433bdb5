//! Text renderings of a frozen network.
pub mod dump;

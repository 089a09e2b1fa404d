//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (model artifact, reference
//! data service).

mod model;
mod reference;

pub use model::{ModelError, UsageModel};
pub use reference::{ReferenceError, ReferenceSource};

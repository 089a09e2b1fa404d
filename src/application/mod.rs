//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

pub(crate) mod estimation;
mod handler;

pub use estimation::EstimationService;
pub use handler::{
    parse_profile, HandlerFailure, HandlerOutcome, PredictAction, PredictHandler, ResultRow,
    ResultTable,
};

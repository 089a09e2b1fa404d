//! # Therapist Demand
//!
//! Decision-support service that predicts how many employees of a company
//! will use the therapy service and how many additional therapists are
//! needed to serve them.
//!
//! This crate provides:
//! - Inference over a pre-trained tree-ensemble usage model
//! - Reference data (available slots, therapist activity) from Google Sheets
//!   or a bundled file, behind a refresh cache
//! - A small authenticated web UI and JSON API
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (profile vocabularies, encoders, tables, estimate)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (tree model, Sheets, file, cache)
//! - `application`: Use cases orchestrating domain and ports
//! - `web`: HTTP surface (axum)

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod web;

pub use domain::{Area, CompanyProfile, EmployeeCount, Estimate, Industry, Language};

/// Result type for estimator operations
pub type Result<T> = std::result::Result<T, DemandError>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum DemandError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Reference data unavailable: {0}")]
    RemoteFetch(ports::ReferenceError),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] domain::LookupError),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] domain::EncodingError),

    #[error("Computation failed: {0}")]
    Computation(#[from] domain::ComputationError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Model error: {0}")]
    Model(#[from] ports::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DemandError {
    /// Stable tag for logs, HTML and JSON error bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::RemoteFetch(_) => "remote_fetch",
            Self::Lookup(_) => "lookup",
            Self::Encoding(_) => "encoding",
            Self::Computation(_) => "computation",
            Self::Validation(_) => "validation",
            Self::Model(_) => "model",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<ports::ReferenceError> for DemandError {
    fn from(err: ports::ReferenceError) -> Self {
        match err {
            ports::ReferenceError::Table(lookup) => Self::Lookup(lookup),
            other => Self::RemoteFetch(other),
        }
    }
}

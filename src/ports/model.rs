//! Usage model port: Trait for the pre-trained regression model.
//!
//! This trait abstracts the exported model artifact from the application
//! logic so tests can inject fixture models.

/// Errors raised by model loading and inference.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model artifact: {0}")]
    Format(String),

    #[error("Model integrity check failed: {0}")]
    Integrity(String),

    #[error("Feature count mismatch: model expects {expected}, got {actual}")]
    FeatureCount { expected: usize, actual: usize },
}

/// Trait for usage prediction.
///
/// Implementations are immutable after loading and shared across requests.
pub trait UsageModel: Send + Sync {
    /// Number of input features the model expects.
    fn feature_count(&self) -> usize;

    /// Predict service usage (percent) for an encoded feature vector.
    ///
    /// # Errors
    /// Returns `ModelError::FeatureCount` if `features` has the wrong length.
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

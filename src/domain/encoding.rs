//! Category encoders mapping form labels to the integer codes the trained
//! model was fitted on.
//!
//! A label's code is its position in the trained class list, so the lists
//! must be exported in exactly the order the training pipeline produced.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::profile::{Area, CompanyProfile, Industry, Language};

/// Errors raised while encoding categorical inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("Unknown {field} label {label:?}: not part of the trained vocabulary")]
    UnknownLabel { field: &'static str, label: String },

    #[error("Encoder for {field} lists {label:?} more than once")]
    DuplicateLabel { field: &'static str, label: String },

    #[error("Encoder for {field} has no classes")]
    EmptyVocabulary { field: &'static str },

    #[error("Failed to load encoders: {0}")]
    Load(String),
}

/// Label encoder for a single categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Build an encoder from the trained class list.
    ///
    /// # Errors
    /// Returns error if the list is empty or contains duplicates.
    pub fn new(field: &'static str, classes: Vec<String>) -> Result<Self, EncodingError> {
        let encoder = Self { classes };
        encoder.check(field)?;
        Ok(encoder)
    }

    fn check(&self, field: &'static str) -> Result<(), EncodingError> {
        if self.classes.is_empty() {
            return Err(EncodingError::EmptyVocabulary { field });
        }
        for (i, label) in self.classes.iter().enumerate() {
            if self.classes[..i].contains(label) {
                return Err(EncodingError::DuplicateLabel {
                    field,
                    label: label.clone(),
                });
            }
        }
        Ok(())
    }

    /// Code of `label`, or `UnknownLabel` if it was never seen in training.
    ///
    /// # Errors
    /// Returns `EncodingError::UnknownLabel` for unseen labels.
    pub fn encode(&self, field: &'static str, label: &str) -> Result<u32, EncodingError> {
        self.classes
            .iter()
            .position(|c| c == label)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| EncodingError::UnknownLabel {
                field,
                label: label.to_string(),
            })
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Encoded model input.
///
/// Feature order matches the trained model: language, area, industry, n.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedProfile {
    pub language: u32,
    pub area: u32,
    pub industry: u32,
    pub employee_count: f64,
}

impl EncodedProfile {
    /// Number of model features.
    pub const FEATURE_COUNT: usize = 4;

    /// Feature vector in model order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            f64::from(self.language),
            f64::from(self.area),
            f64::from(self.industry),
            self.employee_count,
        ]
    }
}

/// Feature names in model order.
pub const FEATURE_NAMES: [&str; EncodedProfile::FEATURE_COUNT] =
    ["language", "area", "industry", "n"];

/// The three fixed encoders, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoders {
    language: LabelEncoder,
    area: LabelEncoder,
    industry: LabelEncoder,
}

impl CategoryEncoders {
    /// Build encoders from explicit class lists.
    ///
    /// # Errors
    /// Returns error if any list is empty or has duplicates.
    pub fn new(
        language: Vec<String>,
        area: Vec<String>,
        industry: Vec<String>,
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            language: LabelEncoder::new("language", language)?,
            area: LabelEncoder::new("area", area)?,
            industry: LabelEncoder::new("industry", industry)?,
        })
    }

    /// Parse encoders from the exported JSON document.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or a class list is invalid.
    pub fn from_json(bytes: &[u8]) -> Result<Self, EncodingError> {
        let encoders: Self =
            serde_json::from_slice(bytes).map_err(|e| EncodingError::Load(e.to_string()))?;
        encoders.language.check("language")?;
        encoders.area.check("area")?;
        encoders.industry.check("industry")?;
        Ok(encoders)
    }

    /// Load encoders from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, EncodingError> {
        let bytes = std::fs::read(path)
            .map_err(|e| EncodingError::Load(format!("{}: {e}", path.display())))?;
        Self::from_json(&bytes)
    }

    /// Check that every label the form can submit is encodable.
    ///
    /// Run at startup so a vocabulary mismatch between the UI and the
    /// trained encoders stops the process instead of failing requests.
    ///
    /// # Errors
    /// Returns the first label that cannot be encoded.
    pub fn validate_vocabulary(&self) -> Result<(), EncodingError> {
        for language in Language::ALL {
            self.language.encode("language", language.label())?;
        }
        for area in Area::ALL {
            self.area.encode("area", area.label())?;
        }
        for industry in Industry::ALL {
            self.industry.encode("industry", industry.label())?;
        }
        Ok(())
    }

    /// Encode a profile into model input.
    ///
    /// # Errors
    /// Returns `EncodingError::UnknownLabel` if any label is unseen.
    pub fn encode(&self, profile: &CompanyProfile) -> Result<EncodedProfile, EncodingError> {
        Ok(EncodedProfile {
            language: self.language.encode("language", profile.language.label())?,
            area: self.area.encode("area", profile.area.label())?,
            industry: self.industry.encode("industry", profile.industry.label())?,
            employee_count: profile.employee_count.as_f64(),
        })
    }
}

//! File adapter: Implementation of ReferenceSource over a bundled JSON file.
//!
//! The file holds the same row grids the spreadsheet returns:
//! `{ "slots": [[header...], [row...]], "activity": [[header...], ...] }`.
//! It is read once at construction; the tables never change afterwards.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::ReferenceTables;
use crate::ports::{ReferenceError, ReferenceSource};

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    slots: Vec<Vec<String>>,
    activity: Vec<Vec<String>>,
}

/// Reference source backed by a local file or fixed tables.
#[derive(Debug, Clone)]
pub struct StaticReferenceSource {
    origin: String,
    tables: Arc<ReferenceTables>,
}

impl StaticReferenceSource {
    /// Wrap already-built tables.
    #[must_use]
    pub fn new(tables: ReferenceTables) -> Self {
        Self {
            origin: "in-memory".to_string(),
            tables: Arc::new(tables),
        }
    }

    /// Load tables from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the grids are invalid.
    pub fn from_file(path: &Path) -> Result<Self, ReferenceError> {
        let file_err = |message: String| ReferenceError::File {
            path: path.display().to_string(),
            message,
        };
        let bytes = std::fs::read(path).map_err(|e| file_err(e.to_string()))?;
        let file: ReferenceFile =
            serde_json::from_slice(&bytes).map_err(|e| file_err(e.to_string()))?;
        let tables = ReferenceTables::from_rows(&file.slots, &file.activity)?;

        tracing::info!(
            "Loaded reference data from {:?} ({} slot entries, {} therapists)",
            path,
            tables.slots.len(),
            tables.activity.len()
        );

        Ok(Self {
            origin: path.display().to_string(),
            tables: Arc::new(tables),
        })
    }
}

impl ReferenceSource for StaticReferenceSource {
    fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
        Ok(Arc::clone(&self.tables))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Area, Language};
    use tempfile::tempdir;

    #[test]
    fn test_bundled_sample_loads() {
        let source = StaticReferenceSource::from_file(Path::new("data/reference_sample.json"))
            .expect("sample loads");
        let tables = source.fetch().unwrap();
        assert_eq!(
            tables
                .slots
                .available_slots(Area::NorthAmerica, Language::English)
                .unwrap(),
            50.0
        );
        assert_eq!(tables.activity.mean_patients_per_therapist().unwrap(), 20.0);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("reference.json");
        std::fs::write(&path, b"{\"slots\": []}").unwrap();

        let err = StaticReferenceSource::from_file(&path).unwrap_err();
        assert!(matches!(err, ReferenceError::File { .. }));

        std::fs::write(&path, br#"{"slots": [], "activity": [["Total Actives"]]}"#).unwrap();
        let err = StaticReferenceSource::from_file(&path).unwrap_err();
        assert!(matches!(err, ReferenceError::Table(_)));
    }
}

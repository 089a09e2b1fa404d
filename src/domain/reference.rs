//! Reference tables: available slots by area and language, and
//! per-therapist activity.
//!
//! Both tables arrive as row grids whose first row is the header. Rows may
//! be shorter than the header; missing trailing cells are treated as blank.

use chrono::{DateTime, Utc};

use super::profile::{Area, Language};

/// Header of the key column in the slots table.
pub const AREA_COLUMN: &str = "Continent_therapist";

/// Header of the active-patient column in the activity table.
pub const ACTIVE_PATIENTS_COLUMN: &str = "Total Actives";

/// Errors raised while building or querying reference tables.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("No available-slot entry for {language} in {area}")]
    MissingSlots { area: Area, language: Language },

    #[error("Available slots for {language} in {area} is not a number: {value:?}")]
    MalformedSlots {
        area: Area,
        language: Language,
        value: String,
    },

    #[error("Therapist activity table has no active-patient values")]
    EmptyActivity,

    #[error("Active-patient value on row {row} is not a number: {value:?}")]
    MalformedActivity { row: usize, value: String },

    #[error("Reference table {table} has no header row")]
    MissingHeader { table: &'static str },

    #[error("Reference table {table} has no {column:?} column")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

fn cell(row: &[String], index: usize) -> Option<&str> {
    row.get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Available slots keyed by (area, language).
///
/// Cells are kept as text and parsed on lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotTable {
    entries: Vec<(Area, Language, String)>,
}

impl SlotTable {
    /// Build the table from a header row plus data rows.
    ///
    /// Rows whose area is outside the vocabulary and columns whose header is
    /// not a language are ignored.
    ///
    /// # Errors
    /// Returns error if the header or the area column is missing.
    pub fn from_rows(rows: &[Vec<String>]) -> Result<Self, LookupError> {
        let (header, data) = rows
            .split_first()
            .ok_or(LookupError::MissingHeader { table: "slots" })?;

        let area_idx = header
            .iter()
            .position(|h| h.trim() == AREA_COLUMN)
            .ok_or(LookupError::MissingColumn {
                table: "slots",
                column: AREA_COLUMN,
            })?;

        let language_columns: Vec<(usize, Language)> = header
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.parse::<Language>().ok().map(|l| (i, l)))
            .collect();

        // Only the first row of each area counts; its blank cells stay blank
        // instead of falling through to a later duplicate row.
        let mut seen: Vec<Area> = Vec::new();
        let mut entries = Vec::new();
        for row in data {
            let Some(area) = cell(row, area_idx).and_then(|a| a.parse::<Area>().ok()) else {
                continue;
            };
            if seen.contains(&area) {
                continue;
            }
            seen.push(area);
            for &(idx, language) in &language_columns {
                let value = cell(row, idx).unwrap_or_default();
                entries.push((area, language, value.to_string()));
            }
        }

        Ok(Self { entries })
    }

    /// Insert a value directly (fixtures and bundled data).
    pub fn insert(&mut self, area: Area, language: Language, slots: f64) {
        self.entries.push((area, language, slots.to_string()));
    }

    /// Available slots for the first row matching `area`.
    ///
    /// # Errors
    /// Returns `MissingSlots` if the area has no row or the cell in its
    /// first row is blank, or `MalformedSlots` if the value is not numeric.
    pub fn available_slots(&self, area: Area, language: Language) -> Result<f64, LookupError> {
        let raw = self
            .entries
            .iter()
            .find(|(a, l, _)| *a == area && *l == language)
            .map(|(_, _, v)| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or(LookupError::MissingSlots { area, language })?;

        parse_number(raw).ok_or_else(|| LookupError::MalformedSlots {
            area,
            language,
            value: raw.to_string(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-therapist active-patient counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityTable {
    active_patients: Vec<f64>,
}

impl ActivityTable {
    #[must_use]
    pub fn new(active_patients: Vec<f64>) -> Self {
        Self { active_patients }
    }

    /// Build the table from a header row plus data rows.
    ///
    /// Blank cells are skipped; anything else must be numeric.
    ///
    /// # Errors
    /// Returns error if the header or column is missing, or a cell is not
    /// a number.
    pub fn from_rows(rows: &[Vec<String>]) -> Result<Self, LookupError> {
        let (header, data) = rows
            .split_first()
            .ok_or(LookupError::MissingHeader { table: "activity" })?;

        let idx = header
            .iter()
            .position(|h| h.trim() == ACTIVE_PATIENTS_COLUMN)
            .ok_or(LookupError::MissingColumn {
                table: "activity",
                column: ACTIVE_PATIENTS_COLUMN,
            })?;

        let mut active_patients = Vec::with_capacity(data.len());
        for (i, row) in data.iter().enumerate() {
            if let Some(raw) = cell(row, idx) {
                let value = parse_number(raw).ok_or_else(|| LookupError::MalformedActivity {
                    // 1-based, counting the header
                    row: i + 2,
                    value: raw.to_string(),
                })?;
                active_patients.push(value);
            }
        }

        Ok(Self { active_patients })
    }

    /// Arithmetic mean of active patients per therapist.
    ///
    /// # Errors
    /// Returns `EmptyActivity` if there are no values.
    pub fn mean_patients_per_therapist(&self) -> Result<f64, LookupError> {
        if self.active_patients.is_empty() {
            return Err(LookupError::EmptyActivity);
        }
        let sum: f64 = self.active_patients.iter().sum();
        Ok(sum / self.active_patients.len() as f64)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.active_patients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active_patients.is_empty()
    }
}

/// Snapshot of both reference tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTables {
    pub slots: SlotTable,
    pub activity: ActivityTable,
    pub fetched_at: DateTime<Utc>,
}

impl ReferenceTables {
    #[must_use]
    pub fn new(slots: SlotTable, activity: ActivityTable) -> Self {
        Self {
            slots,
            activity,
            fetched_at: Utc::now(),
        }
    }

    /// Build both tables from raw row grids.
    ///
    /// # Errors
    /// Returns error if either grid is structurally invalid.
    pub fn from_rows(
        slot_rows: &[Vec<String>],
        activity_rows: &[Vec<String>],
    ) -> Result<Self, LookupError> {
        Ok(Self::new(
            SlotTable::from_rows(slot_rows)?,
            ActivityTable::from_rows(activity_rows)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| (*c).to_string()).collect())
            .collect()
    }

    #[test]
    fn test_slot_lookup_first_match_wins() {
        let rows = grid(&[
            &["Continent_therapist", "English", "Spanish", "Notes"],
            &["North America", "50", "12", "x"],
            &["North America", "999", "1"],
            &["Oceania", "7", "7"],
        ]);
        let table = SlotTable::from_rows(&rows).expect("valid table");

        assert_eq!(
            table
                .available_slots(Area::NorthAmerica, Language::English)
                .unwrap(),
            50.0
        );
        assert_eq!(
            table
                .available_slots(Area::NorthAmerica, Language::Spanish)
                .unwrap(),
            12.0
        );
    }

    #[test]
    fn test_slot_lookup_missing_and_malformed() {
        let rows = grid(&[
            &["Continent_therapist", "English", "French"],
            &["Europe", "n/a"],
        ]);
        let table = SlotTable::from_rows(&rows).unwrap();

        assert_eq!(
            table.available_slots(Area::Europe, Language::French),
            Err(LookupError::MissingSlots {
                area: Area::Europe,
                language: Language::French
            })
        );
        assert!(matches!(
            table.available_slots(Area::Europe, Language::English),
            Err(LookupError::MalformedSlots { .. })
        ));
        assert!(table
            .available_slots(Area::Asia, Language::English)
            .is_err());
    }

    #[test]
    fn test_blank_cell_in_first_area_row_is_missing() {
        let rows = grid(&[
            &["Continent_therapist", "English", "Spanish"],
            &["Europe", "", "5"],
            &["Europe", "999", "1"],
        ]);
        let table = SlotTable::from_rows(&rows).unwrap();

        assert_eq!(
            table.available_slots(Area::Europe, Language::English),
            Err(LookupError::MissingSlots {
                area: Area::Europe,
                language: Language::English
            })
        );
        assert_eq!(
            table
                .available_slots(Area::Europe, Language::Spanish)
                .unwrap(),
            5.0
        );
    }

    #[test]
    fn test_slot_table_requires_area_column() {
        let rows = grid(&[&["Area", "English"], &["Europe", "3"]]);
        assert!(matches!(
            SlotTable::from_rows(&rows),
            Err(LookupError::MissingColumn { .. })
        ));
        assert!(matches!(
            SlotTable::from_rows(&[]),
            Err(LookupError::MissingHeader { .. })
        ));
    }

    #[test]
    fn test_activity_mean_skips_blanks() {
        let rows = grid(&[
            &["Therapist", "Total Actives"],
            &["a", "10"],
            &["b", ""],
            &["c"],
            &["d", "30"],
        ]);
        let table = ActivityTable::from_rows(&rows).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.mean_patients_per_therapist().unwrap(), 20.0);
    }

    #[test]
    fn test_activity_empty_is_lookup_error() {
        let rows = grid(&[&["Therapist", "Total Actives"]]);
        let table = ActivityTable::from_rows(&rows).unwrap();
        assert_eq!(
            table.mean_patients_per_therapist(),
            Err(LookupError::EmptyActivity)
        );
    }

    #[test]
    fn test_activity_malformed_cell() {
        let rows = grid(&[&["Total Actives"], &["12"], &["twelve"]]);
        assert_eq!(
            ActivityTable::from_rows(&rows),
            Err(LookupError::MalformedActivity {
                row: 3,
                value: "twelve".into()
            })
        );
    }
}

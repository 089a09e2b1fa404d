//! Domain layer: Core business types and logic.
//!
//! Pure Rust types with no I/O beyond reading encoder files. Closed
//! vocabularies are enums so the form and the encoders cannot drift apart
//! silently.

mod encoding;
mod estimate;
mod profile;
mod reference;

pub use encoding::{CategoryEncoders, EncodedProfile, EncodingError, LabelEncoder, FEATURE_NAMES};
pub use estimate::{ComputationError, Estimate};
pub use profile::{Area, CompanyProfile, EmployeeCount, Industry, Language};
pub use reference::{
    ActivityTable, LookupError, ReferenceTables, SlotTable, ACTIVE_PATIENTS_COLUMN, AREA_COLUMN,
};

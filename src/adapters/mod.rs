//! Adapters layer: Concrete implementations of ports.
//!
//! - `forest`: tree-ensemble usage model and signed artifact loading
//! - `sheets`: Google Sheets reference data
//! - `static_source`: reference data from a bundled JSON file
//! - `cache`: TTL cache over any reference source
//! - `sanitize`: secret filtering for logs

pub mod cache;
pub mod forest;
pub mod sanitize;
pub mod sheets;
pub mod static_source;

pub use cache::CachedReferenceSource;
pub use forest::{load_artifacts, ArtifactPolicy, ModelArtifacts, TreeEnsemble, Verification};
pub use sheets::{AuthorizedUserInfo, SheetRanges, SheetsReferenceSource};
pub use static_source::StaticReferenceSource;

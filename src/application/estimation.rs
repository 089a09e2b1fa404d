//! Estimation service: Orchestrates one demand estimate.
//!
//! This service coordinates:
//! - Reference lookup (available slots, mean therapist load)
//! - Category encoding
//! - Model inference
//! - Arithmetic derivation of the staffing estimate

use std::sync::Arc;

use crate::domain::{CategoryEncoders, CompanyProfile, Estimate};
use crate::ports::{ModelError, ReferenceSource, UsageModel};
use crate::DemandError;

/// Service for running estimates.
///
/// Holds only immutable, shared state; clones are cheap and every request
/// may use its own.
pub struct EstimationService<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    model: Arc<M>,
    reference: Arc<R>,
    encoders: Arc<CategoryEncoders>,
}

impl<M, R> Clone for EstimationService<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            reference: Arc::clone(&self.reference),
            encoders: Arc::clone(&self.encoders),
        }
    }
}

impl<M, R> EstimationService<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    /// Create a new estimation service.
    ///
    /// # Errors
    /// Returns `DemandError::Model` if the model does not take the encoded
    /// profile as input.
    pub fn new(
        model: Arc<M>,
        reference: Arc<R>,
        encoders: Arc<CategoryEncoders>,
    ) -> Result<Self, DemandError> {
        let expected = crate::domain::EncodedProfile::FEATURE_COUNT;
        if model.feature_count() != expected {
            return Err(ModelError::FeatureCount {
                expected,
                actual: model.feature_count(),
            }
            .into());
        }

        Ok(Self {
            model,
            reference,
            encoders,
        })
    }

    /// Description of the reference source (for startup logs).
    #[must_use]
    pub fn reference_origin(&self) -> String {
        self.reference.describe()
    }

    /// Run the full estimation for one profile.
    ///
    /// Performs the pipeline:
    /// 1. Look up available slots for (area, language)
    /// 2. Average the active-patient load per therapist
    /// 3. Encode the categorical inputs
    /// 4. Predict usage percentage
    /// 5. Derive users, shortfall and therapists needed
    ///
    /// # Errors
    /// Returns `RemoteFetch` or `Lookup` for reference data problems,
    /// `Encoding` for unseen labels, `Model` or `Computation` for inference
    /// and arithmetic faults.
    pub fn estimate(&self, profile: &CompanyProfile) -> Result<Estimate, DemandError> {
        tracing::debug!(
            "Estimating for {}/{}/{} with {} employees",
            profile.language,
            profile.area,
            profile.industry,
            profile.employee_count
        );

        let tables = self.reference.fetch()?;

        // Step 1: Table A
        let available_slots = tables.slots.available_slots(profile.area, profile.language)?;
        tracing::debug!("Step 1: available slots = {}", available_slots);

        // Step 2: Table B
        let patients_per_therapist = tables.activity.mean_patients_per_therapist()?;
        tracing::debug!("Step 2: mean patients per therapist = {:.2}", patients_per_therapist);

        // Step 3: Encode
        let encoded = self.encoders.encode(profile)?;
        tracing::debug!("Step 3: encoded features = {:?}", encoded.to_vec());

        // Step 4: Predict
        let predicted_usage_pct = self.model.predict(&encoded.to_vec())?;
        tracing::debug!("Step 4: predicted usage = {:.4}%", predicted_usage_pct);

        // Step 5: Derive
        let estimate = Estimate::derive(
            predicted_usage_pct,
            profile.employee_count.as_f64(),
            available_slots,
            patients_per_therapist,
        )?;

        tracing::info!(
            "Estimate complete: usage={:.2}%, users={:.2}, slots_needed={:.2}, therapists={:.2}",
            estimate.predicted_usage_pct,
            estimate.estimated_users,
            estimate.slots_needed,
            estimate.therapists_needed
        );

        Ok(estimate)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::StaticReferenceSource;
    use crate::domain::{
        ActivityTable, Area, EmployeeCount, EncodingError, Industry, Language, LookupError,
        ReferenceTables, SlotTable,
    };
    use crate::ports::ReferenceError;

    /// Model that always predicts the same usage.
    pub(crate) struct FixedModel(pub f64);

    impl UsageModel for FixedModel {
        fn feature_count(&self) -> usize {
            4
        }

        fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
            if features.len() != 4 {
                return Err(ModelError::FeatureCount {
                    expected: 4,
                    actual: features.len(),
                });
            }
            Ok(self.0)
        }
    }

    pub(crate) struct DownSource;

    impl ReferenceSource for DownSource {
        fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
            Err(ReferenceError::Timeout)
        }

        fn describe(&self) -> String {
            "down".into()
        }
    }

    pub(crate) fn encoders() -> Arc<CategoryEncoders> {
        Arc::new(
            CategoryEncoders::load(std::path::Path::new("models/label_encoders.json"))
                .expect("fixture encoders"),
        )
    }

    pub(crate) fn tables(slots: f64, loads: Vec<f64>) -> StaticReferenceSource {
        let mut slot_table = SlotTable::default();
        slot_table.insert(Area::NorthAmerica, Language::English, slots);
        StaticReferenceSource::new(ReferenceTables::new(
            slot_table,
            ActivityTable::new(loads),
        ))
    }

    pub(crate) fn service(
        usage: f64,
        slots: f64,
    ) -> EstimationService<FixedModel, StaticReferenceSource> {
        EstimationService::new(
            Arc::new(FixedModel(usage)),
            Arc::new(tables(slots, vec![18.0, 22.0, 25.0, 15.0, 20.0])),
            encoders(),
        )
        .expect("valid service")
    }

    fn profile(language: Language) -> CompanyProfile {
        CompanyProfile::new(
            language,
            Area::NorthAmerica,
            Industry::Technology,
            EmployeeCount::new(1000).unwrap(),
        )
    }

    #[test]
    fn test_shortfall_scenario() {
        let estimate = service(10.0, 50.0)
            .estimate(&profile(Language::English))
            .expect("estimate");

        assert_eq!(estimate.predicted_usage_pct, 10.0);
        assert_eq!(estimate.estimated_users, 100.0);
        assert_eq!(estimate.available_slots, 50.0);
        assert_eq!(estimate.slots_needed, 50.0);
        assert_eq!(estimate.patients_per_therapist, 20.0);
        assert!((estimate.therapists_needed - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_surplus_scenario() {
        let estimate = service(10.0, 500.0)
            .estimate(&profile(Language::English))
            .expect("estimate");

        assert_eq!(estimate.slots_needed, 0.0);
        assert_eq!(estimate.therapists_needed, 0.0);
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let service = service(7.25, 10.0);
        let first = service.estimate(&profile(Language::English)).unwrap();
        let second = service.estimate(&profile(Language::English)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_slot_entry_is_lookup_error() {
        let err = service(10.0, 50.0)
            .estimate(&profile(Language::German))
            .unwrap_err();
        assert!(matches!(
            err,
            DemandError::Lookup(LookupError::MissingSlots {
                language: Language::German,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_activity_is_lookup_error() {
        let service = EstimationService::new(
            Arc::new(FixedModel(10.0)),
            Arc::new(tables(50.0, Vec::new())),
            encoders(),
        )
        .unwrap();
        let err = service.estimate(&profile(Language::English)).unwrap_err();
        assert!(matches!(err, DemandError::Lookup(LookupError::EmptyActivity)));
    }

    #[test]
    fn test_unseen_label_is_encoding_error() {
        let encoders = CategoryEncoders::new(
            vec!["Spanish".into()],
            vec!["North America".into()],
            vec!["Technology".into()],
        )
        .unwrap();
        let service = EstimationService::new(
            Arc::new(FixedModel(10.0)),
            Arc::new(tables(50.0, vec![20.0])),
            Arc::new(encoders),
        )
        .unwrap();

        let err = service.estimate(&profile(Language::English)).unwrap_err();
        assert!(matches!(
            err,
            DemandError::Encoding(EncodingError::UnknownLabel { field: "language", .. })
        ));
    }

    #[test]
    fn test_remote_failure_is_remote_fetch() {
        let service =
            EstimationService::new(Arc::new(FixedModel(10.0)), Arc::new(DownSource), encoders())
                .unwrap();
        let err = service.estimate(&profile(Language::English)).unwrap_err();
        assert_eq!(err.kind(), "remote_fetch");
    }

    #[test]
    fn test_non_finite_prediction_is_computation_error() {
        let err = service(f64::NAN, 50.0)
            .estimate(&profile(Language::English))
            .unwrap_err();
        assert_eq!(err.kind(), "computation");
    }

    #[test]
    fn test_zero_load_with_shortfall_is_computation_error() {
        let service = EstimationService::new(
            Arc::new(FixedModel(10.0)),
            Arc::new(tables(50.0, vec![0.0, 0.0])),
            encoders(),
        )
        .unwrap();
        let err = service.estimate(&profile(Language::English)).unwrap_err();
        assert_eq!(err.kind(), "computation");
    }

    #[test]
    fn test_bundled_model_end_to_end() {
        use crate::adapters::{load_artifacts, ArtifactPolicy};

        let artifacts = load_artifacts(
            std::path::Path::new("models"),
            &ArtifactPolicy::new(None, false),
        )
        .expect("bundled artifacts load");
        let service = EstimationService::new(
            Arc::new(artifacts.model),
            Arc::new(tables(50.0, vec![18.0, 22.0, 25.0, 15.0, 20.0])),
            Arc::new(artifacts.encoders),
        )
        .unwrap();

        let estimate = service.estimate(&profile(Language::English)).unwrap();
        assert_eq!(estimate.predicted_usage_pct, 10.0);
        assert!((estimate.therapists_needed - 2.5).abs() < 1e-12);
    }
}

//! Predict handler: validates form input, runs one estimate and formats the
//! result table.
//!
//! Every failure ends up in `HandlerOutcome::Failed`; nothing here panics
//! or propagates past the caller.

use serde::{Deserialize, Serialize};

use crate::application::EstimationService;
use crate::domain::{Area, CompanyProfile, EmployeeCount, Estimate, Industry, Language};
use crate::ports::{ReferenceSource, UsageModel};
use crate::DemandError;

/// One press of the Predict control, with the raw form values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PredictAction {
    #[serde(default)]
    pub n_clicks: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub employee_count: Option<String>,
}

/// A labelled row of the results table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub metric: String,
    pub value: String,
}

/// The six result rows, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultTable {
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Format an estimate for display.
    ///
    /// Available slots are shown as stored; everything else with two
    /// decimals.
    #[must_use]
    pub fn from_estimate(language: Language, estimate: &Estimate) -> Self {
        let row = |metric: String, value: String| ResultRow { metric, value };
        Self {
            rows: vec![
                row(
                    "Predicted Service Usage (%)".into(),
                    format!("{:.2}", estimate.predicted_usage_pct),
                ),
                row(
                    "Estimated Number of Users".into(),
                    format!("{:.2}", estimate.estimated_users),
                ),
                row(
                    format!("Available Slots in {language}"),
                    estimate.available_slots.to_string(),
                ),
                row("Slots Needed".into(), format!("{:.2}", estimate.slots_needed)),
                row(
                    "Patients per Therapist".into(),
                    format!("{:.2}", estimate.patients_per_therapist),
                ),
                row(
                    "Additional Therapists Needed".into(),
                    format!("{:.2}", estimate.therapists_needed),
                ),
            ],
        }
    }
}

/// A user-visible failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    pub kind: &'static str,
    pub message: String,
}

impl From<&DemandError> for HandlerFailure {
    fn from(err: &DemandError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// What the output area should show after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Leave the output untouched.
    NoUpdate,
    Table(ResultTable),
    Failed(HandlerFailure),
}

/// Parse the four raw form values into a profile.
///
/// # Errors
/// Returns `Validation` for missing fields or a bad employee count, and
/// `Encoding` for labels outside the vocabulary.
pub fn parse_profile(action: &PredictAction) -> Result<CompanyProfile, DemandError> {
    fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, DemandError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DemandError::Validation(format!("{name} is required")))
    }

    let language: Language = required(&action.language, "Language")?.parse()?;
    let area: Area = required(&action.area, "Area")?.parse()?;
    let industry: Industry = required(&action.industry, "Industry")?.parse()?;
    let employee_count = EmployeeCount::parse_field(required(
        &action.employee_count,
        "Number of employees",
    )?)
    .map_err(DemandError::Validation)?;

    Ok(CompanyProfile::new(language, area, industry, employee_count))
}

/// Handler behind the Predict control.
pub struct PredictHandler<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    service: EstimationService<M, R>,
}

impl<M, R> Clone for PredictHandler<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<M, R> PredictHandler<M, R>
where
    M: UsageModel,
    R: ReferenceSource,
{
    #[must_use]
    pub fn new(service: EstimationService<M, R>) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &EstimationService<M, R> {
        &self.service
    }

    /// Handle one action.
    #[must_use]
    pub fn handle(&self, action: &PredictAction) -> HandlerOutcome {
        if action.n_clicks == 0 {
            return HandlerOutcome::NoUpdate;
        }

        let result = parse_profile(action).and_then(|profile| {
            self.service
                .estimate(&profile)
                .map(|estimate| ResultTable::from_estimate(profile.language, &estimate))
        });

        match result {
            Ok(table) => HandlerOutcome::Table(table),
            Err(e) => {
                tracing::warn!("Prediction failed ({}): {}", e.kind(), e);
                HandlerOutcome::Failed(HandlerFailure::from(&e))
            }
        }
    }
}

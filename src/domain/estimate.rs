//! Estimate: the six values derived from a usage prediction.

use serde::{Deserialize, Serialize};

/// Arithmetic faults in the derivation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputationError {
    #[error("Mean patients per therapist is zero; cannot convert {slots_needed:.2} needed slots into therapists")]
    ZeroPatientsPerTherapist { slots_needed: f64 },

    #[error("Model produced a non-finite usage prediction ({0})")]
    NonFinitePrediction(f64),

    #[error("Derived value {name} is not finite")]
    NonFinite { name: &'static str },
}

/// Result of one estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Model-predicted service usage, in percent.
    pub predicted_usage_pct: f64,
    pub estimated_users: f64,
    pub available_slots: f64,
    /// Never negative.
    pub slots_needed: f64,
    pub patients_per_therapist: f64,
    /// Zero whenever `slots_needed` is zero.
    pub therapists_needed: f64,
}

impl Estimate {
    /// Derive the estimate from a prediction and the reference values.
    ///
    /// `estimated_users = employees * usage / 100`, the slot shortfall is
    /// clamped at zero and converted into therapists using the mean load.
    ///
    /// # Errors
    /// Returns error if the prediction is not finite, or a positive
    /// shortfall meets a zero mean load.
    pub fn derive(
        predicted_usage_pct: f64,
        employee_count: f64,
        available_slots: f64,
        patients_per_therapist: f64,
    ) -> Result<Self, ComputationError> {
        if !predicted_usage_pct.is_finite() {
            return Err(ComputationError::NonFinitePrediction(predicted_usage_pct));
        }

        let estimated_users = employee_count * predicted_usage_pct / 100.0;
        let shortfall = estimated_users - available_slots;

        let (slots_needed, therapists_needed) = if shortfall > 0.0 {
            if patients_per_therapist == 0.0 {
                return Err(ComputationError::ZeroPatientsPerTherapist {
                    slots_needed: shortfall,
                });
            }
            (shortfall, shortfall / patients_per_therapist)
        } else {
            (0.0, 0.0)
        };

        let estimate = Self {
            predicted_usage_pct,
            estimated_users,
            available_slots,
            slots_needed,
            patients_per_therapist,
            therapists_needed,
        };
        estimate.check_finite()?;
        Ok(estimate)
    }

    fn check_finite(&self) -> Result<(), ComputationError> {
        let fields = [
            ("estimated_users", self.estimated_users),
            ("available_slots", self.available_slots),
            ("slots_needed", self.slots_needed),
            ("patients_per_therapist", self.patients_per_therapist),
            ("therapists_needed", self.therapists_needed),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, _)) => Err(ComputationError::NonFinite { name: *name }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortfall_converted_to_therapists() {
        let e = Estimate::derive(10.0, 1000.0, 50.0, 20.0).expect("derivable");
        assert!((e.estimated_users - 100.0).abs() < 1e-9);
        assert!((e.slots_needed - 50.0).abs() < 1e-9);
        assert!((e.therapists_needed - 2.5).abs() < 1e-9);
        assert!((e.patients_per_therapist - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_surplus_clamps_to_zero() {
        let e = Estimate::derive(10.0, 1000.0, 500.0, 20.0).expect("derivable");
        assert_eq!(e.slots_needed, 0.0);
        assert_eq!(e.therapists_needed, 0.0);
        assert!((e.estimated_users - 100.0).abs() < 1e-9);

        // Exact match is not a shortfall either.
        let e = Estimate::derive(10.0, 1000.0, 100.0, 20.0).unwrap();
        assert_eq!(e.slots_needed, 0.0);
    }

    #[test]
    fn test_zero_mean_only_fails_with_shortfall() {
        assert!(matches!(
            Estimate::derive(10.0, 1000.0, 50.0, 0.0),
            Err(ComputationError::ZeroPatientsPerTherapist { .. })
        ));
        let e = Estimate::derive(10.0, 1000.0, 500.0, 0.0).expect("no division needed");
        assert_eq!(e.therapists_needed, 0.0);
    }

    #[test]
    fn test_non_finite_prediction_rejected() {
        assert!(matches!(
            Estimate::derive(f64::NAN, 1000.0, 50.0, 20.0),
            Err(ComputationError::NonFinitePrediction(_))
        ));
    }

    #[test]
    fn test_values_non_negative_across_grid() {
        for usage in [0.0, 0.5, 7.25, 42.0, 100.0] {
            for employees in [1.0, 17.0, 1000.0, 250_000.0] {
                for slots in [0.0, 3.0, 50.0, 10_000.0] {
                    let e = Estimate::derive(usage, employees, slots, 12.5).unwrap();
                    assert!(e.slots_needed >= 0.0);
                    assert!(e.therapists_needed >= 0.0);
                    assert!(e.estimated_users >= 0.0);
                    if e.slots_needed == 0.0 {
                        assert_eq!(e.therapists_needed, 0.0);
                    }
                }
            }
        }
    }
}

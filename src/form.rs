//! Manual entry form for a single patient.
//!
//! The form is the capturing widget: it owns the documented input ranges and
//! clamps out-of-range values before they reach the feature extractor.

use crate::types::record::{FEATURE_COUNT, FEATURE_NAMES};
use tracing::warn;

/// Inclusive bounds for one form field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRange {
    pub min: f64,
    pub max: f64,
}

impl FieldRange {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Form bounds, in training order.
pub const FORM_RANGES: [FieldRange; FEATURE_COUNT] = [
    FieldRange::new(0.0, 17.0),    // Pregnancies
    FieldRange::new(40.0, 200.0),  // Glucose
    FieldRange::new(40.0, 122.0),  // BloodPressure
    FieldRange::new(0.0, 99.0),    // SkinThickness
    FieldRange::new(0.0, 846.0),   // Insulin
    FieldRange::new(15.0, 67.1),   // BMI
    FieldRange::new(0.078, 2.42),  // DiabetesPedigreeFunction
    FieldRange::new(21.0, 100.0),  // Age
];

/// Raw values typed into the form
#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct FormInput {
    /// Number of pregnancies [0, 17]
    #[arg(long, default_value_t = 1)]
    pub pregnancies: u32,

    /// Plasma glucose concentration [40, 200]
    #[arg(long, default_value_t = 120.0)]
    pub glucose: f64,

    /// Diastolic blood pressure [40, 122]
    #[arg(long, default_value_t = 70.0)]
    pub blood_pressure: f64,

    /// Triceps skin fold thickness [0, 99]
    #[arg(long, default_value_t = 20.0)]
    pub skin_thickness: f64,

    /// 2-hour serum insulin [0, 846]
    #[arg(long, default_value_t = 79.0)]
    pub insulin: f64,

    /// Body mass index [15.0, 67.1]
    #[arg(long, default_value_t = 32.0)]
    pub bmi: f64,

    /// Diabetes pedigree function [0.078, 2.42]
    #[arg(long, default_value_t = 0.47)]
    pub diabetes_pedigree_function: f64,

    /// Age in years [21, 100]
    #[arg(long, default_value_t = 30)]
    pub age: u32,
}

impl Default for FormInput {
    fn default() -> Self {
        Self {
            pregnancies: 1,
            glucose: 120.0,
            blood_pressure: 70.0,
            skin_thickness: 20.0,
            insulin: 79.0,
            bmi: 32.0,
            diabetes_pedigree_function: 0.47,
            age: 30,
        }
    }
}

/// A field the form had to pull back into range
#[derive(Debug, Clone, PartialEq)]
pub struct ClampedField {
    pub name: &'static str,
    pub entered: f64,
    pub used: f64,
}

/// Values accepted by the form, in training order
#[derive(Debug, Clone, PartialEq)]
pub struct FormCapture {
    pub values: [f64; FEATURE_COUNT],
    pub clamped: Vec<ClampedField>,
}

impl FormInput {
    fn raw_values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.pregnancies as f64,
            self.glucose,
            self.blood_pressure,
            self.skin_thickness,
            self.insulin,
            self.bmi,
            self.diabetes_pedigree_function,
            self.age as f64,
        ]
    }

    /// Clamp every value into its range and report what changed.
    ///
    /// NaN is not a valid widget value and is replaced by the lower bound.
    pub fn capture(&self) -> FormCapture {
        let mut values = self.raw_values();
        let mut clamped = Vec::new();

        for ((value, range), name) in values.iter_mut().zip(&FORM_RANGES).zip(FEATURE_NAMES) {
            let used = if value.is_nan() {
                range.min
            } else {
                range.clamp(*value)
            };

            if used != *value {
                warn!(field = name, entered = *value, used, "Form value clamped into range");
                clamped.push(ClampedField {
                    name,
                    entered: *value,
                    used,
                });
                *value = used;
            }
        }

        FormCapture { values, clamped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_values_pass_through() {
        let capture = FormInput::default().capture();
        assert!(capture.clamped.is_empty());
        assert_eq!(
            capture.values,
            [1.0, 120.0, 70.0, 20.0, 79.0, 32.0, 0.47, 30.0]
        );
    }

    #[test]
    fn test_every_out_of_range_field_is_reported() {
        let form = FormInput {
            pregnancies: 20,
            glucose: 10.0,
            age: 18,
            ..FormInput::default()
        };
        let capture = form.capture();

        let names: Vec<&str> = capture.clamped.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Pregnancies", "Glucose", "Age"]);
        assert_eq!(capture.values[0], 17.0);
        assert_eq!(capture.values[1], 40.0);
        assert_eq!(capture.values[7], 21.0);
        assert_eq!(capture.clamped[2].entered, 18.0);
    }

    #[test]
    fn test_nan_falls_back_to_lower_bound() {
        let form = FormInput {
            bmi: f64::NAN,
            ..FormInput::default()
        };
        let capture = form.capture();
        assert_eq!(capture.values[5], 15.0);
        assert_eq!(capture.clamped.len(), 1);
    }

    #[test]
    fn test_ranges_are_well_formed() {
        for range in FORM_RANGES {
            assert!(range.min < range.max);
        }
    }
}

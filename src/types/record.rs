//! Feature record: one patient's eight clinical measurements

use serde::{Deserialize, Serialize};

/// Number of features the classifier was trained on.
pub const FEATURE_COUNT: usize = 8;

/// Column names in the exact order used during training.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Pregnancies",
    "Glucose",
    "BloodPressure",
    "SkinThickness",
    "Insulin",
    "BMI",
    "DiabetesPedigreeFunction",
    "Age",
];

/// Patient measurements in training order.
///
/// Field declaration order is the feature order handed to the scaler;
/// [`FeatureRecord::to_vector`] is the only place it is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureRecord {
    /// Number of pregnancies
    pub pregnancies: u32,

    /// Plasma glucose concentration (mg/dL)
    pub glucose: f64,

    /// Diastolic blood pressure (mm Hg)
    pub blood_pressure: f64,

    /// Triceps skin fold thickness (mm)
    pub skin_thickness: f64,

    /// 2-hour serum insulin (mu U/ml)
    pub insulin: f64,

    /// Body mass index (kg/m^2)
    #[serde(rename = "BMI")]
    pub bmi: f64,

    /// Diabetes pedigree function
    pub diabetes_pedigree_function: f64,

    /// Age in years
    pub age: u32,
}

impl FeatureRecord {
    /// Feature vector in training order.
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
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

    /// Build a record from values already in training order.
    ///
    /// `Pregnancies` and `Age` are expected to be non-negative whole numbers;
    /// callers validate that before reaching here.
    pub(crate) fn from_ordered(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            pregnancies: values[0] as u32,
            glucose: values[1],
            blood_pressure: values[2],
            skin_thickness: values[3],
            insulin: values[4],
            bmi: values[5],
            diabetes_pedigree_function: values[6],
            age: values[7] as u32,
        }
    }
}

/// Whether the feature at `index` (training order) is an integer count.
pub(crate) fn is_integer_feature(index: usize) -> bool {
    index == 0 || index == FEATURE_COUNT - 1
}

//! Prediction result data structures

use serde::{Deserialize, Serialize};

/// Maximum allowed deviation of `p0 + p1` from 1.0.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Display language for labels and rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Locale {
    #[default]
    #[serde(rename = "id")]
    #[value(name = "id")]
    Indonesian,
    #[serde(rename = "en")]
    #[value(name = "en")]
    English,
}

impl Locale {
    /// Name of the label column appended to table output.
    pub fn prediction_column(&self) -> &'static str {
        match self {
            Locale::Indonesian => "Prediksi",
            Locale::English => "Prediction",
        }
    }
}

/// Binary outcome of the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiabetesClass {
    /// Class 0
    NotDiabetes,
    /// Class 1
    Diabetes,
}

impl DiabetesClass {
    /// Map a raw classifier label to a class. Anything but 0 or 1 is rejected.
    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            0 => Some(DiabetesClass::NotDiabetes),
            1 => Some(DiabetesClass::Diabetes),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            DiabetesClass::NotDiabetes => 0,
            DiabetesClass::Diabetes => 1,
        }
    }

    /// Human-readable label. The mapping is fixed; only the language varies.
    pub fn label(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (DiabetesClass::Diabetes, _) => "Diabetes",
            (DiabetesClass::NotDiabetes, Locale::Indonesian) => "Tidak Diabetes",
            (DiabetesClass::NotDiabetes, Locale::English) => "Not Diabetes",
        }
    }
}

/// Classifier output for one feature record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class
    pub class: DiabetesClass,
    /// `[P(class 0), P(class 1)]`
    pub probabilities: [f64; 2],
}

impl Prediction {
    pub fn label(&self, locale: Locale) -> &'static str {
        self.class.label(locale)
    }

    /// Probability of diabetes (class 1)
    pub fn diabetes_probability(&self) -> f64 {
        self.probabilities[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mapping_is_fixed() {
        let negative = DiabetesClass::from_label(0).unwrap();
        let positive = DiabetesClass::from_label(1).unwrap();

        assert_eq!(negative.label(Locale::English), "Not Diabetes");
        assert_eq!(negative.label(Locale::Indonesian), "Tidak Diabetes");
        assert_eq!(positive.label(Locale::English), "Diabetes");
        assert_eq!(positive.label(Locale::Indonesian), "Diabetes");
        assert_eq!(DiabetesClass::from_label(2), None);
        assert_eq!(DiabetesClass::from_label(-1), None);
    }

    #[test]
    fn test_prediction_accessors() {
        let prediction = Prediction {
            class: DiabetesClass::NotDiabetes,
            probabilities: [0.8, 0.2],
        };
        assert_eq!(prediction.diabetes_probability(), 0.2);
        assert_eq!(prediction.label(Locale::Indonesian), "Tidak Diabetes");
    }

    #[test]
    fn test_locale_serialization() {
        assert_eq!(serde_json::to_string(&Locale::Indonesian).unwrap(), "\"id\"");
        let parsed: Locale = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(parsed, Locale::English);
        assert_eq!(Locale::English.prediction_column(), "Prediction");
        assert_eq!(Locale::default().prediction_column(), "Prediksi");
    }
}

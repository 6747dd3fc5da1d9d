//! Inference pipeline: scale, classify, map labels

use crate::error::PipelineError;
use crate::feature_extractor::FeatureTable;
use crate::models::loader::Artifacts;
use crate::types::prediction::{DiabetesClass, Prediction, PROBABILITY_TOLERANCE};
use crate::types::record::FeatureRecord;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// How row failures affect a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Score every valid row and report each failing row
    #[default]
    Skip,
    /// Abort the table on the first failing row
    Fail,
}

/// One input row with its scoring outcome
#[derive(Debug)]
pub struct ScoredRow {
    /// 1-based data row number
    pub row: usize,
    /// Raw cells of every input column
    pub cells: Vec<String>,
    pub outcome: Result<Prediction, PipelineError>,
}

/// Scored table: input columns plus one outcome per row, in input order.
#[derive(Debug)]
pub struct ScoredTable {
    pub headers: Vec<String>,
    pub rows: Vec<ScoredRow>,
}

impl ScoredTable {
    pub fn predictions(&self) -> impl Iterator<Item = (usize, &Prediction)> {
        self.rows
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|p| (r.row, p)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &PipelineError)> {
        self.rows
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.row, e)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// Runs the scaler and the classifier over feature records.
///
/// Holds the process-wide artifacts explicitly so tests can substitute mocks.
#[derive(Clone)]
pub struct InferenceEngine {
    artifacts: Arc<Artifacts>,
}

impl InferenceEngine {
    pub fn new(artifacts: Arc<Artifacts>) -> Self {
        Self { artifacts }
    }

    /// Score a single record (form mode).
    pub fn predict(&self, record: &FeatureRecord) -> Result<Prediction, PipelineError> {
        self.predict_row(None, record)
    }

    /// Score a parsed table.
    ///
    /// Rows that failed to parse carry their `MalformedInput` error through.
    /// With [`BatchPolicy::Fail`] the first failing row aborts the table.
    pub fn predict_table(
        &self,
        table: FeatureTable,
        policy: BatchPolicy,
    ) -> Result<ScoredTable, PipelineError> {
        let mut rows = Vec::with_capacity(table.rows.len());

        for row in table.rows {
            let row_number = row.row;
            let outcome = row
                .record
                .and_then(|record| self.predict_row(Some(row_number), &record));

            let outcome = match (outcome, policy) {
                (Err(e), BatchPolicy::Fail) => return Err(e),
                (outcome, _) => outcome,
            };

            if let Err(e) = &outcome {
                warn!(row = row.row, error = %e, "Row skipped");
            }

            rows.push(ScoredRow {
                row: row.row,
                cells: row.cells,
                outcome,
            });
        }

        Ok(ScoredTable {
            headers: table.headers,
            rows,
        })
    }

    fn predict_row(
        &self,
        row: Option<usize>,
        record: &FeatureRecord,
    ) -> Result<Prediction, PipelineError> {
        let features = vec![record.to_vector()];

        let scaled = self
            .artifacts
            .scaler
            .transform(&features)
            .map_err(|e| PipelineError::inference(row, format!("scaling failed: {:#}", e)))?;

        let classifier = &self.artifacts.classifier;
        let (labels, probabilities) = classifier
            .predict_with_proba(&scaled)
            .map_err(|e| PipelineError::inference(row, format!("prediction failed: {:#}", e)))?;

        let (label, pair) = match (labels.as_slice(), probabilities.as_slice()) {
            ([label], [pair]) => (*label, *pair),
            _ => {
                return Err(PipelineError::inference(
                    row,
                    format!(
                        "expected one result, got {} labels and {} probability pairs",
                        labels.len(),
                        probabilities.len()
                    ),
                ))
            }
        };

        let class = DiabetesClass::from_label(label)
            .ok_or_else(|| PipelineError::inference(row, format!("unknown class label {}", label)))?;

        if pair.iter().any(|p| !p.is_finite() || *p < 0.0)
            || (pair[0] + pair[1] - 1.0).abs() > PROBABILITY_TOLERANCE
        {
            return Err(PipelineError::inference(
                row,
                format!("invalid probability pair [{}, {}]", pair[0], pair[1]),
            ));
        }

        // Class 1 iff P(Diabetes) > 0.5, allowing for float32 backends at the boundary
        let consistent = match class {
            DiabetesClass::Diabetes => pair[1] >= 0.5 - PROBABILITY_TOLERANCE,
            DiabetesClass::NotDiabetes => pair[1] <= 0.5 + PROBABILITY_TOLERANCE,
        };
        if !consistent {
            return Err(PipelineError::inference(
                row,
                format!(
                    "class {} disagrees with probability pair [{}, {}]",
                    label, pair[0], pair[1]
                ),
            ));
        }

        debug!(
            row = ?row,
            classifier = classifier.name(),
            class = ?class,
            p_diabetes = pair[1],
            "Record scored"
        );

        Ok(Prediction {
            class,
            probabilities: pair,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureExtractor;
    use crate::models::classifier::{Classifier, LogisticModel};
    use crate::models::scaler::{Scaler, StandardScaler};
    use anyhow::{bail, Result};
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scenario_record() -> FeatureRecord {
        FeatureRecord {
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

    fn engine() -> InferenceEngine {
        let scaler = StandardScaler::new(
            vec![3.85, 120.89, 69.11, 20.54, 79.8, 31.99, 0.47, 33.24],
            vec![3.37, 31.95, 19.34, 15.94, 115.17, 7.88, 0.33, 11.75],
        );
        let model = LogisticModel::new(vec![0.41, 1.11, -0.25, 0.01, -0.14, 0.69, 0.31, 0.18], -0.87);
        InferenceEngine::new(Arc::new(Artifacts::new(Box::new(scaler), Box::new(model))))
    }

    /// Classifier returning a fixed answer, for exercising pipeline checks.
    struct FixedClassifier {
        label: i64,
        pair: [f64; 2],
    }

    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>> {
            Ok(vec![self.label; rows.len()])
        }

        fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
            Ok(vec![self.pair; rows.len()])
        }
    }

    /// Scaler that rejects rows with a glucose above a cutoff.
    struct PickyScaler;

    impl Scaler for PickyScaler {
        fn n_features(&self) -> usize {
            8
        }

        fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
            if rows.iter().any(|r| r[1] > 500.0) {
                bail!("glucose out of fitted support");
            }
            Ok(rows.to_vec())
        }
    }

    fn fixed_engine(label: i64, pair: [f64; 2]) -> InferenceEngine {
        InferenceEngine::new(Arc::new(Artifacts::new(
            Box::new(PickyScaler),
            Box::new(FixedClassifier { label, pair }),
        )))
    }

    #[test]
    fn test_scenario_record() {
        let prediction = engine().predict(&scenario_record()).unwrap();

        let [p0, p1] = prediction.probabilities;
        assert_relative_eq!(p0 + p1, 1.0, epsilon = PROBABILITY_TOLERANCE);
        let expected = if p1 > 0.5 {
            DiabetesClass::Diabetes
        } else {
            DiabetesClass::NotDiabetes
        };
        assert_eq!(prediction.class, expected);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let engine = engine();
        let first = engine.predict(&scenario_record()).unwrap();
        for _ in 0..10 {
            assert_eq!(engine.predict(&scenario_record()).unwrap(), first);
        }
    }

    #[test]
    fn test_table_preserves_order_and_names_rows() {
        let table = FeatureExtractor::new()
            .from_reader(TABLE.replace("b,2,abc", "b,2,110").as_bytes())
            .unwrap();
        let scored = fixed_engine(1, [0.3, 0.7])
            .predict_table(table, BatchPolicy::Skip)
            .unwrap();

        let rows: Vec<usize> = scored.rows.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![1, 2, 3, 4]);
        let (row, err) = scored.failures().next().unwrap();
        assert_eq!(row, 3);
        assert_eq!(err.row(), Some(3));
        assert!(err.to_string().contains("glucose out of fitted support"));
    }

    #[test]
    fn test_class_must_agree_with_probabilities() {
        let err = fixed_engine(1, [0.8, 0.2])
            .predict(&scenario_record())
            .unwrap_err();
        assert!(err.to_string().contains("class 1 disagrees"));

        let err = fixed_engine(0, [0.1, 0.9])
            .predict(&scenario_record())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InferenceError { .. }));

        // Exactly 0.5 is class 0
        assert!(fixed_engine(0, [0.5, 0.5]).predict(&scenario_record()).is_ok());
    }

    /// Classifier that counts how often it is evaluated.
    struct CountingClassifier {
        calls: Arc<AtomicUsize>,
    }

    impl Classifier for CountingClassifier {
        fn name(&self) -> &str {
            "counting"
        }

        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(vec![0; rows.len()])
        }

        fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(vec![[0.6, 0.4]; rows.len()])
        }

        fn predict_with_proba(&self, rows: &[Vec<f64>]) -> Result<(Vec<i64>, Vec<[f64; 2]>)> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok((vec![0; rows.len()], vec![[0.6, 0.4]; rows.len()]))
        }
    }

    #[test]
    fn test_one_classifier_evaluation_per_record() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = InferenceEngine::new(Arc::new(Artifacts::new(
            Box::new(PickyScaler),
            Box::new(CountingClassifier {
                calls: calls.clone(),
            }),
        )));

        engine.predict(&scenario_record()).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unknown_label_is_inference_error() {
        let err = fixed_engine(2, [0.5, 0.5])
            .predict(&scenario_record())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InferenceError { row: None, .. }));
        assert!(err.to_string().contains("unknown class label 2"));
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let err = fixed_engine(1, [0.3, 0.6])
            .predict(&scenario_record())
            .unwrap_err();
        assert!(err.to_string().contains("invalid probability pair"));

        let ok = fixed_engine(0, [0.9999999, 0.0000001]).predict(&scenario_record());
        assert!(ok.is_ok());
    }

    #[test]
    fn test_wrong_vector_length_is_inference_error() {
        let scaler = StandardScaler::new(vec![0.0; 5], vec![1.0; 5]);
        let engine = InferenceEngine::new(Arc::new(Artifacts::new(
            Box::new(scaler),
            Box::new(FixedClassifier {
                label: 0,
                pair: [1.0, 0.0],
            }),
        )));
        let err = engine.predict(&scenario_record()).unwrap_err();
        assert!(err.to_string().contains("expected 5 features, got 8"));
    }

    const TABLE: &str = "Id,Pregnancies,Glucose,BloodPressure,SkinThickness,Insulin,BMI,DiabetesPedigreeFunction,Age\n\
                         a,1,120,70,20,79,32.0,0.47,30\n\
                         b,2,abc,70,20,79,32.0,0.47,30\n\
                         c,1,900,70,20,79,32.0,0.47,30\n\
                         d,0,90,60,10,0,22.0,0.2,25\n";

    #[test]
    fn test_table_skip_policy_reports_every_failure() {
        let table = FeatureExtractor::new().from_reader(TABLE.as_bytes()).unwrap();
        let scored = fixed_engine(0, [0.8, 0.2])
            .predict_table(table, BatchPolicy::Skip)
            .unwrap();

        assert_eq!(scored.rows.len(), 4);
        let scored_rows: Vec<usize> = scored.predictions().map(|(row, _)| row).collect();
        assert_eq!(scored_rows, vec![1, 4]);

        let failures: Vec<(usize, &str)> = scored
            .failures()
            .map(|(row, e)| (row, e.kind().as_str()))
            .collect();
        assert_eq!(failures, vec![(2, "malformed_input"), (3, "inference_error")]);
        assert_eq!(scored.rows[2].cells[0], "c");
    }

    #[test]
    fn test_table_fail_policy_returns_first_error() {
        let table = FeatureExtractor::new().from_reader(TABLE.as_bytes()).unwrap();
        let err = fixed_engine(0, [0.8, 0.2])
            .predict_table(table, BatchPolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { row: 2, .. }));
    }
}

//! Binary classifiers

use crate::types::record::FEATURE_COUNT;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Binary decision model over scaled features.
pub trait Classifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Class label (0 or 1) per row
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>>;

    /// `[P(class 0), P(class 1)]` per row
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<[f64; 2]>>;

    /// Labels and probabilities together. Backends that produce both from
    /// one evaluation override this.
    fn predict_with_proba(&self, rows: &[Vec<f64>]) -> Result<(Vec<i64>, Vec<[f64; 2]>)> {
        Ok((self.predict(rows)?, self.predict_proba(rows)?))
    }
}

/// Logistic regression over the eight scaled features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    /// One weight per feature, in training order
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Class labels in column order of `predict_proba`
    #[serde(default)]
    pub classes: Option<Vec<i64>>,
}

impl LogisticModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
            classes: None,
        }
    }

    /// Check the fitted parameters against the training feature layout.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(format!(
                "expected {} coefficients, found {}",
                FEATURE_COUNT,
                self.coefficients.len()
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("non-finite model parameter".to_string());
        }
        if let Some(classes) = &self.classes {
            if classes.as_slice() != [0, 1] {
                return Err(format!("expected classes [0, 1], found {:?}", classes));
            }
        }
        Ok(())
    }

    fn positive_probability(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            bail!(
                "expected {} features, got {}",
                self.coefficients.len(),
                row.len()
            );
        }

        let z = self.intercept
            + row
                .iter()
                .zip(&self.coefficients)
                .map(|(x, w)| x * w)
                .sum::<f64>();

        if !z.is_finite() {
            bail!("decision value is not finite");
        }

        Ok(sigmoid(z))
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Classifier for LogisticModel {
    fn name(&self) -> &str {
        "logistic"
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>> {
        rows.iter()
            .map(|row| Ok(if self.positive_probability(row)? > 0.5 { 1 } else { 0 }))
            .collect()
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
        rows.iter()
            .map(|row| {
                let p = self.positive_probability(row)?;
                Ok([1.0 - p, p])
            })
            .collect()
    }
}

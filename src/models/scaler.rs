//! Feature scalers

use crate::types::record::{FEATURE_COUNT, FEATURE_NAMES};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Deterministic transform applied to raw features before classification.
pub trait Scaler: Send + Sync {
    /// Number of features expected per row
    fn n_features(&self) -> usize;

    /// Scale every row. Each row must hold exactly `n_features()` values.
    fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;
}

/// Standardization scaler: `(x - mean) / scale` per feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Column names seen at fit time, in order
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// Per-feature mean
    pub mean: Vec<f64>,
    /// Per-feature standard deviation
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self {
            feature_names: None,
            mean,
            scale,
        }
    }

    /// Check the fitted parameters against the training feature layout.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.mean.len() != FEATURE_COUNT || self.scale.len() != FEATURE_COUNT {
            return Err(format!(
                "expected {} means and scales, found {} and {}",
                FEATURE_COUNT,
                self.mean.len(),
                self.scale.len()
            ));
        }

        if let Some(names) = &self.feature_names {
            if names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
                return Err(format!(
                    "feature names {:?} do not match training order {:?}",
                    names, FEATURE_NAMES
                ));
            }
        }

        if let Some(i) = self
            .mean
            .iter()
            .chain(self.scale.iter())
            .position(|v| !v.is_finite())
        {
            return Err(format!(
                "non-finite parameter for feature '{}'",
                FEATURE_NAMES[i % FEATURE_COUNT]
            ));
        }

        Ok(())
    }
}

impl Scaler for StandardScaler {
    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let mut scaled = Vec::with_capacity(rows.len());

        for row in rows {
            if row.len() != self.mean.len() {
                bail!(
                    "expected {} features, got {}",
                    self.mean.len(),
                    row.len()
                );
            }

            scaled.push(
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(&x, (&mean, &scale))| {
                        // Zero-variance features are only centered
                        let scale = if scale == 0.0 { 1.0 } else { scale };
                        (x - mean) / scale
                    })
                    .collect(),
            );
        }

        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scaler() -> StandardScaler {
        StandardScaler::new(
            vec![3.0, 120.0, 70.0, 20.0, 80.0, 32.0, 0.5, 33.0],
            vec![3.0, 30.0, 20.0, 16.0, 115.0, 8.0, 0.25, 12.0],
        )
    }

    #[test]
    fn test_transform() {
        let rows = vec![vec![6.0, 150.0, 70.0, 4.0, 80.0, 40.0, 1.0, 21.0]];
        let scaled = scaler().transform(&rows).unwrap();

        assert_eq!(scaled.len(), 1);
        let expected = [1.0, 1.0, 0.0, -1.0, 0.0, 1.0, 2.0, -1.0];
        for (got, want) in scaled[0].iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_scale_only_centers() {
        let mut s = scaler();
        s.scale[4] = 0.0;
        let scaled = s
            .transform(&[vec![3.0, 120.0, 70.0, 20.0, 90.0, 32.0, 0.5, 33.0]])
            .unwrap();
        assert_relative_eq!(scaled[0][4], 10.0);
    }

    #[test]
    fn test_wrong_vector_length_is_rejected() {
        let err = scaler().transform(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(err.to_string().contains("expected 8 features, got 3"));
    }

    #[test]
    fn test_validate_feature_order() {
        let mut s = scaler();
        s.feature_names = Some(FEATURE_NAMES.iter().map(|n| n.to_string()).collect());
        assert!(s.validate().is_ok());

        let mut swapped: Vec<String> = FEATURE_NAMES.iter().map(|n| n.to_string()).collect();
        swapped.swap(1, 2);
        s.feature_names = Some(swapped);
        let err = s.validate().unwrap_err();
        assert!(err.contains("do not match training order"));
    }

    #[test]
    fn test_validate_shape_and_values() {
        let s = StandardScaler::new(vec![0.0; 7], vec![1.0; 7]);
        assert!(s.validate().is_err());

        let mut s = scaler();
        s.scale[6] = f64::NAN;
        let err = s.validate().unwrap_err();
        assert!(err.contains("DiabetesPedigreeFunction"));
    }
}

//! ONNX classifier backed by ONNX Runtime

use crate::models::classifier::Classifier;
use crate::types::record::FEATURE_COUNT;
use anyhow::{anyhow, bail, Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Classifier exported to ONNX (e.g. a scikit-learn pipeline through skl2onnx).
///
/// Sessions need exclusive access to run, so the session sits behind a mutex;
/// everything else is read-only after load.
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    probability_name: String,
    label_name: Option<String>,
}

impl OnnxClassifier {
    /// Load a classifier from an `.onnx` file.
    pub fn load<P: AsRef<Path>>(path: P, onnx_threads: usize) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        info!(model = %name, path = %path.display(), threads = onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let probability_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.iter().find(|o| !o.name.contains("label")))
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("model has no probability output"))?;

        info!(
            model = %name,
            input = %input_name,
            probabilities = %probability_name,
            label = ?label_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            probability_name,
            label_name,
        })
    }

    /// Run the session once and return labels (if exported) and probabilities.
    fn run(&self, rows: &[Vec<f64>]) -> Result<(Option<Vec<i64>>, Vec<[f64; 2]>)> {
        if let Some(row) = rows.iter().find(|r| r.len() != FEATURE_COUNT) {
            bail!("expected {} features, got {}", FEATURE_COUNT, row.len());
        }

        let flat: Vec<f32> = rows.iter().flatten().map(|&v| v as f32).collect();
        let shape = vec![rows.len() as i64, FEATURE_COUNT as i64];
        let input_tensor =
            Tensor::from_array((shape, flat)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let output = outputs
            .get(self.probability_name.as_str())
            .ok_or_else(|| anyhow!("missing output '{}'", self.probability_name))?;

        let probabilities = if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            probabilities_from_tensor(&dims, data, rows.len())?
        } else if DynSequenceValueType::can_downcast(&output.dtype()) {
            probabilities_from_sequence_map(output, rows.len())?
        } else {
            bail!("unsupported probability output '{}'", self.probability_name);
        };

        let labels = self
            .label_name
            .as_deref()
            .and_then(|name| outputs.get(name))
            .and_then(|o| o.try_extract_tensor::<i64>().ok())
            .map(|(_, data)| data.to_vec());

        debug!(model = %self.name, rows = rows.len(), "ONNX inference complete");

        Ok((labels, probabilities))
    }
}

/// Probabilities from a `[N, 2]` (or `[N, 1]` positive-class) float tensor.
fn probabilities_from_tensor(dims: &[i64], data: &[f32], n_rows: usize) -> Result<Vec<[f64; 2]>> {
    let width = match dims {
        [n, w] if *n as usize == n_rows => *w as usize,
        _ => bail!("unexpected probability shape {:?} for {} rows", dims, n_rows),
    };

    match width {
        2 => Ok(data
            .chunks_exact(2)
            .map(|c| [c[0] as f64, c[1] as f64])
            .collect()),
        1 => Ok(data.iter().map(|&p| [1.0 - p as f64, p as f64]).collect()),
        w => bail!("expected 2 probability columns, found {}", w),
    }
}

/// Probabilities from a `seq(map(int64, float))` output (skl2onnx ZipMap).
fn probabilities_from_sequence_map(
    output: &ort::value::DynValue,
    n_rows: usize,
) -> Result<Vec<[f64; 2]>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    if maps.len() != n_rows {
        bail!("expected {} probability maps, found {}", n_rows, maps.len());
    }

    let mut probabilities = Vec::with_capacity(n_rows);
    for map_value in &maps {
        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
        let mut pair = [f64::NAN; 2];
        for (class_id, prob) in &kv_pairs {
            match class_id {
                0 => pair[0] = *prob as f64,
                1 => pair[1] = *prob as f64,
                other => bail!("unexpected class {} in probability map", other),
            }
        }
        probabilities.push(pair);
    }

    Ok(probabilities)
}

/// Exported labels, or the arg-max of each probability pair when the model
/// has no label output. Ties go to class 0.
fn labels_or_argmax(labels: Option<Vec<i64>>, probabilities: &[[f64; 2]]) -> Vec<i64> {
    labels.unwrap_or_else(|| {
        probabilities
            .iter()
            .map(|p| if p[1] > p[0] { 1 } else { 0 })
            .collect()
    })
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>> {
        Ok(self.predict_with_proba(rows)?.0)
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
        Ok(self.run(rows)?.1)
    }

    fn predict_with_proba(&self, rows: &[Vec<f64>]) -> Result<(Vec<i64>, Vec<[f64; 2]>)> {
        let (labels, probabilities) = self.run(rows)?;
        Ok((labels_or_argmax(labels, &probabilities), probabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_column_probabilities() {
        let probs = probabilities_from_tensor(&[2, 2], &[0.9, 0.1, 0.25, 0.75], 2).unwrap();
        assert_eq!(probs.len(), 2);
        assert_relative_eq!(probs[0][0], 0.9, epsilon = 1e-6);
        assert_relative_eq!(probs[1][1], 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_single_column_is_positive_class() {
        let probs = probabilities_from_tensor(&[1, 1], &[0.25], 1).unwrap();
        assert_relative_eq!(probs[0][0], 0.75, epsilon = 1e-6);
        assert_relative_eq!(probs[0][1], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_row_count_mismatch_is_rejected() {
        let err = probabilities_from_tensor(&[3, 2], &[0.5; 6], 2).unwrap_err();
        assert!(err.to_string().contains("unexpected probability shape"));

        assert!(probabilities_from_tensor(&[4], &[0.5; 4], 2).is_err());
    }

    #[test]
    fn test_three_columns_are_rejected() {
        let err = probabilities_from_tensor(&[1, 3], &[0.2, 0.3, 0.5], 1).unwrap_err();
        assert_eq!(err.to_string(), "expected 2 probability columns, found 3");
    }

    #[test]
    fn test_exported_labels_take_precedence() {
        let probs = [[0.9, 0.1], [0.2, 0.8]];
        assert_eq!(labels_or_argmax(Some(vec![1, 0]), &probs), vec![1, 0]);
    }

    #[test]
    fn test_argmax_fallback_breaks_ties_to_class_zero() {
        let probs = [[0.9, 0.1], [0.2, 0.8], [0.5, 0.5]];
        assert_eq!(labels_or_argmax(None, &probs), vec![0, 1, 0]);
    }
}

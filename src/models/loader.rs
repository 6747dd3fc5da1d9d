//! Artifact loader: classifier and feature scaler

use crate::config::ArtifactsConfig;
use crate::error::PipelineError;
use crate::models::classifier::{Classifier, LogisticModel};
use crate::models::scaler::{Scaler, StandardScaler};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Loaded classifier and scaler, immutable for the process lifetime.
pub struct Artifacts {
    pub scaler: Box<dyn Scaler>,
    pub classifier: Box<dyn Classifier>,
}

impl Artifacts {
    pub fn new(scaler: Box<dyn Scaler>, classifier: Box<dyn Classifier>) -> Self {
        Self { scaler, classifier }
    }
}

/// Loader for the serialized artifacts
pub struct ArtifactLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ArtifactLoader {
    /// Create a new loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new loader with the given ONNX Runtime thread count
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load both artifacts from the configured directory.
    pub fn load(config: &ArtifactsConfig) -> Result<Artifacts, PipelineError> {
        Self::with_threads(config.onnx_threads)
            .load_pair(config.model_path(), config.scaler_path())
    }

    /// Load a classifier and a scaler from explicit paths.
    ///
    /// Both files are checked before either is parsed so a missing scaler is
    /// reported even when the classifier is also broken.
    pub fn load_pair<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        model_path: P,
        scaler_path: Q,
    ) -> Result<Artifacts, PipelineError> {
        let model_path = model_path.as_ref();
        let scaler_path = scaler_path.as_ref();

        for path in [model_path, scaler_path] {
            fs::metadata(path).map_err(|source| PipelineError::ArtifactNotFound {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let scaler = self.load_scaler(scaler_path)?;
        let classifier = self.load_classifier(model_path)?;

        info!(
            model = %model_path.display(),
            classifier = classifier.name(),
            scaler = %scaler_path.display(),
            features = scaler.n_features(),
            "Artifacts loaded"
        );

        Ok(Artifacts::new(scaler, classifier))
    }

    /// Load a scaler artifact. Only JSON standard scalers are supported.
    pub fn load_scaler(&self, path: &Path) -> Result<Box<dyn Scaler>, PipelineError> {
        match extension(path).as_deref() {
            Some("json") => {
                let scaler: StandardScaler = read_json(path)?;
                scaler.validate().map_err(|reason| corrupt(path, reason))?;
                Ok(Box::new(scaler))
            }
            other => Err(corrupt(path, unsupported(other))),
        }
    }

    /// Load a classifier artifact (`.json` logistic model or `.onnx`).
    pub fn load_classifier(&self, path: &Path) -> Result<Box<dyn Classifier>, PipelineError> {
        match extension(path).as_deref() {
            Some("json") => {
                let model: LogisticModel = read_json(path)?;
                model.validate().map_err(|reason| corrupt(path, reason))?;
                Ok(Box::new(model))
            }
            #[cfg(feature = "onnx")]
            Some("onnx") => {
                // Surface unreadable files as not-found before ONNX Runtime sees them
                fs::File::open(path).map_err(|source| PipelineError::ArtifactNotFound {
                    path: path.to_path_buf(),
                    source,
                })?;
                let model = crate::models::onnx::OnnxClassifier::load(path, self.onnx_threads)
                    .map_err(|e| corrupt(path, format!("{:#}", e)))?;
                Ok(Box::new(model))
            }
            other => Err(corrupt(path, unsupported(other))),
        }
    }
}

impl Default for ArtifactLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let bytes = fs::read(path).map_err(|source| PipelineError::ArtifactNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e.to_string()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn unsupported(ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("unsupported artifact format '.{}'", ext),
        None => "artifact file has no extension".to_string(),
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::ArtifactCorrupt {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

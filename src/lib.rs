//! Diabetes Risk Pipeline Library
//!
//! Loads a trained scaler and classifier, validates patient measurements
//! from CSV tables, a manual form or service requests, and returns a binary
//! diabetes prediction with per-class probabilities.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod form;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod report;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, PipelineError};
pub use feature_extractor::{FeatureExtractor, FeatureTable};
pub use models::{ArtifactLoader, Artifacts, BatchPolicy, InferenceEngine};
pub use types::{DiabetesClass, FeatureRecord, Locale, Prediction};

//! Configuration management for the diabetes risk front-ends

use crate::models::inference::BatchPolicy;
use crate::types::prediction::Locale;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    pub output: OutputConfig,
    pub nats: NatsConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

/// Location of the serialized model artifacts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory containing the artifact files
    pub dir: String,
    /// Classifier file name (.json or .onnx)
    pub model_file: String,
    /// Scaler file name (.json)
    pub scaler_file: String,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

impl ArtifactsConfig {
    pub fn model_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.model_file)
    }

    pub fn scaler_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.scaler_file)
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: "artifacts".to_string(),
            model_file: "model.json".to_string(),
            scaler_file: "scaler.json".to_string(),
            onnx_threads: 1,
        }
    }
}

/// Rendering configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Label language
    pub locale: Locale,
    /// Append per-class probability columns to table output
    pub with_probabilities: bool,
    /// Row error policy for tables
    pub batch_policy: BatchPolicy,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming prediction requests
    pub request_subject: String,
    /// Queue group shared by service instances; empty for a plain subscription
    pub queue_group: String,
}

impl NatsConfig {
    /// Queue group to join, if any
    pub fn queue_group(&self) -> Option<&str> {
        let group = self.queue_group.trim();
        (!group.is_empty()).then_some(group)
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            request_subject: "diabetes.predict".to_string(),
            queue_group: "diabetes-risk".to_string(),
        }
    }
}

/// Request service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Maximum number of requests handled concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file, falling back to defaults
    /// when it does not exist. Environment overrides apply in both cases.
    pub fn load() -> Result<Self> {
        Self::build(Path::new(DEFAULT_CONFIG_PATH), false)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(path.as_ref(), true)
    }

    fn build(path: &Path, required: bool) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix("DIABETES_RISK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.artifacts.model_path(), PathBuf::from("artifacts/model.json"));
        assert_eq!(config.artifacts.scaler_path(), PathBuf::from("artifacts/scaler.json"));
        assert_eq!(config.output.locale, Locale::Indonesian);
        assert_eq!(config.output.batch_policy, BatchPolicy::Skip);
        assert_eq!(config.nats.request_subject, "diabetes.predict");
        assert_eq!(config.nats.queue_group(), Some("diabetes-risk"));
        assert_eq!(config.service.workers, 4);
    }

    #[test]
    fn test_empty_queue_group_disables_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[nats]\nqueue_group = \"\"\n").unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.nats.queue_group(), None);
        assert_eq!(config.nats.request_subject, "diabetes.predict");
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[artifacts]\nmodel_file = \"model.onnx\"\nonnx_threads = 2\n\n[output]\nlocale = \"en\"\nbatch_policy = \"fail\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.artifacts.model_file, "model.onnx");
        assert_eq!(config.artifacts.onnx_threads, 2);
        assert_eq!(config.artifacts.scaler_file, "scaler.json");
        assert_eq!(config.output.locale, Locale::English);
        assert_eq!(config.output.batch_policy, BatchPolicy::Fail);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        assert!(AppConfig::load_from_path(dir.path().join("absent.toml")).is_err());
    }
}

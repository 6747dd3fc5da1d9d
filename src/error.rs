//! Error taxonomy for the validation and inference pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the artifact loader, the input adapter and the
/// inference pipeline.
///
/// Row numbers are 1-based and count data rows only. Row 0 refers to the
/// document as a whole (header or envelope).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("artifact not found or unreadable at {}: {source}", .path.display())]
    ArtifactNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact at {} is corrupt: {reason}", .path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("missing required columns: {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("malformed input at row {row}{}: {reason}", column_suffix(.column))]
    MalformedInput {
        row: usize,
        column: Option<String>,
        reason: String,
    },

    #[error("inference failed{}: {reason}", row_suffix(.row))]
    InferenceError { row: Option<usize>, reason: String },
}

fn column_suffix(column: &Option<String>) -> String {
    column
        .as_ref()
        .map(|c| format!(", column '{}'", c))
        .unwrap_or_default()
}

fn row_suffix(row: &Option<usize>) -> String {
    row.map(|r| format!(" at row {}", r)).unwrap_or_default()
}

/// Stable identifier for each error variant, used in service replies and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ArtifactNotFound,
    ArtifactCorrupt,
    SchemaMismatch,
    MalformedInput,
    InferenceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ArtifactNotFound => "artifact_not_found",
            ErrorKind::ArtifactCorrupt => "artifact_corrupt",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::InferenceError => "inference_error",
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            PipelineError::ArtifactCorrupt { .. } => ErrorKind::ArtifactCorrupt,
            PipelineError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            PipelineError::MalformedInput { .. } => ErrorKind::MalformedInput,
            PipelineError::InferenceError { .. } => ErrorKind::InferenceError,
        }
    }

    /// Row the error refers to, if any.
    pub fn row(&self) -> Option<usize> {
        match self {
            PipelineError::MalformedInput { row, .. } => Some(*row),
            PipelineError::InferenceError { row, .. } => *row,
            _ => None,
        }
    }

    pub(crate) fn malformed(row: usize, column: Option<&str>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedInput {
            row,
            column: column.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub(crate) fn inference(row: Option<usize>, reason: impl Into<String>) -> Self {
        PipelineError::InferenceError {
            row,
            reason: reason.into(),
        }
    }
}

//! Request handling for the prediction service.
//!
//! A request payload is one of:
//! - a JSON object with the eight feature columns as keys,
//! - a JSON array of such objects,
//! - a CSV document with a header row (table mode).

use crate::error::{ErrorKind, PipelineError};
use crate::feature_extractor::{FeatureExtractor, FeatureTable};
use crate::metrics::PipelineMetrics;
use crate::models::inference::{BatchPolicy, InferenceEngine};
use crate::types::prediction::{Locale, Prediction};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

/// Error details attached to a reply or a row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub message: String,
    /// Columns absent from the input (schema mismatches only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_columns: Vec<String>,
}

impl From<&PipelineError> for ErrorReply {
    fn from(error: &PipelineError) -> Self {
        let missing_columns = match error {
            PipelineError::SchemaMismatch { missing } => missing.clone(),
            _ => Vec::new(),
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            missing_columns,
        }
    }
}

/// Outcome for one input row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowReply {
    /// 1-based row number
    pub row: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// `[P(class 0), P(class 1)]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
}

impl RowReply {
    fn scored(row: usize, prediction: &Prediction, locale: Locale) -> Self {
        Self {
            row,
            class: Some(prediction.class.index()),
            label: Some(prediction.label(locale).to_string()),
            probabilities: Some(prediction.probabilities),
            error: None,
        }
    }

    fn failed(row: usize, error: &PipelineError) -> Self {
        Self {
            row,
            class: None,
            label: None,
            probabilities: None,
            error: Some(error.into()),
        }
    }
}

/// Reply published for every request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReply {
    /// Unique request identifier
    pub request_id: String,
    /// Reply generation timestamp
    pub timestamp: DateTime<Utc>,
    /// One entry per input row, in input order
    pub results: Vec<RowReply>,
    /// Set when the request as a whole could not be scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
}

impl PredictionReply {
    fn new(results: Vec<RowReply>, error: Option<ErrorReply>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            results,
            error,
        }
    }
}

/// Turns request payloads into replies using the shared inference engine.
pub struct RequestHandler {
    engine: InferenceEngine,
    extractor: FeatureExtractor,
    locale: Locale,
    policy: BatchPolicy,
    metrics: Arc<PipelineMetrics>,
}

impl RequestHandler {
    pub fn new(
        engine: InferenceEngine,
        locale: Locale,
        policy: BatchPolicy,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            engine,
            extractor: FeatureExtractor::new(),
            locale,
            policy,
            metrics,
        }
    }

    /// Score one request. Never fails: errors become part of the reply.
    pub fn handle(&self, payload: &[u8]) -> PredictionReply {
        let start_time = Instant::now();

        let scored = self
            .parse(payload)
            .and_then(|table| self.engine.predict_table(table, self.policy));

        let reply = match scored {
            Ok(scored) => {
                let results = scored
                    .rows
                    .iter()
                    .map(|row| match &row.outcome {
                        Ok(prediction) => {
                            self.metrics.record_prediction(prediction);
                            RowReply::scored(row.row, prediction, self.locale)
                        }
                        Err(e) => {
                            self.metrics.record_failure(e.kind());
                            RowReply::failed(row.row, e)
                        }
                    })
                    .collect();
                PredictionReply::new(results, None)
            }
            Err(e) => {
                warn!(error = %e, "Request rejected");
                self.metrics.record_failure(e.kind());
                PredictionReply::new(Vec::new(), Some((&e).into()))
            }
        };

        let elapsed = start_time.elapsed();
        self.metrics.record_request(elapsed);
        debug!(
            request_id = %reply.request_id,
            rows = reply.results.len(),
            processing_time_us = elapsed.as_micros(),
            "Request handled"
        );

        reply
    }

    fn parse(&self, payload: &[u8]) -> Result<FeatureTable, PipelineError> {
        let first = payload.iter().find(|b| !b.is_ascii_whitespace());
        match first {
            Some(b'{') | Some(b'[') => parse_json(&self.extractor, payload),
            _ => self.extractor.from_reader(payload),
        }
    }
}

fn parse_json(extractor: &FeatureExtractor, payload: &[u8]) -> Result<FeatureTable, PipelineError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| PipelineError::malformed(0, None, format!("invalid JSON: {}", e)))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => {
            return Err(PipelineError::malformed(
                0,
                None,
                "expected a JSON object or an array of objects",
            ))
        }
    };

    Ok(extractor.from_json_rows(items))
}

/// Bounded set of in-flight request tasks.
///
/// At most `workers` tasks run at once; `shutdown` waits for the rest so no
/// reply is lost when the subscription ends.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Wait for a free worker, then run `task` on it.
    pub async fn spawn<F>(&mut self, task: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker semaphore closed")?;

        // Reap finished tasks so the set does not grow with the request count
        while let Some(result) = self.tasks.try_join_next() {
            log_join(result);
        }

        self.tasks.spawn(async move {
            task.await;
            drop(permit);
        });
        Ok(())
    }

    /// Tasks spawned and not yet reaped
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every spawned task to finish.
    pub async fn shutdown(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join(result);
        }
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Request task failed");
    }
}

//! Input adapter: turns uploaded tables and form captures into feature records.
//!
//! Table mode checks that every training column is present, then extracts
//! those eight columns per row in training order. Extra columns are kept as
//! raw cells so they can be passed through to the rendered output unscored.

use crate::error::PipelineError;
use crate::form::FormCapture;
use crate::types::record::{is_integer_feature, FeatureRecord, FEATURE_COUNT, FEATURE_NAMES};
use serde_json::Value;
use std::io::Read;
use tracing::debug;

/// One data row of an input table
#[derive(Debug)]
pub struct TableRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    /// Raw cells of every column, in header order
    pub cells: Vec<String>,
    /// Parsed features, or why this row cannot be scored
    pub record: Result<FeatureRecord, PipelineError>,
}

/// Canonicalized input table
#[derive(Debug)]
pub struct FeatureTable {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Feature extractor that maps raw input onto the model's feature layout.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Required columns absent from `headers`, in training order.
    pub fn missing_columns<S: AsRef<str>>(&self, headers: &[S]) -> Vec<String> {
        FEATURE_NAMES
            .iter()
            .filter(|name| !headers.iter().any(|h| h.as_ref() == **name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Parse a CSV document with a header row.
    ///
    /// Fails with `SchemaMismatch` naming every missing column before any
    /// row is read. Row-level problems are recorded per row as
    /// `MalformedInput` so the caller can decide the batch policy.
    pub fn from_reader<R: Read>(&self, reader: R) -> Result<FeatureTable, PipelineError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| PipelineError::malformed(0, None, format!("unreadable header: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let missing = self.missing_columns(&headers);
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch { missing });
        }

        // First occurrence wins when a column name is repeated
        let mut indices = [0usize; FEATURE_COUNT];
        for (slot, name) in indices.iter_mut().zip(FEATURE_NAMES) {
            *slot = headers.iter().position(|h| h == name).unwrap_or_default();
        }

        let mut rows = Vec::new();
        for (i, result) in csv_reader.records().enumerate() {
            let row = i + 1;
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => {
                    return Err(PipelineError::malformed(row, None, e.to_string()));
                }
                Err(e) => {
                    rows.push(TableRow {
                        row,
                        cells: Vec::new(),
                        record: Err(PipelineError::malformed(row, None, e.to_string())),
                    });
                    continue;
                }
            };

            let cells: Vec<String> = record.iter().map(str::to_string).collect();
            let parsed = if cells.len() != headers.len() {
                Err(PipelineError::malformed(
                    row,
                    None,
                    format!("expected {} fields, found {}", headers.len(), cells.len()),
                ))
            } else {
                parse_features(row, &cells, &indices)
            };

            rows.push(TableRow {
                row,
                cells,
                record: parsed,
            });
        }

        debug!(
            rows = rows.len(),
            columns = headers.len(),
            "Input table parsed"
        );

        Ok(FeatureTable { headers, rows })
    }

    /// Build a table from JSON objects keyed by column name.
    ///
    /// Feature values follow the same cell rules as CSV, so `2.0` is a valid
    /// count and `null` or an absent key is a missing value. Other keys become
    /// extra columns after the eight features, in order of first appearance.
    pub fn from_json_rows(&self, items: Vec<Value>) -> FeatureTable {
        let mut headers: Vec<String> = FEATURE_NAMES.iter().map(|n| n.to_string()).collect();
        for map in items.iter().filter_map(Value::as_object) {
            for key in map.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }

        let indices: [usize; FEATURE_COUNT] = std::array::from_fn(|i| i);
        let rows: Vec<TableRow> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let row = i + 1;
                match item.as_object() {
                    Some(map) => {
                        let cells: Vec<String> = headers
                            .iter()
                            .map(|h| map.get(h).map(json_cell).unwrap_or_default())
                            .collect();
                        let record = parse_features(row, &cells, &indices);
                        TableRow { row, cells, record }
                    }
                    None => TableRow {
                        row,
                        cells: Vec::new(),
                        record: Err(PipelineError::malformed(
                            row,
                            None,
                            format!("expected a JSON object, found {}", item),
                        )),
                    },
                }
            })
            .collect();

        debug!(rows = rows.len(), columns = headers.len(), "JSON rows parsed");

        FeatureTable { headers, rows }
    }

    /// Assemble a record from values captured by the form.
    ///
    /// The form enforces shape and ranges, so no validation happens here.
    pub fn from_form(&self, capture: &FormCapture) -> FeatureRecord {
        FeatureRecord::from_ordered(capture.values)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_features(
    row: usize,
    cells: &[String],
    indices: &[usize; FEATURE_COUNT],
) -> Result<FeatureRecord, PipelineError> {
    let mut values = [0.0; FEATURE_COUNT];
    for (feature, (&index, value)) in indices.iter().zip(values.iter_mut()).enumerate() {
        *value = parse_cell(row, feature, &cells[index])?;
    }
    Ok(FeatureRecord::from_ordered(values))
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_cell(row: usize, feature: usize, raw: &str) -> Result<f64, PipelineError> {
    let column = Some(FEATURE_NAMES[feature]);
    let text = raw.trim();

    if text.is_empty() {
        return Err(PipelineError::malformed(row, column, "missing value"));
    }

    let value: f64 = text
        .parse()
        .map_err(|_| PipelineError::malformed(row, column, format!("not a number: '{}'", raw)))?;

    if !value.is_finite() {
        return Err(PipelineError::malformed(
            row,
            column,
            format!("value is not finite: '{}'", raw),
        ));
    }

    if is_integer_feature(feature)
        && (value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64)
    {
        return Err(PipelineError::malformed(
            row,
            column,
            format!("expected a non-negative whole number, found '{}'", raw),
        ));
    }

    Ok(value)
}

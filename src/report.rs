//! Rendering of prediction results for the table and form front-ends

use crate::models::inference::ScoredTable;
use crate::types::prediction::{DiabetesClass, Locale, Prediction};
use anyhow::{Context, Result};
use std::io::Write;

/// Header names of the optional probability columns
pub const PROBABILITY_COLUMNS: [&str; 2] = ["Probability_0", "Probability_1"];

/// Rendering options
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub locale: Locale,
    pub with_probabilities: bool,
}

/// Write the scored table as CSV: every input column, then the label column.
///
/// An input column already named like the label column is overwritten in
/// place. Rows that could not be scored keep their cells and get an empty
/// label. Every output row has exactly as many cells as the header.
pub fn write_table<W: Write>(table: &ScoredTable, options: RenderOptions, writer: W) -> Result<()> {
    let label_column = options.locale.prediction_column();
    let existing = table.headers.iter().position(|h| h == label_column);

    let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    let mut headers = table.headers.clone();
    if existing.is_none() {
        headers.push(label_column.to_string());
    }
    if options.with_probabilities {
        headers.extend(PROBABILITY_COLUMNS.iter().map(|c| c.to_string()));
    }
    csv_writer
        .write_record(&headers)
        .context("Failed to write header")?;

    for row in &table.rows {
        let prediction = row.outcome.as_ref().ok();
        let label = prediction
            .map(|p| p.label(options.locale).to_string())
            .unwrap_or_default();

        // Short or unparsable rows are padded so every cell stays under its header
        let mut cells = row.cells.clone();
        cells.resize(table.headers.len(), String::new());
        match existing {
            Some(index) => cells[index] = label,
            None => cells.push(label),
        }

        if options.with_probabilities {
            match prediction {
                Some(p) => cells.extend(p.probabilities.iter().map(|v| format!("{:.6}", v))),
                None => cells.extend([String::new(), String::new()]),
            }
        }

        csv_writer
            .write_record(&cells)
            .with_context(|| format!("Failed to write row {}", row.row))?;
    }

    csv_writer.flush().context("Failed to flush output")?;
    Ok(())
}

/// Text shown after a form prediction: the label and both probabilities.
pub fn form_summary(prediction: &Prediction, locale: Locale) -> String {
    let negative = DiabetesClass::NotDiabetes.label(locale);
    let positive = DiabetesClass::Diabetes.label(locale);
    let [p0, p1] = prediction.probabilities;

    match locale {
        Locale::Indonesian => format!(
            "Hasil prediksi: {}\nProbabilitas {}: {:.2}%\nProbabilitas {}: {:.2}%",
            prediction.label(locale),
            negative,
            p0 * 100.0,
            positive,
            p1 * 100.0
        ),
        Locale::English => format!(
            "Prediction: {}\nProbability of {}: {:.2}%\nProbability of {}: {:.2}%",
            prediction.label(locale),
            negative,
            p0 * 100.0,
            positive,
            p1 * 100.0
        ),
    }
}

/// Warning shown when an uploaded table lacks required columns.
pub fn schema_mismatch_message(missing: &[String], locale: Locale) -> String {
    match locale {
        Locale::Indonesian => format!(
            "Kolom berikut hilang di file CSV kamu: {}",
            missing.join(", ")
        ),
        Locale::English => format!(
            "The following columns are missing from your CSV file: {}",
            missing.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::inference::ScoredRow;

    fn prediction(class: DiabetesClass, p1: f64) -> Prediction {
        Prediction {
            class,
            probabilities: [1.0 - p1, p1],
        }
    }

    fn table(headers: &[&str]) -> ScoredTable {
        let width = headers.len();
        ScoredTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: vec![
                ScoredRow {
                    row: 1,
                    cells: (0..width).map(|i| format!("a{}", i)).collect(),
                    outcome: Ok(prediction(DiabetesClass::Diabetes, 0.75)),
                },
                ScoredRow {
                    row: 2,
                    cells: (0..width).map(|i| format!("b{}", i)).collect(),
                    outcome: Err(PipelineError::malformed(2, Some("Glucose"), "missing value")),
                },
                ScoredRow {
                    row: 3,
                    cells: (0..width).map(|i| format!("c{}", i)).collect(),
                    outcome: Ok(prediction(DiabetesClass::NotDiabetes, 0.1)),
                },
            ],
        }
    }

    fn render(table: &ScoredTable, options: RenderOptions) -> String {
        let mut out = Vec::new();
        write_table(table, options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_label_column_appended_and_extras_kept() {
        let out = render(&table(&["Id", "Glucose"]), RenderOptions::default());
        assert_eq!(
            out,
            "Id,Glucose,Prediksi\na0,a1,Diabetes\nb0,b1,\nc0,c1,Tidak Diabetes\n"
        );
    }

    #[test]
    fn test_existing_label_column_is_replaced() {
        let options = RenderOptions {
            locale: Locale::English,
            with_probabilities: false,
        };
        let out = render(&table(&["Prediction", "Glucose"]), options);
        assert_eq!(
            out,
            "Prediction,Glucose\nDiabetes,a1\n,b1\nNot Diabetes,c1\n"
        );
    }

    #[test]
    fn test_probability_columns() {
        let options = RenderOptions {
            locale: Locale::English,
            with_probabilities: true,
        };
        let out = render(&table(&["Id"]), options);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Id,Prediction,Probability_0,Probability_1");
        assert_eq!(lines[1], "a0,Diabetes,0.250000,0.750000");
        assert_eq!(lines[2], "b0,,,");
    }

    #[test]
    fn test_short_rows_stay_aligned_with_header() {
        let mut table = table(&["Pregnancies", "Glucose", "BloodPressure", "Note"]);
        table.rows[1].cells = vec!["1".to_string(), "120".to_string()];
        table.rows[2].cells = Vec::new();
        let options = RenderOptions {
            locale: Locale::English,
            with_probabilities: true,
        };

        let out = render(&table, options);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "Pregnancies,Glucose,BloodPressure,Note,Prediction,Probability_0,Probability_1"
        );
        assert_eq!(lines[2], "1,120,,,,,");
        assert_eq!(lines[3], ",,,,Not Diabetes,0.900000,0.100000");
        for line in &lines {
            assert_eq!(line.split(',').count(), 7);
        }
    }

    #[test]
    fn test_form_summary() {
        let p = prediction(DiabetesClass::Diabetes, 0.7321);
        assert_eq!(
            form_summary(&p, Locale::English),
            "Prediction: Diabetes\nProbability of Not Diabetes: 26.79%\nProbability of Diabetes: 73.21%"
        );
        assert!(form_summary(&p, Locale::Indonesian).starts_with("Hasil prediksi: Diabetes"));
    }

    #[test]
    fn test_schema_mismatch_message() {
        let missing = vec!["BloodPressure".to_string(), "Insulin".to_string()];
        assert_eq!(
            schema_mismatch_message(&missing, Locale::Indonesian),
            "Kolom berikut hilang di file CSV kamu: BloodPressure, Insulin"
        );
    }
}

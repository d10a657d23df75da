//! Result sink: the output CSV.
//!
//! Every input column passes through unchanged, followed by four result
//! columns. Rows are appended one batch at a time and made durable by
//! [`ResultSink::flush`] before the run checkpoint advances.

use crate::error::SinkError;
use crate::states::{format_state_list, parse_state_list};
use crate::types::{Confidence, PharmacyRecord, ValidationResult, Verdict};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const CORRECT_COLUMN: &str = "Initial states of operation correct";
pub const CONFIDENCE_COLUMN: &str = "Validation confidence";
pub const REASONING_COLUMN: &str = "Validation reasoning";

/// Number of columns appended after the passthrough columns.
pub const RESULT_COLUMNS: usize = 4;

/// Header of the corrected-states column for a provider label.
pub fn provider_column(provider_label: &str) -> String {
    format!("States of operation by {provider_label} AI")
}

/// Full output header: input headers then the result columns.
pub fn output_headers(headers: &[String], provider_label: &str) -> Vec<String> {
    let mut out = headers.to_vec();
    out.push(CORRECT_COLUMN.to_string());
    out.push(provider_column(provider_label));
    out.push(CONFIDENCE_COLUMN.to_string());
    out.push(REASONING_COLUMN.to_string());
    out
}

/// Destination for validated rows.
pub trait ResultSink {
    /// Buffer rows for writing, in order.
    fn append(&mut self, results: &[ValidationResult]) -> Result<(), SinkError>;

    /// Make everything appended so far durable.
    fn flush(&mut self) -> Result<(), SinkError>;

    /// Data rows written, including rows kept from a resumed run.
    fn rows_written(&self) -> usize;
}

/// CSV output file.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: usize,
}

impl CsvSink {
    /// Create (or truncate) the output file and write the header.
    pub fn create(path: &Path, headers: &[String], provider_label: &str) -> Result<Self, SinkError> {
        create_parent(path)?;
        let file = File::create(path).map_err(|e| write_err(path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(output_headers(headers, provider_label))
            .map_err(|e| csv_err(path, e))?;
        let mut sink = Self {
            path: path.to_path_buf(),
            writer,
            rows_written: 0,
        };
        sink.flush()?;
        tracing::debug!("Created output file {:?}", path);
        Ok(sink)
    }

    /// Reopen an output file from an interrupted run.
    ///
    /// Keeps the header and the first `keep_rows` data rows, discarding
    /// anything written after the last checkpoint, and returns the kept rows
    /// as results paired with their input records.
    pub fn restore(
        path: &Path,
        records: &[PharmacyRecord],
        headers: &[String],
        provider_label: &str,
        keep_rows: usize,
    ) -> Result<(Self, Vec<ValidationResult>), SinkError> {
        let resume_err = |message: String| SinkError::Resume {
            path: path.to_path_buf(),
            message,
        };
        if keep_rows > records.len() {
            return Err(resume_err(format!(
                "checkpoint claims {keep_rows} rows but the input has {}",
                records.len()
            )));
        }

        let expected = output_headers(headers, provider_label);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| csv_err(path, e))?;
        let found: Vec<String> = reader
            .headers()
            .map_err(|e| csv_err(path, e))?
            .iter()
            .map(str::to_string)
            .collect();
        if found != expected {
            return Err(resume_err("output header does not match this run".into()));
        }

        let mut kept = Vec::with_capacity(keep_rows);
        let mut results = Vec::with_capacity(keep_rows);
        for (row, record) in reader.records().zip(records).take(keep_rows) {
            let row = row.map_err(|e| csv_err(path, e))?;
            results.push(decode_row(&row, record, headers.len()).ok_or_else(|| {
                resume_err(format!("row {} does not match the input", record.row_index + 1))
            })?);
            kept.push(row);
        }
        if kept.len() < keep_rows {
            return Err(resume_err(format!(
                "expected {keep_rows} rows, found {}",
                kept.len()
            )));
        }
        drop(reader);

        // Rewrite without any trailing partial batch, then swap into place.
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp).map_err(|e| csv_err(&tmp, e))?;
            writer.write_record(&expected).map_err(|e| csv_err(&tmp, e))?;
            for row in &kept {
                writer.write_record(row).map_err(|e| csv_err(&tmp, e))?;
            }
            writer.flush().map_err(|e| write_err(&tmp, e))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| write_err(path, e))?;

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| write_err(path, e))?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        tracing::info!("Reopened {:?} with {} rows from the previous run", path, keep_rows);
        Ok((
            Self {
                path: path.to_path_buf(),
                writer,
                rows_written: keep_rows,
            },
            results,
        ))
    }
}

impl ResultSink for CsvSink {
    fn append(&mut self, results: &[ValidationResult]) -> Result<(), SinkError> {
        for result in results {
            let mut row: Vec<String> = result.record.columns.clone();
            row.push(result.initial_correct.as_str().to_string());
            row.push(format_state_list(&result.corrected_states));
            row.push(result.confidence.as_str().to_string());
            row.push(result.reasoning.clone());
            self.writer
                .write_record(&row)
                .map_err(|e| csv_err(&self.path, e))?;
            self.rows_written += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|e| write_err(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| write_err(&self.path, e))
    }

    fn rows_written(&self) -> usize {
        self.rows_written
    }
}

/// Rebuild a result from an output row, checking it belongs to `record`.
fn decode_row(row: &csv::StringRecord, record: &PharmacyRecord, width: usize) -> Option<ValidationResult> {
    if row.len() != width + RESULT_COLUMNS {
        return None;
    }
    let passthrough: Vec<&str> = row.iter().take(width).collect();
    if passthrough != record.columns.iter().map(String::as_str).collect::<Vec<_>>() {
        return None;
    }
    let confidence = match row.get(width + 2)? {
        "error" => Confidence::Error,
        other => Confidence::parse(other)?,
    };
    Some(ValidationResult {
        record: record.clone(),
        initial_correct: Verdict::parse(row.get(width)?)?,
        corrected_states: parse_state_list(row.get(width + 1)?),
        confidence,
        reasoning: row.get(width + 3)?.to_string(),
    })
}

fn create_parent(path: &Path) -> Result<(), SinkError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| write_err(path, e))
        }
        _ => Ok(()),
    }
}

fn write_err(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_err(path: &Path, source: csv::Error) -> SinkError {
    SinkError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

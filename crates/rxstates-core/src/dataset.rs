//! CSV dataset loading and column validation.

use crate::config::InputConfig;
use crate::error::ConfigError;
use crate::states::parse_state_list;
use crate::types::PharmacyRecord;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SAMPLE_CSV: &str = "StoreName,Address1,City,State,ZipCode,Operates in states,NCPDPID\n\
                          Test Pharmacy,123 Main St,Anytown,CA,90210,\"CA, NV, AZ\",1234567\n";

/// A loaded input file: header plus records in file order.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub headers: Arc<Vec<String>>,
    pub records: Vec<PharmacyRecord>,
}

impl Dataset {
    /// Load and validate an input CSV.
    ///
    /// Fails if the file is unreadable, lacks the states column, or has no
    /// data rows. Rows with a different cell count than the header are
    /// padded or truncated.
    pub fn load(path: &Path, columns: &InputConfig) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|e| ConfigError::Input {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_reader(path, file, columns)
    }

    /// The single pharmacy used by `rxstates check`.
    pub fn sample() -> Result<Self, ConfigError> {
        Self::from_reader(Path::new("<sample>"), SAMPLE_CSV.as_bytes(), &InputConfig::default())
    }

    /// Load from any reader; `path` is used for diagnostics only.
    pub fn from_reader<R: Read>(
        path: &Path,
        source: R,
        columns: &InputConfig,
    ) -> Result<Self, ConfigError> {
        let input_err = |message: String| ConfigError::Input {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(source);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| input_err(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let states_idx = headers
            .iter()
            .position(|h| h == &columns.states_column)
            .ok_or_else(|| ConfigError::MissingColumn {
                path: path.to_path_buf(),
                column: columns.states_column.clone(),
                available: headers.clone(),
            })?;
        let id_idx = headers.iter().position(|h| h == &columns.id_column);
        let name_idx = headers.iter().position(|h| h == &columns.name_column);
        if id_idx.is_none() {
            tracing::warn!(
                "Identifier column '{}' not found, using row numbers as identifiers",
                columns.id_column
            );
        }

        let headers = Arc::new(headers);
        let width = headers.len();
        let mut records = Vec::new();

        for (row_index, row) in reader.records().enumerate() {
            let row = row.map_err(|e| input_err(format!("row {}: {e}", row_index + 1)))?;
            let mut cells: Vec<String> = row.iter().map(str::to_string).collect();
            if cells.len() != width {
                tracing::warn!(
                    "Row {} has {} cells, expected {width}; adjusting",
                    row_index + 1,
                    cells.len()
                );
                cells.resize(width, String::new());
            }

            let cell = |idx: Option<usize>| {
                idx.map(|i| cells[i].trim().to_string())
                    .filter(|v| !v.is_empty())
            };
            let id = cell(id_idx).unwrap_or_else(|| format!("row-{}", row_index + 1));
            let name = cell(name_idx).unwrap_or_else(|| "N/A".to_string());
            let claimed_raw = cells[states_idx].clone();

            records.push(PharmacyRecord {
                row_index,
                id,
                name,
                claimed_states: parse_state_list(&claimed_raw),
                claimed_raw,
                columns: cells,
                headers: headers.clone(),
            });
        }

        if records.is_empty() {
            return Err(ConfigError::EmptyInput(path.to_path_buf()));
        }

        tracing::info!(
            "Loaded {} rows with {} columns from {:?}",
            records.len(),
            width,
            path
        );

        let dataset = Self {
            path: path.to_path_buf(),
            headers,
            records,
        };
        let duplicates = dataset.duplicate_ids();
        if !duplicates.is_empty() {
            tracing::warn!(
                "{} identifiers appear on more than one row, replies are matched by position for those: {}",
                duplicates.len(),
                duplicates.join(", ")
            );
        }
        Ok(dataset)
    }

    /// Identifiers shared by more than one row, in first-seen order.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for record in &self.records {
            let id = record.id.to_ascii_lowercase();
            if !seen.insert(id) && !duplicates.contains(&record.id) {
                duplicates.push(record.id.clone());
            }
        }
        duplicates
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//! Run checkpoint: which batches are durably in the output file.
//!
//! The checkpoint is rewritten after every batch (temp file + rename) and
//! removed when a run completes. It is honoured only when its fingerprint
//! matches the current run's.

use crate::config::{InputConfig, PolicyConfig};
use crate::error::SinkError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const CHECKPOINT_VERSION: u32 = 1;

/// Settings besides the input bytes that decide what a run writes.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings<'a> {
    pub batch_size: usize,
    pub provider: &'a str,
    pub model: &'a str,
    pub columns: &'a InputConfig,
    pub policy: &'a PolicyConfig,
}

/// Identity of a run: input bytes plus [`RunSettings`]. Two runs with the
/// same fingerprint batch the same rows the same way and reconcile replies
/// under the same rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFingerprint(String);

impl RunFingerprint {
    /// Fingerprint an input file with BLAKE3, streaming its contents.
    pub fn compute(input: &Path, settings: &RunSettings<'_>) -> std::io::Result<Self> {
        let mut reader = BufReader::new(File::open(input)?);
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; 65536];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Self::finish(hasher, settings))
    }

    /// Fingerprint in-memory input bytes.
    pub fn from_parts(input: &[u8], settings: &RunSettings<'_>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(input);
        Self::finish(hasher, settings)
    }

    fn finish(mut hasher: blake3::Hasher, settings: &RunSettings<'_>) -> Self {
        hasher.update(&(settings.batch_size as u64).to_le_bytes());
        for field in [
            settings.provider,
            settings.model,
            settings.columns.states_column.as_str(),
            settings.columns.id_column.as_str(),
            settings.columns.name_column.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update(&[0]);
        }
        let policy = settings.policy;
        hasher.update(&[
            u8::from(policy.accept_narrowing),
            u8::from(policy.accept_widening),
            policy.min_correction_confidence.rank(),
        ]);
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Persistent run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub version: u32,
    pub fingerprint: String,
    /// Output file this run is appending to
    pub output_path: PathBuf,
    pub batch_size: usize,
    pub total_batches: usize,
    /// Batch indices durably written
    pub completed: BTreeSet<usize>,
    /// Data rows durably written
    pub rows_written: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn new(
        fingerprint: &RunFingerprint,
        output_path: PathBuf,
        batch_size: usize,
        total_batches: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            fingerprint: fingerprint.as_str().to_string(),
            output_path,
            batch_size,
            total_batches,
            completed: BTreeSet::new(),
            rows_written: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// Load a checkpoint if one exists.
    ///
    /// A missing file is `None`. An unreadable or corrupt file is logged and
    /// also treated as `None`, so the run starts fresh.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable checkpoint {:?}: {e}", path);
                return None;
            }
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(cp) if cp.version == CHECKPOINT_VERSION => Some(cp),
            Ok(cp) => {
                tracing::warn!(
                    "Ignoring checkpoint {:?} with unsupported version {}",
                    path,
                    cp.version
                );
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupt checkpoint {:?}: {e}", path);
                None
            }
        }
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<(), SinkError> {
        let err = |message: String| SinkError::Checkpoint {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| err(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| err(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| err(e.to_string()))?;
        Ok(())
    }

    /// Remove the checkpoint file after a clean run.
    pub fn discard(path: &Path) -> Result<(), SinkError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SinkError::Checkpoint {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    pub fn matches(&self, fingerprint: &RunFingerprint, batch_size: usize, total_batches: usize) -> bool {
        self.fingerprint == fingerprint.as_str()
            && self.batch_size == batch_size
            && self.total_batches == total_batches
    }

    pub fn mark_complete(&mut self, batch_index: usize, rows: usize) {
        if self.completed.insert(batch_index) {
            self.rows_written += rows;
        }
        self.updated_at = Utc::now();
    }

    pub fn is_complete(&self, batch_index: usize) -> bool {
        self.completed.contains(&batch_index)
    }

    /// First batch index not yet complete.
    pub fn next_batch(&self) -> usize {
        (0..).find(|i| !self.completed.contains(i)).unwrap_or(0)
    }
}

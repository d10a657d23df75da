//! Core data types: input records, per-row verdicts and run summaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PharmacyRecord {
    /// Zero-based position in the input file
    pub row_index: usize,

    /// Identifier used to align provider replies with rows
    pub id: String,

    /// Pharmacy display name
    pub name: String,

    /// Claimed states of operation, normalized
    pub claimed_states: Vec<String>,

    /// Claimed states exactly as written in the input cell
    pub claimed_raw: String,

    /// Every original cell, in header order
    pub columns: Vec<String>,

    /// Shared header names, used for address lookups
    pub(crate) headers: std::sync::Arc<Vec<String>>,
}

impl PharmacyRecord {
    /// Look up a passthrough column by header name.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.columns.get(i))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Street address line for prompts ("N/A" parts when unknown).
    pub fn address_line(&self) -> String {
        let part = |c: &str| self.field(c).unwrap_or("N/A").to_string();
        format!(
            "{}, {}, {} {}",
            part("Address1"),
            part("City"),
            part("State"),
            part("ZipCode")
        )
    }
}

/// Tri-state answer to "were the claimed states correct?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    True,
    False,
    #[default]
    Unknown,
}

impl Verdict {
    /// Parse loosely: true/false/yes/no/unknown/null, any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_matches('"').to_lowercase().as_str() {
            "true" | "yes" | "correct" => Some(Self::True),
            "false" | "no" | "incorrect" => Some(Self::False),
            "unknown" | "null" | "none" | "" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Unknown => "unknown",
        }
    }
}

impl From<Option<bool>> for Verdict {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::True,
            Some(false) => Self::False,
            None => Self::Unknown,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How sure the oracle was, or `Error` when no answer was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Error,
}

impl Confidence {
    /// Parse a model-reported confidence. `error` is never accepted from a
    /// reply; it is reserved for rows the pipeline could not validate.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_matches('"').to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" | "moderate" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Ordering used by the correction policy threshold.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Error => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome for one pharmacy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub record: PharmacyRecord,
    pub initial_correct: Verdict,
    /// Populated only when a correction was asserted and accepted
    pub corrected_states: Vec<String>,
    pub confidence: Confidence,
    pub reasoning: String,
}

impl ValidationResult {
    /// Placeholder for a row whose validation failed.
    pub fn error(record: &PharmacyRecord, reason: impl Into<String>) -> Self {
        Self {
            record: record.clone(),
            initial_correct: Verdict::Unknown,
            corrected_states: Vec::new(),
            confidence: Confidence::Error,
            reasoning: reason.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.confidence == Confidence::Error
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unknown: usize,
    pub errors: usize,
    pub batches_processed: usize,
    pub batches_failed: usize,
    pub batches_resumed: usize,
    pub retries: u32,
}

impl RunSummary {
    /// Tally verdicts over a full result set. Batch counters are filled in
    /// by the orchestrator.
    pub fn tally(results: &[ValidationResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for r in results {
            match r.initial_correct {
                Verdict::True => summary.correct += 1,
                Verdict::False => summary.incorrect += 1,
                Verdict::Unknown => summary.unknown += 1,
            }
            if r.is_error() {
                summary.errors += 1;
            }
        }
        summary
    }

    /// Share of rows that received a definite verdict, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.correct + self.incorrect) as f64 / self.total as f64 * 100.0
    }
}

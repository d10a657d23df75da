//! Turn a reply entry into a result under the configured correction policy.

use super::ReplyEntry;
use crate::config::PolicyConfig;
use crate::states::CorrectionShape;
use crate::types::{Confidence, PharmacyRecord, ValidationResult, Verdict};

/// Merge one matched entry with its record.
pub fn reconcile(
    record: &PharmacyRecord,
    entry: &ReplyEntry,
    policy: &PolicyConfig,
) -> ValidationResult {
    let confidence = entry.confidence.unwrap_or(Confidence::Low);
    let reported = entry.verdict.unwrap_or(Verdict::Unknown);
    let mut result = ValidationResult {
        record: record.clone(),
        initial_correct: reported,
        corrected_states: Vec::new(),
        confidence,
        reasoning: entry.reasoning.clone(),
    };

    if entry.corrected_states.is_empty() {
        return result;
    }

    let shape = CorrectionShape::classify(&record.claimed_states, &entry.corrected_states);
    if shape == CorrectionShape::Identical {
        result.initial_correct = Verdict::True;
        return result;
    }

    let withheld = if confidence.rank() < policy.min_correction_confidence.rank() {
        Some(format!(
            "{confidence} confidence below {}",
            policy.min_correction_confidence
        ))
    } else if shape == CorrectionShape::Narrowing && !policy.accept_narrowing {
        Some("narrowing corrections disabled".to_string())
    } else if shape == CorrectionShape::Widening && !policy.accept_widening {
        Some("widening corrections disabled".to_string())
    } else {
        None
    };

    match withheld {
        Some(why) => {
            tracing::debug!("Withholding correction for {}: {why}", record.id);
            result.initial_correct = Verdict::Unknown;
            result.reasoning = format!("[correction withheld: {why}] {}", entry.reasoning)
                .trim_end()
                .to_string();
        }
        None => {
            if reported == Verdict::True {
                tracing::debug!(
                    "Reply for {} says correct but asserts a {:?} correction; applying it",
                    record.id,
                    shape
                );
            }
            result.initial_correct = Verdict::False;
            result.corrected_states = entry.corrected_states.clone();
        }
    }
    result
}

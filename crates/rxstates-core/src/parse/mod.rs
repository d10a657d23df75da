//! Response parsing: raw provider reply to one result per batch row.
//!
//! Parsing is two-stage. [`strict`] decodes the reply as JSON (fenced block,
//! outermost object, or outermost array). When that fails, [`fallback`]
//! recovers fields with a fixed set of key patterns. Entries are then aligned
//! with the batch by identifier, falling back to the 1-based index, and each
//! match is reconciled against the correction policy.
//!
//! A reply with no recoverable entries, or none that match the batch, is a
//! [`ParseError`] for the whole batch. Rows missing from an otherwise usable
//! reply become error rows individually.

pub(crate) mod fallback;
pub(crate) mod reconcile;
pub(crate) mod strict;

use crate::config::PolicyConfig;
use crate::error::ParseError;
use crate::pipeline::Batch;
use crate::types::{Confidence, ValidationResult, Verdict};

/// One pharmacy's answer as recovered from a reply, before alignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyEntry {
    pub pharmacy_id: Option<String>,
    /// 1-based position within the batch, as echoed by the model
    pub pharmacy_index: Option<usize>,
    pub verdict: Option<Verdict>,
    /// Normalized, de-duplicated
    pub corrected_states: Vec<String>,
    pub confidence: Option<Confidence>,
    pub reasoning: String,
}

/// Which stage produced the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Strict,
    Fallback,
}

/// Results for a batch plus diagnostics.
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    /// One result per batch row, in batch order
    pub results: Vec<ValidationResult>,
    pub stage: ParseStage,
    /// Identifiers with no entry in the reply
    pub missing: Vec<String>,
    /// Entries that matched no row
    pub unmatched: usize,
}

/// Recover entries from reply text, strict stage first.
pub fn extract_entries(text: &str) -> Result<(Vec<ReplyEntry>, ParseStage), ParseError> {
    if let Some(entries) = strict::decode(text) {
        return Ok((entries, ParseStage::Strict));
    }
    tracing::debug!("Strict decoding failed, trying tolerant extraction");
    fallback::extract(text)
        .map(|entries| (entries, ParseStage::Fallback))
        .ok_or(ParseError::Unparseable {
            reply_len: text.len(),
        })
}

/// Parse a reply into results aligned with `batch`.
pub fn parse_reply(
    text: &str,
    batch: &Batch,
    policy: &PolicyConfig,
) -> Result<ParsedBatch, ParseError> {
    let (entries, stage) = extract_entries(text)?;

    let mut slots: Vec<Option<usize>> = vec![None; batch.len()];
    let mut unmatched = 0usize;
    for (entry_idx, entry) in entries.iter().enumerate() {
        let by_index = entry
            .pharmacy_index
            .filter(|i| (1..=batch.len()).contains(i))
            .map(|i| i - 1);
        // An entry naming an id outside the batch is not realigned by index.
        let slot = match entry.pharmacy_id.as_deref() {
            Some(id) => slot_for_id(batch, &slots, id.trim(), by_index),
            None => by_index,
        };
        match slot {
            Some(pos) if slots[pos].is_none() => slots[pos] = Some(entry_idx),
            Some(pos) => {
                tracing::warn!(
                    "Duplicate reply entry for {}, keeping the first",
                    batch.records[pos].id
                );
            }
            None => {
                unmatched += 1;
                tracing::warn!(
                    "Reply entry {:?} (index {:?}) matches no pharmacy in batch {}",
                    entry.pharmacy_id,
                    entry.pharmacy_index,
                    batch.index + 1
                );
            }
        }
    }

    if slots.iter().all(Option::is_none) {
        return Err(ParseError::NoMatches {
            entries: entries.len(),
        });
    }

    let mut missing = Vec::new();
    let results = batch
        .records
        .iter()
        .zip(&slots)
        .map(|(record, slot)| match slot {
            Some(i) => reconcile::reconcile(record, &entries[*i], policy),
            None => {
                missing.push(record.id.clone());
                ValidationResult::error(record, "No entry for this pharmacy in provider reply")
            }
        })
        .collect();

    Ok(ParsedBatch {
        results,
        stage,
        missing,
        unmatched,
    })
}

/// Row for an entry naming `id`. Rows sharing an identifier are told apart
/// by the echoed index, otherwise the first unfilled one wins.
fn slot_for_id(
    batch: &Batch,
    slots: &[Option<usize>],
    id: &str,
    by_index: Option<usize>,
) -> Option<usize> {
    let matches = |pos: &usize| batch.records[*pos].id.trim().eq_ignore_ascii_case(id);
    let mut candidates = (0..batch.len()).filter(matches).peekable();
    let first = *candidates.peek()?;
    if let Some(pos) = by_index.filter(|p| matches(p) && slots[*p].is_none()) {
        return Some(pos);
    }
    Some(
        candidates
            .find(|pos| slots[*pos].is_none())
            .unwrap_or(first),
    )
}

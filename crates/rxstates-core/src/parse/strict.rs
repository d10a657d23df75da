//! Stage 1: strict JSON decoding of a reply.

use super::ReplyEntry;
use crate::states::{normalize_states, parse_state_list};
use crate::types::{Confidence, Verdict};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n?(.*?)```").expect("valid code fence regex")
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped {
        #[serde(alias = "results")]
        validations: Vec<StrictEntry>,
    },
    Bare(Vec<StrictEntry>),
}

/// Every field is a raw `Value` so a single oddly-typed field does not sink
/// the whole document.
#[derive(Deserialize, Default)]
#[serde(default)]
struct StrictEntry {
    pharmacy_id: Value,
    pharmacy_index: Value,
    is_correct: Value,
    corrected_states: Value,
    confidence: Value,
    reasoning: Value,
}

/// Candidate JSON texts, most specific first: fenced code blocks, the
/// outermost object, the outermost array.
fn candidates(text: &str) -> Vec<&str> {
    let mut out: Vec<&str> = fence_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .collect();
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                out.push(&text[start..=end]);
            }
        }
    }
    out
}

/// Decode the first candidate that parses as a validations document.
pub fn decode(text: &str) -> Option<Vec<ReplyEntry>> {
    candidates(text).into_iter().find_map(|candidate| {
        match serde_json::from_str::<Envelope>(candidate) {
            Ok(Envelope::Wrapped { validations }) | Ok(Envelope::Bare(validations)) => {
                Some(validations.into_iter().map(ReplyEntry::from).collect())
            }
            Err(e) => {
                tracing::trace!("Strict decode candidate rejected: {e}");
                None
            }
        }
    })
}

impl From<StrictEntry> for ReplyEntry {
    fn from(e: StrictEntry) -> Self {
        Self {
            pharmacy_id: scalar_string(&e.pharmacy_id),
            pharmacy_index: match &e.pharmacy_index {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            },
            verdict: match &e.is_correct {
                Value::Bool(b) => Some(Verdict::from(Some(*b))),
                Value::Null => None,
                Value::String(s) => Verdict::parse(s),
                _ => None,
            },
            corrected_states: match &e.corrected_states {
                Value::String(s) => parse_state_list(s),
                Value::Array(items) => {
                    normalize_states(items.iter().filter_map(|v| v.as_str()))
                }
                _ => Vec::new(),
            },
            confidence: e.confidence.as_str().and_then(Confidence::parse),
            reasoning: match e.reasoning {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            },
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_document() {
        let reply = r#"{"validations": [
            {"pharmacy_id": "111", "pharmacy_index": 1, "is_correct": true,
             "confidence": "high", "reasoning": "Licensed in both."}
        ]}"#;
        let entries = decode(reply).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pharmacy_id.as_deref(), Some("111"));
        assert_eq!(entries[0].pharmacy_index, Some(1));
        assert_eq!(entries[0].verdict, Some(Verdict::True));
        assert_eq!(entries[0].confidence, Some(Confidence::High));
        assert_eq!(entries[0].reasoning, "Licensed in both.");
    }

    #[test]
    fn test_decode_fenced_block_with_prose() {
        let reply = "Here is my analysis {see below}.\n\n```json\n{\"validations\": [\
            {\"pharmacy_id\": 222, \"is_correct\": false, \"corrected_states\": \"ca, ny, tx\", \
            \"confidence\": \"Medium\", \"reasoning\": \"Also licensed in TX.\"}]}\n```\nThanks.";
        let entries = decode(reply).unwrap();
        assert_eq!(entries[0].pharmacy_id.as_deref(), Some("222"));
        assert_eq!(entries[0].verdict, Some(Verdict::False));
        assert_eq!(entries[0].corrected_states, vec!["CA", "NY", "TX"]);
        assert_eq!(entries[0].confidence, Some(Confidence::Medium));
    }

    #[test]
    fn test_decode_bare_array_and_list_corrections() {
        let reply = r#"[{"pharmacy_id": "A", "is_correct": "no",
                         "corrected_states": ["fl", "FL", " ga "]}]"#;
        let entries = decode(reply).unwrap();
        assert_eq!(entries[0].verdict, Some(Verdict::False));
        assert_eq!(entries[0].corrected_states, vec!["FL", "GA"]);
        assert_eq!(entries[0].confidence, None);
    }

    #[test]
    fn test_decode_results_alias() {
        let reply = r#"{"results": [{"pharmacy_index": "2", "is_correct": null}]}"#;
        let entries = decode(reply).unwrap();
        assert_eq!(entries[0].pharmacy_index, Some(2));
        assert_eq!(entries[0].verdict, None);
    }

    #[test]
    fn test_decode_rejects_prose() {
        assert!(decode("I could not find information on these pharmacies.").is_none());
        assert!(decode("{not json at all}").is_none());
        assert!(decode(r#"{"summary": "nothing"}"#).is_none());
    }
}

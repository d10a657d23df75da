//! Stage 2: tolerant field extraction for replies that are not valid JSON.
//!
//! The rules are a fixed set, each a single key pattern:
//!
//! | Rule | Key | Accepted value |
//! |------|-----|----------------|
//! | F1 | `pharmacy_id` / `pharmacy id` / `pharmacy_index`, or `N. Pharmacy:` with `ID:` | segments the reply into entry blocks |
//! | F2 | `is_correct` | `true`, `false`, `yes`, `no`, `unknown`, `null` |
//! | F3 | `corrected_states` | `[..]` list, quoted string, or rest of line |
//! | F4 | `confidence` | `high`, `medium`, `low` |
//! | F5 | `reasoning` | quoted string (escapes allowed) or rest of line |
//!
//! Keys may be quoted, wrapped in markdown `**`, and followed by `:` or `=`.

use super::ReplyEntry;
use crate::states::{normalize_states, parse_state_list};
use crate::types::{Confidence, Verdict};
use regex::Regex;
use std::sync::OnceLock;

fn key_re() -> &'static Regex {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE.get_or_init(|| {
        Regex::new(
            r#"(?i)[*"'_]*pharmacy[ _]?(id|index)[*"'_]*\s*[:=]\s*[*"'\s]*([A-Za-z0-9][A-Za-z0-9._-]*)"#,
        )
        .expect("valid pharmacy key regex")
    })
}

fn listing_re() -> &'static Regex {
    static LISTING_RE: OnceLock<Regex> = OnceLock::new();
    LISTING_RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t>#*-]*(\d+)[.)][ \t]+[*_]*pharmacy[*_]*[ \t]*:")
            .expect("valid listing regex")
    })
}

fn bare_id_re() -> &'static Regex {
    static BARE_ID_RE: OnceLock<Regex> = OnceLock::new();
    BARE_ID_RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t>*-]*[*_]*id[*_]*[ \t]*[:=][ \t*]*([A-Za-z0-9][A-Za-z0-9._-]*)")
            .expect("valid bare id regex")
    })
}

fn index_re() -> &'static Regex {
    static INDEX_RE: OnceLock<Regex> = OnceLock::new();
    INDEX_RE.get_or_init(|| {
        Regex::new(r#"(?i)[*"'_]*pharmacy[ _]?index[*"'_]*\s*[:=]\s*[*"'\s]*(\d+)"#)
            .expect("valid pharmacy index regex")
    })
}

fn verdict_re() -> &'static Regex {
    static VERDICT_RE: OnceLock<Regex> = OnceLock::new();
    VERDICT_RE.get_or_init(|| {
        Regex::new(
            r#"(?i)[*"'_]*is[ _]?correct[*"'_]*\s*[:=]\s*[*"'\s]*(true|false|yes|no|unknown|null)\b"#,
        )
        .expect("valid verdict regex")
    })
}

fn corrected_re() -> &'static Regex {
    static CORRECTED_RE: OnceLock<Regex> = OnceLock::new();
    CORRECTED_RE.get_or_init(|| {
        Regex::new(
            r#"(?i)[*"'_]*corrected[ _]?states[*"'_]*\s*[:=][ \t*]*(\[[^\]]*\]|"[^"]*"|[^\n]*)"#,
        )
        .expect("valid corrected states regex")
    })
}

fn confidence_re() -> &'static Regex {
    static CONFIDENCE_RE: OnceLock<Regex> = OnceLock::new();
    CONFIDENCE_RE.get_or_init(|| {
        Regex::new(r#"(?i)[*"'_]*confidence[*"'_]*\s*[:=]\s*[*"'\s]*(high|medium|low)\b"#)
            .expect("valid confidence regex")
    })
}

fn reasoning_re() -> &'static Regex {
    static REASONING_RE: OnceLock<Regex> = OnceLock::new();
    REASONING_RE.get_or_init(|| {
        Regex::new(
            r#"(?i)[*"'_]*reasoning[*"'_]*\s*[:=][ \t*]*(?:"((?:[^"\\]|\\.)*)"|([^\n]*))"#,
        )
        .expect("valid reasoning regex")
    })
}

/// One entry's slice of the reply.
struct Block<'a> {
    id: Option<String>,
    index: Option<usize>,
    text: &'a str,
}

/// F1: split the reply into entry blocks.
///
/// Blocks start at identifier keys when any are present. Otherwise a reply
/// that echoes the numbered `N. Pharmacy:` listing is split per item, taking
/// the item number as index and a bare `ID:` line as identifier. Failing
/// both, blocks start at index keys, so a JSON-like entry carrying both keys
/// is one block.
fn segment(text: &str) -> Vec<Block<'_>> {
    let keys: Vec<_> = key_re().captures_iter(text).collect();
    let by_id = keys
        .iter()
        .any(|c| c[1].eq_ignore_ascii_case("id"));

    let starts: Vec<(usize, Option<String>, Option<usize>)> = if by_id {
        keys.iter()
            .filter(|c| c[1].eq_ignore_ascii_case("id"))
            .filter_map(|c| Some((c.get(0)?.start(), Some(c[2].to_string()), None)))
            .collect()
    } else if listing_re().is_match(text) {
        listing_re()
            .captures_iter(text)
            .filter_map(|c| Some((c.get(0)?.start(), None, c[1].parse().ok())))
            .collect()
    } else {
        keys.iter()
            .filter_map(|c| Some((c.get(0)?.start(), None, None)))
            .collect()
    };

    starts
        .iter()
        .enumerate()
        .map(|(i, (start, id, index))| {
            let end = starts.get(i + 1).map(|(s, _, _)| *s).unwrap_or(text.len());
            let block = &text[*start..end];
            let id = id.clone().or_else(|| {
                index.and_then(|_| bare_id_re().captures(block).map(|c| c[1].to_string()))
            });
            Block {
                id,
                index: *index,
                text: block,
            }
        })
        .collect()
}

/// F2
fn verdict(block: &str) -> Option<Verdict> {
    verdict_re()
        .captures(block)
        .and_then(|c| Verdict::parse(&c[1]))
}

/// F3
fn corrected_states(block: &str) -> Vec<String> {
    let Some(c) = corrected_re().captures(block) else {
        return Vec::new();
    };
    let value = c[1].trim();
    if let Some(list) = value.strip_prefix('[') {
        let list = list.trim_end_matches(']');
        normalize_states(list.split(','))
    } else if let Some(quoted) = value.strip_prefix('"') {
        parse_state_list(quoted.trim_end_matches('"'))
    } else {
        parse_state_list(value.trim_end_matches([',', '}', '*']))
    }
}

/// F4
fn confidence(block: &str) -> Option<Confidence> {
    confidence_re()
        .captures(block)
        .and_then(|c| Confidence::parse(&c[1]))
}

/// F5
fn reasoning(block: &str) -> String {
    let Some(c) = reasoning_re().captures(block) else {
        return String::new();
    };
    if let Some(quoted) = c.get(1) {
        unescape(quoted.as_str())
    } else {
        c.get(2)
            .map(|m| {
                m.as_str()
                    .trim()
                    .trim_start_matches('"')
                    .trim_end_matches([',', '}'])
                    .trim()
                    .to_string()
            })
            .unwrap_or_default()
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out.trim().to_string()
}

/// Extract entries with rules F1-F5. `None` when F1 finds no blocks.
pub fn extract(text: &str) -> Option<Vec<ReplyEntry>> {
    let blocks = segment(text);
    if blocks.is_empty() {
        return None;
    }
    Some(
        blocks
            .into_iter()
            .map(|block| ReplyEntry {
                pharmacy_index: block.index.or_else(|| {
                    index_re()
                        .captures(block.text)
                        .and_then(|c| c[1].parse().ok())
                }),
                pharmacy_id: block.id,
                verdict: verdict(block.text),
                corrected_states: corrected_states(block.text),
                confidence: confidence(block.text),
                reasoning: reasoning(block.text),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f1_segments_on_ids() {
        let reply = "pharmacy_id: 111\nis_correct: true\n\npharmacy_id: 222\nis_correct: false\n";
        let blocks = segment(reply);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id.as_deref(), Some("111"));
        assert_eq!(blocks[1].id.as_deref(), Some("222"));
        assert!(blocks[0].text.contains("true"));
        assert!(!blocks[0].text.contains("false"));
    }

    #[test]
    fn test_f1_markdown_key() {
        let blocks = segment("**Pharmacy ID:** 7654321\n- **Is correct:** yes");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id.as_deref(), Some("7654321"));
    }

    #[test]
    fn test_f1_falls_back_to_index_segmentation() {
        let blocks = segment("pharmacy_index = 1, is_correct = true; pharmacy_index = 2");
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.id.is_none()));
    }

    #[test]
    fn test_f1_numbered_listing_with_bare_ids() {
        let reply = "Here is what I found for each pharmacy:\n\n\
                     1. Pharmacy: Acme Rx\n   ID: 1234567\n   Is correct: yes\n\
                     \x20  Confidence: high\n   Reasoning: Licensed in CA and NV.\n\n\
                     2. **Pharmacy:** Beta Rx\n   **ID:** 7654321\n   **Is correct:** no\n\
                     \x20  **Corrected states:** CA, NY, TX\n   **Confidence:** medium\n\
                     \x20  **Reasoning:** Texas license found.\n";
        let entries = extract(reply).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pharmacy_id.as_deref(), Some("1234567"));
        assert_eq!(entries[0].pharmacy_index, Some(1));
        assert_eq!(entries[0].verdict, Some(Verdict::True));
        assert_eq!(entries[0].confidence, Some(Confidence::High));
        assert_eq!(entries[0].reasoning, "Licensed in CA and NV.");
        assert_eq!(entries[1].pharmacy_id.as_deref(), Some("7654321"));
        assert_eq!(entries[1].pharmacy_index, Some(2));
        assert_eq!(entries[1].verdict, Some(Verdict::False));
        assert_eq!(entries[1].corrected_states, vec!["CA", "NY", "TX"]);
        assert_eq!(entries[1].reasoning, "Texas license found.");
    }

    #[test]
    fn test_f1_numbered_listing_without_ids_keeps_index() {
        let entries = extract("1. Pharmacy: Acme Rx\nIs correct: true\n").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pharmacy_id, None);
        assert_eq!(entries[0].pharmacy_index, Some(1));
    }

    #[test]
    fn test_f1_id_and_index_in_one_entry() {
        let reply = r#"{"pharmacy_id": "A1", "pharmacy_index": 1, "is_correct": true
                        {"pharmacy_id": "B2", "pharmacy_index": 2, "is_correct": false"#;
        let entries = extract(reply).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pharmacy_index, Some(1));
        assert_eq!(entries[1].pharmacy_id.as_deref(), Some("B2"));
        assert_eq!(entries[1].pharmacy_index, Some(2));
    }

    #[test]
    fn test_f2_verdict_variants() {
        assert_eq!(verdict("\"is_correct\": false,"), Some(Verdict::False));
        assert_eq!(verdict("Is correct = YES"), Some(Verdict::True));
        assert_eq!(verdict("is_correct: null"), Some(Verdict::Unknown));
        assert_eq!(verdict("nothing here"), None);
    }

    #[test]
    fn test_f3_corrected_states_forms() {
        assert_eq!(
            corrected_states(r#""corrected_states": ["CA", "ny", "TX"],"#),
            vec!["CA", "NY", "TX"]
        );
        assert_eq!(
            corrected_states(r#""corrected_states": "CA, NY, TX","#),
            vec!["CA", "NY", "TX"]
        );
        assert_eq!(
            corrected_states("Corrected states: fl; ga\nConfidence: low"),
            vec!["FL", "GA"]
        );
        assert!(corrected_states("corrected_states: N/A").is_empty());
        assert!(corrected_states("no corrections").is_empty());
    }

    #[test]
    fn test_f4_confidence() {
        assert_eq!(confidence("\"confidence\": \"HIGH\""), Some(Confidence::High));
        assert_eq!(confidence("**Confidence:** medium"), Some(Confidence::Medium));
        assert_eq!(confidence("confidence: unsure"), None);
    }

    #[test]
    fn test_f5_reasoning_quoted_and_line() {
        assert_eq!(
            reasoning(r#""reasoning": "Board lists \"active\" license.\nRenewed 2024.""#),
            "Board lists \"active\" license.\nRenewed 2024."
        );
        assert_eq!(
            reasoning("Reasoning: Found on NABP verify.\nNext line"),
            "Found on NABP verify."
        );
        assert_eq!(reasoning("no reasoning key"), "");
    }

    #[test]
    fn test_extract_truncated_json_reply() {
        // Output cut off mid-document: strict decoding cannot recover this
        let reply = r#"{"validations": [
            {"pharmacy_id": "111", "is_correct": true, "confidence": "high",
             "reasoning": "Licensed in CA and NY."},
            {"pharmacy_id": "222", "is_correct": false, "corrected_states": "CA, NY, TX",
             "confidence": "medium", "reasoning": "Also hold"#;
        let entries = extract(reply).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].verdict, Some(Verdict::True));
        assert_eq!(entries[0].reasoning, "Licensed in CA and NY.");
        assert_eq!(entries[1].corrected_states, vec!["CA", "NY", "TX"]);
        assert_eq!(entries[1].confidence, Some(Confidence::Medium));
        assert_eq!(entries[1].reasoning, "Also hold");
    }

    #[test]
    fn test_extract_none_without_keys() {
        assert!(extract("I'm sorry, I can't help with that.").is_none());
    }
}

//! State-list normalization.
//!
//! Claimed and corrected state lists arrive as free text ("CA, ny ;TX") or as
//! JSON arrays. Both reduce to the same canonical form: trimmed, uppercase,
//! whitespace-collapsed codes in first-seen order with no duplicates.

use std::collections::HashSet;

/// Placeholder tokens models use to mean "no states".
const PLACEHOLDERS: &[&str] = &["N/A", "NA", "NONE", "NULL", "-"];

/// Split a delimited state list into normalized codes.
///
/// Delimiters are `,`, `;`, `|` and newlines. Spaces are not delimiters, so
/// full names such as "New York" survive as a single entry.
pub fn parse_state_list(raw: &str) -> Vec<String> {
    normalize_states(raw.split([',', ';', '|', '\n']))
}

/// Normalize an already-split sequence of state tokens.
pub fn normalize_states<I, S>(tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in tokens {
        let code = normalize_code(token.as_ref());
        if code.is_empty() || PLACEHOLDERS.contains(&code.as_str()) {
            continue;
        }
        if seen.insert(code.clone()) {
            out.push(code);
        }
    }
    out
}

/// Format a state list the way it appears in the output CSV.
pub fn format_state_list(states: &[String]) -> String {
    states.join(", ")
}

/// How a correction relates to the claimed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionShape {
    /// Same set of states
    Identical,
    /// Strict subset of the claim
    Narrowing,
    /// Strict superset of the claim
    Widening,
    /// Neither subset nor superset
    Replacement,
}

impl CorrectionShape {
    pub fn classify(claimed: &[String], corrected: &[String]) -> Self {
        let claimed: HashSet<&str> = claimed.iter().map(String::as_str).collect();
        let corrected: HashSet<&str> = corrected.iter().map(String::as_str).collect();
        if claimed == corrected {
            Self::Identical
        } else if corrected.is_subset(&claimed) {
            Self::Narrowing
        } else if corrected.is_superset(&claimed) {
            Self::Widening
        } else {
            Self::Replacement
        }
    }
}

fn normalize_code(token: &str) -> String {
    token
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

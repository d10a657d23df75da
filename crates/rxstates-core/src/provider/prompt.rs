//! Prompt construction for batch validation requests.

use crate::pipeline::Batch;

/// System framing shared by every backend.
pub const SYSTEM_PROMPT: &str = "You are a healthcare regulatory expert. Provide accurate, \
fact-based analysis of pharmacy licensing and operations.";

const INSTRUCTIONS: &str = "You are a healthcare regulatory expert specializing in pharmacy \
licensing and operations across U.S. states.

Your task is to verify if the listed \"states of operation\" for each mail-order pharmacy are \
accurate based on current regulatory information, licensing requirements, and known \
operational status.

CRITICAL: Use web search to find current, authoritative information about each pharmacy's \
licensing and operational status.

For each pharmacy, search and analyze:
1. **Current licensing databases**: Search state pharmacy board websites and licensing databases
2. **Regulatory compliance**: Check for current mail-order pharmacy licenses in claimed states
3. **Company websites**: Verify operational scope on official pharmacy websites
4. **Recent regulatory changes**: Look for any recent licensing updates or restrictions
5. **Cross-reference sources**: Compare multiple authoritative sources for accuracy

IMPORTANT: Base your analysis on factual, up-to-date regulatory information found through web \
search, not assumptions or outdated knowledge.

Pharmacies to validate:
";

const REPLY_FORMAT: &str = r#"

For each pharmacy, provide your response in this EXACT JSON format:
{
  "validations": [
    {
      "pharmacy_id": "the ID exactly as listed above",
      "pharmacy_index": 1,
      "is_correct": true,
      "corrected_states": ["CA", "NY"],
      "confidence": "high/medium/low",
      "reasoning": "Brief explanation of your findings"
    }
  ]
}

Include one entry for every pharmacy listed. Set "is_correct" to true or false.
Only include "corrected_states" if the original information is incorrect, as a list of state
codes in the same style as the input.
"#;

/// Build the user prompt for a batch.
pub fn build_prompt(batch: &Batch) -> String {
    let mut prompt = String::from(INSTRUCTIONS);
    for (i, rec) in batch.records.iter().enumerate() {
        prompt.push_str(&format!(
            "\n{}. Pharmacy: {}\n   ID: {}\n   Address: {}\n   Current listed states of operation: {}\n",
            i + 1,
            rec.name,
            rec.id,
            rec.address_line(),
            if rec.claimed_raw.trim().is_empty() {
                "N/A"
            } else {
                rec.claimed_raw.trim()
            },
        ));
    }
    prompt.push_str(REPLY_FORMAT);
    prompt
}

/// Search-strategy hints appended for backends with grounding tools.
///
/// Returns an empty string when both kinds of grounding are disabled.
pub fn search_strategy(search: bool, url: bool) -> String {
    if !search && !url {
        return String::new();
    }
    let mut section =
        String::from("\n\nSEARCH STRATEGY (Use Google Search to find current information):\n");
    if search {
        section.push_str(
            "- Search for \"[pharmacy name] licensing states\" to find current operational scope\n\
             - Search for \"[pharmacy name] pharmacy board license\" for official records\n\
             - Search for \"mail order pharmacy licensing [state name]\" for state-specific requirements\n",
        );
    }
    if url {
        section.push_str(
            "- Reference specific state pharmacy board websites:\n  \
             * \"[state].gov pharmacy board\" or \"[state] board of pharmacy\"\n  \
             * NABP (National Association of Boards of Pharmacy) database\n  \
             * State-specific pharmacy licensing verification portals\n\
             - Key regulatory websites to check:\n  \
             * https://www.nabp.pharmacy/ (National database)\n  \
             * State pharmacy board websites for license verification\n  \
             * FDA registered mail-order pharmacy databases\n",
        );
    }
    section
}

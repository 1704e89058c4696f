//! Term filter gating forum submissions.
//!
//! Matching is plain case-insensitive substring containment. There is no
//! word-boundary handling, so clean words containing a listed term are flagged
//! too ("class" contains "ass", "hello" contains "hell").

use serde::Serialize;

pub const MODERATION_TERMS: &[&str] = &[
    "damn", "hell", "crap", "stupid", "idiot", "moron", "hate", "kill", "die", "fuck", "shit",
    "bitch", "ass", "bastard", "piss", "bloody", "bugger",
];

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub flagged: bool,
    /// Matched terms in list order.
    pub matched_terms: Vec<String>,
}

impl ScanResult {
    /// Moderation reason, e.g. `Inappropriate language: damn, hell`.
    pub fn reason(&self) -> Option<String> {
        self.flagged
            .then(|| format!("Inappropriate language: {}", self.matched_terms.join(", ")))
    }
}

pub fn scan(text: &str) -> ScanResult {
    let lowered = text.to_lowercase();
    let matched_terms: Vec<String> = MODERATION_TERMS
        .iter()
        .filter(|term| lowered.contains(*term))
        .map(|term| term.to_string())
        .collect();

    ScanResult {
        flagged: !matched_terms.is_empty(),
        matched_terms,
    }
}

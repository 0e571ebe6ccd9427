//! Snippet classification and augmentation
//!
//! Generated code arrives as untyped text; routing it into a supported
//! intent is a purely structural decision driven by a data table of required
//! substrings and required imports per intent. Keeping the table explicit
//! (rather than scattered string checks) makes the gate testable in
//! isolation from the retry loop, and lets a session override it wholesale.
//!
//! Per intent the pipeline is: filter on required substrings, stable dedupe,
//! prepend missing imports, append the fixed trailer(s) that export the
//! snippet's artifact into the side channel. Intents are not mutually
//! exclusive; one snippet may survive both gates.

use sdk::types::{CodeSnippet, Intent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Classification and augmentation rule for one intent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentRule {
    /// The intent this rule classifies into
    pub intent: Intent,

    /// A candidate must contain every one of these to match
    pub required_substrings: Vec<String>,

    /// Setup lines prepended (in this order) when their exact text is
    /// absent from the snippet
    pub required_imports: Vec<String>,

    /// Fixed blocks appended before the side-channel trailer
    pub pre_trailers: Vec<String>,

    /// Fixed block that writes the snippet's artifact into the side channel
    pub trailer: String,
}

/// The two output lists of a classification pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedCode {
    /// Import-augmented snippets without trailers; stored in memory for
    /// display
    pub plain: Vec<CodeSnippet>,

    /// Fully augmented snippets handed to the executor
    pub executable: Vec<CodeSnippet>,
}

impl ClassifiedCode {
    /// True if nothing survived the gate
    pub fn is_empty(&self) -> bool {
        self.plain.is_empty()
    }

    /// The plain snippet texts, for memory storage
    pub fn plain_texts(&self) -> Vec<String> {
        self.plain.iter().map(|s| s.text.clone()).collect()
    }
}

/// Run the classification/augmentation pipeline for one intent
pub fn classify_and_augment(candidates: &[String], rule: &IntentRule) -> ClassifiedCode {
    // 1. Filter: every required substring must appear.
    // 2. Stable dedupe by exact text, first occurrence wins.
    let mut seen: HashSet<&str> = HashSet::new();
    let surviving: Vec<&String> = candidates
        .iter()
        .filter(|text| {
            rule.required_substrings
                .iter()
                .all(|needle| text.contains(needle.as_str()))
        })
        .filter(|text| seen.insert(text.as_str()))
        .collect();

    // 3. Prepend whichever required imports are missing, in rule order.
    let plain: Vec<CodeSnippet> = surviving
        .into_iter()
        .map(|text| {
            let missing: Vec<&str> = rule
                .required_imports
                .iter()
                .filter(|import| !text.contains(import.as_str()))
                .map(String::as_str)
                .collect();
            let text = if missing.is_empty() {
                text.clone()
            } else {
                format!("{}\n{}", missing.join("\n"), text)
            };
            CodeSnippet::new(text, rule.intent)
        })
        .collect();

    // 4.-5. Append the fixed blocks, side-channel trailer last.
    let executable: Vec<CodeSnippet> = plain
        .iter()
        .map(|snippet| {
            let mut text = snippet.text.clone();
            for block in &rule.pre_trailers {
                text.push_str(block);
            }
            text.push_str(&rule.trailer);
            CodeSnippet::new(text, rule.intent)
        })
        .collect();

    ClassifiedCode { plain, executable }
}

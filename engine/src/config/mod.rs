//! Session configuration
//!
//! All tunables of a session live in one immutable [`SessionConfig`] fixed
//! at construction: the retry budget, the memory window, the substring
//! tables driving code extraction and intent classification, the fixed
//! trailer blocks, and the prompt templates for the cleaning operations.
//! The defaults reproduce the stock behavior; a TOML file can override any
//! subset of fields.
//!
//! # Examples
//!
//! ```
//! use tabletalk_engine::config::SessionConfig;
//!
//! let config = SessionConfig::default();
//! assert_eq!(config.retry_budget, 10);
//! assert_eq!(config.memory_window, 5);
//! ```

use crate::snippet::IntentRule;
use sdk::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete configuration of one session
///
/// Deserializable from TOML; every field has a default so a partial file is
/// enough. The session never mutates its configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum attempts per external turn
    #[serde(default = "default_retry_budget")]
    pub retry_budget: usize,

    /// Number of most-recent turns recalled into the oracle request
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Name of the code-execution tool in the oracle's trace
    #[serde(default = "default_code_tool")]
    pub code_tool: String,

    /// Substrings (lowercase) marking a trace observation as failed
    #[serde(default = "default_error_indicators")]
    pub error_indicators: Vec<String>,

    /// Substrings in an answer that mean the oracle gave up
    #[serde(default = "default_give_up_indicators")]
    pub give_up_indicators: Vec<String>,

    /// Fixed polite fallback substituted for a given-up answer
    #[serde(default = "default_give_up_answer")]
    pub give_up_answer: String,

    /// Classification/augmentation rule for chart snippets
    #[serde(default = "default_chart_rule")]
    pub chart: IntentRule,

    /// Classification/augmentation rule for mutation snippets
    #[serde(default = "default_mutation_rule")]
    pub mutation: IntentRule,

    /// Fixed instruction sent as the question of the oracle cleaning turn
    #[serde(default = "default_clean_instruction")]
    pub clean_instruction: String,

    /// Template for the final cleaning summary; `{result}` is substituted
    #[serde(default = "default_clean_summary_template")]
    pub clean_summary_template: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            memory_window: default_memory_window(),
            code_tool: default_code_tool(),
            error_indicators: default_error_indicators(),
            give_up_indicators: default_give_up_indicators(),
            give_up_answer: default_give_up_answer(),
            chart: default_chart_rule(),
            mutation: default_mutation_rule(),
            clean_instruction: default_clean_instruction(),
            clean_summary_template: default_clean_summary_template(),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        let config: Self =
            toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults for absent fields
    pub fn load_from(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate the configuration
    ///
    /// A zero retry budget would make every turn exhaust immediately, and a
    /// rule with no required substrings would classify every snippet into
    /// that intent; both are rejected as configuration errors.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.retry_budget == 0 {
            return Err(SessionError::Config(
                "retry_budget must be at least 1".to_string(),
            ));
        }
        if self.code_tool.is_empty() {
            return Err(SessionError::Config(
                "code_tool must not be empty".to_string(),
            ));
        }
        if self.give_up_answer.is_empty() {
            return Err(SessionError::Config(
                "give_up_answer must not be empty".to_string(),
            ));
        }
        for rule in [&self.chart, &self.mutation] {
            if rule.required_substrings.is_empty() {
                return Err(SessionError::Config(format!(
                    "{} rule needs at least one required substring",
                    rule.intent
                )));
            }
            if rule.trailer.is_empty() {
                return Err(SessionError::Config(format!(
                    "{} rule needs a side-channel trailer",
                    rule.intent
                )));
            }
        }
        Ok(())
    }
}

fn default_retry_budget() -> usize {
    10
}

fn default_memory_window() -> usize {
    5
}

fn default_code_tool() -> String {
    "python_repl_ast".to_string()
}

fn default_error_indicators() -> Vec<String> {
    vec![
        "error".to_string(),
        "invalid".to_string(),
        "incomplete".to_string(),
    ]
}

fn default_give_up_indicators() -> Vec<String> {
    // Raw code in the answer text means the oracle leaked its scratch work
    // instead of answering; treated the same as an explicit stop.
    vec![
        "Agent stopped".to_string(),
        "import pandas as pd".to_string(),
        "import matplotlib.pyplot as plt".to_string(),
        "import numpy as np".to_string(),
        "plt.tight_layout()".to_string(),
    ]
}

fn default_give_up_answer() -> String {
    "Sorry, but I'm unable to provide an answer due to the complexity of your question. \
     Could you please break it down into smaller parts and ask again? \
     I'll be happy to assist you further."
        .to_string()
}

fn default_chart_rule() -> IntentRule {
    IntentRule {
        intent: sdk::types::Intent::Chart,
        required_substrings: vec!["plt.tight_layout()".to_string()],
        required_imports: vec![
            "import matplotlib.pyplot as plt".to_string(),
            "import pandas as pd".to_string(),
            "import numpy as np".to_string(),
            "fig, ax = plt.subplots(figsize=(8, 8))".to_string(),
        ],
        pre_trailers: vec!["\nax.wrap_xticklabels(10)\nax.wrap_yticklabels(10)\n".to_string()],
        trailer: "\nfigures.append(fig)\n".to_string(),
    }
}

fn default_mutation_rule() -> IntentRule {
    IntentRule {
        intent: sdk::types::Intent::Mutation,
        required_substrings: vec!["df_update".to_string()],
        required_imports: vec![
            "import pandas as pd".to_string(),
            "import numpy as np".to_string(),
            "import copy".to_string(),
        ],
        pre_trailers: Vec::new(),
        trailer: "\nstaged_frames.append(df_update)\n".to_string(),
    }
}

fn default_clean_instruction() -> String {
    "Clean the data based on the following rules:\n\
     1. For categorical columns, merge similar and redundant categories, treating lowercase \
     and uppercase as equivalent and keeping the original case where possible.\n\
     2. For numeric columns, detect unreasonable values using logical checks and replace \
     them with the column mean.\n\
     3. Stage every change on 'df_update' without asking for confirmation.\n\
     4. Provide a summary of changes."
        .to_string()
}

fn default_clean_summary_template() -> String {
    "Summarize the data cleaning result in around 130 words for a non-technical audience. \
     Use a friendly tone, bold text and bullet points where they help, and no titles. \
     Here is the result:\n{result}"
        .to_string()
}

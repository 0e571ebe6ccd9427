//! Session Core
//!
//! This module implements the turn controller that orchestrates one user
//! question to an answer. Each turn runs through a bounded retry loop:
//!
//! 1. Build the request (history-augmented when memory is non-empty)
//! 2. Invoke the oracle with the attempt index as a fresh seed
//! 3. Extract code candidates from the last trace entry
//! 4. Chart phase: gate, augment, execute, collect figures
//! 5. Mutation phase: gate, augment, execute, adopt the last staged frame
//! 6. Record the turn into memory (same id on every attempt)
//! 7. Accept, or retry on a give-up answer
//!
//! Every failure inside an attempt is contained: it is logged, consumes the
//! attempt, and the loop carries on. An exhausted budget degrades to the
//! last computed state instead of erroring, so callers always receive a
//! structurally complete result.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::dataset::{clean, Dataset};
use crate::executor::{self, Figure, SideChannel};
use crate::memory::ConversationMemory;
use crate::oracle::{self, Oracle};
use crate::snippet::classify_and_augment;
use sdk::errors::SessionError;
use sdk::types::{
    CodeSnippet, ConversationTurn, DatasetContext, OracleRequest, OracleResponse, TurnField,
};

/// Everything one turn produced
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// Final answer text (the fixed fallback if the oracle gave up or the
    /// budget was exhausted without a usable attempt)
    pub answer: String,

    /// True if at least one figure was exported
    pub has_plots: bool,

    /// True if the last staged frame differed from the active dataset
    pub has_changes: bool,

    /// Figures exported during the accepted (or last) attempt
    pub figures: Vec<Figure>,

    /// The active dataset after the turn
    pub dataset: Dataset,

    /// Raw oracle response of the accepted (or last) attempt
    pub response: Option<OracleResponse>,

    /// Code candidates extracted from the trace
    pub extracted: Vec<CodeSnippet>,

    /// Fully augmented chart snippets that were executed
    pub chart_executable: Vec<CodeSnippet>,

    /// Fully augmented mutation snippets that were executed
    pub mutation_executable: Vec<CodeSnippet>,

    /// Attempts consumed, including the accepted one
    pub attempts: usize,
}

impl TurnResult {
    /// The degraded result returned when no attempt produced any state
    fn degraded(config: &SessionConfig, dataset: Dataset, attempts: usize) -> Self {
        Self {
            answer: config.give_up_answer.clone(),
            has_plots: false,
            has_changes: false,
            figures: Vec::new(),
            dataset,
            response: None,
            extracted: Vec::new(),
            chart_executable: Vec::new(),
            mutation_executable: Vec::new(),
            attempts,
        }
    }
}

/// State computed by one attempt, plus the retry decision
struct Attempt {
    answer: String,
    has_plots: bool,
    has_changes: bool,
    figures: Vec<Figure>,
    response: OracleResponse,
    extracted: Vec<CodeSnippet>,
    chart_executable: Vec<CodeSnippet>,
    mutation_executable: Vec<CodeSnippet>,
    retry: bool,
}

impl Attempt {
    fn into_result(self, dataset: Dataset, attempts: usize) -> TurnResult {
        TurnResult {
            answer: self.answer,
            has_plots: self.has_plots,
            has_changes: self.has_changes,
            figures: self.figures,
            dataset,
            response: Some(self.response),
            extracted: self.extracted,
            chart_executable: self.chart_executable,
            mutation_executable: self.mutation_executable,
            attempts,
        }
    }
}

/// One conversation session over one dataset
///
/// Owns the active dataset and the memory exclusively; all mutating
/// operations take `&mut self`, so a session is single-writer by
/// construction. Concurrent sessions must each own their own instance.
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    oracle: Arc<dyn Oracle>,
    dataset: Dataset,
    context: DatasetContext,
    memory: ConversationMemory,
    channel: SideChannel,
    next_turn_id: u64,
}

impl Session {
    /// Create a session over a dataset
    pub fn new(
        oracle: Arc<dyn Oracle>,
        dataset: Dataset,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let context = dataset.profile();
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            oracle,
            dataset,
            context,
            memory: ConversationMemory::new(),
            channel: SideChannel::new(),
            next_turn_id: 1,
        })
    }

    /// The active dataset
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// The session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Drive one question to an accepted or exhausted answer
    pub async fn run_turn(&mut self, question: &str) -> TurnResult {
        let turn_id = self.next_turn_id;
        info!(session = %self.id, turn_id, "starting turn");

        let mut accepted = false;
        let mut attempts = 0;
        let mut last: Option<Attempt> = None;

        for attempt in 0..self.config.retry_budget {
            attempts = attempt + 1;
            match self.run_attempt(question, attempt as u64).await {
                Ok(state) => {
                    let retry = state.retry;
                    last = Some(state);
                    if retry {
                        debug!(
                            session = %self.id,
                            turn_id,
                            attempt,
                            "oracle gave up, retrying with a fresh seed"
                        );
                    } else {
                        accepted = true;
                        break;
                    }
                }
                Err(error) => {
                    warn!(session = %self.id, turn_id, attempt, %error, "attempt failed");
                }
            }
        }

        // One logical turn record per external question: the id advances
        // exactly once, however many attempts overwrote it.
        self.next_turn_id += 1;

        if accepted {
            info!(session = %self.id, turn_id, attempts, "turn accepted");
        } else {
            warn!(session = %self.id, turn_id, attempts, "retry budget exhausted");
        }

        match last {
            Some(state) => state.into_result(self.dataset.clone(), attempts),
            None => TurnResult::degraded(&self.config, self.dataset.clone(), attempts),
        }
    }

    /// One pass through the turn pipeline
    async fn run_attempt(&mut self, question: &str, seed: u64) -> Result<Attempt> {
        self.channel.clear();
        self.context = self.dataset.profile();

        let input = self.build_input(question)?;
        let request = OracleRequest::new(input, seed, self.context.clone());
        let response = self
            .oracle
            .invoke(request)
            .await
            .context("oracle invocation failed")?;
        let answer = response.output.clone();

        let candidates = extract_code(&response, &self.config);

        // Chart phase
        let chart = classify_and_augment(&candidates, &self.config.chart);
        for snippet in &chart.executable {
            if let Err(error) = executor::execute(&snippet.text, &self.dataset, &mut self.channel)
            {
                warn!(session = %self.id, %error, "chart snippet failed");
            }
        }
        let has_plots = !self.channel.figures.is_empty();

        // Mutation phase
        let mutation = classify_and_augment(&candidates, &self.config.mutation);
        for snippet in &mutation.executable {
            if let Err(error) = executor::execute(&snippet.text, &self.dataset, &mut self.channel)
            {
                warn!(session = %self.id, %error, "mutation snippet failed");
            }
        }
        let mut has_changes = false;
        if let Some(staged) = self.channel.staged_frames.last() {
            has_changes = *staged != self.dataset;
            // Adopt a deep copy even when nothing changed, and rebind the
            // oracle context to the adopted frame.
            self.dataset = staged.clone();
            self.context = self.dataset.profile();
            debug!(session = %self.id, has_changes, "adopted staged frame");
        }

        // Record the attempt under the current turn id; the raw answer is
        // stored even when the give-up fallback replaces it below.
        let turn_id = self.next_turn_id;
        self.memory
            .remember(turn_id, TurnField::Human(question.to_string()));
        self.memory.remember(turn_id, TurnField::Ai(answer.clone()));
        self.memory
            .remember(turn_id, TurnField::ChartCode(chart.plain_texts()));

        let gave_up = self
            .config
            .give_up_indicators
            .iter()
            .any(|marker| answer.contains(marker.as_str()));
        let answer = if gave_up {
            self.config.give_up_answer.clone()
        } else {
            answer
        };

        Ok(Attempt {
            answer,
            has_plots,
            has_changes,
            figures: self.channel.figures.clone(),
            response,
            extracted: candidates
                .iter()
                .map(|text| CodeSnippet::unclassified(text.clone()))
                .collect(),
            chart_executable: chart.executable,
            mutation_executable: mutation.executable,
            retry: gave_up,
        })
    }

    /// The raw question, or the history-augmented request when memory holds
    /// previous turns
    fn build_input(&self, question: &str) -> Result<String> {
        if self.memory.is_empty() || self.config.memory_window == 0 {
            return Ok(question.to_string());
        }
        let window = self.memory.recall_last(self.config.memory_window);
        if window.is_empty() {
            return Ok(question.to_string());
        }
        let rendered = serde_json::to_string(&window).context("failed to render memory window")?;
        Ok(oracle::wrap_with_history(question, &rendered))
    }

    /// Run the deterministic cleaning pass and adopt its output
    pub fn clean_without_oracle(&mut self) -> (String, Dataset) {
        let (cleaned, summary) = clean::clean(&self.dataset);
        self.dataset = cleaned;
        self.context = self.dataset.profile();
        info!(session = %self.id, "deterministic clean applied");
        (summary.to_string(), self.dataset.clone())
    }

    /// Run one oracle turn with the fixed cleaning instruction
    pub async fn clean_with_oracle(&mut self) -> (String, bool, Dataset) {
        let instruction = self.config.clean_instruction.clone();
        let result = self.run_turn(&instruction).await;
        (result.answer, result.has_changes, result.dataset)
    }

    /// Deterministic pass, oracle pass, then a compressed summary
    ///
    /// The summary compression is a single non-tool completion; if it
    /// fails, the raw concatenated summary is returned instead.
    pub async fn clean_full(&mut self) -> (String, bool, Dataset) {
        let (summary, _) = self.clean_without_oracle();
        let (answer, has_changes, dataset) = self.clean_with_oracle().await;
        let combined = format!("{summary}{answer}");

        let prompt = self
            .config
            .clean_summary_template
            .replace("{result}", &combined);
        let final_summary = match self.oracle.complete(&prompt).await {
            Ok(text) => text,
            Err(error) => {
                warn!(session = %self.id, %error, "summary completion failed");
                combined
            }
        };
        (final_summary, has_changes, dataset)
    }

    /// All stored turns, rendered for display
    pub fn recall_all(&self) -> String {
        self.memory.recall_all()
    }

    /// The most recent `n` turns
    pub fn recall_last(&self, n: usize) -> BTreeMap<u64, ConversationTurn> {
        self.memory.recall_last(n)
    }

    /// Forget every stored turn
    ///
    /// Turn numbering is owned by the session and keeps increasing across a
    /// clear.
    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }
}

/// Harvest code candidates from the last trace entry
///
/// Candidates are taken only when the entry signals no error: no secondary
/// output, an empty one, or one free of every configured error indicator
/// (checked case-insensitively). A malformed or empty trace yields an empty
/// list, never an error.
fn extract_code(response: &OracleResponse, config: &SessionConfig) -> Vec<String> {
    let Some(last) = response.intermediate_steps.last() else {
        return Vec::new();
    };

    let clean = match &last.observation {
        None => true,
        Some(text) if text.is_empty() => true,
        Some(text) => {
            let lower = text.to_lowercase();
            !config
                .error_indicators
                .iter()
                .any(|marker| lower.contains(marker.to_lowercase().as_str()))
        }
    };
    if !clean {
        return Vec::new();
    }

    last.action
        .tool_calls
        .iter()
        .filter(|call| call.name == config.code_tool)
        .filter_map(|call| call.query().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{ToolCallRecord, ToolInvocation, TraceStep};
    use serde_json::json;

    fn response_with_last_step(observation: Option<&str>, calls: Vec<ToolInvocation>) -> OracleResponse {
        OracleResponse::new(
            "done",
            vec![
                // An earlier step that must be ignored.
                TraceStep::new(
                    ToolCallRecord::new(vec![ToolInvocation::new(
                        "python_repl_ast",
                        json!({"query": "ignored_early_step"}),
                    )]),
                    None,
                ),
                TraceStep::new(ToolCallRecord::new(calls), observation.map(String::from)),
            ],
        )
    }

    fn code_call(code: &str) -> ToolInvocation {
        ToolInvocation::new("python_repl_ast", json!({"query": code}))
    }

    #[test]
    fn test_extract_only_last_step() {
        let config = SessionConfig::default();
        let response = response_with_last_step(None, vec![code_call("late")]);
        assert_eq!(extract_code(&response, &config), vec!["late"]);
    }

    #[test]
    fn test_extract_skips_error_observations() {
        let config = SessionConfig::default();
        let response = response_with_last_step(Some("NameError: Invalid thing"), vec![code_call("x")]);
        assert!(extract_code(&response, &config).is_empty());

        // Case-insensitive match on the configured indicators.
        let response = response_with_last_step(Some("ERROR at line 3"), vec![code_call("x")]);
        assert!(extract_code(&response, &config).is_empty());
    }

    #[test]
    fn test_extract_accepts_benign_observations() {
        let config = SessionConfig::default();
        let response = response_with_last_step(Some("42 rows"), vec![code_call("x")]);
        assert_eq!(extract_code(&response, &config), vec!["x"]);

        let response = response_with_last_step(Some(""), vec![code_call("x")]);
        assert_eq!(extract_code(&response, &config), vec!["x"]);
    }

    #[test]
    fn test_extract_filters_by_tool_name() {
        let config = SessionConfig::default();
        let response = response_with_last_step(
            None,
            vec![
                code_call("keep"),
                ToolInvocation::new("web_search", json!({"query": "drop"})),
                ToolInvocation::new("python_repl_ast", json!({"input": "no query arg"})),
            ],
        );
        assert_eq!(extract_code(&response, &config), vec!["keep"]);
    }

    #[test]
    fn test_extract_empty_trace() {
        let config = SessionConfig::default();
        let response = OracleResponse::answer_only("no tools used");
        assert!(extract_code(&response, &config).is_empty());
    }
}

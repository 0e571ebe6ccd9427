//! Oracle wire contract and conversation types
//!
//! The oracle (the code-generating language model service) is consumed as a
//! black box. This module defines the request/response shapes exchanged with
//! it, the intents a generated snippet can carry, and the conversation turn
//! records the engine stores in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Purpose of a generated code snippet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Produces a chart into the figure side channel
    Chart,

    /// Stages a replacement dataset into the side channel
    Mutation,

    /// Extracted but not (yet) matched to a supported intent
    Unclassified,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Chart => write!(f, "chart"),
            Intent::Mutation => write!(f, "mutation"),
            Intent::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// A piece of generated code plus its classification tag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSnippet {
    /// The code text
    pub text: String,

    /// The intent this snippet was classified into
    pub intent: Intent,
}

impl CodeSnippet {
    /// Create a snippet with a known intent
    pub fn new(text: impl Into<String>, intent: Intent) -> Self {
        Self {
            text: text.into(),
            intent,
        }
    }

    /// Create a freshly extracted, not-yet-classified snippet
    pub fn unclassified(text: impl Into<String>) -> Self {
        Self::new(text, Intent::Unclassified)
    }
}

/// One tool invocation recorded in the oracle's trace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    /// Name of the invoked tool
    pub name: String,

    /// Arguments the oracle passed to the tool
    pub args: serde_json::Value,
}

impl ToolInvocation {
    /// Create a new tool invocation
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The `query` argument, if present and a string
    ///
    /// Code-execution tools carry the generated snippet here.
    pub fn query(&self) -> Option<&str> {
        self.args.get("query").and_then(|v| v.as_str())
    }
}

/// The action half of a trace step: the tool invocations the oracle made
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    /// Ordered tool invocations within this step
    pub tool_calls: Vec<ToolInvocation>,
}

impl ToolCallRecord {
    /// Create a record from a list of invocations
    pub fn new(tool_calls: Vec<ToolInvocation>) -> Self {
        Self { tool_calls }
    }
}

/// One intermediate step of an oracle invocation
///
/// `observation` is the secondary output the tool produced (stdout, an error
/// message). `None` and the empty string both mean "nothing to report".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceStep {
    /// The tool invocations made in this step
    pub action: ToolCallRecord,

    /// Secondary output of the step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

impl TraceStep {
    /// Create a trace step
    pub fn new(action: ToolCallRecord, observation: Option<String>) -> Self {
        Self {
            action,
            observation,
        }
    }
}

/// Schema snapshot of the active dataset, bound into every oracle request
///
/// Rebuilt whenever the active dataset is replaced so the oracle always
/// generates against the current shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatasetContext {
    /// Number of rows in the active dataset
    pub rows: usize,

    /// Column profiles in dataset order
    pub columns: Vec<ColumnProfile>,
}

/// Name and kind of one dataset column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnProfile {
    /// Column name
    pub name: String,

    /// Column kind
    pub kind: ColumnKind,
}

/// The cell type of a dataset column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Floating-point values; NaN marks a missing cell
    Numeric,

    /// Free-text categories; `None` marks a missing cell
    Categorical,

    /// Epoch-seconds timestamps; `None` marks a missing cell
    Datetime,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
            ColumnKind::Datetime => write!(f, "datetime"),
        }
    }
}

/// Request sent to the oracle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleRequest {
    /// The question, raw or history-augmented
    pub input: String,

    /// Generation seed; the retry loop passes the attempt index so every
    /// retry gets a fresh generation
    pub seed: u64,

    /// Schema snapshot of the active dataset
    pub context: DatasetContext,
}

impl OracleRequest {
    /// Create a new oracle request
    pub fn new(input: impl Into<String>, seed: u64, context: DatasetContext) -> Self {
        Self {
            input: input.into(),
            seed,
            context,
        }
    }
}

/// Response received from the oracle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleResponse {
    /// Final answer text
    pub output: String,

    /// Ordered trace of intermediate tool invocations
    #[serde(default)]
    pub intermediate_steps: Vec<TraceStep>,
}

impl OracleResponse {
    /// Create a response with a trace
    pub fn new(output: impl Into<String>, intermediate_steps: Vec<TraceStep>) -> Self {
        Self {
            output: output.into(),
            intermediate_steps,
        }
    }

    /// Create a response with no intermediate steps
    pub fn answer_only(output: impl Into<String>) -> Self {
        Self::new(output, Vec::new())
    }
}

/// One stored conversation turn
///
/// Immutable once the external turn is accepted; while a turn is being
/// retried, each attempt overwrites the fields of the same record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    /// What the user asked
    pub human: String,

    /// What the oracle answered
    pub ai: String,

    /// Chart code kept for display (no side-channel plumbing)
    pub chart_code: Vec<String>,

    /// When the record was created
    pub recorded_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// A fresh record with empty fields
    pub fn empty() -> Self {
        Self {
            human: String::new(),
            ai: String::new(),
            chart_code: Vec::new(),
            recorded_at: Utc::now(),
        }
    }
}

impl Default for ConversationTurn {
    fn default() -> Self {
        Self::empty()
    }
}

/// A writable field of a conversation turn
///
/// `remember` takes one of these; last write wins per (turn id, field).
#[derive(Debug, Clone, PartialEq)]
pub enum TurnField {
    /// The user's question
    Human(String),

    /// The oracle's answer
    Ai(String),

    /// Chart code generated during the turn, trailer-free
    ChartCode(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snippet_creation() {
        let s = CodeSnippet::unclassified("x = 1");
        assert_eq!(s.text, "x = 1");
        assert_eq!(s.intent, Intent::Unclassified);

        let s = CodeSnippet::new("plt.tight_layout()", Intent::Chart);
        assert_eq!(s.intent, Intent::Chart);
    }

    #[test]
    fn test_invocation_query_accessor() {
        let call = ToolInvocation::new("python_repl_ast", json!({"query": "df.head()"}));
        assert_eq!(call.query(), Some("df.head()"));

        let call = ToolInvocation::new("python_repl_ast", json!({"other": 1}));
        assert_eq!(call.query(), None);

        let call = ToolInvocation::new("python_repl_ast", json!({"query": 42}));
        assert_eq!(call.query(), None);
    }

    #[test]
    fn test_response_serialization() {
        let response = OracleResponse::new(
            "done",
            vec![TraceStep::new(
                ToolCallRecord::new(vec![ToolInvocation::new("t", json!({"query": "c"}))]),
                Some("ok".to_string()),
            )],
        );
        let json = serde_json::to_string(&response).unwrap();
        let back: OracleResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn test_response_without_trace_deserializes() {
        let back: OracleResponse = serde_json::from_str(r#"{"output": "hi"}"#).unwrap();
        assert_eq!(back.output, "hi");
        assert!(back.intermediate_steps.is_empty());
    }

    #[test]
    fn test_turn_defaults() {
        let turn = ConversationTurn::empty();
        assert!(turn.human.is_empty());
        assert!(turn.ai.is_empty());
        assert!(turn.chart_code.is_empty());
    }

    #[test]
    fn test_intent_display() {
        assert_eq!(Intent::Chart.to_string(), "chart");
        assert_eq!(Intent::Mutation.to_string(), "mutation");
        assert_eq!(ColumnKind::Numeric.to_string(), "numeric");
    }
}

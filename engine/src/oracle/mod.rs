//! Oracle collaborator abstraction
//!
//! The code-generating language-model service is consumed behind the
//! [`Oracle`] trait: a structured `invoke` for agent turns (answer text plus
//! an intermediate-step trace) and a plain `complete` for single non-tool
//! completions. Providers own their transport; the engine never sees HTTP,
//! prompts, or retries below this seam — the turn controller's retry loop is
//! the only retry mechanism.

use async_trait::async_trait;
use sdk::types::{OracleRequest, OracleResponse};

/// Result type for oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;

/// Errors a provider can surface
///
/// All of them are contained by the turn controller: each consumes one
/// retry attempt and is never propagated past the session boundary.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// The code-generating oracle
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns the name of the provider (for logs)
    fn name(&self) -> &str;

    /// Run one agent invocation
    ///
    /// # Arguments
    /// * `request` - question (raw or history-augmented), generation seed,
    ///   and the schema snapshot of the active dataset
    ///
    /// # Returns
    /// * `Ok(OracleResponse)` - answer text and the ordered tool trace
    /// * `Err(OracleError)` - if the provider fails; consumes one attempt
    async fn invoke(&self, request: OracleRequest) -> Result<OracleResponse>;

    /// Run one plain completion with no tool access
    ///
    /// Used for the cleaning-summary compression step.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Wrap a question together with a rendered memory window
///
/// The format is part of the oracle contract and fixed; the window text is
/// the serialized most-recent-turns map, earliest first.
pub fn wrap_with_history(question: &str, window: &str) -> String {
    format!(
        "My question is: {question}. Below is the our previous conversation and codes \
         in chronological order, from the earliest to the latest.: {window}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_with_history_format() {
        let wrapped = wrap_with_history("how many rows?", "{\"1\":{}}");
        assert!(wrapped.starts_with("My question is: how many rows?."));
        assert!(wrapped.contains("chronological order"));
        assert!(wrapped.ends_with("{\"1\":{}}."));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(OracleError::Timeout.to_string(), "Timeout");
        assert_eq!(
            OracleError::NetworkError("reset".to_string()).to_string(),
            "Network error: reset"
        );
    }
}

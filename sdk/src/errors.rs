//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the Tabletalk
//! engine. All errors implement the `SessionErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! The taxonomy deliberately distinguishes failures that consume a retry
//! attempt (oracle, extraction) from failures that are contained per snippet
//! (execution) and from failures that can only happen at construction time
//! (configuration). A turn never surfaces any of these to the caller; the
//! session absorbs them and returns a structurally complete result.

use thiserror::Error;

/// Trait for session error extensions
///
/// Provides additional context for errors: a hint safe to show to end
/// users, and whether the error is worth retrying within a turn.
pub trait SessionErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains generated code, dataset contents, or
    /// provider internals.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors consume one retry attempt and the turn carries
    /// on. Non-recoverable errors indicate a misconfigured session.
    fn is_recoverable(&self) -> bool;
}

/// Main session error type
///
/// Every failure mode below the session boundary maps onto one of these
/// variants. Give-up answers and retry exhaustion are NOT errors: both are
/// recognized outcomes of a turn and are represented in the turn result,
/// not here.
#[derive(Debug, Error)]
pub enum SessionError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Oracle collaborator errors
    #[error("Oracle failure: {0}")]
    Oracle(String),

    // Trace extraction errors
    #[error("Trace extraction failed: {0}")]
    Extraction(String),

    // Snippet execution errors
    #[error("Snippet execution failed: {0}")]
    Execution(String),

    // Dataset shape errors
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Column {column} is not {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    #[error("Row {row} out of bounds (dataset has {rows} rows)")]
    RowOutOfBounds { row: usize, rows: usize },

    #[error("Column {column} has {len} rows, dataset has {rows}")]
    ColumnLength {
        column: String,
        len: usize,
        rows: usize,
    },

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    // Generic IO error (config file loading)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionErrorExt for SessionError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check the session configuration for errors",
            Self::Oracle(_) => "The code generator is unavailable. The turn will be retried",
            Self::Extraction(_) => "The generated response was malformed and was skipped",
            Self::Execution(_) => "A generated snippet failed to run and was skipped",
            Self::UnknownColumn(_) => "The referenced column does not exist in the dataset",
            Self::ColumnType { .. } => "The operation does not apply to this column type",
            Self::RowOutOfBounds { .. } => "The referenced row does not exist in the dataset",
            Self::ColumnLength { .. } => "Columns in a dataset must have equal length",
            Self::DuplicateColumn(_) => "Column names in a dataset must be unique",
            Self::Io(_) => "Failed to read the configuration file",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // A broken configuration or unreadable config file cannot be
            // retried away.
            Self::Config(_) | Self::Io(_) => false,

            // Everything else is absorbed by the retry loop or the
            // per-snippet containment.
            _ => true,
        }
    }
}

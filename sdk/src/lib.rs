//! Tabletalk SDK
//!
//! Shared contract surface for Tabletalk components: the error taxonomy and
//! the wire types exchanged with the oracle collaborator. This crate is used
//! by the engine and by oracle provider implementations.

/// Error types and handling
pub mod errors;

/// Oracle wire contract and conversation types
pub mod types;

// Re-export commonly used types
pub use errors::{SessionError, SessionErrorExt};
pub use types::{
    CodeSnippet, ColumnKind, ColumnProfile, ConversationTurn, DatasetContext, Intent,
    OracleRequest, OracleResponse, ToolCallRecord, ToolInvocation, TraceStep, TurnField,
};

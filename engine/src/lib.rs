//! Tabletalk Engine Library
//!
//! This library implements the agent-turn orchestration pipeline that lets a
//! user converse with a tabular dataset in natural language: a question is
//! turned into generated code by an oracle collaborator, the code is
//! classified by intent and augmented with required boilerplate, executed in
//! a restricted interpreter, and the results are folded into a bounded
//! conversation memory for future turns.

/// Session configuration module
pub mod config;

/// Column-oriented dataset and the deterministic cleaning pass
pub mod dataset;

/// Conversation memory with sliding-window recall
pub mod memory;

/// Oracle collaborator abstraction layer
pub mod oracle;

/// Snippet classification and augmentation
pub mod snippet;

/// Restricted snippet executor and side channel
pub mod executor;

/// Turn controller and session-level operations
pub mod agent;

/// Telemetry and Observability
pub mod telemetry;

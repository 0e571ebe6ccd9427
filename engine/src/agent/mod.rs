//! Turn controller and session-level operations
//!
//! The agent module owns one conversation session: the active dataset, the
//! conversation memory, and the bounded-retry loop that drives a question
//! through the oracle, the snippet gate, and the executor to an answer.

pub mod core;

pub use self::core::{Session, TurnResult};

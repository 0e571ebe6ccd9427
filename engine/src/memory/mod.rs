//! Conversation memory
//!
//! Keyed, ordered store of conversation turns with a sliding-window recall.
//! Keys are turn ids assigned by the turn controller; the store itself never
//! numbers anything, so `clear` makes no promise about post-clear numbering.
//! Purely in-memory; every operation is total.

use sdk::types::{ConversationTurn, TurnField};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Keyed conversation ledger with bounded recall
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    store: BTreeMap<u64, ConversationTurn>,
}

impl ConversationMemory {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no turns are stored
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of stored turns
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Set one field of a turn record, creating the record if absent
    ///
    /// Last write wins per (id, field); repeated writes are not an error —
    /// the retry loop relies on this to overwrite the same turn record on
    /// every attempt.
    pub fn remember(&mut self, turn_id: u64, field: TurnField) {
        let turn = self.store.entry(turn_id).or_default();
        let role = match field {
            TurnField::Human(value) => {
                turn.human = value;
                "human"
            }
            TurnField::Ai(value) => {
                turn.ai = value;
                "ai"
            }
            TurnField::ChartCode(value) => {
                turn.chart_code = value;
                "chart_code"
            }
        };
        info!(turn_id, role, "stored turn field");
    }

    /// Look up one turn record
    pub fn recall(&self, turn_id: u64) -> Option<&ConversationTurn> {
        self.store.get(&turn_id)
    }

    /// The most recent `n` turns in ascending id order
    ///
    /// Returns the whole store when it holds at most `n` turns, and an
    /// empty map for an empty store or `n == 0`.
    pub fn recall_last(&self, n: usize) -> BTreeMap<u64, ConversationTurn> {
        if n == 0 || self.store.is_empty() {
            return BTreeMap::new();
        }
        // Non-empty store: both bounds exist.
        let (Some(min_id), Some(max_id)) = (
            self.store.keys().next().copied(),
            self.store.keys().next_back().copied(),
        ) else {
            return BTreeMap::new();
        };
        let start = if n >= self.store.len() {
            min_id
        } else {
            max_id - n as u64 + 1
        };
        self.store
            .range(start..=max_id)
            .map(|(id, turn)| (*id, turn.clone()))
            .collect()
    }

    /// All turns in id order, rendered for display
    ///
    /// The result is an opaque serialized string; callers must not parse it.
    pub fn recall_all(&self) -> String {
        serde_json::to_string(&self.store).unwrap_or_default()
    }

    /// Remove one turn if present
    ///
    /// Forgetting an absent turn is a warned no-op, not an error.
    pub fn forget(&mut self, turn_id: u64) {
        if self.store.remove(&turn_id).is_some() {
            info!(turn_id, "forgot turn");
        } else {
            warn!(turn_id, "turn not found in memory");
        }
    }

    /// Remove every stored turn
    pub fn clear(&mut self) {
        self.store.clear();
        info!("cleared all memory");
    }
}

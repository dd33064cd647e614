//! Bounded per-conversation turn history.
//!
//! Contexts are created lazily on first append and never destroyed. Appends
//! take a short synchronous lock with no await inside, so a turn is always
//! stored whole.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::types::ConversationTurn;

/// Default bound on stored turns per conversation.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// In-memory conversation store, keyed by conversation id.
#[derive(Debug)]
pub struct ConversationStore {
    max_turns: usize,
    contexts: Mutex<HashMap<String, VecDeque<ConversationTurn>>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<ConversationTurn>>> {
        // A panic mid-append cannot leave a partial turn behind.
        self.contexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a turn, evicting the oldest when over the bound.
    pub fn append(&self, conversation_id: &str, turn: ConversationTurn) {
        let mut contexts = self.lock();
        let turns = contexts.entry(conversation_id.to_string()).or_default();
        turns.push_back(turn);
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
    }

    /// The last `n` turns, oldest first. Empty for unknown ids.
    pub fn recent(&self, conversation_id: &str, n: usize) -> Vec<ConversationTurn> {
        let contexts = self.lock();
        contexts
            .get(conversation_id)
            .map(|turns| {
                let skip = turns.len().saturating_sub(n);
                turns.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Full stored history, or `None` if the conversation was never seen.
    pub fn history(&self, conversation_id: &str) -> Option<Vec<ConversationTurn>> {
        self.lock()
            .get(conversation_id)
            .map(|turns| turns.iter().cloned().collect())
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.lock().get(conversation_id).map_or(0, VecDeque::len)
    }
}

//! Bounded conversation history
//!
//! Keeps the most recent turns for prompt construction. When the cap is
//! exceeded the earliest non-system turn is evicted; a system turn is never
//! evicted and always sits at the front.

use std::collections::VecDeque;

use tracing::debug;

use crate::messages::{ChatTurn, Role};

/// Default number of retained turns
pub const DEFAULT_MAX_TURNS: usize = 10;

/// Insertion-ordered, capacity-bounded list of turns
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ChatTurn>,
    max_turns: usize,
}

impl ConversationHistory {
    /// Create an empty history retaining at most `max_turns` turns
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns + 1),
            max_turns,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn, evicting the earliest non-system turn when over capacity
    ///
    /// A system turn replaces any existing system turn and is placed first.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        let turn = ChatTurn::new(role, content);

        if turn.is_system() {
            self.turns.retain(|t| !t.is_system());
            self.turns.push_front(turn);
        } else {
            self.turns.push_back(turn);
        }

        while self.turns.len() > self.max_turns {
            let Some(index) = self.turns.iter().position(|t| !t.is_system()) else {
                break;
            };
            if let Some(evicted) = self.turns.remove(index) {
                debug!(role = %evicted.role(), "evicted oldest turn from history");
            }
        }
    }

    /// Turns in conversation order
    pub fn snapshot(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Remove every turn, including a system turn
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn contents(history: &ConversationHistory) -> Vec<String> {
        history
            .snapshot()
            .iter()
            .map(|t| t.content().to_string())
            .collect()
    }

    #[test]
    fn test_fifo_eviction_without_system_turn() {
        let mut history = ConversationHistory::default();
        for i in 1..=15 {
            let role = if i % 2 == 1 { Role::User } else { Role::Assistant };
            history.append(role, format!("turn {i}"));
        }

        assert_eq!(history.len(), 10);
        let kept = contents(&history);
        assert_eq!(kept.first().map(String::as_str), Some("turn 6"));
        assert_eq!(kept.last().map(String::as_str), Some("turn 15"));
    }

    #[test]
    fn test_system_turn_is_never_evicted() {
        let mut history = ConversationHistory::default();
        history.append(Role::System, "persona");
        for i in 1..=15 {
            history.append(Role::User, format!("turn {i}"));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot[0], ChatTurn::system("persona"));
        // System turn plus the nine most recent user turns
        assert_eq!(snapshot[1].content(), "turn 7");
        assert_eq!(snapshot[9].content(), "turn 15");
    }

    #[test]
    fn test_late_system_turn_moves_to_front() {
        let mut history = ConversationHistory::new(3);
        history.append(Role::User, "a");
        history.append(Role::System, "old persona");
        history.append(Role::System, "new persona");
        history.append(Role::User, "b");
        history.append(Role::User, "c");

        assert_eq!(contents(&history), vec!["new persona", "b", "c"]);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut history = ConversationHistory::new(4);
        history.append(Role::System, "persona");
        history.append(Role::User, "hi");
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_only_system() {
        let mut history = ConversationHistory::new(0);
        history.append(Role::User, "dropped");
        assert!(history.is_empty());
        history.append(Role::System, "persona");
        assert_eq!(history.len(), 1);
    }
}

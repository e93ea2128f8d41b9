use std::collections::VecDeque;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// One accepted exchange: the state turn the agent saw and the reply that was
/// acted on. Retry scaffolding is never stored.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub user: String,
    pub assistant: String,
}

/// Per-agent conversational memory, owned by the orchestrator between ticks
/// and moved into the decision task for the duration of one round.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AgentMemory {
    #[serde(default)]
    pub history: VecDeque<HistoryEntry>,
    pub history_limit: usize,
    /// What happened to the agent since its last decision, consumed by the
    /// next request.
    #[serde(default)]
    pub last_outcome: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Default for AgentMemory {
    fn default() -> Self {
        Self::with_limit(5)
    }
}

impl AgentMemory {
    pub fn with_limit(history_limit: usize) -> Self {
        Self {
            history: VecDeque::new(),
            history_limit,
            last_outcome: None,
            last_error: None,
        }
    }

    pub fn record(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.history.push_back(HistoryEntry {
            user: user.into(),
            assistant: assistant.into(),
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Forget every past exchange; the next request starts a fresh conversation.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_error = None;
    }

    pub fn set_outcome(&mut self, summary: impl Into<String>) {
        self.last_outcome = Some(summary.into());
    }

    pub fn take_outcome(&mut self) -> Option<String> {
        self.last_outcome.take()
    }
}

/// Prior-cycle summary shown ahead of the next state turn.
pub fn summarize_outcome(energy_before: f64, energy_after: f64, notes: &[String]) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "Last cycle: your energy went from {energy_before:.1} to {energy_after:.1}."
    );
    if notes.is_empty() {
        out.push_str("\nNothing else happened to you.");
    }
    for note in notes {
        let _ = write!(out, "\n- {note}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_only_the_newest_pairs() {
        let mut mem = AgentMemory::with_limit(2);
        mem.record("u1", "a1");
        mem.record("u2", "a2");
        mem.record("u3", "a3");

        let users: Vec<_> = mem.history.iter().map(|h| h.user.as_str()).collect();
        assert_eq!(users, ["u2", "u3"]);
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let mut mem = AgentMemory::with_limit(0);
        mem.record("u", "a");
        assert!(mem.history.is_empty());
    }

    #[test]
    fn reset_clears_history_but_not_pending_outcome() {
        let mut mem = AgentMemory::default();
        mem.record("u", "a");
        mem.last_error = Some("boom".to_string());
        mem.set_outcome("you moved");

        mem.reset();

        assert!(mem.history.is_empty());
        assert!(mem.last_error.is_none());
        assert_eq!(mem.take_outcome().as_deref(), Some("you moved"));
        assert!(mem.take_outcome().is_none());
    }

    #[test]
    fn summary_lists_each_note() {
        let text = summarize_outcome(
            50.0,
            47.9,
            &["You moved up.".to_string(), "Poison drained 1.0 energy from you.".to_string()],
        );
        assert!(text.starts_with("Last cycle: your energy went from 50.0 to 47.9."));
        assert!(text.contains("\n- You moved up."));
        assert!(text.contains("\n- Poison drained"));

        let quiet = summarize_outcome(10.0, 10.0, &[]);
        assert!(quiet.ends_with("Nothing else happened to you."));
    }
}

//! In-memory per-conversation history.
//!
//! Sessions are keyed by an opaque UUID, created on the first query that
//! arrives without one, and garbage-collected only by process restart.
//! Each session keeps the most recent `max_history` user/assistant pairs;
//! older pairs are dropped first (FIFO, no recency re-ordering).

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// One conversational turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: String,
    pub text: String,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Vec<Turn>>>,
    max_history: usize,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_history,
        }
    }

    /// Mint a new session id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .insert(id.clone(), Vec::new());
        id
    }

    /// Formatted transcript for prompt inclusion, or `None` for an unknown
    /// or empty session.
    pub fn history(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().expect("session store lock poisoned");
        let turns = sessions.get(session_id)?;
        if turns.is_empty() {
            return None;
        }
        Some(
            turns
                .iter()
                .map(|t| format!("{}: {}", t.role, t.text))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    /// Append one user/assistant exchange, creating the session if absent,
    /// then truncate to the most recent `max_history` pairs.
    pub fn add_exchange(&self, session_id: &str, user_text: &str, assistant_text: &str) {
        let mut sessions = self.sessions.lock().expect("session store lock poisoned");
        let turns = sessions.entry(session_id.to_string()).or_default();

        turns.push(Turn {
            role: "User".to_string(),
            text: user_text.to_string(),
        });
        turns.push(Turn {
            role: "Assistant".to_string(),
            text: assistant_text.to_string(),
        });

        let cap = self.max_history * 2;
        if turns.len() > cap {
            let drop = turns.len() - cap;
            turns.drain(..drop);
        }
    }

    /// Number of stored turns (tests and diagnostics).
    pub fn turn_count(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .get(session_id)
            .map(|t| t.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_session_has_no_history() {
        let store = SessionStore::new(2);
        assert!(store.history("nope").is_none());
    }

    #[test]
    fn test_exchange_roundtrip() {
        let store = SessionStore::new(2);
        let id = store.create();
        assert!(store.history(&id).is_none());

        store.add_exchange(&id, "What is lesson 0?", "It covers the basics.");
        let history = store.history(&id).unwrap();
        assert_eq!(
            history,
            "User: What is lesson 0?\nAssistant: It covers the basics."
        );
    }

    #[test]
    fn test_implicit_session_creation() {
        let store = SessionStore::new(2);
        store.add_exchange("ad-hoc", "q", "a");
        assert!(store.history("ad-hoc").is_some());
    }

    #[test]
    fn test_fifo_truncation_keeps_most_recent_pairs() {
        let store = SessionStore::new(2);
        let id = store.create();
        for i in 0..3 {
            store.add_exchange(&id, &format!("q{}", i), &format!("a{}", i));
        }

        assert_eq!(store.turn_count(&id), 4);
        let history = store.history(&id).unwrap();
        assert!(!history.contains("q0"), "oldest pair must be dropped");
        assert!(history.contains("q1"));
        assert!(history.contains("q2"));
        // Pair ordering is preserved.
        assert!(history.find("q1").unwrap() < history.find("a1").unwrap());
        assert!(history.find("a1").unwrap() < history.find("q2").unwrap());
    }
}

use crewline_core::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A conversation: its turns and the task graphs executed on its behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session id.
    pub id: Uuid,
    /// Conversation turns, oldest first.
    pub messages: Vec<Message>,
    /// Ids of task graphs executed within this session, in execution order.
    #[serde(default)]
    pub graphs: Vec<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last change.
    pub updated_at: DateTime<Utc>,
    /// Free-form caller data.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Empty session under a fresh id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Create an empty session under an id chosen by the caller's chat layer.
    pub fn with_id(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            graphs: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Append a turn.
    pub fn add_message(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Record a graph executed for this session.
    pub fn record_graph(&mut self, graph_id: Uuid) {
        self.updated_at = Utc::now();
        self.graphs.push(graph_id);
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Number of turns.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_turns_window() {
        let mut session = Session::new();
        for i in 0..7 {
            session.add_message(Message::user(format!("turn {i}"), session.id));
        }
        let recent = session.recent_turns(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "turn 2");
        assert_eq!(recent[4].content, "turn 6");
        assert_eq!(session.recent_turns(50).len(), 7);
    }

    #[test]
    fn test_record_graph() {
        let mut session = Session::new();
        let g = Uuid::new_v4();
        session.record_graph(g);
        assert_eq!(session.graphs, vec![g]);
        assert!(session.updated_at >= session.created_at);
    }
}

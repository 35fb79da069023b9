use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of an [`AgentMessage`]. Also the topic subscribers filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// The coordinator hands a task to an agent.
    TaskAssignment,
    /// An agent's task finished (successfully or not).
    TaskResult,
    /// A task or run changed state.
    StatusUpdate,
    /// A tool invocation, recorded for audit.
    ResourceRequest,
    /// Free-form announcement to every subscriber.
    Broadcast,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 5] = [
        MessageType::TaskAssignment,
        MessageType::TaskResult,
        MessageType::StatusUpdate,
        MessageType::ResourceRequest,
        MessageType::Broadcast,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TaskAssignment => "task_assignment",
            MessageType::TaskResult => "task_result",
            MessageType::StatusUpdate => "status_update",
            MessageType::ResourceRequest => "resource_request",
            MessageType::Broadcast => "broadcast",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipients {
    /// Every agent subscribed to the message's type.
    Broadcast,
    /// An explicit list of agent names.
    Agents(Vec<String>),
}

impl Recipients {
    /// Address a single agent.
    pub fn agent(name: impl Into<String>) -> Self {
        Recipients::Agents(vec![name.into()])
    }

    /// Whether `name` is listed explicitly. Always `false` for broadcasts.
    pub fn names(&self, name: &str) -> bool {
        match self {
            Recipients::Broadcast => false,
            Recipients::Agents(names) => names.iter().any(|n| n == name),
        }
    }
}

/// A unit of the message pool.
///
/// Messages are immutable once published; consumers deduplicate on `id`
/// because delivery is at-least-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message id.
    pub id: Uuid,
    /// Session the message belongs to.
    pub session_id: Uuid,
    /// Message type / topic.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Name of the sending agent (or `coordinator`, `tools`, ...).
    pub sender: String,
    /// Addressees.
    pub recipients: Recipients,
    /// UTC timestamp of creation.
    pub timestamp: DateTime<Utc>,
    /// Opaque payload.
    pub content: serde_json::Value,
    /// Optional metadata such as the graph or run id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentMessage {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(
        session_id: Uuid,
        kind: MessageType,
        sender: impl Into<String>,
        recipients: Recipients,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            kind,
            sender: sender.into(),
            recipients,
            timestamp: Utc::now(),
            content,
            metadata: HashMap::new(),
        }
    }

    /// Creates a message addressed to every subscriber of `kind`.
    pub fn broadcast(
        session_id: Uuid,
        kind: MessageType,
        sender: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self::new(session_id, kind, sender, Recipients::Broadcast, content)
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the message is a broadcast.
    pub fn is_broadcast(&self) -> bool {
        self.recipients == Recipients::Broadcast
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_type_serializes_under_type_key() {
        let msg = AgentMessage::broadcast(
            Uuid::new_v4(),
            MessageType::StatusUpdate,
            "coordinator",
            serde_json::json!({"status": "in_progress"}),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status_update");
        assert_eq!(json["recipients"], "broadcast");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_recipients_names() {
        let r = Recipients::Agents(vec!["coder".into(), "tester".into()]);
        assert!(r.names("tester"));
        assert!(!r.names("writer"));
        assert!(!Recipients::Broadcast.names("coder"));
    }

    #[test]
    fn test_message_type_display_matches_wire_name() {
        for kind in MessageType::ALL {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, kind.to_string());
        }
    }
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crewline_core::*;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// 1. AgentMessage survives persistence encoding
// ---------------------------------------------------------------------------

#[test]
fn agent_message_jsonl_line_roundtrip() {
    let session_id = Uuid::new_v4();
    let msg = AgentMessage::new(
        session_id,
        MessageType::TaskAssignment,
        "coordinator",
        Recipients::agent("EmailWriter"),
        serde_json::json!({"task_id": "draft", "description": "Draft the email"}),
    )
    .with_metadata("graph_id", serde_json::json!("g-1"));

    let line = serde_json::to_string(&msg).unwrap();
    assert!(!line.contains('\n'));

    let parsed: AgentMessage = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed.id, msg.id);
    assert_eq!(parsed.session_id, session_id);
    assert_eq!(parsed.kind, MessageType::TaskAssignment);
    assert_eq!(parsed.recipients, Recipients::agent("EmailWriter"));
    assert_eq!(parsed.timestamp, msg.timestamp);
    assert_eq!(parsed.metadata["graph_id"], "g-1");
}

// ---------------------------------------------------------------------------
// 2. Metadata is optional on the wire
// ---------------------------------------------------------------------------

#[test]
fn agent_message_without_metadata_parses() {
    let raw = serde_json::json!({
        "id": Uuid::new_v4(),
        "session_id": Uuid::new_v4(),
        "type": "broadcast",
        "sender": "coordinator",
        "recipients": "broadcast",
        "timestamp": "2026-01-01T00:00:00Z",
        "content": {"note": "hello team"}
    });
    let msg: AgentMessage = serde_json::from_value(raw).unwrap();
    assert!(msg.is_broadcast());
    assert!(msg.metadata.is_empty());
}

// ---------------------------------------------------------------------------
// 3. Error taxonomy renders human-readable reasons
// ---------------------------------------------------------------------------

#[test]
fn error_messages_are_human_readable() {
    let cases: Vec<(CrewlineError, &str)> = vec![
        (
            CrewlineError::Router("agent 'Ghost' is not registered".into()),
            "Router error: agent 'Ghost' is not registered",
        ),
        (
            CrewlineError::NoMatch("no agents registered".into()),
            "No matching agent: no agents registered",
        ),
        (
            CrewlineError::RateLimited("search: 5/min".into()),
            "Rate limited: search: 5/min",
        ),
        (
            CrewlineError::Decomposer("forward reference".into()),
            "Decomposer error: forward reference",
        ),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn json_errors_convert() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
    let err: CrewlineError = parse.unwrap_err().into();
    assert!(matches!(err, CrewlineError::Json(_)));
}

// ---------------------------------------------------------------------------
// 4. Conversation history messages
// ---------------------------------------------------------------------------

#[test]
fn conversation_message_roundtrip() {
    let session_id = Uuid::new_v4();
    let mut msg = Message::assistant("Done: 3/3 tasks completed", session_id);
    msg.metadata
        .insert("graph_id".into(), serde_json::json!("g-42"));

    let json = serde_json::to_string(&msg).unwrap();
    let parsed: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.role, Role::Assistant);
    assert_eq!(parsed.session_id, session_id);
    assert_eq!(parsed.metadata["graph_id"], "g-42");
}

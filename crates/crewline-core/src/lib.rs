//! Core types and error definitions for the Crewline orchestration core.
//!
//! This crate provides the foundational types shared across all Crewline
//! crates: the unified error taxonomy, conversation turns, the
//! [`AgentMessage`] envelope carried by the message pool, and tool call
//! abstractions.
//!
//! # Main types
//!
//! - [`CrewlineError`]: Unified error enum covering routing, decomposition,
//!   scheduling, tool dispatch, and persistence.
//! - [`CrewlineResult`]: Convenience alias for `Result<T, CrewlineError>`.
//! - [`Message`] / [`Role`]: A conversation turn used as routing history.
//! - [`AgentMessage`]: Unit of the message pool.
//! - [`ToolCall`] / [`ToolResult`]: Agent-initiated tool invocations.

/// Message pool envelope types.
pub mod envelope;
/// Conversation turns.
pub mod message;

pub use envelope::{AgentMessage, MessageType, Recipients};
pub use message::{Message, Role};

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for Crewline.
///
/// Request-fatal kinds ([`Router`](Self::Router), [`Analyzer`](Self::Analyzer),
/// [`Decomposer`](Self::Decomposer), [`CircularDependency`](Self::CircularDependency))
/// abort a request before any task is dispatched. Task-local kinds
/// ([`TaskTimeout`](Self::TaskTimeout), [`TaskExecution`](Self::TaskExecution))
/// only fail the node they occurred on.
#[derive(Debug, thiserror::Error)]
pub enum CrewlineError {
    /// Routing could not produce a valid agent (e.g. the semantic match named
    /// an agent that is not registered).
    #[error("Router error: {0}")]
    Router(String),

    /// No registered or eligible agent fits the request. Not fatal: callers
    /// route it to the fallback responder.
    #[error("No matching agent: {0}")]
    NoMatch(String),

    /// The complexity classifier returned a missing or malformed decision.
    #[error("Complexity analysis error: {0}")]
    Analyzer(String),

    /// The decomposer produced a plan that is not a valid task graph.
    #[error("Decomposer error: {0}")]
    Decomposer(String),

    /// A task graph contains a dependency cycle. Lists the node ids that could
    /// not be scheduled.
    #[error("Circular dependency among tasks: {}", .unresolved.join(", "))]
    CircularDependency {
        /// Node ids left unscheduled when leveling got stuck.
        unresolved: Vec<String>,
    },

    /// A task did not finish within its timeout.
    #[error("Task '{task_id}' timed out after {timeout_ms}ms")]
    TaskTimeout {
        /// The task that timed out.
        task_id: String,
        /// The timeout that was applied.
        timeout_ms: u64,
    },

    /// The agent executor itself failed.
    #[error("Task execution error: {0}")]
    TaskExecution(String),

    /// A tool call exceeded its per-session rate limit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Unknown tool or parameters that violate the tool schema.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Message pool persistence or delivery failure.
    #[error("Message pool error: {0}")]
    Pool(String),

    /// Session persistence or lookup failure.
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid configuration or registry setup.
    #[error("Config error: {0}")]
    Config(String),

    /// Work was cancelled by the caller.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrewlineError {
    /// Whether this error aborts a whole request before any task executes.
    pub fn aborts_request(&self) -> bool {
        matches!(
            self,
            CrewlineError::Router(_)
                | CrewlineError::Analyzer(_)
                | CrewlineError::Decomposer(_)
                | CrewlineError::CircularDependency { .. }
        )
    }

    /// Whether a failed executor call is transient and worth retrying.
    ///
    /// Only [`TaskExecution`](Self::TaskExecution) errors qualify, and only
    /// when they look like rate limiting, timeouts, or upstream 5xx responses.
    /// Client errors (400) are never retried.
    pub fn is_retryable(&self) -> bool {
        let CrewlineError::TaskExecution(msg) = self else {
            return false;
        };
        let lower = msg.to_lowercase();
        if lower.contains("400") {
            return false;
        }
        lower.contains("429")
            || lower.contains("timeout")
            || lower.contains("temporarily unavailable")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
    }
}

/// A convenience `Result` alias using [`CrewlineError`].
pub type CrewlineResult<T> = Result<T, CrewlineError>;

// --- Tool types ---

/// A request from an agent to invoke a specific tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call, echoed in the [`ToolResult`].
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Creates a tool call with a fresh random id.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result returned after executing a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// The ID of the [`ToolCall`] this result corresponds to.
    pub call_id: String,
    /// Name of the tool that produced the result.
    pub tool: String,
    /// Output produced by the tool, or an error description.
    pub content: serde_json::Value,
    /// Whether the tool execution ended in an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful tool result.
    pub fn success(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            content,
            is_error: false,
        }
    }

    /// Creates an error tool result.
    pub fn error(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            content: serde_json::Value::String(message.into()),
            is_error: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_lists_nodes() {
        let err = CrewlineError::CircularDependency {
            unresolved: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency among tasks: a, b");
        assert!(err.aborts_request());
    }

    #[test]
    fn test_task_errors_do_not_abort_request() {
        let timeout = CrewlineError::TaskTimeout {
            task_id: "build".into(),
            timeout_ms: 60_000,
        };
        assert!(!timeout.aborts_request());
        assert!(timeout.to_string().contains("60000ms"));
        assert!(!CrewlineError::TaskExecution("boom".into()).aborts_request());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CrewlineError::TaskExecution("HTTP 503 from upstream".into()).is_retryable());
        assert!(CrewlineError::TaskExecution("429 Too Many Requests".into()).is_retryable());
        assert!(!CrewlineError::TaskExecution("400 bad request".into()).is_retryable());
        assert!(!CrewlineError::TaskExecution("invalid input".into()).is_retryable());
        assert!(!CrewlineError::Router("503".into()).is_retryable());
    }

    #[test]
    fn test_tool_result_variants() {
        let ok = ToolResult::success("c1", "search", serde_json::json!({"hits": 3}));
        assert!(!ok.is_error);
        assert_eq!(ok.content["hits"], 3);

        let err = ToolResult::error("c2", "search", "backend down");
        assert!(err.is_error);
        assert_eq!(err.content, serde_json::json!("backend down"));
    }
}

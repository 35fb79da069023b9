use crate::tools::ToolOrchestrator;
use crate::types::{TaskNode, TaskResult};
use async_trait::async_trait;
use crewline_core::CrewlineResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Text-in, text-out language model used for semantic matching, complexity
/// analysis and planning. Responses are expected to be a single JSON object.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Complete `prompt` and return the raw model text.
    async fn classify(&self, prompt: &str) -> CrewlineResult<String>;
}

/// What an executor sees besides its task.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Session the run belongs to.
    pub session_id: Uuid,
    /// Graph being executed.
    pub graph_id: Uuid,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Cancelled when the run is cancelled; executors should stop promptly.
    pub cancellation: CancellationToken,
    /// Tool dispatch, when tools are configured.
    pub tools: Option<Arc<ToolOrchestrator>>,
}

/// Performs the actual work of an agent.
///
/// The coordinator owns status transitions and timeouts; an executor only
/// returns output or an error. Retryable errors (see
/// [`CrewlineError::is_retryable`](crewline_core::CrewlineError::is_retryable))
/// may be retried according to the configured policy.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute `task` given the results of its dependencies.
    async fn run(
        &self,
        task: &TaskNode,
        dependencies: &[TaskResult],
        ctx: &ExecutionContext,
    ) -> CrewlineResult<serde_json::Value>;
}

/// Stateless single-turn responder used when no agent matches.
#[async_trait]
pub trait FallbackResponder: Send + Sync {
    /// Reply to `message` directly.
    async fn respond(&self, message: &str) -> CrewlineResult<String>;
}

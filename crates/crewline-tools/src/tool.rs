use crewline_core::CrewlineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata describing a tool's interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, for agents.
    pub description: String,
    /// JSON Schema the call parameters must satisfy.
    pub parameters_schema: serde_json::Value,
    /// Per-session calls allowed per minute; `None` uses the orchestrator default.
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
}

impl ToolDescriptor {
    /// Descriptor without its own rate limit.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            rate_limit_per_minute: None,
        }
    }

    /// Override the orchestrator's default rate limit.
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = Some(per_minute);
        self
    }
}

/// Who is calling a tool, and on behalf of which task.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session making the call.
    pub session_id: Uuid,
    /// Agent making the call.
    pub agent: String,
    /// Task the call serves, if any.
    pub task_id: Option<String>,
}

impl ToolContext {
    /// Context for `agent` outside any task.
    pub fn new(session_id: Uuid, agent: impl Into<String>) -> Self {
        Self {
            session_id,
            agent: agent.into(),
            task_id: None,
        }
    }

    /// Attribute the call to `task_id`.
    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Trait every externally supplied tool implements.
///
/// `execute` receives parameters that already passed schema validation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameter schema.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run the tool on validated `params`.
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> CrewlineResult<serde_json::Value>;
}

use crate::config::ToolConfig;
use crate::pool::MessagePool;
use crewline_core::{AgentMessage, CrewlineError, CrewlineResult, MessageType, ToolCall, ToolResult};
use crewline_security::RateLimiter;
use crewline_tools::{ToolContext, ToolDescriptor, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Dispatches agent tool calls.
///
/// Every call is validated against the tool's schema, rate limited per
/// `(session, tool)`, executed, and recorded in the message pool as a
/// `resource_request`. Rejected calls never reach the tool.
pub struct ToolOrchestrator {
    registry: ToolRegistry,
    pool: Arc<MessagePool>,
    limiter: RateLimiter,
    default_limit: u32,
}

impl ToolOrchestrator {
    /// Dispatch over `registry`, auditing into `pool`, with `config`'s
    /// default per-session limit.
    pub fn new(registry: ToolRegistry, pool: Arc<MessagePool>, config: &ToolConfig) -> Self {
        Self {
            registry,
            pool,
            limiter: RateLimiter::per_minute(),
            default_limit: config.rate_limit_per_minute,
        }
    }

    /// Use a custom rate-limit window instead of one minute.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.limiter = RateLimiter::new(window);
        self
    }

    /// Descriptors of every registered tool.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.registry.list_descriptors()
    }

    /// Run `name` with `params` on behalf of `ctx`.
    pub async fn execute_tool(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> CrewlineResult<ToolResult> {
        self.execute_call(ToolCall::new(name, params), ctx).await
    }

    /// Run one call. Validation and rate-limit rejections are errors; a tool
    /// that fails while running yields a [`ToolResult`] with `is_error` set.
    pub async fn execute_call(&self, call: ToolCall, ctx: &ToolContext) -> CrewlineResult<ToolResult> {
        let tool = self.registry.resolve(&call.name, &call.arguments)?;

        let limit = tool
            .descriptor()
            .rate_limit_per_minute
            .unwrap_or(self.default_limit);
        let key = format!("{}:{}", ctx.session_id, call.name);
        if !self.limiter.check(&key, limit).await {
            let retry_in = self.limiter.reset_in(&key).await;
            return Err(CrewlineError::RateLimited(format!(
                "tool '{}' allows {limit} calls per {}s per session; retry in {}ms",
                call.name,
                self.limiter.window().as_secs(),
                retry_in.as_millis()
            )));
        }

        let result = match tool.execute(call.arguments.clone(), ctx).await {
            Ok(content) => ToolResult::success(&call.id, &call.name, content),
            Err(e) => {
                warn!(tool = %call.name, agent = %ctx.agent, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, &call.name, e.to_string())
            }
        };

        let audit = AgentMessage::broadcast(
            ctx.session_id,
            MessageType::ResourceRequest,
            &ctx.agent,
            serde_json::json!({
                "call_id": call.id,
                "tool": call.name,
                "params": call.arguments,
                "task_id": ctx.task_id,
                "is_error": result.is_error,
                "result": result.content,
            }),
        );
        self.pool.publish(audit).await?;

        info!(
            tool = %call.name,
            agent = %ctx.agent,
            session_id = %ctx.session_id,
            is_error = result.is_error,
            "Tool call completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crewline_tools::Tool;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct Search {
        descriptor: ToolDescriptor,
        calls: AtomicU32,
    }

    impl Search {
        fn new(limit: Option<u32>) -> Arc<Self> {
            let mut descriptor = ToolDescriptor::new(
                "search",
                "Search the web",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": "string", "minLength": 1}},
                    "required": ["query"]
                }),
            );
            if let Some(limit) = limit {
                descriptor = descriptor.with_rate_limit(limit);
            }
            Arc::new(Self {
                descriptor,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Tool for Search {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(
            &self,
            params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> CrewlineResult<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if params["query"] == "explode" {
                return Err(CrewlineError::Tool("backend unreachable".into()));
            }
            Ok(json!({"hits": [params["query"].clone()]}))
        }
    }

    fn orchestrator(tool: Arc<Search>, pool: Arc<MessagePool>) -> ToolOrchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        ToolOrchestrator::new(registry, pool, &ToolConfig::default())
    }

    #[tokio::test]
    async fn test_successful_call_is_audited() {
        let pool = Arc::new(MessagePool::in_memory());
        let tools = orchestrator(Search::new(None), Arc::clone(&pool));
        let session = Uuid::new_v4();
        let ctx = ToolContext::new(session, "Researcher").for_task("lookup");

        let result = tools
            .execute_tool("search", json!({"query": "rust"}), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content["hits"][0], "rust");

        let audit = pool.session_messages(session).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].kind, MessageType::ResourceRequest);
        assert_eq!(audit[0].sender, "Researcher");
        assert_eq!(audit[0].content["task_id"], "lookup");
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_tool() {
        let pool = Arc::new(MessagePool::in_memory());
        let search = Search::new(None);
        let tools = orchestrator(Arc::clone(&search), Arc::clone(&pool));
        let ctx = ToolContext::new(Uuid::new_v4(), "Researcher");

        let err = tools
            .execute_tool("search", json!({"query": ""}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CrewlineError::Tool(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_rate_limit_per_session_and_tool() {
        let pool = Arc::new(MessagePool::in_memory());
        let search = Search::new(Some(2));
        let tools = orchestrator(Arc::clone(&search), pool);
        let ctx = ToolContext::new(Uuid::new_v4(), "Researcher");
        let params = json!({"query": "rust"});

        tools.execute_tool("search", params.clone(), &ctx).await.unwrap();
        tools.execute_tool("search", params.clone(), &ctx).await.unwrap();
        let err = tools
            .execute_tool("search", params.clone(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CrewlineError::RateLimited(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);

        // A different session has its own budget.
        let other = ToolContext::new(Uuid::new_v4(), "Researcher");
        assert!(tools.execute_tool("search", params, &other).await.is_ok());
    }

    #[tokio::test]
    async fn test_finished_sessions_leave_the_limiter() {
        let tools = orchestrator(Search::new(None), Arc::new(MessagePool::in_memory()))
            .with_window(Duration::from_millis(20));
        let params = json!({"query": "rust"});
        for _ in 0..20 {
            let ctx = ToolContext::new(Uuid::new_v4(), "Researcher");
            tools.execute_tool("search", params.clone(), &ctx).await.unwrap();
        }
        assert_eq!(tools.limiter.tracked_keys().await, 20);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let ctx = ToolContext::new(Uuid::new_v4(), "Researcher");
        tools.execute_tool("search", params, &ctx).await.unwrap();
        assert_eq!(tools.limiter.tracked_keys().await, 1);
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let pool = Arc::new(MessagePool::in_memory());
        let tools = orchestrator(Search::new(None), Arc::clone(&pool));
        let session = Uuid::new_v4();
        let ctx = ToolContext::new(session, "Researcher");

        let result = tools
            .execute_tool("search", json!({"query": "explode"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
        let audit = pool.session_messages(session).await.unwrap();
        assert_eq!(audit[0].content["is_error"], true);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let tools = orchestrator(Search::new(None), Arc::new(MessagePool::in_memory()));
        let ctx = ToolContext::new(Uuid::new_v4(), "Researcher");
        let err = tools.execute_tool("delete_everything", json!({}), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
        assert_eq!(tools.descriptors().len(), 1);
    }
}

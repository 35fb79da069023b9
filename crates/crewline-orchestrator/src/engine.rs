use crate::analyzer::ComplexityAnalyzer;
use crate::config::OrchestratorConfig;
use crate::coordinator::{ExecutionCoordinator, COORDINATOR};
use crate::graph::TaskGraph;
use crate::monitor::AgentMonitor;
use crate::pool::MessagePool;
use crate::registry::AgentRegistry;
use crate::router::AgentRouter;
use crate::tools::ToolOrchestrator;
use crate::traits::{FallbackResponder, SemanticClassifier};
use crate::types::{RoutingResult, TaskResult, TaskStatus};
use crewline_core::{AgentMessage, CrewlineError, CrewlineResult, Message, MessageType};
use crewline_session::SessionStore;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Final outcome of one request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No agent matched; a fallback responder answered directly.
    Fallback {
        /// Text from the fallback responder.
        response: String,
    },
    /// The request was routed and its task graph executed.
    Executed {
        /// Router decision.
        routing: RoutingResult,
        /// Graph as executed, with final statuses.
        graph: TaskGraph,
        /// Result of every task by id.
        results: HashMap<String, TaskResult>,
        /// Text rendered by [`summarize`].
        summary: String,
    },
}

impl RunOutcome {
    /// Text for the user: the fallback reply or the execution summary.
    pub fn summary(&self) -> &str {
        match self {
            RunOutcome::Fallback { response } => response,
            RunOutcome::Executed { summary, .. } => summary,
        }
    }

    /// Per-task results; `None` for a fallback reply.
    pub fn results(&self) -> Option<&HashMap<String, TaskResult>> {
        match self {
            RunOutcome::Fallback { .. } => None,
            RunOutcome::Executed { results, .. } => Some(results),
        }
    }
}

/// A request in flight.
///
/// `updates` yields every status update of the run as it happens and ends
/// after the final `run_completed` (or `run_failed`) update. `outcome`
/// resolves to the final result.
pub struct RunHandle {
    /// Status updates of the run, in publication order.
    pub updates: UnboundedReceiver<AgentMessage>,
    /// Final outcome of the run.
    pub outcome: JoinHandle<CrewlineResult<RunOutcome>>,
    cancel: CancellationToken,
}

impl RunHandle {
    /// Cooperatively cancel the run. Tasks not yet dispatched are cancelled;
    /// in-flight executors see their cancellation token fire.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the final outcome.
    pub async fn finish(self) -> CrewlineResult<RunOutcome> {
        self.outcome
            .await
            .map_err(|e| CrewlineError::TaskExecution(format!("run aborted: {e}")))?
    }
}

/// Entry point of the orchestration core: routes a user message, executes
/// the resulting graph, and records the conversation.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    router: Arc<AgentRouter>,
    coordinator: Arc<ExecutionCoordinator>,
    pool: Arc<MessagePool>,
    fallback: Arc<dyn FallbackResponder>,
    sessions: Option<Arc<dyn SessionStore>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Orchestrator over `registry` and `pool`, classifying with `classifier`.
    pub fn new(
        registry: Arc<AgentRegistry>,
        pool: Arc<MessagePool>,
        classifier: Arc<dyn SemanticClassifier>,
        analyzer: Arc<dyn ComplexityAnalyzer>,
        fallback: Arc<dyn FallbackResponder>,
        config: OrchestratorConfig,
    ) -> CrewlineResult<Self> {
        config.validate()?;
        let router = AgentRouter::new(
            Arc::clone(&registry),
            classifier,
            analyzer,
            config.router.clone(),
        );
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&pool),
            config.coordinator.clone(),
        );
        Ok(Self {
            registry,
            router: Arc::new(router),
            coordinator: Arc::new(coordinator),
            pool,
            fallback,
            sessions: None,
            config,
        })
    }

    /// Load routing history from, and record turns into, `store`.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Give executors access to `tools`.
    pub fn with_tools(mut self, tools: Arc<ToolOrchestrator>) -> Self {
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.pool),
            self.config.coordinator.clone(),
        )
        .with_monitor(Arc::clone(self.coordinator.monitor()))
        .with_tools(tools);
        self.coordinator = Arc::new(coordinator);
        self
    }

    /// Use a dedicated planner for decomposition.
    pub fn with_planner(mut self, planner: Arc<dyn SemanticClassifier>) -> Self {
        let router = AgentRouter::new(
            Arc::clone(&self.registry),
            Arc::clone(self.router.matcher().classifier()),
            Arc::clone(self.router.analyzer()),
            self.config.router.clone(),
        )
        .with_planner(planner);
        self.router = Arc::new(router);
        self
    }

    /// Registered agents.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Message pool shared by every run.
    pub fn pool(&self) -> &Arc<MessagePool> {
        &self.pool
    }

    /// Router used for every request.
    pub fn router(&self) -> &Arc<AgentRouter> {
        &self.router
    }

    /// Per-agent execution metrics.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        self.coordinator.monitor()
    }

    /// Start handling `message` in the background.
    pub fn route_and_execute(&self, message: impl Into<String>, session_id: Uuid) -> RunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let this = self.clone();
        let message = message.into();
        let token = cancel.clone();
        let outcome = tokio::spawn(async move { this.handle(&message, session_id, &token, tx).await });
        RunHandle {
            updates: rx,
            outcome,
            cancel,
        }
    }

    /// Every pool message of a session, in append order.
    pub async fn session_messages(&self, session_id: Uuid) -> CrewlineResult<Vec<AgentMessage>> {
        self.pool.session_messages(session_id).await
    }

    /// Route and execute `message`, reporting progress on `updates`.
    pub async fn handle(
        &self,
        message: &str,
        session_id: Uuid,
        cancel: &CancellationToken,
        updates: UnboundedSender<AgentMessage>,
    ) -> CrewlineResult<RunOutcome> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        info!(session_id = %session_id, run_id = %run_id, "Handling request");

        let history = self.history(session_id).await;
        let routing = match self.router.route(message, &history, session_id).await {
            Ok(routing) => routing,
            Err(CrewlineError::NoMatch(reason)) => {
                info!(session_id = %session_id, reason = %reason, "No agent matched, using fallback");
                return self
                    .fall_back(message, session_id, run_id, &reason, &updates)
                    .await;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Routing failed");
                self.announce(session_id, run_id, "run_failed", json!({"error": e.to_string()}), &updates)
                    .await;
                return Err(e);
            }
        };

        self.announce(
            session_id,
            run_id,
            "routed",
            json!({"routing": &routing}),
            &updates,
        )
        .await;

        let mut graph = routing.to_graph(session_id, message);
        let results = match self
            .coordinator
            .execute_with_updates(&mut graph, cancel, Some(updates.clone()))
            .await
        {
            Ok(results) => results,
            Err(e) => {
                self.announce(session_id, run_id, "run_failed", json!({"error": e.to_string()}), &updates)
                    .await;
                return Err(e);
            }
        };

        let summary = summarize(&graph, &results);
        self.record_turn(session_id, message, &summary, Some(graph.id)).await;

        self.announce(
            session_id,
            run_id,
            "run_completed",
            json!({
                "graph_id": graph.id,
                "summary": summary,
                "completed": graph.count_by_status(TaskStatus::Completed),
                "failed": graph.count_by_status(TaskStatus::Failed),
                "cancelled": graph.count_by_status(TaskStatus::Cancelled),
            }),
            &updates,
        )
        .await;

        info!(
            session_id = %session_id,
            run_id = %run_id,
            mode = routing.mode(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request handled"
        );
        Ok(RunOutcome::Executed {
            routing,
            graph,
            results,
            summary,
        })
    }

    async fn fall_back(
        &self,
        message: &str,
        session_id: Uuid,
        run_id: Uuid,
        reason: &str,
        updates: &UnboundedSender<AgentMessage>,
    ) -> CrewlineResult<RunOutcome> {
        let response = match self.fallback.respond(message).await {
            Ok(response) => response,
            Err(e) => {
                self.announce(session_id, run_id, "run_failed", json!({"error": e.to_string()}), updates)
                    .await;
                return Err(e);
            }
        };
        self.record_turn(session_id, message, &response, None).await;
        self.announce(
            session_id,
            run_id,
            "run_completed",
            json!({"fallback": true, "reason": reason, "summary": response}),
            updates,
        )
        .await;
        Ok(RunOutcome::Fallback { response })
    }

    async fn history(&self, session_id: Uuid) -> Vec<Message> {
        let Some(store) = &self.sessions else {
            return Vec::new();
        };
        match store.get(session_id).await {
            Ok(Some(session)) => session
                .recent_turns(self.config.router.history_turns)
                .to_vec(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Could not load session history");
                Vec::new()
            }
        }
    }

    async fn record_turn(&self, session_id: Uuid, user: &str, reply: &str, graph_id: Option<Uuid>) {
        let Some(store) = &self.sessions else {
            return;
        };
        let result = async {
            let mut session = store.get_or_create(session_id).await?;
            session.add_message(Message::user(user, session_id));
            session.add_message(Message::assistant(reply, session_id));
            if let Some(graph_id) = graph_id {
                session.record_graph(graph_id);
            }
            store.update(&session).await
        }
        .await;
        if let Err(e) = result {
            warn!(session_id = %session_id, error = %e, "Could not record session turn");
        }
    }

    /// Publish a run-level status update and forward it to the observer.
    async fn announce(
        &self,
        session_id: Uuid,
        run_id: Uuid,
        event: &str,
        mut content: serde_json::Value,
        updates: &UnboundedSender<AgentMessage>,
    ) {
        if let Some(fields) = content.as_object_mut() {
            fields.insert("event".into(), json!(event));
        }
        let message = AgentMessage::broadcast(session_id, MessageType::StatusUpdate, COORDINATOR, content)
            .with_metadata("run_id", json!(run_id));
        if let Err(e) = self.pool.publish(message.clone()).await {
            warn!(run_id = %run_id, error = %e, "Failed to publish run update");
        }
        let _ = updates.send(message);
    }
}

/// Human-readable account of what completed and what did not.
pub fn summarize(graph: &TaskGraph, results: &HashMap<String, TaskResult>) -> String {
    let total = graph.len();
    let completed = graph.count_by_status(TaskStatus::Completed);
    let mut summary = format!("{completed}/{total} tasks completed");

    let mut problems = Vec::new();
    for node in &graph.nodes {
        if let Some(result) = results.get(&node.id) {
            if let Some(err) = result.error.as_ref().filter(|_| !result.is_success()) {
                problems.push(format!("{} {} ({})", node.id, result.status, err.message));
            }
        }
    }
    if !problems.is_empty() {
        summary.push_str("; ");
        summary.push_str(&problems.join("; "));
    }
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{TaskError, TaskErrorKind, TaskNode};
    use chrono::Utc;

    #[test]
    fn test_summary_explains_failures() {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        graph.add_node(TaskNode::new("build", "Build", "Coder")).unwrap();
        graph
            .add_node(TaskNode::new("test", "Test", "Tester").with_dependencies(["build"]))
            .unwrap();
        graph.add_node(TaskNode::new("docs", "Docs", "Writer")).unwrap();

        let mut results = HashMap::new();
        let build = graph.get("build").unwrap().clone();
        let test = graph.get("test").unwrap().clone();
        let docs = graph.get("docs").unwrap().clone();
        results.insert(
            "build".to_string(),
            TaskResult::failed(
                &build,
                TaskError::new(TaskErrorKind::Timeout, "Task 'build' timed out after 50ms"),
                Utc::now(),
                1,
            ),
        );
        results.insert(
            "test".to_string(),
            TaskResult::cancelled(
                &test,
                TaskError::new(TaskErrorKind::DependencyFailed, "dependency 'build' did not complete"),
                None,
                0,
            ),
        );
        results.insert(
            "docs".to_string(),
            TaskResult::completed(&docs, json!("ok"), Utc::now(), 1),
        );
        graph.set_status("build", TaskStatus::Failed);
        graph.set_status("test", TaskStatus::Cancelled);
        graph.set_status("docs", TaskStatus::Completed);

        let summary = summarize(&graph, &results);
        assert!(summary.starts_with("1/3 tasks completed"));
        assert!(summary.contains("build failed (Task 'build' timed out after 50ms)"));
        assert!(summary.contains("test cancelled"));
        assert!(!summary.contains("docs"));
    }
}

use crate::config::{CoordinatorConfig, RetryPolicy};
use crate::graph::TaskGraph;
use crate::monitor::AgentMonitor;
use crate::pool::MessagePool;
use crate::registry::AgentRegistry;
use crate::tools::ToolOrchestrator;
use crate::traits::{AgentExecutor, ExecutionContext};
use crate::types::{TaskError, TaskErrorKind, TaskNode, TaskResult, TaskStatus};
use chrono::Utc;
use crewline_core::{AgentMessage, CrewlineError, CrewlineResult, MessageType, Recipients};
use futures_util::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Sender name used for coordinator-originated messages.
pub const COORDINATOR: &str = "coordinator";

/// Executes a task graph level by level.
///
/// Nodes in one level run concurrently, each under its own timeout. A level
/// starts only after every node of the previous level reached a terminal
/// state. Nodes whose dependencies did not complete are cancelled without
/// being dispatched. Every transition is published to the message pool.
pub struct ExecutionCoordinator {
    registry: Arc<AgentRegistry>,
    pool: Arc<MessagePool>,
    monitor: Arc<AgentMonitor>,
    tools: Option<Arc<ToolOrchestrator>>,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    /// Coordinator over `registry`, publishing transitions to `pool`.
    pub fn new(
        registry: Arc<AgentRegistry>,
        pool: Arc<MessagePool>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            pool,
            monitor: Arc::new(AgentMonitor::new()),
            tools: None,
            config,
        }
    }

    /// Tools handed to executors through [`ExecutionContext::tools`].
    pub fn with_tools(mut self, tools: Arc<ToolOrchestrator>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Record metrics into a shared monitor instead of a private one.
    pub fn with_monitor(mut self, monitor: Arc<AgentMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Per-agent execution metrics.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Timeout and retry settings in effect.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run every node of `graph` to a terminal state.
    ///
    /// Fails only when the graph cannot be scheduled (cycle), in which case
    /// nothing is dispatched. Task failures are reported in the returned
    /// results, keyed by node id.
    pub async fn execute(
        &self,
        graph: &mut TaskGraph,
        cancel: &CancellationToken,
    ) -> CrewlineResult<HashMap<String, TaskResult>> {
        self.execute_with_updates(graph, cancel, None).await
    }

    /// Like [`execute`](Self::execute), also forwarding every status update
    /// to `updates`.
    pub async fn execute_with_updates(
        &self,
        graph: &mut TaskGraph,
        cancel: &CancellationToken,
        updates: Option<UnboundedSender<AgentMessage>>,
    ) -> CrewlineResult<HashMap<String, TaskResult>> {
        let levels = graph.levels().map_err(|e| {
            error!(graph_id = %graph.id, error = %e, "Task graph rejected");
            e
        })?;

        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            pool: Arc::clone(&self.pool),
            monitor: Arc::clone(&self.monitor),
            tools: self.tools.clone(),
            timeout: self.config.task_timeout(),
            retry: self.config.retry.clone(),
            session_id: graph.session_id,
            graph_id: graph.id,
            cancel: cancel.clone(),
            updates,
        };

        info!(
            graph_id = %graph.id,
            tasks = graph.len(),
            levels = levels.len(),
            "Executing task graph"
        );

        let mut results: HashMap<String, TaskResult> = HashMap::new();
        for (depth, level) in levels.into_iter().enumerate() {
            let mut batch = Vec::new();
            for id in level {
                let Some(node) = graph.get(&id).cloned() else {
                    continue;
                };

                if cancel.is_cancelled() {
                    let result = TaskResult::cancelled(
                        &node,
                        TaskError::new(TaskErrorKind::Cancelled, "run cancelled before dispatch"),
                        None,
                        0,
                    );
                    dispatcher.finish(&node, &result).await;
                    graph.set_status(&id, TaskStatus::Cancelled);
                    results.insert(id, result);
                    continue;
                }

                let blocked = node
                    .dependencies
                    .iter()
                    .find(|dep| results.get(dep.as_str()).map_or(true, |r| !r.is_success()))
                    .cloned();
                if let Some(dep) = blocked {
                    let result = TaskResult::cancelled(
                        &node,
                        TaskError::new(
                            TaskErrorKind::DependencyFailed,
                            format!("dependency '{dep}' did not complete"),
                        ),
                        None,
                        0,
                    );
                    dispatcher.finish(&node, &result).await;
                    graph.set_status(&id, TaskStatus::Cancelled);
                    results.insert(id, result);
                    continue;
                }

                let deps: Vec<TaskResult> = node
                    .dependencies
                    .iter()
                    .filter_map(|d| results.get(d).cloned())
                    .collect();
                graph.set_status(&id, TaskStatus::InProgress);
                batch.push((node, deps));
            }

            if batch.is_empty() {
                continue;
            }
            debug!(graph_id = %graph.id, depth, tasks = batch.len(), "Dispatching level");

            let nodes: Vec<TaskNode> = batch.iter().map(|(node, _)| node.clone()).collect();
            let handles = batch
                .into_iter()
                .map(|(node, deps)| tokio::spawn(dispatcher.clone().run(node, deps)));
            let outcomes = join_all(handles).await;

            for (node, outcome) in nodes.into_iter().zip(outcomes) {
                let result = match outcome {
                    Ok(result) => result,
                    Err(join_err) => {
                        error!(task_id = %node.id, error = %join_err, "Task dispatch aborted");
                        self.registry.mark_idle(&node.agent);
                        let result = TaskResult::failed(
                            &node,
                            TaskError::new(
                                TaskErrorKind::Execution,
                                format!("executor aborted: {join_err}"),
                            ),
                            Utc::now(),
                            1,
                        );
                        dispatcher.finish(&node, &result).await;
                        result
                    }
                };
                graph.set_status(&node.id, result.status);
                results.insert(node.id, result);
            }
        }

        info!(
            graph_id = %graph.id,
            completed = graph.count_by_status(TaskStatus::Completed),
            failed = graph.count_by_status(TaskStatus::Failed),
            cancelled = graph.count_by_status(TaskStatus::Cancelled),
            "Task graph finished"
        );
        Ok(results)
    }
}

/// Everything one dispatched task needs, cloned into its spawned future.
#[derive(Clone)]
struct Dispatcher {
    registry: Arc<AgentRegistry>,
    pool: Arc<MessagePool>,
    monitor: Arc<AgentMonitor>,
    tools: Option<Arc<ToolOrchestrator>>,
    timeout: Duration,
    retry: RetryPolicy,
    session_id: Uuid,
    graph_id: Uuid,
    cancel: CancellationToken,
    updates: Option<UnboundedSender<AgentMessage>>,
}

impl Dispatcher {
    async fn run(self, node: TaskNode, deps: Vec<TaskResult>) -> TaskResult {
        let started_at = Utc::now();
        let Some(executor) = self.registry.executor(&node.agent) else {
            let result = TaskResult::failed(
                &node,
                TaskError::new(
                    TaskErrorKind::Execution,
                    format!("agent '{}' is not registered", node.agent),
                ),
                started_at,
                0,
            );
            self.finish(&node, &result).await;
            return result;
        };

        self.registry.mark_busy(&node.agent);
        self.emit(AgentMessage::new(
            self.session_id,
            MessageType::TaskAssignment,
            COORDINATOR,
            Recipients::agent(&node.agent),
            json!({
                "task_id": node.id,
                "description": node.description,
                "dependencies": node.dependencies,
            }),
        ))
        .await;
        self.status(&node, TaskStatus::InProgress, None).await;
        info!(task_id = %node.id, agent = %node.agent, "Task dispatched");

        let (outcome, attempts) = self.attempt(&node, &executor, &deps).await;
        self.registry.mark_idle(&node.agent);

        let result = match outcome {
            Ok(output) => TaskResult::completed(&node, output, started_at, attempts),
            Err(e @ CrewlineError::Cancelled(_)) => TaskResult::cancelled(
                &node,
                TaskError::from_error(&e),
                Some(started_at),
                attempts,
            ),
            Err(e) => TaskResult::failed(&node, TaskError::from_error(&e), started_at, attempts),
        };
        self.finish(&node, &result).await;
        result
    }

    /// Run the executor, retrying transient failures per the retry policy.
    async fn attempt(
        &self,
        node: &TaskNode,
        executor: &Arc<dyn AgentExecutor>,
        deps: &[TaskResult],
    ) -> (CrewlineResult<serde_json::Value>, u32) {
        let cancelled = || CrewlineError::Cancelled(format!("task '{}' cancelled", node.id));
        let mut attempt = 0;
        loop {
            attempt += 1;
            let ctx = ExecutionContext {
                session_id: self.session_id,
                graph_id: self.graph_id,
                attempt,
                cancellation: self.cancel.child_token(),
                tools: self.tools.clone(),
            };

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(cancelled()),
                res = tokio::time::timeout(self.timeout, executor.run(node, deps, &ctx)) => match res {
                    Ok(res) => res,
                    Err(_) => Err(CrewlineError::TaskTimeout {
                        task_id: node.id.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }),
                },
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt <= self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt - 1);
                    warn!(
                        task_id = %node.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient task failure, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return (Err(cancelled()), attempt),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return (other, attempt),
            }
        }
    }

    /// Record a terminal result: metrics, task_result message, status update.
    async fn finish(&self, node: &TaskNode, result: &TaskResult) {
        match result.status {
            TaskStatus::Completed => {
                info!(task_id = %node.id, agent = %node.agent, attempts = result.attempts, "Task completed");
            }
            _ => {
                let reason = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or("");
                warn!(
                    task_id = %node.id,
                    agent = %node.agent,
                    status = %result.status,
                    reason,
                    "Task did not complete"
                );
            }
        }

        self.monitor.record(result).await;
        self.emit(AgentMessage::broadcast(
            self.session_id,
            MessageType::TaskResult,
            &node.agent,
            serde_json::to_value(result).unwrap_or_default(),
        ))
        .await;
        self.status(node, result.status, result.error.as_ref()).await;
    }

    async fn status(&self, node: &TaskNode, status: TaskStatus, error: Option<&TaskError>) {
        self.emit(AgentMessage::broadcast(
            self.session_id,
            MessageType::StatusUpdate,
            COORDINATOR,
            json!({
                "event": "task_status",
                "task_id": node.id,
                "agent": node.agent,
                "status": status,
                "error": error,
            }),
        ))
        .await;
    }

    /// Publish, then forward status updates to the run's observer. Publishing
    /// failures are logged and never fail the task.
    async fn emit(&self, message: AgentMessage) {
        let message = message.with_metadata("graph_id", json!(self.graph_id));
        let forward = (message.kind == MessageType::StatusUpdate)
            .then(|| self.updates.as_ref())
            .flatten()
            .map(|tx| (tx, message.clone()));

        if let Err(e) = self.pool.publish(message).await {
            warn!(graph_id = %self.graph_id, error = %e, "Failed to publish coordinator message");
        }
        if let Some((tx, message)) = forward {
            // Observer gone is fine: the message is in the pool.
            let _ = tx.send(message);
        }
    }
}

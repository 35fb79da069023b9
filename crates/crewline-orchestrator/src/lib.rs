//! Routing and scheduling core for Crewline "AI employee" agents.
//!
//! A user message is routed to one agent or decomposed into a task graph,
//! the graph is executed level by level with concurrent fan-out, and every
//! state change is published to a durable message pool.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Facade exposing `route_and_execute` and `session_messages`.
//! - [`AgentRouter`]: Staged agent selection (keyword → semantic → complexity).
//! - [`ExecutionCoordinator`]: Topological leveling, parallel dispatch, timeouts, cascading cancellation.
//! - [`MessagePool`]: Durable, topic-addressed pub/sub bus.
//! - [`ToolOrchestrator`]: Schema-validated, rate-limited, audited tool dispatch.
//! - [`AgentRegistry`]: Catalog of agents with lock-protected status.

/// Complexity classification.
pub mod analyzer;
/// Runtime configuration.
pub mod config;
/// Level-by-level graph execution.
pub mod coordinator;
/// Complex-task decomposition into task graphs.
pub mod decomposer;
/// Request facade tying routing and execution together.
pub mod engine;
/// Task graph and topological leveling.
pub mod graph;
/// Keyword and semantic agent matching.
pub mod matcher;
/// Per-agent execution metrics.
pub mod monitor;
/// Durable pub/sub message pool.
pub mod pool;
/// Agent catalog and status.
pub mod registry;
/// Staged agent routing.
pub mod router;
mod structured;
/// Tool dispatch with validation, rate limiting, and audit.
pub mod tools;
/// Collaborator interfaces (classifier, executor, fallback responder).
pub mod traits;
/// Shared orchestration types.
pub mod types;

pub use analyzer::{ComplexityAnalyzer, LlmComplexityAnalyzer};
pub use config::{CoordinatorConfig, OrchestratorConfig, RetryPolicy, RouterConfig, ToolConfig};
pub use coordinator::ExecutionCoordinator;
pub use decomposer::TaskDecomposer;
pub use engine::{Orchestrator, RunHandle, RunOutcome};
pub use graph::TaskGraph;
pub use matcher::{AgentMatcher, AgentSelection, KeywordMatch, MatchStage};
pub use monitor::AgentMonitor;
pub use pool::{MessageDeduper, MessagePool, Subscription};
pub use registry::{AgentRegistry, AgentSnapshot};
pub use router::AgentRouter;
pub use tools::ToolOrchestrator;
pub use traits::{AgentExecutor, ExecutionContext, FallbackResponder, SemanticClassifier};
pub use types::{
    AgentMetrics, AgentProfile, AgentStatus, Complexity, ComplexityResult, RoutingResult,
    TaskError, TaskErrorKind, TaskNode, TaskResult, TaskStatus,
};

use crate::graph::TaskGraph;
use chrono::{DateTime, Utc};
use crewline_core::{CrewlineError, CrewlineResult};
use serde::{Deserialize, Serialize};

/// Availability of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered with no task in flight.
    Idle,
    /// At least one task is currently dispatched to the agent.
    Busy,
    /// Taken out of rotation by an admin; never routed to.
    Unavailable,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Busy => write!(f, "busy"),
            AgentStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Capability descriptor of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent name.
    pub name: String,
    /// Tags matched case-insensitively against the user message.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Free-text description shown to the semantic classifier.
    pub capability: String,
}

impl AgentProfile {
    /// Profile without keywords.
    pub fn new(name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
            capability: capability.into(),
        }
    }

    /// Replace the keyword list.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Status of a task node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or dispatch.
    #[default]
    Pending,
    /// Dispatched to its agent.
    InProgress,
    /// Finished with output.
    Completed,
    /// Gave up after its last attempt.
    Failed,
    /// Never finished: cancelled run or failed dependency.
    Cancelled,
}

impl TaskStatus {
    /// True for completed, failed and cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a task did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The last attempt exceeded the task timeout.
    Timeout,
    /// The executor returned an error.
    Execution,
    /// A dependency failed or was cancelled, so the task was never attempted.
    DependencyFailed,
    /// The caller cancelled the run.
    Cancelled,
}

/// Why a task did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Failure category.
    pub kind: TaskErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl TaskError {
    /// Error of `kind` with `message`.
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a crate error.
    pub fn from_error(err: &CrewlineError) -> Self {
        let kind = match err {
            CrewlineError::TaskTimeout { .. } => TaskErrorKind::Timeout,
            CrewlineError::Cancelled(_) => TaskErrorKind::Cancelled,
            _ => TaskErrorKind::Execution,
        };
        Self::new(kind, err.to_string())
    }
}

/// A unit of work in a [`TaskGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Id unique within the graph.
    pub id: String,
    /// What the agent should do.
    pub description: String,
    /// Name of the registered agent that executes this node.
    pub agent: String,
    /// Ids of nodes that must complete first, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskNode {
    /// Pending node without dependencies.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent: agent.into(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
        }
    }

    /// Replace the dependency list.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// True when `id` is a direct dependency.
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d == id)
    }
}

/// Terminal outcome of one task.
///
/// Results are never mutated; a correction is a new result built with
/// [`TaskResult::supersede`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Id of the task.
    pub task_id: String,
    /// Agent that ran the task.
    pub agent: String,
    /// Terminal status.
    pub status: TaskStatus,
    /// Opaque executor output; `null` when the task produced none.
    #[serde(default)]
    pub output: serde_json::Value,
    /// Failure detail, for failed and cancelled tasks.
    #[serde(default)]
    pub error: Option<TaskError>,
    /// `None` when the task was cancelled before dispatch.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached its terminal status.
    pub completed_at: DateTime<Utc>,
    /// Executor attempts made (0 when never dispatched).
    #[serde(default)]
    pub attempts: u32,
    /// Set on results that correct an earlier result for the same task.
    #[serde(default)]
    pub supersedes: bool,
}

impl TaskResult {
    /// Successful result with `output`.
    pub fn completed(
        node: &TaskNode,
        output: serde_json::Value,
        started_at: DateTime<Utc>,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: node.id.clone(),
            agent: node.agent.clone(),
            status: TaskStatus::Completed,
            output,
            error: None,
            started_at: Some(started_at),
            completed_at: Utc::now(),
            attempts,
            supersedes: false,
        }
    }

    /// Failed result carrying `error`.
    pub fn failed(
        node: &TaskNode,
        error: TaskError,
        started_at: DateTime<Utc>,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: node.id.clone(),
            agent: node.agent.clone(),
            status: TaskStatus::Failed,
            output: serde_json::Value::Null,
            error: Some(error),
            started_at: Some(started_at),
            completed_at: Utc::now(),
            attempts,
            supersedes: false,
        }
    }

    /// Cancelled result; `started_at` is `None` when never dispatched.
    pub fn cancelled(
        node: &TaskNode,
        error: TaskError,
        started_at: Option<DateTime<Utc>>,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: node.id.clone(),
            agent: node.agent.clone(),
            status: TaskStatus::Cancelled,
            output: serde_json::Value::Null,
            error: Some(error),
            started_at,
            completed_at: Utc::now(),
            attempts,
            supersedes: false,
        }
    }

    /// A completed result replacing this one with corrected output.
    pub fn supersede(&self, output: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            task_id: self.task_id.clone(),
            agent: self.agent.clone(),
            status: TaskStatus::Completed,
            output,
            error: None,
            started_at: Some(now),
            completed_at: now,
            attempts: self.attempts,
            supersedes: true,
        }
    }

    /// True when the task completed.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// SIMPLE: 1–3 sequential steps for one agent. COMPLEX: needs decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    /// One agent, few steps.
    Simple,
    /// Needs decomposition.
    Complex,
}

/// Strict decision returned by a complexity analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityResult {
    /// SIMPLE or COMPLEX.
    pub complexity: Complexity,
    /// Estimated sequential steps, at least 1.
    #[serde(alias = "estimatedSteps")]
    pub estimated_steps: u32,
    /// Classifier's explanation.
    pub reasoning: String,
}

impl ComplexityResult {
    /// Most steps a SIMPLE task may take.
    pub const MAX_SIMPLE_STEPS: u32 = 3;

    /// Reject decisions that contradict the SIMPLE/COMPLEX definition.
    pub fn validated(self) -> CrewlineResult<Self> {
        if self.estimated_steps == 0 {
            return Err(CrewlineError::Analyzer(
                "estimated_steps must be at least 1".to_string(),
            ));
        }
        if self.complexity == Complexity::Simple && self.estimated_steps > Self::MAX_SIMPLE_STEPS {
            return Err(CrewlineError::Analyzer(format!(
                "SIMPLE task cannot take {} steps (max {})",
                self.estimated_steps,
                Self::MAX_SIMPLE_STEPS
            )));
        }
        Ok(self)
    }
}

/// Output of the router for one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RoutingResult {
    /// One agent handles the whole request.
    Single {
        /// Chosen agent.
        agent: String,
        /// Selection confidence in `[0, 1]`.
        confidence: f64,
        /// Why the agent was chosen.
        reasoning: String,
    },
    /// The request was decomposed into a task graph.
    Supervisor {
        /// Graph to execute.
        plan: TaskGraph,
        /// Why the request was decomposed.
        reasoning: String,
    },
}

impl RoutingResult {
    /// `"single"` or `"supervisor"`.
    pub fn mode(&self) -> &'static str {
        match self {
            RoutingResult::Single { .. } => "single",
            RoutingResult::Supervisor { .. } => "supervisor",
        }
    }

    /// Explanation behind the decision.
    pub fn reasoning(&self) -> &str {
        match self {
            RoutingResult::Single { reasoning, .. } | RoutingResult::Supervisor { reasoning, .. } => {
                reasoning
            }
        }
    }

    /// The graph to execute: the plan itself, or a one-node graph for a
    /// single-agent decision.
    pub fn to_graph(&self, session_id: uuid::Uuid, message: &str) -> TaskGraph {
        match self {
            RoutingResult::Single { agent, .. } => TaskGraph::single(session_id, agent, message),
            RoutingResult::Supervisor { plan, .. } => plan.clone(),
        }
    }
}

/// Execution metrics for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Tasks completed.
    pub tasks_completed: u32,
    /// Tasks failed, timeouts included.
    pub tasks_failed: u32,
    /// Tasks that failed by timeout.
    pub tasks_timed_out: u32,
    /// Tasks cancelled.
    pub tasks_cancelled: u32,
    /// Summed wall time of dispatched tasks.
    pub duration_ms: u64,
}

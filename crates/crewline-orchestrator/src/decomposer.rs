use crate::graph::TaskGraph;
use crate::matcher::{describe_agents, AgentMatcher};
use crate::registry::AgentRegistry;
use crate::structured::parse_structured;
use crate::traits::SemanticClassifier;
use crate::types::{ComplexityResult, TaskNode};
use crewline_core::{CrewlineError, CrewlineResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct Plan {
    subtasks: Vec<PlannedSubtask>,
}

#[derive(Debug, Deserialize)]
struct PlannedSubtask {
    id: String,
    description: String,
    #[serde(default, alias = "dependencies", alias = "dependsOn")]
    depends_on: Vec<String>,
}

/// Turns a COMPLEX request into a task graph.
///
/// The planner proposes ordered subtasks; each subtask is then assigned an
/// agent through the same keyword/semantic matching the router uses.
pub struct TaskDecomposer {
    planner: Arc<dyn SemanticClassifier>,
    matcher: Arc<AgentMatcher>,
    registry: Arc<AgentRegistry>,
}

impl TaskDecomposer {
    /// Decomposer that plans with `planner` and assigns agents with `matcher`.
    pub fn new(
        planner: Arc<dyn SemanticClassifier>,
        matcher: Arc<AgentMatcher>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            planner,
            matcher,
            registry,
        }
    }

    /// Split `task` into a validated task graph for `session_id`.
    pub async fn decompose(
        &self,
        task: &str,
        analysis: &ComplexityResult,
        session_id: Uuid,
    ) -> CrewlineResult<TaskGraph> {
        let prompt = self.plan_prompt(task, analysis);
        let raw = self
            .planner
            .classify(&prompt)
            .await
            .map_err(|e| CrewlineError::Decomposer(format!("planner failed: {e}")))?;
        let plan: Plan = parse_structured(&raw)
            .map_err(|e| CrewlineError::Decomposer(format!("malformed plan: {e}")))?;

        if plan.subtasks.len() < 2 {
            return Err(CrewlineError::Decomposer(format!(
                "a plan needs at least 2 subtasks, got {}",
                plan.subtasks.len()
            )));
        }

        let mut graph = TaskGraph::new(session_id);
        for subtask in plan.subtasks {
            let id = subtask.id.trim().to_string();
            let description = subtask.description.trim().to_string();
            if description.is_empty() {
                return Err(CrewlineError::Decomposer(format!(
                    "subtask '{id}' has no description"
                )));
            }
            let selection = self.matcher.select(&description, &[]).await.map_err(|e| {
                CrewlineError::Decomposer(format!("no agent for subtask '{id}': {e}"))
            })?;
            debug!(subtask = %id, agent = %selection.agent, stage = ?selection.stage, "Subtask assigned");

            let deps = subtask.depends_on.iter().map(|d| d.trim().to_string());
            graph.add_node(TaskNode::new(id, description, selection.agent).with_dependencies(deps))?;
        }

        graph
            .levels()
            .map_err(|e| CrewlineError::Decomposer(format!("plan is not executable: {e}")))?;

        info!(graph_id = %graph.id, subtasks = graph.len(), "Task decomposed");
        Ok(graph)
    }

    fn plan_prompt(&self, task: &str, analysis: &ComplexityResult) -> String {
        format!(
            "Break the task below into an ordered list of subtasks.\n\
             Each subtask must be doable by one of these agents:\n{agents}\n\
             Expected size: about {steps} steps. Rationale: {reasoning}\n\n\
             Task: {task}\n\n\
             Rules: give at least 2 subtasks; ids are short unique slugs; \
             depends_on may only list ids of subtasks that appear earlier.\n\
             Respond with only a JSON object: {{\"subtasks\": [{{\"id\": \"<slug>\", \
             \"description\": \"<what to do>\", \"depends_on\": [\"<earlier id>\"]}}]}}",
            agents = describe_agents(&self.registry.eligible_profiles()),
            steps = analysis.estimated_steps,
            reasoning = analysis.reasoning,
        )
    }
}

use crate::types::{AgentMetrics, TaskErrorKind, TaskResult, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-agent execution metrics, fed by the coordinator.
pub struct AgentMonitor {
    metrics: Arc<RwLock<HashMap<String, AgentMetrics>>>,
}

impl AgentMonitor {
    /// Empty monitor.
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a terminal task result for its agent.
    pub async fn record(&self, result: &TaskResult) {
        let duration_ms = result
            .started_at
            .map(|start| (result.completed_at - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(result.agent.clone()).or_default();
        entry.duration_ms += duration_ms;
        match result.status {
            TaskStatus::Completed => entry.tasks_completed += 1,
            TaskStatus::Failed => {
                if result
                    .error
                    .as_ref()
                    .is_some_and(|e| e.kind == TaskErrorKind::Timeout)
                {
                    entry.tasks_timed_out += 1;
                }
                entry.tasks_failed += 1;
            }
            TaskStatus::Cancelled => entry.tasks_cancelled += 1,
            TaskStatus::Pending | TaskStatus::InProgress => {}
        }
    }

    /// Metrics of `agent`, if it has run anything.
    pub async fn get(&self, agent: &str) -> Option<AgentMetrics> {
        self.metrics.read().await.get(agent).cloned()
    }

    /// Metrics of every agent seen so far, sorted by agent name.
    pub async fn snapshot(&self) -> Vec<(String, AgentMetrics)> {
        let metrics = self.metrics.read().await;
        let mut all: Vec<(String, AgentMetrics)> =
            metrics.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Sum over every agent.
    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let metrics = self.metrics.read().await;
        let mut total = AgentMetrics::default();
        for m in metrics.values() {
            total.tasks_completed += m.tasks_completed;
            total.tasks_failed += m.tasks_failed;
            total.tasks_timed_out += m.tasks_timed_out;
            total.tasks_cancelled += m.tasks_cancelled;
            total.duration_ms += m.duration_ms;
        }
        total
    }

    /// Serialize the current metrics as JSON.
    pub async fn to_json(&self) -> serde_json::Value {
        let agents: serde_json::Map<String, serde_json::Value> = self
            .snapshot()
            .await
            .into_iter()
            .map(|(name, m)| (name, serde_json::to_value(m).unwrap_or_default()))
            .collect();
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": agents,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{TaskError, TaskNode};
    use chrono::{Duration, Utc};

    fn node(agent: &str) -> TaskNode {
        TaskNode::new("t", "task", agent)
    }

    #[tokio::test]
    async fn test_initial_state() {
        let monitor = AgentMonitor::new();
        assert!(monitor.snapshot().await.is_empty());
        assert!(monitor.get("Coder").await.is_none());
    }

    #[tokio::test]
    async fn test_record_outcomes() {
        let monitor = AgentMonitor::new();
        let started = Utc::now() - Duration::milliseconds(250);
        monitor
            .record(&TaskResult::completed(&node("Coder"), serde_json::json!(1), started, 1))
            .await;
        monitor
            .record(&TaskResult::failed(
                &node("Coder"),
                TaskError::new(TaskErrorKind::Timeout, "slow"),
                Utc::now(),
                1,
            ))
            .await;
        monitor
            .record(&TaskResult::cancelled(
                &node("Tester"),
                TaskError::new(TaskErrorKind::DependencyFailed, "upstream failed"),
                None,
                0,
            ))
            .await;

        let coder = monitor.get("Coder").await.unwrap();
        assert_eq!(coder.tasks_completed, 1);
        assert_eq!(coder.tasks_failed, 1);
        assert_eq!(coder.tasks_timed_out, 1);
        assert!(coder.duration_ms >= 250);

        let tester = monitor.get("Tester").await.unwrap();
        assert_eq!(tester.tasks_cancelled, 1);
        assert_eq!(tester.duration_ms, 0);
    }

    #[tokio::test]
    async fn test_aggregate_and_json() {
        let monitor = AgentMonitor::new();
        for agent in ["Coder", "Tester"] {
            monitor
                .record(&TaskResult::completed(
                    &node(agent),
                    serde_json::Value::Null,
                    Utc::now(),
                    1,
                ))
                .await;
        }
        assert_eq!(monitor.aggregate_metrics().await.tasks_completed, 2);

        let json = monitor.to_json().await;
        assert_eq!(json["agents"]["Coder"]["tasks_completed"], 1);
        assert_eq!(json["aggregate"]["tasks_completed"], 2);
    }
}

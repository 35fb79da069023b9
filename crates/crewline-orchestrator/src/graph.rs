use crate::types::{TaskNode, TaskStatus};
use chrono::{DateTime, Utc};
use crewline_core::{CrewlineError, CrewlineResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// A directed acyclic graph of tasks for one request.
///
/// Nodes are kept in creation order; [`TaskGraph::add_node`] only accepts
/// dependencies on nodes that already exist, so graphs built through it are
/// acyclic by construction. Graphs deserialized from elsewhere are checked by
/// [`TaskGraph::levels`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    /// Graph id.
    pub id: Uuid,
    /// Session the graph was planned for.
    pub session_id: Uuid,
    /// Nodes in declaration order.
    pub nodes: Vec<TaskNode>,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TaskGraph {
    /// Empty graph for `session_id`.
    pub fn new(session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            nodes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A one-node graph for a single-agent request.
    pub fn single(session_id: Uuid, agent: &str, description: &str) -> Self {
        let mut graph = Self::new(session_id);
        graph.nodes.push(TaskNode::new("task-1", description, agent));
        graph
    }

    /// Append a node. Its id must be new and every dependency must name an
    /// earlier node.
    pub fn add_node(&mut self, node: TaskNode) -> CrewlineResult<()> {
        if node.id.trim().is_empty() {
            return Err(CrewlineError::Decomposer("task id must not be empty".into()));
        }
        if self.get(&node.id).is_some() {
            return Err(CrewlineError::Decomposer(format!(
                "duplicate task id '{}'",
                node.id
            )));
        }
        for dep in &node.dependencies {
            if dep == &node.id {
                return Err(CrewlineError::Decomposer(format!(
                    "task '{}' depends on itself",
                    node.id
                )));
            }
            if self.get(dep).is_none() {
                return Err(CrewlineError::Decomposer(format!(
                    "task '{}' depends on '{dep}', which is not an earlier task",
                    node.id
                )));
            }
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Node with `id`.
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Mutable node with `id`.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in creation order.
    pub fn ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Node id → ids it depends on.
    pub fn dependency_map(&self) -> HashMap<&str, HashSet<&str>> {
        self.nodes
            .iter()
            .map(|n| {
                (
                    n.id.as_str(),
                    n.dependencies.iter().map(String::as_str).collect(),
                )
            })
            .collect()
    }

    /// Group nodes into execution levels.
    ///
    /// Level 0 holds the nodes without dependencies; each later level holds
    /// the nodes whose dependencies all sit in earlier levels. Within a level
    /// nodes keep creation order. Fails with
    /// [`CrewlineError::CircularDependency`] listing the nodes that can never
    /// be scheduled (cycles, or dependencies on unknown ids), and with
    /// [`CrewlineError::Decomposer`] when two nodes share an id.
    pub fn levels(&self) -> CrewlineResult<Vec<Vec<String>>> {
        let mut ids = HashSet::new();
        if let Some(dup) = self.nodes.iter().find(|n| !ids.insert(n.id.as_str())) {
            return Err(CrewlineError::Decomposer(format!(
                "duplicate task id '{}'",
                dup.id
            )));
        }

        let deps = self.dependency_map();
        let mut scheduled: HashSet<&str> = HashSet::new();
        let mut levels = Vec::new();

        while scheduled.len() < self.nodes.len() {
            let level: Vec<&str> = self
                .nodes
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| !scheduled.contains(id))
                .filter(|id| {
                    deps.get(id)
                        .is_some_and(|d| d.iter().all(|dep| scheduled.contains(dep)))
                })
                .collect();

            if level.is_empty() {
                let unresolved = self
                    .nodes
                    .iter()
                    .filter(|n| !scheduled.contains(n.id.as_str()))
                    .map(|n| n.id.clone())
                    .collect();
                return Err(CrewlineError::CircularDependency { unresolved });
            }

            scheduled.extend(level.iter().copied());
            levels.push(level.into_iter().map(String::from).collect());
        }

        Ok(levels)
    }

    /// Every node that transitively depends on `id`.
    pub fn descendants(&self, id: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            for node in &self.nodes {
                if node.depends_on(&current) && found.insert(node.id.clone()) {
                    queue.push_back(node.id.clone());
                }
            }
        }
        found
    }

    pub(crate) fn set_status(&mut self, id: &str, status: TaskStatus) {
        if let Some(node) = self.get_mut(id) {
            node.status = status;
        }
    }

    /// Number of nodes in `status`.
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }

    /// True once every node reached a terminal status.
    pub fn is_done(&self) -> bool {
        self.nodes.iter().all(|n| n.status.is_terminal())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> TaskNode {
        TaskNode::new(id, format!("do {id}"), "agent").with_dependencies(deps.iter().copied())
    }

    fn diamond() -> TaskGraph {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        graph.add_node(node("design", &[])).unwrap();
        graph.add_node(node("frontend", &["design"])).unwrap();
        graph.add_node(node("backend", &["design"])).unwrap();
        graph.add_node(node("test", &["frontend", "backend"])).unwrap();
        graph
    }

    #[test]
    fn test_empty_graph() {
        let graph = TaskGraph::new(Uuid::new_v4());
        assert!(graph.is_empty());
        assert!(graph.is_done());
        assert!(graph.levels().unwrap().is_empty());
    }

    #[test]
    fn test_levels_of_diamond() {
        let levels = diamond().levels().unwrap();
        assert_eq!(
            levels,
            vec![
                vec!["design".to_string()],
                vec!["frontend".to_string(), "backend".to_string()],
                vec!["test".to_string()],
            ]
        );
    }

    #[test]
    fn test_independent_nodes_share_level() {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        graph.add_node(node("a", &[])).unwrap();
        graph.add_node(node("b", &[])).unwrap();
        graph.add_node(node("c", &[])).unwrap();
        assert_eq!(graph.levels().unwrap().len(), 1);
    }

    #[test]
    fn test_add_node_rejects_forward_reference() {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        let err = graph.add_node(node("test", &["build"])).unwrap_err();
        assert!(matches!(err, CrewlineError::Decomposer(_)));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_add_node_rejects_duplicates_and_self_edges() {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        graph.add_node(node("a", &[])).unwrap();
        assert!(graph.add_node(node("a", &[])).is_err());
        assert!(graph.add_node(node("b", &["b"])).is_err());
    }

    #[test]
    fn test_cycle_reports_unresolved_nodes() {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        graph.add_node(node("root", &[])).unwrap();
        // Bypass add_node to build a cycle, as a foreign plan could.
        graph.nodes.push(node("a", &["b"]));
        graph.nodes.push(node("b", &["a"]));

        match graph.levels().unwrap_err() {
            CrewlineError::CircularDependency { unresolved } => {
                assert_eq!(unresolved, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency_is_unschedulable() {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        graph.nodes.push(node("a", &["ghost"]));
        assert!(matches!(
            graph.levels(),
            Err(CrewlineError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_named() {
        let mut graph = TaskGraph::new(Uuid::new_v4());
        graph.add_node(node("a", &[])).unwrap();
        graph.add_node(node("b", &["a"])).unwrap();
        graph.nodes.push(node("a", &[]));

        match graph.levels().unwrap_err() {
            CrewlineError::Decomposer(msg) => assert!(msg.contains("duplicate task id 'a'")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_descendants() {
        let graph = diamond();
        let below = graph.descendants("design");
        assert_eq!(below.len(), 3);
        assert!(graph.descendants("test").is_empty());
        let below_frontend = graph.descendants("frontend");
        assert_eq!(below_frontend, HashSet::from(["test".to_string()]));
    }

    #[test]
    fn test_status_tracking() {
        let mut graph = diamond();
        assert!(!graph.is_done());
        for id in ["design", "frontend", "backend"] {
            graph.set_status(id, TaskStatus::Completed);
        }
        graph.set_status("test", TaskStatus::Failed);
        assert!(graph.is_done());
        assert_eq!(graph.count_by_status(TaskStatus::Completed), 3);
        assert_eq!(graph.count_by_status(TaskStatus::Failed), 1);
    }

    #[test]
    fn test_graph_json_roundtrip_keeps_order() {
        let graph = diamond();
        let json = serde_json::to_string(&graph).unwrap();
        let back: TaskGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ids(), vec!["design", "frontend", "backend", "test"]);
        assert_eq!(back.id, graph.id);
    }
}

//! Offline inspection commands. Each renders its report as a string so the
//! binary only prints.

use crate::config::CrewlineConfig;
use async_trait::async_trait;
use crewline_core::{AgentMessage, CrewlineError, CrewlineResult, Recipients};
use crewline_orchestrator::{
    AgentExecutor, AgentMatcher, AgentProfile, AgentRegistry, ExecutionContext,
    SemanticClassifier, TaskGraph, TaskNode, TaskResult,
};
use crewline_session::{FileMessageStore, MessageStore};
use std::fmt::Write;
use std::sync::Arc;
use uuid::Uuid;

/// Stand-in for the language model and the agents when running offline.
struct Offline;

#[async_trait]
impl SemanticClassifier for Offline {
    async fn classify(&self, _prompt: &str) -> CrewlineResult<String> {
        Err(CrewlineError::Router("no language model configured".into()))
    }
}

#[async_trait]
impl AgentExecutor for Offline {
    async fn run(
        &self,
        task: &TaskNode,
        _dependencies: &[TaskResult],
        _ctx: &ExecutionContext,
    ) -> CrewlineResult<serde_json::Value> {
        Err(CrewlineError::TaskExecution(format!(
            "agent '{}' has no executor offline",
            task.agent
        )))
    }
}

fn offline_registry(agents: &[AgentProfile]) -> CrewlineResult<Arc<AgentRegistry>> {
    let registry = Arc::new(AgentRegistry::new());
    for agent in agents {
        registry.register(agent.clone(), Arc::new(Offline))?;
    }
    Ok(registry)
}

/// Configured agents with their capabilities and keywords.
pub fn agents(config: &CrewlineConfig) -> String {
    if config.agents.is_empty() {
        return "No agents configured.\nAdd [[agents]] entries to crewline.toml\n".to_string();
    }
    let mut out = String::from("Configured agents:\n");
    for agent in &config.agents {
        let _ = writeln!(out, "  {}: {}", agent.name, agent.capability);
        if !agent.keywords.is_empty() {
            let _ = writeln!(out, "    keywords: {}", agent.keywords.join(", "));
        }
    }
    let _ = writeln!(out, "\nTotal: {} agent(s)", config.agents.len());
    out
}

/// Stage-1 keyword scores for `message` and whether they clear the shortcut.
pub fn keyword_match(config: &CrewlineConfig, message: &str) -> anyhow::Result<String> {
    let registry = offline_registry(&config.agents)?;
    let matcher = AgentMatcher::new(registry, Arc::new(Offline))
        .with_shortcut_threshold(config.orchestrator.router.shortcut_threshold);

    let mut scores = matcher.keyword_scores(message)?;
    if scores.is_empty() {
        return Ok("No agents configured.\n".to_string());
    }
    // Stable sort keeps registration order among equal scores.
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut out = String::new();
    for m in &scores {
        let _ = writeln!(out, "  {:<24} {:.2}", m.agent, m.score);
    }
    let best = matcher.best_keyword(message)?;
    match matcher.shortcut(best.as_ref()) {
        Some(selection) => {
            let _ = writeln!(
                out,
                "\nShortcut: {} ({:.2} > {:.2})",
                selection.agent,
                selection.confidence,
                matcher.shortcut_threshold()
            );
        }
        None => {
            let _ = writeln!(
                out,
                "\nNo keyword shortcut (threshold {:.2}); the semantic stage would decide.",
                matcher.shortcut_threshold()
            );
        }
    }
    Ok(out)
}

/// Validate a task graph document and list its execution levels.
pub fn plan(config: &CrewlineConfig, raw: &str) -> anyhow::Result<String> {
    let graph: TaskGraph = serde_json::from_str(raw)?;
    let levels = graph.levels()?;

    let mut out = String::new();
    let _ = writeln!(out, "Graph {} ({} tasks)", graph.id, graph.len());
    for (depth, level) in levels.iter().enumerate() {
        let _ = writeln!(out, "  level {depth}: {}", level.join(", "));
    }
    if !config.agents.is_empty() {
        for node in &graph.nodes {
            if !config.agents.iter().any(|a| a.name == node.agent) {
                let _ = writeln!(
                    out,
                    "  warning: task '{}' uses unconfigured agent '{}'",
                    node.id, node.agent
                );
            }
        }
    }
    Ok(out)
}

/// Persisted pool messages of one session, oldest first.
pub async fn messages(
    config: &CrewlineConfig,
    session_id: Uuid,
    json: bool,
) -> anyhow::Result<String> {
    let store = FileMessageStore::open(config.messages_dir()).await?;
    let messages = store.by_session(session_id).await?;
    if messages.is_empty() {
        return Ok(format!("No messages for session {session_id}.\n"));
    }

    let mut out = String::new();
    for message in &messages {
        if json {
            let _ = writeln!(out, "{}", serde_json::to_string(message)?);
        } else {
            let _ = writeln!(out, "{}", describe(message));
        }
    }
    Ok(out)
}

fn describe(message: &AgentMessage) -> String {
    let to = match &message.recipients {
        Recipients::Broadcast => "*".to_string(),
        Recipients::Agents(names) => names.join(","),
    };
    format!(
        "{} {:<16} {} -> {} {}",
        message.timestamp.format("%H:%M:%S%.3f"),
        message.kind.as_str(),
        message.sender,
        to,
        message.content
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config() -> CrewlineConfig {
        CrewlineConfig::parse(
            r#"
[[agents]]
name = "EmailWriter"
keywords = ["email", "write"]
capability = "Drafts emails"

[[agents]]
name = "Tester"
keywords = ["test", "verify"]
capability = "Tests software"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_agents_listing() {
        let out = agents(&config());
        assert!(out.contains("EmailWriter: Drafts emails"));
        assert!(out.contains("keywords: test, verify"));
        assert!(out.contains("Total: 2 agent(s)"));
    }

    #[test]
    fn test_match_reports_shortcut() {
        let out = keyword_match(&config(), "Write an email to Bob").unwrap();
        assert!(out.contains("Shortcut: EmailWriter (1.00 > 0.85)"));
        let first = out.lines().next().unwrap();
        assert!(first.contains("EmailWriter"));
    }

    #[test]
    fn test_match_without_shortcut() {
        let out = keyword_match(&config(), "Please test it").unwrap();
        assert!(out.contains("No keyword shortcut"));
    }

    #[test]
    fn test_plan_levels_and_cycle() {
        let session = Uuid::new_v4();
        let graph = serde_json::json!({
            "id": Uuid::new_v4(),
            "session_id": session,
            "nodes": [
                {"id": "a", "description": "write", "agent": "EmailWriter", "dependencies": []},
                {"id": "b", "description": "check", "agent": "Reviewer", "dependencies": ["a"]}
            ]
        });
        let out = plan(&config(), &graph.to_string()).unwrap();
        assert!(out.contains("level 0: a"));
        assert!(out.contains("level 1: b"));
        assert!(out.contains("unconfigured agent 'Reviewer'"));

        let cyclic = serde_json::json!({
            "id": Uuid::new_v4(),
            "session_id": session,
            "nodes": [
                {"id": "a", "description": "x", "agent": "EmailWriter", "dependencies": ["b"]},
                {"id": "b", "description": "y", "agent": "EmailWriter", "dependencies": ["a"]}
            ]
        });
        let err = plan(&config(), &cyclic.to_string()).unwrap_err();
        assert!(err.to_string().contains("Circular dependency"));
    }

    #[test]
    fn test_plan_names_duplicate_task() {
        let graph = serde_json::json!({
            "id": Uuid::new_v4(),
            "session_id": Uuid::new_v4(),
            "nodes": [
                {"id": "a", "description": "x", "agent": "EmailWriter", "dependencies": []},
                {"id": "a", "description": "y", "agent": "Tester", "dependencies": []}
            ]
        });
        let err = plan(&config(), &graph.to_string()).unwrap_err();
        assert!(err.to_string().contains("duplicate task id 'a'"));
    }

    #[tokio::test]
    async fn test_messages_for_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = CrewlineConfig {
            data_dir: dir.path().to_path_buf(),
            ..CrewlineConfig::default()
        };
        let session = Uuid::new_v4();
        let store = FileMessageStore::open(config.messages_dir()).await.unwrap();
        store
            .append(&AgentMessage::new(
                session,
                crewline_core::MessageType::TaskAssignment,
                "coordinator",
                Recipients::agent("Tester"),
                serde_json::json!({"task_id": "t1"}),
            ))
            .await
            .unwrap();

        let out = messages(&config, session, false).await.unwrap();
        assert!(out.contains("task_assignment"));
        assert!(out.contains("coordinator -> Tester"));

        let raw = messages(&config, session, true).await.unwrap();
        let parsed: AgentMessage = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(parsed.session_id, session);

        let empty = messages(&config, Uuid::new_v4(), false).await.unwrap();
        assert!(empty.starts_with("No messages"));
    }
}

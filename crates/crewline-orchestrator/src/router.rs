use crate::analyzer::ComplexityAnalyzer;
use crate::config::RouterConfig;
use crate::decomposer::TaskDecomposer;
use crate::matcher::{AgentMatcher, KeywordMatch};
use crate::registry::AgentRegistry;
use crate::traits::SemanticClassifier;
use crate::types::{Complexity, RoutingResult};
use crewline_core::{CrewlineError, CrewlineResult, Message};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Staged router: keyword shortcut, semantic match, then complexity analysis
/// deciding between a single agent and a decomposed plan.
///
/// The whole pipeline runs under one time budget. When the budget runs out
/// the router degrades to the best keyword match instead of failing.
pub struct AgentRouter {
    registry: Arc<AgentRegistry>,
    matcher: Arc<AgentMatcher>,
    analyzer: Arc<dyn ComplexityAnalyzer>,
    decomposer: TaskDecomposer,
    config: RouterConfig,
}

impl AgentRouter {
    /// Build a router whose matcher and planner share `classifier`.
    pub fn new(
        registry: Arc<AgentRegistry>,
        classifier: Arc<dyn SemanticClassifier>,
        analyzer: Arc<dyn ComplexityAnalyzer>,
        config: RouterConfig,
    ) -> Self {
        let matcher = Arc::new(
            AgentMatcher::new(Arc::clone(&registry), Arc::clone(&classifier))
                .with_shortcut_threshold(config.shortcut_threshold)
                .with_history_turns(config.history_turns),
        );
        let decomposer =
            TaskDecomposer::new(classifier, Arc::clone(&matcher), Arc::clone(&registry));
        Self {
            registry,
            matcher,
            analyzer,
            decomposer,
            config,
        }
    }

    /// Replace the planner used for decomposition.
    pub fn with_planner(mut self, planner: Arc<dyn SemanticClassifier>) -> Self {
        self.decomposer =
            TaskDecomposer::new(planner, Arc::clone(&self.matcher), Arc::clone(&self.registry));
        self
    }

    /// Keyword and semantic matcher.
    pub fn matcher(&self) -> &Arc<AgentMatcher> {
        &self.matcher
    }

    /// Complexity analyzer.
    pub fn analyzer(&self) -> &Arc<dyn ComplexityAnalyzer> {
        &self.analyzer
    }

    /// Decide single-agent or supervisor mode for `message`.
    pub async fn route(
        &self,
        message: &str,
        history: &[Message],
        session_id: Uuid,
    ) -> CrewlineResult<RoutingResult> {
        if self.registry.eligible_profiles().is_empty() {
            return Err(CrewlineError::NoMatch("no eligible agents registered".into()));
        }
        let best = self.matcher.best_keyword(message)?;

        let staged = self.route_staged(message, history, session_id, best.as_ref());
        let outcome = tokio::time::timeout(self.config.timeout(), staged).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout_ms = self.config.timeout_ms,
                    "Routing timed out, falling back to keyword match"
                );
                match best {
                    Some(m) if m.score > 0.0 => Ok(RoutingResult::Single {
                        reasoning: format!(
                            "routing exceeded {}ms; using best keyword match ({:.2})",
                            self.config.timeout_ms, m.score
                        ),
                        agent: m.agent,
                        confidence: m.score,
                    }),
                    _ => Err(CrewlineError::NoMatch(format!(
                        "routing exceeded {}ms and no keyword matched",
                        self.config.timeout_ms
                    ))),
                }
            }
        }
    }

    async fn route_staged(
        &self,
        message: &str,
        history: &[Message],
        session_id: Uuid,
        best: Option<&KeywordMatch>,
    ) -> CrewlineResult<RoutingResult> {
        let selection = match self.matcher.shortcut(best) {
            Some(selection) => selection,
            None => self.matcher.semantic(message, history).await?,
        };

        let analysis = self.analyzer.analyze(message).await?.validated()?;

        let routing = match analysis.complexity {
            Complexity::Simple => RoutingResult::Single {
                agent: selection.agent,
                confidence: selection.confidence,
                reasoning: join_reasoning(&selection.reasoning, &analysis.reasoning),
            },
            Complexity::Complex => {
                let plan = self
                    .decomposer
                    .decompose(message, &analysis, session_id)
                    .await?;
                RoutingResult::Supervisor {
                    reasoning: join_reasoning(&selection.reasoning, &analysis.reasoning),
                    plan,
                }
            }
        };
        info!(
            session_id = %session_id,
            mode = routing.mode(),
            stage = ?selection.stage,
            "Request routed"
        );
        Ok(routing)
    }
}

fn join_reasoning(selection: &str, analysis: &str) -> String {
    match (selection.is_empty(), analysis.is_empty()) {
        (true, _) => analysis.to_string(),
        (_, true) => selection.to_string(),
        _ => format!("{selection}; {analysis}"),
    }
}

use crate::registry::AgentRegistry;
use crate::structured::parse_structured;
use crate::traits::SemanticClassifier;
use crate::types::AgentProfile;
use crewline_core::{CrewlineError, CrewlineResult, Message};
use crewline_security::Sanitizer;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

/// Fraction of an agent's keywords found in a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordMatch {
    /// Agent name.
    pub agent: String,
    /// Matched keywords over total keywords, in `[0, 1]`.
    pub score: f64,
}

/// Which matching stage picked the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStage {
    /// Keyword confidence cleared the shortcut threshold.
    Keyword,
    /// The semantic classifier decided.
    Semantic,
}

/// An agent chosen for a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSelection {
    /// Agent name.
    pub agent: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Why this agent was chosen.
    pub reasoning: String,
    /// Stage that made the choice.
    pub stage: MatchStage,
}

#[derive(Debug, Deserialize)]
struct SemanticDecision {
    agent: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Score a normalized message against a keyword list.
///
/// Keywords are compared lowercased and trimmed; blank keywords are ignored.
pub fn keyword_score(normalized: &str, keywords: &[String]) -> f64 {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return 0.0;
    }
    let hits = keywords
        .iter()
        .filter(|k| normalized.contains(k.as_str()))
        .count();
    hits as f64 / keywords.len() as f64
}

/// Keyword shortcut plus semantic classification, shared by the router and
/// the decomposer.
pub struct AgentMatcher {
    registry: Arc<AgentRegistry>,
    classifier: Arc<dyn SemanticClassifier>,
    sanitizer: Sanitizer,
    shortcut_threshold: f64,
    history_turns: usize,
}

impl AgentMatcher {
    /// Matcher over `registry`, falling back to `classifier` for semantic matching.
    pub fn new(registry: Arc<AgentRegistry>, classifier: Arc<dyn SemanticClassifier>) -> Self {
        Self {
            registry,
            classifier,
            sanitizer: Sanitizer::default(),
            shortcut_threshold: 0.85,
            history_turns: 5,
        }
    }

    /// Keyword confidence above which the semantic stage is skipped.
    pub fn with_shortcut_threshold(mut self, threshold: f64) -> Self {
        self.shortcut_threshold = threshold;
        self
    }

    /// Conversation turns included in the semantic prompt.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Classifier used by the semantic stage.
    pub fn classifier(&self) -> &Arc<dyn SemanticClassifier> {
        &self.classifier
    }

    /// Current keyword shortcut threshold.
    pub fn shortcut_threshold(&self) -> f64 {
        self.shortcut_threshold
    }

    /// Keyword scores of every eligible agent, in registration order.
    pub fn keyword_scores(&self, message: &str) -> CrewlineResult<Vec<KeywordMatch>> {
        let normalized = self
            .sanitizer
            .normalize(message)
            .ok_or_else(|| CrewlineError::Router("message rejected by sanitizer".into()))?;
        Ok(self
            .registry
            .eligible_profiles()
            .into_iter()
            .map(|p| KeywordMatch {
                score: keyword_score(&normalized, &p.keywords),
                agent: p.name,
            })
            .collect())
    }

    /// Highest keyword score. Ties go to the agent registered first; `None`
    /// when no agent is eligible.
    pub fn best_keyword(&self, message: &str) -> CrewlineResult<Option<KeywordMatch>> {
        let mut best: Option<KeywordMatch> = None;
        for candidate in self.keyword_scores(message)? {
            if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    /// The stage-1 result when it clears the shortcut threshold.
    pub fn shortcut(&self, best: Option<&KeywordMatch>) -> Option<AgentSelection> {
        let best = best?;
        (best.score > self.shortcut_threshold).then(|| AgentSelection {
            agent: best.agent.clone(),
            confidence: best.score,
            reasoning: format!(
                "matched {:.0}% of {}'s keywords",
                best.score * 100.0,
                best.agent
            ),
            stage: MatchStage::Keyword,
        })
    }

    /// Pick an agent for `text`: the keyword shortcut when it is confident
    /// enough, otherwise the semantic classifier.
    pub async fn select(&self, text: &str, history: &[Message]) -> CrewlineResult<AgentSelection> {
        let best = self.best_keyword(text)?;
        if let Some(selection) = self.shortcut(best.as_ref()) {
            debug!(agent = %selection.agent, confidence = selection.confidence, "Keyword shortcut");
            return Ok(selection);
        }
        self.semantic(text, history).await
    }

    /// Ask the classifier to pick one eligible agent.
    pub async fn semantic(&self, text: &str, history: &[Message]) -> CrewlineResult<AgentSelection> {
        let agents = self.registry.eligible_profiles();
        if agents.is_empty() {
            return Err(CrewlineError::NoMatch("no eligible agents".into()));
        }
        let start = history.len().saturating_sub(self.history_turns);
        let prompt = semantic_prompt(text, &history[start..], &agents);

        let raw = self
            .classifier
            .classify(&prompt)
            .await
            .map_err(|e| CrewlineError::Router(format!("semantic classifier failed: {e}")))?;
        let decision: SemanticDecision = parse_structured(&raw)
            .map_err(|e| CrewlineError::Router(format!("malformed semantic match: {e}")))?;

        if !self.registry.contains(&decision.agent) {
            return Err(CrewlineError::Router(format!(
                "semantic match named unknown agent '{}'",
                decision.agent
            )));
        }
        if !self.registry.is_eligible(&decision.agent) {
            return Err(CrewlineError::Router(format!(
                "semantic match named unavailable agent '{}'",
                decision.agent
            )));
        }
        if !(0.0..=1.0).contains(&decision.confidence) {
            return Err(CrewlineError::Router(format!(
                "semantic confidence {} outside [0, 1]",
                decision.confidence
            )));
        }

        info!(agent = %decision.agent, confidence = decision.confidence, "Semantic match");
        Ok(AgentSelection {
            agent: decision.agent,
            confidence: decision.confidence,
            reasoning: decision.reasoning,
            stage: MatchStage::Semantic,
        })
    }
}

/// Agent catalog block shared by the matcher and planner prompts.
pub(crate) fn describe_agents(agents: &[AgentProfile]) -> String {
    let mut out = String::new();
    for agent in agents {
        let _ = writeln!(out, "- {}: {}", agent.name, agent.capability);
    }
    out
}

fn semantic_prompt(text: &str, history: &[Message], agents: &[AgentProfile]) -> String {
    let mut prompt = String::from(
        "You route a user request to exactly one agent.\n\nAvailable agents:\n",
    );
    prompt.push_str(&describe_agents(agents));
    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in history {
            let _ = writeln!(prompt, "{}: {}", turn.role, turn.content);
        }
    }
    let _ = write!(
        prompt,
        "\nRequest: {text}\n\nRespond with only a JSON object: \
         {{\"agent\": \"<agent name>\", \"confidence\": <number between 0 and 1>, \
         \"reasoning\": \"<one sentence>\"}}"
    );
    prompt
}

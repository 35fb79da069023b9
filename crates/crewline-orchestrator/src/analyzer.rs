use crate::structured::parse_structured;
use crate::traits::SemanticClassifier;
use crate::types::ComplexityResult;
use async_trait::async_trait;
use crewline_core::{CrewlineError, CrewlineResult};
use std::sync::Arc;
use tracing::debug;

/// Decides whether a request is SIMPLE (one agent) or COMPLEX (decompose).
#[async_trait]
pub trait ComplexityAnalyzer: Send + Sync {
    /// Classify `task` as SIMPLE or COMPLEX.
    async fn analyze(&self, task: &str) -> CrewlineResult<ComplexityResult>;
}

/// Classifier-backed analyzer with a strict JSON contract.
pub struct LlmComplexityAnalyzer {
    classifier: Arc<dyn SemanticClassifier>,
}

impl LlmComplexityAnalyzer {
    /// Analyzer asking `classifier` for a strict JSON decision.
    pub fn new(classifier: Arc<dyn SemanticClassifier>) -> Self {
        Self { classifier }
    }
}

fn complexity_prompt(task: &str) -> String {
    format!(
        "Classify the complexity of the task below.\n\
         SIMPLE: one agent can finish it in 1 to 3 sequential steps.\n\
         COMPLEX: it needs several steps that benefit from separate specialists.\n\n\
         Task: {task}\n\n\
         Respond with only a JSON object: {{\"complexity\": \"SIMPLE\" or \"COMPLEX\", \
         \"estimated_steps\": <integer>, \"reasoning\": \"<one sentence>\"}}"
    )
}

#[async_trait]
impl ComplexityAnalyzer for LlmComplexityAnalyzer {
    async fn analyze(&self, task: &str) -> CrewlineResult<ComplexityResult> {
        let raw = self
            .classifier
            .classify(&complexity_prompt(task))
            .await
            .map_err(|e| CrewlineError::Analyzer(format!("classifier failed: {e}")))?;
        let result: ComplexityResult = parse_structured(&raw)
            .map_err(|e| CrewlineError::Analyzer(format!("malformed complexity decision: {e}")))?;
        debug!(
            complexity = ?result.complexity,
            steps = result.estimated_steps,
            "Complexity analyzed"
        );
        result.validated()
    }
}

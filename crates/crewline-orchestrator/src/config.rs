use crewline_core::{CrewlineError, CrewlineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behaviour for transient executor failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    #[serde(default)]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Cap for the exponential backoff delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), capped at `backoff_max_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(retry));
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

/// Agent router tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Budget covering every routing stage.
    #[serde(default = "default_router_timeout_ms")]
    pub timeout_ms: u64,
    /// Keyword confidence above which the semantic stage is skipped.
    #[serde(default = "default_shortcut_threshold")]
    pub shortcut_threshold: f64,
    /// Conversation turns sent to the semantic classifier.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_router_timeout_ms() -> u64 {
    10_000
}

fn default_shortcut_threshold() -> f64 {
    0.85
}

fn default_history_turns() -> usize {
    5
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_router_timeout_ms(),
            shortcut_threshold: default_shortcut_threshold(),
            history_turns: default_history_turns(),
        }
    }
}

impl RouterConfig {
    /// `timeout_ms` as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Execution coordinator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Per-attempt timeout for every dispatched task.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Retry policy for retryable executor errors.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_task_timeout_ms() -> u64 {
    60_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: default_task_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    /// `task_timeout_ms` as a [`Duration`].
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

/// Tool orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Calls per minute per session for tools without their own limit.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
}

fn default_rate_limit_per_minute() -> u32 {
    60
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: default_rate_limit_per_minute(),
        }
    }
}

/// Everything tunable in the orchestration core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Agent router settings.
    #[serde(default)]
    pub router: RouterConfig,
    /// Execution coordinator settings.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Tool orchestrator settings.
    #[serde(default)]
    pub tools: ToolConfig,
}

impl OrchestratorConfig {
    /// Reject out-of-range values.
    pub fn validate(&self) -> CrewlineResult<()> {
        if self.router.timeout_ms == 0 {
            return Err(CrewlineError::Config("router.timeout_ms must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.router.shortcut_threshold) {
            return Err(CrewlineError::Config(format!(
                "router.shortcut_threshold must be within [0, 1], got {}",
                self.router.shortcut_threshold
            )));
        }
        if self.coordinator.task_timeout_ms == 0 {
            return Err(CrewlineError::Config(
                "coordinator.task_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.router.timeout(), Duration::from_secs(10));
        assert_eq!(config.router.shortcut_threshold, 0.85);
        assert_eq!(config.router.history_turns, 5);
        assert_eq!(config.coordinator.task_timeout(), Duration::from_secs(60));
        assert_eq!(config.coordinator.retry.max_retries, 0);
        assert_eq!(config.tools.rate_limit_per_minute, 60);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: OrchestratorConfig = serde_json::from_value(serde_json::json!({
            "coordinator": {"task_timeout_ms": 5000, "retry": {"max_retries": 2}}
        }))
        .unwrap();
        assert_eq!(config.coordinator.task_timeout_ms, 5000);
        assert_eq!(config.coordinator.retry.max_retries, 2);
        assert_eq!(config.coordinator.retry.backoff_base_ms, 500);
        assert_eq!(config.router, RouterConfig::default());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            backoff_base_ms: 100,
            backoff_max_ms: 1_000,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(8), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = OrchestratorConfig::default();
        config.router.shortcut_threshold = 1.5;
        assert!(matches!(config.validate(), Err(CrewlineError::Config(_))));
    }
}

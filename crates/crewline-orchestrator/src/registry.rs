use crate::traits::AgentExecutor;
use crate::types::{AgentProfile, AgentStatus};
use crewline_core::{CrewlineError, CrewlineResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

struct Entry {
    profile: AgentProfile,
    executor: Arc<dyn AgentExecutor>,
    unavailable: bool,
    active: u32,
}

impl Entry {
    fn status(&self) -> AgentStatus {
        if self.unavailable {
            AgentStatus::Unavailable
        } else if self.active > 0 {
            AgentStatus::Busy
        } else {
            AgentStatus::Idle
        }
    }
}

/// Point-in-time view of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    /// Capability descriptor.
    pub profile: AgentProfile,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Tasks currently dispatched to the agent.
    pub active_tasks: u32,
}

/// Catalog of agents, kept in registration order.
///
/// Busy is derived from a counter of in-flight dispatches, so an agent can
/// serve several tasks at once. Unavailable is set by an admin and excludes
/// the agent from routing.
pub struct AgentRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl AgentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Add an agent. Fails when the name is empty or already taken.
    pub fn register(
        &self,
        profile: AgentProfile,
        executor: Arc<dyn AgentExecutor>,
    ) -> CrewlineResult<()> {
        if profile.name.trim().is_empty() {
            return Err(CrewlineError::Config("agent name must not be empty".into()));
        }
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.profile.name == profile.name) {
            return Err(CrewlineError::Config(format!(
                "agent '{}' is already registered",
                profile.name
            )));
        }
        info!(agent = %profile.name, keywords = profile.keywords.len(), "Registered agent");
        entries.push(Entry {
            profile,
            executor,
            unavailable: false,
            active: 0,
        });
        Ok(())
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// True when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().iter().any(|e| e.profile.name == name)
    }

    /// Profile of `name`.
    pub fn profile(&self, name: &str) -> Option<AgentProfile> {
        self.entries
            .read()
            .iter()
            .find(|e| e.profile.name == name)
            .map(|e| e.profile.clone())
    }

    /// All profiles in registration order.
    pub fn profiles(&self) -> Vec<AgentProfile> {
        self.entries.read().iter().map(|e| e.profile.clone()).collect()
    }

    /// Profiles that may be routed to, in registration order.
    pub fn eligible_profiles(&self) -> Vec<AgentProfile> {
        self.entries
            .read()
            .iter()
            .filter(|e| !e.unavailable)
            .map(|e| e.profile.clone())
            .collect()
    }

    /// True when `name` is registered and may receive work.
    pub fn is_eligible(&self, name: &str) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.profile.name == name && !e.unavailable)
    }

    /// Executor of `name`.
    pub fn executor(&self, name: &str) -> Option<Arc<dyn AgentExecutor>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.profile.name == name)
            .map(|e| Arc::clone(&e.executor))
    }

    /// Current status of `name`.
    pub fn status(&self, name: &str) -> Option<AgentStatus> {
        self.entries
            .read()
            .iter()
            .find(|e| e.profile.name == name)
            .map(Entry::status)
    }

    /// Every agent with its status and load, in registration order.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.entries
            .read()
            .iter()
            .map(|e| AgentSnapshot {
                profile: e.profile.clone(),
                status: e.status(),
                active_tasks: e.active,
            })
            .collect()
    }

    /// Admin status change. Only `Unavailable` and `Idle` (back in rotation)
    /// can be set; `Busy` follows dispatches.
    pub fn set_status(&self, name: &str, status: AgentStatus) -> CrewlineResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.profile.name == name)
            .ok_or_else(|| CrewlineError::Config(format!("unknown agent '{name}'")))?;
        match status {
            AgentStatus::Unavailable => entry.unavailable = true,
            AgentStatus::Idle => entry.unavailable = false,
            AgentStatus::Busy => {
                return Err(CrewlineError::Config(
                    "busy is derived from dispatches and cannot be set".into(),
                ))
            }
        }
        info!(agent = %name, status = %entry.status(), "Agent status changed");
        Ok(())
    }

    pub(crate) fn mark_busy(&self, name: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.profile.name == name) {
            entry.active += 1;
        }
    }

    pub(crate) fn mark_idle(&self, name: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.profile.name == name) {
            if entry.active == 0 {
                warn!(agent = %name, "mark_idle without matching dispatch");
            }
            entry.active = entry.active.saturating_sub(1);
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

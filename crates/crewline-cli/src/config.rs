use anyhow::{bail, Context};
use crewline_orchestrator::{AgentProfile, OrchestratorConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Contents of `crewline.toml`.
#[derive(Debug, Deserialize)]
pub struct CrewlineConfig {
    /// Root for persisted state; messages live under `messages/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Router, coordinator and tool tuning.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Agent profiles, in routing tie-break order.
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

impl Default for CrewlineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            orchestrator: OrchestratorConfig::default(),
            agents: Vec::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl CrewlineConfig {
    /// Parse and validate a config document.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: CrewlineConfig = toml::from_str(raw)?;
        config.orchestrator.validate()?;

        let mut seen = HashSet::new();
        for agent in &config.agents {
            if agent.name.trim().is_empty() {
                bail!("agent with empty name in [[agents]]");
            }
            if !seen.insert(agent.name.as_str()) {
                bail!("agent '{}' is configured twice", agent.name);
            }
        }
        Ok(config)
    }

    /// Read `path`. A missing file yields the defaults with no agents.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read config file '{}'", path.display())
            }),
        }
    }

    /// Directory holding the persisted message pool.
    pub fn messages_dir(&self) -> PathBuf {
        self.data_dir.join("messages")
    }
}

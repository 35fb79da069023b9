use clap::{Parser, Subcommand};
use crewline_cli::{commands, CrewlineConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "crewline", about = "Crewline: multi-agent routing and task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "crewline.toml")]
    config: PathBuf,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured agents
    Agents,
    /// Show keyword scores for a message and whether the shortcut applies
    Match {
        /// The user message to score
        message: String,
    },
    /// Validate a task graph file and print its execution levels
    Plan {
        /// Path to a JSON task graph
        graph: PathBuf,
    },
    /// Dump the persisted pool messages of a session
    Messages {
        session_id: Uuid,
        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = CrewlineConfig::load(&cli.config).await?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    info!(
        config = %cli.config.display(),
        agents = config.agents.len(),
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    let report = match cli.command {
        Commands::Agents => commands::agents(&config),
        Commands::Match { message } => commands::keyword_match(&config, &message)?,
        Commands::Plan { graph } => {
            let raw = tokio::fs::read_to_string(&graph).await.map_err(|e| {
                anyhow::anyhow!("Failed to read graph file '{}': {e}", graph.display())
            })?;
            commands::plan(&config, &raw)?
        }
        Commands::Messages { session_id, json } => {
            commands::messages(&config, session_id, json).await?
        }
    };
    print!("{report}");

    Ok(())
}

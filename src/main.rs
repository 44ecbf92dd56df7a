use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dagwright_agent::Orchestrator;
use dagwright_core::config::AppConfig;
use dagwright_core::types::ContextMap;
use dagwright_core::version::NodeVersion;

#[derive(Parser)]
#[command(name = "dagwright", version, about = "Versioned agent graph engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "dagwright.toml", env = "DAGWRIGHT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single query through the graph
    Run {
        /// Initial context as a JSON object
        #[arg(long)]
        context: Option<String>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
    },
    /// Show versioned node status
    Status,
    /// Write the canonical audit export
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check whether a node could be upgraded to a version
    Validate {
        /// Capability domain, e.g. "governance"
        domain: String,
        /// Target version (major.minor.patch)
        version: NodeVersion,
    },
    /// Print the graph topology
    Visualize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DAGWRIGHT_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("dagwright=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    match cli.command {
        Commands::Run {
            context,
            json,
            query,
        } => {
            let query = query.join(" ");
            let context: ContextMap = match context {
                Some(raw) => serde_json::from_str(&raw).context("--context must be a JSON object")?,
                None => ContextMap::new(),
            };
            let response = orchestrator.run_with_context(&query, context).await?;
            if response.is_degraded() {
                warn!(run_id = %response.run_id, "Answered in degraded mode");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{response}");
            }
        }
        Commands::Status => {
            let manager = versioned(&orchestrator)?;
            println!("{}", serde_json::to_string_pretty(&manager.get_status()?)?);
        }
        Commands::Export { output } => {
            let export = versioned(&orchestrator)?.export_for_audit()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &export)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), bytes = export.len(), "Audit export written");
                }
                None => println!("{export}"),
            }
        }
        Commands::Validate { domain, version } => {
            let validation = versioned(&orchestrator)?.validate_upgrade(&domain, version)?;
            println!("{}", serde_json::to_string_pretty(&validation)?);
            if !validation.valid {
                std::process::exit(1);
            }
        }
        Commands::Visualize => {
            println!("{}", orchestrator.engine().visualize()?);
        }
    }

    Ok(())
}

fn versioned(orchestrator: &Orchestrator) -> anyhow::Result<&dagwright_versioning::VersionedGraphManager> {
    match orchestrator.engine().versioned() {
        Some(manager) => Ok(manager),
        None => bail!("engine.versioned is false; status, export and validate need a versioned graph"),
    }
}

/// Explicit path, then `~/.dagwright/config.toml`, then built-in defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home_config) = dirs_home().map(|h| h.join(".dagwright").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }
    warn!(path = %path.display(), "No config file found, using defaults");
    Ok(AppConfig::default())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

//! ---
//! pf_section: "05-networking-external-interfaces"
//! pf_subsection: "binary"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Control CLI for running deployment plans and inspecting artifacts."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use plantflow_common::{logging::init_tracing, AppConfig};
use plantflow_logging as logging;

mod artifact;
mod plan;

#[derive(Debug, Parser)]
#[command(author, version, about = "PlantFlow service orchestration utility", long_about = None)]
struct Cli {
    /// Configuration file; `PLANTFLOW_CONFIG` takes precedence when set.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log to stdout and the rolling file set up under `[logging]` instead of stderr.
    #[arg(long, global = true)]
    file_log: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(subcommand, about = "Validate, deploy or cycle deployment plans")]
    Plan(plan::PlanCommand),
    #[command(subcommand, about = "Inspect artifact documents")]
    Artifact(artifact::ArtifactCommand),
}

fn load_config(explicit: Option<&PathBuf>) -> Result<AppConfig> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/plantflow.toml"));
    let loaded = AppConfig::load_with_source(&candidates)?;
    if explicit.is_some() && loaded.source.is_none() {
        anyhow::bail!(
            "configuration file {} not found",
            explicit.map(|p| p.display().to_string()).unwrap_or_default()
        );
    }
    Ok(loaded.config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    if cli.file_log {
        init_tracing("plantflowctl", &config.resource, &config.logging)?;
    } else {
        logging::init();
    }
    match cli.command {
        Commands::Plan(cmd) => plan::run(cmd, &config)?,
        Commands::Artifact(cmd) => artifact::run(cmd, &config)?,
    }
    Ok(())
}

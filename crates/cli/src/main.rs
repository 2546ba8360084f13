use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use venueops_cli::{Replay, Script};
use venueops_core::UuidV7IdGenerator;
use venueops_infra::EngineConfig;

#[derive(Parser)]
#[command(name = "venueops", about = "Venue stock ledger and procurement tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON script against fresh in-memory stores and print the result.
    Replay {
        /// Path to the script file.
        script: PathBuf,
        #[arg(long, action = ArgAction::SetTrue, help = "Stop at the first rejected step")]
        fail_fast: bool,
    },
    /// Print the configuration resolved from the environment.
    Config,
}

fn main() -> Result<()> {
    venueops_observability::init();
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Replay { script, fail_fast } => {
            let raw = std::fs::read_to_string(&script)
                .with_context(|| format!("failed to read {}", script.display()))?;
            let parsed: Script = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", script.display()))?;

            let replay = Replay::new(config, Arc::new(UuidV7IdGenerator));
            let report = replay.run(&parsed, fail_fast)?;
            if report.failed_steps() > 0 {
                tracing::warn!(failed = report.failed_steps(), "some steps were rejected");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config => {
            println!("max_conflict_retries = {}", config.max_conflict_retries);
            println!("default_tax_rate = {}", config.default_tax_rate);
            println!("default_consumption = {}", config.default_consumption);
        }
    }

    Ok(())
}

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::scenario::{Scenario, ScenarioRunner};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted editing session and print the resulting bindings
    Replay {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Engine config JSON file (defaults to the built-in block families)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the effective engine config as JSON
    Config {
        /// Engine config JSON file to validate and print
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { scenario, config, json } => replay(&scenario, config.as_deref(), json)?,
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path).map_err(|e| anyhow!(e)),
        None => Ok(EngineConfig::default()),
    }
}

fn replay(scenario_path: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let content = std::fs::read_to_string(scenario_path)
        .map_err(|e| anyhow!("Failed to read scenario {:?}: {}", scenario_path, e))?;
    let scenario = Scenario::from_json(&content)?;

    log::info!(
        "Replaying {} step(s) over {} node(s)",
        scenario.steps.len(),
        scenario.program.len()
    );
    let runner = ScenarioRunner::run(config, &scenario)?;
    let report = runner.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_table());
    }
    Ok(())
}

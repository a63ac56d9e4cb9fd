use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use volley_config::{ConfigLoader, LogLevel, VolleyConfig};
use volley_execution::{ExecutionError, Orchestrator};
use volley_http::HttpManager;

mod cli;
mod summary;

use cli::{Cli, Commands, ConfigCommands};

/// Every threshold passed
const EXIT_PASSED: u8 = 0;
/// Configuration, I/O or other fatal error
const EXIT_FATAL: u8 = 1;
/// The run finished but a threshold failed or was indeterminate
const EXIT_THRESHOLDS_FAILED: u8 = 99;

/// Load configuration and apply command-line overrides
fn load_config(
    path: &Path,
    log_level: Option<&String>,
    timeout: Option<Duration>,
) -> Result<VolleyConfig> {
    let mut config = ConfigLoader::new()
        .from_file(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;

    if let Some(level) = log_level {
        config.logging.level = LogLevel::from_str(level)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid --log-level")?;
    }
    if let Some(timeout) = timeout {
        config.run.timeout = timeout;
    }

    Ok(config)
}

/// Build the run plan, printing every problem when it is rejected
fn build_orchestrator(config: &VolleyConfig) -> Result<Orchestrator> {
    let client = HttpManager::new(&config.http).context("Failed to create HTTP client")?;

    match Orchestrator::new(config, Arc::new(client)) {
        Ok(orchestrator) => Ok(orchestrator),
        Err(e @ ExecutionError::InvalidPlan(_)) => {
            eprintln!("Configuration is invalid:");
            for problem in e.problems() {
                eprintln!("  - {}", problem);
            }
            Err(e).context("Run plan rejected")
        }
        Err(e) => Err(e).context("Failed to prepare run"),
    }
}

async fn handle_run(
    config_path: &PathBuf,
    log_level: Option<&String>,
    timeout: Option<Duration>,
    json: bool,
) -> Result<u8> {
    let config = load_config(config_path, log_level, timeout)?;
    volley_logging::init_logging_from_config(&config.logging)?;
    info!("Loaded configuration from {:?}", config_path);

    let orchestrator = build_orchestrator(&config)?;

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received; abandoning in-flight transactions");
                stop.stop();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let result = orchestrator.run().await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise run result")?
        );
    } else {
        print!("{}", summary::render(&result));
    }

    Ok(if result.passed {
        EXIT_PASSED
    } else {
        EXIT_THRESHOLDS_FAILED
    })
}

fn handle_validate(config_path: &PathBuf, log_level: Option<&String>) -> Result<u8> {
    let config = load_config(config_path, log_level, None)?;
    volley_logging::init_logging_from_config(&config.logging)?;

    let orchestrator = build_orchestrator(&config)?;
    println!(
        "Configuration is valid: {} scenarios, {} thresholds",
        orchestrator.scenarios().len(),
        orchestrator.thresholds().len()
    );
    for plan in orchestrator.scenarios() {
        println!(
            "  {} ({}) over {:?}, up to {} workers",
            plan.config.name,
            plan.config.executor,
            plan.config.total_duration(),
            plan.config.max_workers()
        );
    }
    Ok(EXIT_PASSED)
}

fn handle_config_sample(output: Option<&PathBuf>, force: bool) -> Result<u8> {
    let sample = VolleyConfig::generate_sample();

    let Some(output) = output else {
        print!("{}", sample);
        return Ok(EXIT_PASSED);
    };

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(output, sample)
        .with_context(|| format!("Failed to write sample configuration to {:?}", output))?;
    println!("Sample configuration written to {:?}", output);
    Ok(EXIT_PASSED)
}

async fn dispatch(cli: Cli) -> Result<u8> {
    match &cli.command {
        Some(Commands::Run {
            config,
            timeout,
            json,
        }) => handle_run(config, cli.log_level.as_ref(), *timeout, *json).await,
        Some(Commands::Validate { config }) => handle_validate(config, cli.log_level.as_ref()),
        Some(Commands::Config { config_cmd }) => match config_cmd {
            ConfigCommands::Sample { output, force } => {
                handle_config_sample(output.as_ref(), *force)
            }
        },
        None => {
            // If no subcommand is provided, print help
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().context("Failed to print help")?;
            println!();
            Ok(EXIT_PASSED)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

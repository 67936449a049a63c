use anyhow::{Context, Result};
use clap::Parser;
use planner_config::domains::logging::LogLevel;
use planner_config::{ConfigLoader, PlannerConfig};
use planner_http::types::{MissionCompileRequest, DEFAULT_CELL_SIZE};
use planner_logging::{init_logging_from_config, init_simple_tracing};
use planner_runtime::{Supervisor, SupervisorError};
use serde_json::{to_string_pretty, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info, warn};

mod cli;

use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file or environment
fn load_config(config_path: Option<&PathBuf>) -> Result<PlannerConfig> {
    ConfigLoader::new()
        .load(config_path)
        .context("Failed to load configuration")
}

/// Handle configuration validation
fn handle_config_validate(config_file: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_config) => {
            println!("✅ Configuration file is valid");
            Ok(())
        }
        Err(e) => {
            println!("❌ Configuration validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, PlannerConfig::generate_sample())
        .context("Failed to write configuration file")?;

    println!("✅ Configuration generated at: {:?}", output);
    println!(
        "🔧 Validate with: fl-mission config validate --config-file {:?}",
        output
    );
    Ok(())
}

/// Commands that talk to the worker
async fn run_worker_command(supervisor: &Supervisor, command: &Commands) -> Result<(), SupervisorError> {
    let result: JsonValue = match command {
        Commands::Health => to_json(supervisor.health().await?)?,
        Commands::Status => {
            supervisor.start().await?;
            to_json(supervisor.stats().await)?
        }
        Commands::Grid { cell_size } => to_json(supervisor.build_grid(*cell_size).await?)?,
        Commands::Compile {
            file,
            step,
            snap_to_grid,
            grid_cell_size,
        } => {
            let mission_text = fs::read_to_string(file).map_err(|e| {
                SupervisorError::Domain(planner_http::ServiceFailure::rejected_locally(format!(
                    "Cannot read mission file {}: {}",
                    file.display(),
                    e
                )))
            })?;

            let mut request = MissionCompileRequest::new(mission_text).with_step(*step);
            if *snap_to_grid {
                request = request.snapped_to_grid(grid_cell_size.unwrap_or(DEFAULT_CELL_SIZE));
            }
            to_json(supervisor.compile_mission(&request).await?)?
        }
        Commands::Boundary => to_json(supervisor.cache_boundary().await?)?,
        Commands::Config { .. } => return Ok(()),
    };

    println!("{}", to_string_pretty(&result).unwrap_or_else(|_| result.to_string()));
    Ok(())
}

fn to_json(value: impl serde::Serialize) -> Result<JsonValue, SupervisorError> {
    serde_json::to_value(value).map_err(|e| {
        SupervisorError::Protocol(planner_http::BridgeError::Decode(e.to_string()))
    })
}

/// Print a supervisor error; validation problems one per line
fn report(err: &SupervisorError) {
    match err {
        SupervisorError::Domain(failure) if !failure.errors.is_empty() => {
            eprintln!("❌ {}", failure.message);
            for issue in &failure.errors {
                eprintln!("   {}", issue);
            }
        }
        other => eprintln!("❌ {}", other),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Config { config_cmd } = &cli.command {
        return match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
        }
        .map(|_| ExitCode::SUCCESS);
    }

    let supervisor = Supervisor::from_config(&config_for(&cli)?)
        .context("Failed to prepare the worker launch")?;

    let outcome = tokio::select! {
        result = run_worker_command(&supervisor, &cli.command) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping worker");
            None
        }
    };

    supervisor.shutdown().await;

    match outcome {
        Some(Ok(())) => Ok(ExitCode::SUCCESS),
        Some(Err(e)) => {
            error!("Command failed: {}", e);
            report(&e);
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::from(130)),
    }
}

/// Configuration with the command line log level applied
fn config_for(cli: &Cli) -> Result<PlannerConfig> {
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = LogLevel::from_str(level).map_err(anyhow::Error::msg)?;
    }
    Ok(config)
}

/// Logging from configuration, or plain console output when it cannot load.
/// Configuration errors surface from run(), after logging is up.
fn init_logging(cli: &Cli) -> Result<()> {
    match config_for(cli) {
        Ok(config) => init_logging_from_config(&config.logging),
        Err(_) => init_simple_tracing(cli.log_level.as_deref().unwrap_or("info")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    info!("fl-mission starting");
    run(cli).await
}

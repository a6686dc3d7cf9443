//! Barrage CLI main entry point

use anyhow::Result;
use barrage_config::BarrageConfig;
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};

/// Initialize logging from configuration, letting `--log-level` override it
fn init_logging(config: &BarrageConfig, log_level: Option<&String>) -> Result<()> {
    let mut logging_config = config.logging.clone();
    if let Some(level_str) = log_level {
        match level_str.parse() {
            Ok(level) => logging_config.level = level,
            Err(e) => eprintln!("{}, keeping configured level", e),
        }
    }

    if let Err(e) = barrage_logging::init_logging_from_config(&logging_config) {
        eprintln!(
            "Failed to initialize structured logging: {}, falling back to simple tracing",
            e
        );
        barrage_logging::init_simple_tracing(&logging_config.level.to_string())?;
    }
    debug!("Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands work on their own file and only need console logging
    if let Some(Commands::Config { config_cmd }) = &cli.command {
        barrage_logging::init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
        return match config_cmd {
            ConfigCommands::Validate { config_file } => {
                commands::handle_config_validate(config_file)
            }
            ConfigCommands::Generate { output, force } => {
                commands::handle_config_generate(output, *force)
            }
        };
    }

    let config = commands::load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_ref())?;
    info!("Barrage CLI starting");

    match &cli.command {
        Some(Commands::Run { input, output }) => {
            commands::run_command(&config, input, output.as_ref()).await
        }
        Some(Commands::Chain { input, output }) => {
            commands::chain_command(&config, input, output.as_ref()).await
        }
        Some(Commands::Config { .. }) => Ok(()),
        None => {
            warn!("No command specified");
            println!("No command specified. Use --help to see available commands.");
            Ok(())
        }
    }
}

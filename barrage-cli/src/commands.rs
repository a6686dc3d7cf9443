//! Command handlers

use anyhow::{Context, Result};
use barrage_config::{BarrageConfig, ConfigLoader};
use barrage_engine::{ChainRequest, LoadTestRequest, LoadTestRunner};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Load configuration from file or use defaults
pub fn load_config(config_path: Option<&PathBuf>) -> Result<BarrageConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Parse a JSON document from a file, or from stdin when the path is `-`
fn read_input<T: DeserializeOwned>(input: &Path) -> Result<T> {
    let content = if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read input from stdin")?;
        buffer
    } else {
        fs::read_to_string(input).context(format!("Failed to read input file {:?}", input))?
    };

    serde_json::from_str(&content).context(format!("Invalid JSON in {:?}", input))
}

/// Write a JSON document to a file or stdout
fn write_output<T: Serialize>(value: &T, output: Option<&PathBuf>, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create output directory")?;
            }
            fs::write(path, json + "\n").context(format!("Failed to write {:?}", path))?;
            info!("Wrote result to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Run a load test and print its report
pub async fn run_command(
    config: &BarrageConfig,
    input: &Path,
    output: Option<&PathBuf>,
) -> Result<()> {
    let request: LoadTestRequest = read_input(input)?;
    let runner = LoadTestRunner::new(config);

    let response = runner.run(&request).await;
    write_output(&response, output, config.output.pretty)?;

    match response.error() {
        Some(e) => Err(anyhow::anyhow!("Load test failed: {}", e)),
        None => Ok(()),
    }
}

/// Run a request chain and print its result
pub async fn chain_command(
    config: &BarrageConfig,
    input: &Path,
    output: Option<&PathBuf>,
) -> Result<()> {
    let request: ChainRequest = read_input(input)?;
    let runner = LoadTestRunner::new(config);

    let result = runner
        .run_chain(&request)
        .await
        .context("Failed to run chain")?;
    write_output(&result, output, config.output.pretty)?;

    if result.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Chain failed after {} of {} steps",
            result.steps.len(),
            request.steps.len()
        ))
    }
}

/// Handle configuration validation
pub fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_config) => {
            println!("Configuration file is valid");
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed: {}", e);
            error!("Configuration validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handle configuration generation
pub fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    info!("Generating configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, BarrageConfig::generate_sample())
        .context(format!("Failed to write configuration to {:?}", output))?;
    println!("Configuration written to {:?}", output);
    Ok(())
}

//! Breaking Bias command-line driver.
//!
//! Runs one dashboard request against a transaction file and prints the
//! JSON response:
//!
//!   breaking-bias request /getPastDataUnbiased '{"filtering_factor": ["Female", "NoFilter"]}'
//!   breaking-bias values Race
//!   breaking-bias routes

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use breaking_bias::config::DEFAULT_CONFIG_PATH;
use breaking_bias::data::loader::load_file;
use breaking_bias::{AppConfig, MovingAverageForecaster, PipelineError, Route, SeriesService};
use clap::{Parser, Subcommand};
use log::{info, warn};

/// Serve transaction fraud/bias series from a data file
#[derive(Parser)]
#[command(name = "breaking-bias")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Transaction data file; overrides `data.path` from the config
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one request, e.g. `request /getPastData '{"filtering_factor": [null, null]}'`
    Request {
        /// Route path
        route: String,
        /// JSON request body
        body: String,
    },
    /// List the distinct values of a column (filter options)
    Values {
        column: String,
    },
    /// List the available routes
    Routes,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let client_error = err
                .downcast_ref::<PipelineError>()
                .is_some_and(PipelineError::is_client_error);
            eprintln!("error: {err:#}");
            if client_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from_path(&cli.config)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if let Some(path) = cli.data {
        config.data.path = path;
    }

    match cli.command {
        Commands::Routes => {
            for route in Route::ALL {
                println!("{route}");
            }
        }
        Commands::Values { column } => {
            let records = load_file(&config.data.path)?;
            let values: Vec<String> = records
                .distinct_values(&column)?
                .iter()
                .map(|v| v.to_string())
                .collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Commands::Request { route, body } => {
            let route = Route::from_path(&route)
                .ok_or_else(|| PipelineError::input(format!("unknown route '{route}'")))?;
            let body: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| PipelineError::input(format!("request body is not JSON: {e}")))?;

            let records = load_file(&config.data.path)
                .with_context(|| format!("loading {}", config.data.path.display()))?;
            let service = SeriesService::new(
                records,
                MovingAverageForecaster::new(config.forecast.window),
                config.forecast.max_points,
            );

            match service.handle(route, &body) {
                Ok(response) => {
                    info!("{route} answered");
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Err(err) => {
                    warn!("{route} failed: {err}");
                    return Err(err.into());
                }
            }
        }
    }
    Ok(())
}

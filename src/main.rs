//! Command-line front end: JSON request file in, JSON result out.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use commodity_valuator::commands::{self, BacktestRequest, ForecastRequest, ValuationRequest};
use commodity_valuator::config::AppConfig;
use commodity_valuator::telemetry::{init_subscriber, level_for_verbosity};

#[derive(Parser)]
#[command(name = "commodity-valuator")]
#[command(about = "Commodity price forecasting and storage contract valuation", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (JSON); defaults to ./config.json when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model and forecast future prices
    Forecast {
        /// Request file with `prices` and optional `model`, `horizon`, `config`
        #[arg(short, long)]
        input: PathBuf,

        /// Model id or name (sma, ets, gbt, arima, prophet, regression, ensemble)
        #[arg(short, long)]
        model: Option<String>,

        /// Number of periods to forecast
        #[arg(long)]
        horizon: Option<usize>,

        /// Output file (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Value a storage contract by Monte Carlo simulation
    Value {
        /// Request file with `prices` and optional `contract`, `simulation`
        #[arg(short, long)]
        input: PathBuf,

        /// Number of simulated paths
        #[arg(short = 'n', long)]
        simulations: Option<usize>,

        /// Horizon in days (30 to 365)
        #[arg(long)]
        horizon: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Sample paths to include for charting
        #[arg(long, default_value = "0")]
        samples: usize,

        /// Output file (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List forecasting models and whether this build includes them
    Models,

    /// Score a model on a chronological holdout
    Backtest {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        model: Option<String>,

        /// Share of the history held out (0.1 to 0.3)
        #[arg(long)]
        test_size: Option<f64>,

        /// Rank every available model instead of scoring one
        #[arg(long)]
        rank: bool,

        /// Output file (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse a request file, filling top-level keys it leaves out from `defaults`.
fn read_request<T: DeserializeOwned>(path: &Path, defaults: Vec<(&str, Value)>) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let mut value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse request file {}", path.display()))?;

    let Some(object) = value.as_object_mut() else {
        bail!("Request file {} must contain a JSON object", path.display());
    };
    for (key, default) in defaults {
        object.entry(key).or_insert(default);
    }
    serde_json::from_value(value).context("Request does not match the expected shape")
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    init_subscriber(&level_for_verbosity(cli.verbose, &config.app.log_level));
    tracing::debug!(app = %config.app.name, "Configuration loaded");

    match cli.command {
        Commands::Forecast {
            input,
            model,
            horizon,
            output,
        } => {
            let mut request: ForecastRequest = read_request(
                &input,
                vec![
                    ("config", serde_json::to_value(config.forecasting.forecast_config())?),
                    ("horizon", Value::from(config.forecasting.default_horizon)),
                ],
            )?;
            if model.is_some() {
                request.model = model;
            }
            if request.model.is_none() {
                request.model = config.forecasting.default_model.map(|k| k.id().to_string());
            }
            if horizon.is_some() {
                request.horizon = horizon;
            }

            let points = request.prices.len();
            if points < config.forecasting.min_history_days {
                tracing::warn!(
                    points,
                    recommended = config.forecasting.min_history_days,
                    "History is shorter than recommended"
                );
            }

            let response = commands::run_forecast(request).map_err(anyhow::Error::msg)?;
            emit(&response, output.as_deref())
        }

        Commands::Value {
            input,
            simulations,
            horizon,
            seed,
            samples,
            output,
        } => {
            let mut request: ValuationRequest = read_request(
                &input,
                vec![
                    ("contract", serde_json::to_value(config.valuation.contract)?),
                    ("simulation", serde_json::to_value(config.valuation.simulation)?),
                ],
            )?;
            if let Some(n) = simulations {
                request.simulation.n_simulations = n;
            }
            if let Some(h) = horizon {
                request.simulation.horizon_days = h;
            }
            if let Some(s) = seed {
                request.simulation.seed = s;
            }
            if samples > 0 {
                request.sample_paths = samples;
            }

            let response = commands::value_contract(request).map_err(anyhow::Error::msg)?;
            emit(&response, output.as_deref())
        }

        Commands::Models => emit(&commands::list_models(), None),

        Commands::Backtest {
            input,
            model,
            test_size,
            rank,
            output,
        } => {
            let mut request: BacktestRequest = read_request(
                &input,
                vec![
                    ("config", serde_json::to_value(config.forecasting.forecast_config())?),
                    ("test_size", Value::from(config.forecasting.test_size)),
                ],
            )?;
            if model.is_some() {
                request.model = model;
            }
            if test_size.is_some() {
                request.test_size = test_size;
            }

            if rank {
                let scores = commands::rank_models(request).map_err(anyhow::Error::msg)?;
                emit(&scores, output.as_deref())
            } else {
                let report = commands::run_backtest_command(request).map_err(anyhow::Error::msg)?;
                emit(&report, output.as_deref())
            }
        }
    }
}

mod config;

use clap::{Parser, Subcommand};
use config::{Config, LoggingConfig, MetricsConfig, SettingsError};
use gate::cache::ResultCache;
use gate::config::{GateConfig, ValidationError};
use gate::errors::StoreError;
use gate::metrics_defs::ALL_METRICS;
use gate::{LaunchController, LaunchOutcome, store};
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::MetricType;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gatekeeper", about = "Resolve the gate destination for a cold start")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run a launch: cached destination if present, otherwise resolve it.
    Resolve {
        #[arg(short, long)]
        config: PathBuf,
        /// Ignore the cached destination and always resolve.
        #[arg(long)]
        fresh: bool,
    },
    /// Print the cached destination without touching the network.
    Cached {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl CliCommand {
    fn config_path(&self) -> &PathBuf {
        match self {
            CliCommand::Resolve { config, .. } | CliCommand::Cached { config } => config,
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("invalid gate config: {0}")]
    Validation(#[from] ValidationError),
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(cli.command.config_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(config.logging.as_ref());

    match run(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "gatekeeper failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: CliCommand, config: Config) -> Result<ExitCode, CliError> {
    if let Some(ref metrics) = config.metrics {
        init_metrics(metrics)?;
    }

    // Launch work runs sequentially on one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match command {
        CliCommand::Resolve { fresh, .. } => runtime.block_on(resolve(&config.gate, fresh)),
        CliCommand::Cached { .. } => cached(&config.gate),
    }
}

async fn resolve(gate: &GateConfig, fresh: bool) -> Result<ExitCode, CliError> {
    let controller = LaunchController::from_config(gate)?;

    let outcome = if fresh {
        match controller.resolve().await {
            Ok(endpoint) => LaunchOutcome::Remote(endpoint),
            Err(e) => LaunchOutcome::Offline(e),
        }
    } else {
        controller.launch().await
    };
    // Background reports would be dropped with the runtime
    controller.flush_reports().await;

    match outcome {
        LaunchOutcome::Cached(url) => {
            println!("{url}");
        }
        LaunchOutcome::Remote(endpoint) => {
            tracing::info!(strategy = endpoint.strategy.as_str(), "Resolved fresh destination");
            println!("{}", endpoint.url);
        }
        LaunchOutcome::Offline(e) => {
            tracing::warn!(error = %e, "No destination, falling back to offline mode");
            return Ok(ExitCode::from(2));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cached(gate: &GateConfig) -> Result<ExitCode, CliError> {
    let cache = ResultCache::new(store::from_config(&gate.store));

    match cache.load()? {
        Some(url) => {
            println!("{url}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("no cached destination");
            Ok(ExitCode::from(2))
        }
    }
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let level = logging.map_or("info", |l| l.level.as_str());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let guard = logging
        .and_then(|l| l.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(None)
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    for def in ALL_METRICS {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }

    Ok(())
}

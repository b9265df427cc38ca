use clap::{Args, Parser};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use crm::{CrmError, HubSpotClient};
use gateway::errors::GatewayError;
use lifecycle::Synchronizer;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe_all;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod config;

const METRICS_PREFIX: &str = "relay";

/// Relays storefront contact and purchase events to the CRM.
#[derive(Parser)]
#[command(name = "relay", version)]
enum CliCommand {
    /// Serve the storefront gateway.
    Run(ConfigArgs),
    /// Load and validate the config, including environment overrides.
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not install metrics recorder: {0}")]
    Metrics(String),
    #[error("could not build CRM client: {0}")]
    Crm(#[from] CrmError),
    #[error("gateway failed: {0}")]
    Gateway(#[from] GatewayError),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let result = match &cli {
        CliCommand::Run(args) => run(&args.config_path),
        CliCommand::CheckConfig(args) => check_config(&args.config_path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Reports config problems without touching logging, metrics or the network.
fn check_config(config_path: &Path) -> Result<(), RelayError> {
    Config::load(config_path)?;
    println!("config ok: {}", config_path.display());
    Ok(())
}

fn run(config_path: &Path) -> Result<(), RelayError> {
    let config = Config::load(config_path)?;
    let _sentry = init_logging(config.logging.as_ref());
    init_metrics(config.metrics.as_ref())?;

    let crm = HubSpotClient::new(&config.crm)?;
    let synchronizer = Synchronizer::new(Arc::new(crm), &config.lifecycle);
    tracing::info!(
        crm = %config.crm.base_url,
        recheck_delay = ?config.lifecycle.recheck_delay(),
        "starting relay"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(gateway::run(config.gateway, synchronizer))?;
    Ok(())
}

/// Installs the global tracing subscriber. Sentry receives error events when configured;
/// the returned guard flushes it on drop.
fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = config.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

/// Metrics stay no-ops unless a statsd target is configured.
fn init_metrics(config: Option<&MetricsConfig>) -> Result<(), RelayError> {
    let Some(config) = config else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| RelayError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| RelayError::Metrics(e.to_string()))?;

    for defs in [
        crm::metrics_defs::ALL_METRICS,
        lifecycle::metrics_defs::ALL_METRICS,
        gateway::metrics_defs::ALL_METRICS,
    ] {
        describe_all(defs);
    }
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}

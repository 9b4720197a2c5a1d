mod config;

use clap::Parser;
use config::{Config, LoggingConfig, MetricsConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(about = "Path-prefix reverse proxy for GitHub, TMDB and Docker Hub")]
struct Cli {
    /// YAML config file. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port of the public listener. Overrides the config file.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.proxy.listener.port = port;
    }

    let _sentry = init_logging(config.common.logging.as_ref());
    init_metrics(config.common.metrics.as_ref());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting proxy");
    match runtime.block_on(proxy::run(config.proxy)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Proxy exited");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.and_then(
        |logging| match logging.sentry_dsn.parse::<sentry::types::Dsn>() {
            Ok(dsn) => Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            })),
            Err(e) => {
                // the subscriber is not installed yet
                eprintln!("invalid sentry_dsn, error reporting disabled: {e}");
                None
            }
        },
    );

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .init();

    guard
}

fn init_metrics(metrics_config: Option<&MetricsConfig>) {
    let Some(metrics_config) = metrics_config else {
        return;
    };

    let recorder = match metrics_exporter_statsd::StatsdBuilder::from(
        metrics_config.statsd_host.as_str(),
        metrics_config.statsd_port,
    )
    .build(Some("multiproxy"))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build statsd recorder, metrics disabled");
            return;
        }
    };

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("A metrics recorder is already installed");
        return;
    }

    shared::metrics_defs::describe_all(proxy::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "Sending metrics to statsd"
    );
}

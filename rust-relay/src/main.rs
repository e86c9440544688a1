//! Hookrelay agent - drains the webhook queue into a local HTTP service.
//!
//! Reads its configuration from the environment, connects to SQS and runs
//! until SIGINT/SIGTERM, then drains in-flight deliveries before exiting.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::{HttpTarget, LogFormat, Relay, RelayConfig, SqsQueue};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = RelayConfig::from_env();
    // A config that failed to load still gets the default format so the
    // error below is reported through the same pipeline.
    init_logging(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or(LogFormat::Json),
    );

    info!(version = env!("CARGO_PKG_VERSION"), "relay_starting");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "relay_config_invalid");
            return Err(e).context("Invalid relay configuration");
        }
    };

    let queue = SqsQueue::connect(&config).await;
    let target = HttpTarget::new(config.request_timeout).context("Failed to create HTTP client")?;

    let relay = Relay::new(config, Arc::new(queue), Arc::new(target))
        .context("Invalid relay configuration")?;

    tokio::spawn(cancel_on_signal(relay.cancellation_token()));

    let report = relay.run().await;
    if !report.drained_cleanly() {
        error!(abandoned = report.abandoned, "relay_exit_unclean");
    }
    Ok(report.exit_code())
}

/// Structured JSON, or compact lines for `LogFormat::Pretty`.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(fmt::layer().compact()).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true))
            .init(),
    }
}

/// Cancel `token` on the first SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "sigint_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_stopping");
    token.cancel();
}

use anyhow::Context;
use lifeline::config::{Config, LogFormat};
use lifeline::lifecycle::{
    forward_signals, install_fault_handler, ExitOutcome, LifecycleCoordinator, LifecycleError,
    SignalListener,
};
use lifeline::server::{build_router, create_metrics, AppState, InFlightTracker};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing (`RUST_LOG` honoured, default `info`)
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Wire everything up and run until the coordinator reaches STOPPED
async fn run(config: Config) -> anyhow::Result<ExitOutcome> {
    info!(
        port = config.port,
        environment = %config.environment,
        instance = %config.instance_id,
        grace_period_secs = config.grace_period.as_secs(),
        "Starting lifeline"
    );

    let metrics = create_metrics().context("Failed to create metrics registry")?;
    let tracker = InFlightTracker::new();
    let coordinator = LifecycleCoordinator::new(
        config.grace_period,
        Arc::new(tracker.clone()),
        metrics.clone(),
    );

    install_fault_handler(coordinator.clone());

    // Register before binding so a signal during startup is not lost
    let signals = SignalListener::register().map_err(LifecycleError::Signal)?;
    tokio::spawn(forward_signals(signals, coordinator.clone()));

    let port = config.port;
    let state = AppState::new(coordinator.clone(), tracker, metrics, config);
    if let Err(e) = coordinator.start(port, build_router(state)).await {
        error!(error = %e, "Fatal startup error");
        // A shutdown that completed before the bind keeps its own outcome
        return Ok(coordinator
            .outcome()
            .unwrap_or(ExitOutcome::StartupFailed));
    }

    let outcome = coordinator.wait_stopped().await;
    if outcome == ExitOutcome::Clean {
        // Let the last responses reach their clients before exiting
        coordinator.finish_serving().await;
    }
    Ok(outcome)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or(LogFormat::Text),
    );

    let outcome = match config {
        Ok(config) => match run(config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = ?e, "Fatal startup error");
                ExitOutcome::StartupFailed
            }
        },
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            ExitOutcome::StartupFailed
        }
    };

    info!(
        outcome = outcome.as_str(),
        exit_code = outcome.exit_code(),
        "lifeline stopped"
    );
    std::process::exit(outcome.exit_code());
}

//! Process bootstrap: logging, signals and the service task set.

use std::time::Duration;

use futures::future::join_all;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::{http, Config, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
/// Time in-flight requests get after SIGTERM before shutdown starts
const REQUEST_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to install signal handlers: {0}")]
    Signals(std::io::Error),
    #[error("error creating server state: {0}")]
    State(#[from] crate::StateSetupError),
    #[error("failed to shut down within {} seconds", FINAL_SHUTDOWN_TIMEOUT.as_secs())]
    ShutdownTimeout,
}

/// Install the global subscriber: a compact formatter on a non-blocking
/// stdout writer, filtered by `RUST_LOG` with `level` as the default.
/// Logs are flushed when the returned guard drops.
pub fn init_tracing(level: tracing::Level) -> WorkerGuard {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stdout_layer).init();
    guard
}

/// Registers a panic hook that logs panics using the `tracing` crate
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

fn report_build_info() {
    let build = common::prelude::build_info();
    tracing::info!(
        version = build.version,
        repo_version = build.repo_version,
        build_profile = build.build_profile,
        features = build.build_features,
        "augury starting up"
    );
}

/// A watch that fires on SIGINT, or on SIGTERM after the grace period.
/// The returned task completes when it has fired.
fn shutdown_signal() -> Result<(JoinHandle<()>, watch::Receiver<()>), ProcessError> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(ProcessError::Signals)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(ProcessError::Signals)?;
    let (tx, rx) = watch::channel(());

    let waiter = tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("SIGINT received, shutting down"),
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, shutting down in {:?}", REQUEST_GRACE_PERIOD);
                tokio::time::sleep(REQUEST_GRACE_PERIOD).await;
            }
        }
        let _ = tx.send(());
    });
    Ok((waiter, rx))
}

/// Run the relay and gateway until a shutdown signal arrives. Expects
/// tracing to be initialised already.
pub async fn spawn_service(config: &Config) -> Result<(), ProcessError> {
    register_panic_logger();
    report_build_info();

    let (waiter, shutdown_rx) = shutdown_signal()?;
    let state = ServiceState::from_config(config).await?;
    tracing::info!(
        store = %config.store_path.display(),
        posters = config.posters.len(),
        "state ready"
    );

    let mut handles = Vec::new();

    let listen_addr = config.listen_addr;
    let log_level = config.log_level;
    let max_upload_bytes = config.max_upload_bytes;
    let http_rx = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = http::run(listen_addr, log_level, max_upload_bytes, state, http_rx).await {
            tracing::error!("HTTP server error: {}", e);
        }
    }));

    let _ = waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(handles))
        .await
        .is_err()
    {
        return Err(ProcessError::ShutdownTimeout);
    }
    tracing::info!("augury stopped");
    Ok(())
}

pub mod core;
pub mod error_handler;
pub mod routes;
pub mod telemetry;

use std::time::Duration;

use review_pipeline::Pipeline;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

use crate::core::{app_state::AppState, config::AppConfig};
use crate::error_handler::AppError;

const PRUNE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

pub async fn start() -> Result<(), AppError> {
    let cfg = AppConfig::from_env()?;
    let state = AppState::build(&cfg)?;

    // Runs journaled events that were accepted but never finished.
    match state.pipeline.recover().await {
        Ok(0) => {}
        Ok(n) => info!(events = n, "replaying unfinished events"),
        Err(e) => warn!(error = %e, "event recovery failed"),
    }
    spawn_history_pruning(state.pipeline.clone());

    let app = routes::router(state);

    let listener = TcpListener::bind(&cfg.address)
        .await
        .map_err(AppError::Bind)?;
    info!(address = %cfg.address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("server stopped");
    Ok(())
}

/// Prunes completed run history now and every [`PRUNE_INTERVAL`].
fn spawn_history_pruning(pipeline: Pipeline) {
    let Some(retention) = pipeline.history_retention() else {
        return;
    };
    info!(retention_secs = retention.as_secs(), "run history pruning enabled");
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tick.tick().await;
            if let Err(e) = pipeline.prune_history().await {
                warn!(error = %e, "run history pruning failed");
            }
        }
    });
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// iov-twin/crates/sim_orchestrator/src/main.rs
mod config;
mod metrics;
mod state;
mod tasking;

use crate::config::{Args, FeedKind, Settings};
use crate::metrics::Metrics;
use crate::state::CanonicalState;
use crate::tasking::{EpochRunner, EpochStatus, StateSink};
use anyhow::Context;
use clap::Parser;
use iov_twin::{ObservationSource, Pipeline, ReplayFeed, StandaloneMobility};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::load(Args::parse())?;
    tracing::info!(settings = ?settings, "Loaded configuration");

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let metrics = Arc::new(Metrics::new());
    let (state, _mirror_rx) = CanonicalState::new(settings.history_capacity);

    let feed: Box<dyn ObservationSource> = match settings.feed {
        FeedKind::Standalone => Box::new(StandaloneMobility::new(
            settings.mobility.clone(),
            &settings.twin.topology,
            settings.twin.seed,
        )),
        FeedKind::Replay => {
            let path = settings
                .replay_path
                .as_ref()
                .context("Replay feed selected without a trace path")?;
            Box::new(ReplayFeed::open(path).context("Failed to open replay trace")?)
        }
    };
    tracing::info!(feed = feed.name(), session_id = %state.session_id, "Observation feed ready");

    let runner = EpochRunner {
        pipeline: Pipeline::new(&settings.twin).context("Failed to build epoch pipeline")?,
        feed,
        sink: StateSink::new(state.clone(), metrics.clone()),
    };

    // Spawn the epoch loop
    let mut epoch_handle = spawn_epoch_loop(
        runner,
        settings.tick_interval,
        settings.steps,
        shutdown_rx.clone(),
    );

    // Spawn the metrics and reporting server
    let http_handle = {
        let router = metrics.router(state.clone());
        let addr = settings.http_listen_addr;
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
            tracing::info!(addr = %addr, "Metrics and reporting server started");
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = rx.changed().await;
                })
                .await?;
            Ok::<(), anyhow::Error>(())
        })
    };

    tracing::info!("All services started. Awaiting shutdown signal...");

    let mut finished = None;
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received. Terminating services...");
        }
        res = &mut epoch_handle => {
            finished = Some(res);
        }
    }

    // The drop of the sender will cause all receivers to receive the shutdown signal.
    drop(shutdown_tx);

    let epochs = match finished {
        Some(res) => epoch_outcome(res),
        None => epoch_outcome(epoch_handle.await),
    };
    match http_handle.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task failed."),
        Err(e) => tracing::error!(error = %e, "HTTP server task panicked."),
        Ok(Ok(())) => {}
    }
    // A failed epoch loop aborts the run without writing results.
    epochs.context("Epoch loop aborted")?;

    if let Some(path) = &settings.results_path {
        let history = state.history();
        let json = serde_json::to_string_pretty(&history).context("Failed to serialize results")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results to '{}'", path.display()))?;
        tracing::info!(path = %path.display(), epochs = history.len(), "Results written");
    }

    tracing::info!("Orchestrator shut down gracefully.");
    Ok(())
}

/// Runs one epoch per tick on a blocking thread until the step budget, the
/// end of the feed, or shutdown.
fn spawn_epoch_loop(
    mut runner: EpochRunner,
    tick_interval: Duration,
    steps: Option<u64>,
    mut shutdown_rx: watch::Receiver<()>,
) -> JoinHandle<anyhow::Result<u64>> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::info!("Epoch loop stopping on shutdown.");
                    break;
                }
                _ = interval.tick() => {
                    if steps.is_some_and(|s| runner.epochs() >= s) {
                        tracing::info!(epochs = runner.epochs(), "Step budget reached.");
                        break;
                    }
                    let (returned, status) = tokio::task::spawn_blocking(move || {
                        let status = runner.run_epoch();
                        (runner, status)
                    })
                    .await
                    .context("Epoch worker panicked")?;
                    runner = returned;
                    if status? == EpochStatus::FeedExhausted {
                        tracing::info!(epochs = runner.epochs(), "Observation feed exhausted.");
                        break;
                    }
                }
            }
        }
        Ok(runner.epochs())
    })
}

/// Logs how the epoch loop ended and folds a panic into its error.
fn epoch_outcome(res: Result<anyhow::Result<u64>, tokio::task::JoinError>) -> anyhow::Result<u64> {
    match res {
        Ok(Ok(epochs)) => {
            tracing::info!(epochs, "Epoch loop completed.");
            Ok(epochs)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Epoch loop failed.");
            Err(e)
        }
        Err(e) => {
            tracing::error!(error = %e, "Epoch loop panicked.");
            Err(anyhow::Error::new(e).context("Epoch worker panicked"))
        }
    }
}

/// Listens for OS shutdown signals (SIGINT, SIGTERM) and resolves when one is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

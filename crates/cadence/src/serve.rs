// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cadence serve` command implementation.
//!
//! Runs the dispatcher, sequence engine, and radar scheduler on independent
//! intervals until SIGINT/SIGTERM. Each loop finishes its current pass
//! before exiting. Each pass logs its own summary.

use std::future::Future;
use std::time::Duration;

use cadence_config::CadenceConfig;
use cadence_core::CadenceError;
use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::App;
use crate::shutdown;

/// Runs the engine loops until a shutdown signal arrives.
pub async fn run_serve(config: CadenceConfig) -> Result<(), CadenceError> {
    let app = App::open(config.clone()).await?;
    let dispatcher = app.dispatcher()?;
    let radar = match app.radar() {
        Ok(radar) => Some(radar),
        Err(e) => {
            info!(reason = %e, "radar loop disabled");
            None
        }
    };

    info!(
        name = %config.engine.name,
        database = %config.storage.database_path,
        "cadence serve starting"
    );

    let cancel = shutdown::install_signal_handler();
    let mut loops = JoinSet::new();

    loops.spawn(periodic(
        "dispatch",
        Duration::from_secs(config.dispatch.interval_secs),
        cancel.clone(),
        move || {
            let dispatcher = dispatcher.clone();
            async move {
                dispatcher.tick(Utc::now()).await;
            }
        },
    ));

    let engine = app.engine.clone();
    loops.spawn(periodic(
        "sequences",
        Duration::from_secs(config.sequence.interval_secs),
        cancel.clone(),
        move || {
            let engine = engine.clone();
            async move {
                engine.run_due(Utc::now()).await;
            }
        },
    ));

    if let Some(radar) = radar {
        loops.spawn(periodic(
            "radar",
            Duration::from_secs(config.radar.interval_secs),
            cancel.clone(),
            move || {
                let radar = radar.clone();
                async move {
                    radar.pulse(Utc::now()).await;
                }
            },
        ));
    }

    while let Some(joined) = loops.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "engine loop aborted");
            cancel.cancel();
        }
    }

    log_heap_usage();
    app.close().await?;
    info!("cadence serve shutdown complete");
    Ok(())
}

/// Calls `job` every `every` until `cancel` fires. A pass that overruns the
/// interval delays the next one instead of bursting to catch up.
async fn periodic<F, Fut>(name: &'static str, every: Duration, cancel: CancellationToken, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(task = name, interval_secs = every.as_secs(), "loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => job().await,
            _ = cancel.cancelled() => {
                info!(task = name, "loop shutting down");
                break;
            }
        }
    }
}

#[cfg(not(target_env = "msvc"))]
fn log_heap_usage() {
    let _ = tikv_jemalloc_ctl::epoch::advance();
    let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
    let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
    debug!(
        allocated_mb = allocated / (1024 * 1024),
        resident_mb = resident / (1024 * 1024),
        "heap usage at shutdown"
    );
}

#[cfg(target_env = "msvc")]
fn log_heap_usage() {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn periodic_runs_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let counter = runs.clone();
        let handle = tokio::spawn(periodic("test", Duration::from_secs(10), cancel.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // First tick fires immediately, then at 10s and 20s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_token_stops_loop_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        periodic("test", Duration::from_secs(3600), cancel, || async {}).await;
    }
}

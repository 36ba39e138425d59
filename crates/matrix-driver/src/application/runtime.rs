//! Async glue between the Tokio runtime and the blocking device operations.
//!
//! Device work runs on plain threads and blocks on [`StopSignal`]s.  The
//! binary runs that work on Tokio's blocking pool and races it against a
//! shutdown future (normally Ctrl-C).  When shutdown wins, the signal is
//! fired with [`StopReason::Interrupted`] and the work is awaited again so
//! its cleanup can finish before the process exits.

use std::future::Future;

use tracing::info;

use matrix_core::{StopReason, StopSignal};

/// Runs `work` on the blocking pool until it returns, interrupting it via
/// `stop` if `shutdown` resolves first.
///
/// # Errors
///
/// Returns an error if the blocking task panicked or was cancelled.
pub async fn run_until_shutdown<T, F, S>(stop: StopSignal, shutdown: S, work: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(StopSignal) -> T + Send + 'static,
    S: Future<Output = ()>,
{
    let worker_signal = stop.clone();
    let mut worker = tokio::task::spawn_blocking(move || work(worker_signal));

    tokio::select! {
        result = &mut worker => return Ok(result?),
        () = shutdown => {
            info!("shutdown requested, interrupting device work");
            stop.stop(StopReason::Interrupted);
        }
    }

    Ok(worker.await?)
}

/// Resolves on Ctrl-C.  If the handler cannot be installed it never resolves.
pub async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("could not listen for Ctrl-C; interrupts are disabled");
        std::future::pending::<()>().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

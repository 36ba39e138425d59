//! Periodic keep-alive pings.
//!
//! The display firmware goes to sleep after about a minute without traffic.
//! While keep-alive is enabled, a background worker sends a wake command
//! every `interval` (the first one immediately) so static content stays lit.
//!
//! Disabling is non-blocking: the flag flips at once and the worker is told
//! to stop, but its thread is only joined on the next enable (or on drop).
//! That keeps guard cleanup fast while still guaranteeing that two worker
//! loops never run at the same time.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use matrix_core::{StopReason, StopSignal};

/// Default time between pings.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(50);

/// Boxed error returned by a [`Ping`] implementation.
pub type PingError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for keep-alive control.
#[derive(Debug, Error)]
pub enum KeepAliveError {
    #[error("failed to spawn keep-alive worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Sends one keep-alive command.
pub trait Ping: Send + Sync {
    fn ping(&self) -> Result<(), PingError>;
}

struct Worker {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct KeepAliveState {
    enabled: bool,
    active: Option<Worker>,
    retiring: Option<JoinHandle<()>>,
}

/// Keep-alive control for one device.
pub struct KeepAliveService {
    pinger: Arc<dyn Ping>,
    interval: Duration,
    label: String,
    state: Mutex<KeepAliveState>,
}

impl KeepAliveService {
    /// `label` names the worker thread (`keep-alive-<label>`).
    pub fn new(pinger: Arc<dyn Ping>, interval: Duration, label: impl Into<String>) -> Self {
        Self {
            pinger,
            interval,
            label: label.into(),
            state: Mutex::new(KeepAliveState::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Turns keep-alive on or off.  Setting the current value is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`KeepAliveError::Spawn`] if the worker thread cannot be
    /// started; keep-alive then stays disabled.
    pub fn set_enabled(&self, enable: bool) -> Result<(), KeepAliveError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.enabled == enable {
            return Ok(());
        }

        if enable {
            if let Some(retiring) = state.retiring.take() {
                join_worker(retiring, &self.label);
            }
            let stop = StopSignal::new();
            let handle = self.spawn_worker(stop.clone())?;
            state.active = Some(Worker { stop, handle });
            state.enabled = true;
            debug!("keep-alive enabled for {}", self.label);
        } else {
            state.enabled = false;
            if let Some(worker) = state.active.take() {
                worker.stop.stop(StopReason::Finished);
                state.retiring = Some(worker.handle);
            }
            debug!("keep-alive disabled for {}", self.label);
        }
        Ok(())
    }

    fn spawn_worker(&self, stop: StopSignal) -> std::io::Result<JoinHandle<()>> {
        let pinger = Arc::clone(&self.pinger);
        let interval = self.interval;
        let label = self.label.clone();
        thread::Builder::new()
            .name(format!("keep-alive-{label}"))
            .spawn(move || loop {
                if let Err(e) = pinger.ping() {
                    warn!("keep-alive ping to {label} failed: {e}");
                }
                if stop.wait_timeout(interval).is_some() {
                    break;
                }
            })
    }
}

fn join_worker(handle: JoinHandle<()>, label: &str) {
    if handle.join().is_err() {
        warn!("keep-alive worker for {label} panicked");
    }
}

impl Drop for KeepAliveService {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = state.active.take() {
            worker.stop.stop(StopReason::Finished);
            join_worker(worker.handle, &self.label);
        }
        if let Some(retiring) = state.retiring.take() {
            join_worker(retiring, &self.label);
        }
    }
}

impl std::fmt::Debug for KeepAliveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAliveService")
            .field("label", &self.label)
            .field("interval", &self.interval)
            .field("enabled", &self.enabled())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

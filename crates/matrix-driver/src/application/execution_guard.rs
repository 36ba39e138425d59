//! Time-boxed activation of a group of devices with guaranteed cleanup.
//!
//! # Session lifecycle (for beginners)
//!
//! ```text
//!   Idle ──run()──► Running ──activator ok, signal fired──► Completed
//!                      │                                    Cancelled (interrupt)
//!                      └──activator or cleanup error──────► Failed
//! ```
//!
//! Each call to [`ExecutionGuard::run`] opens one [`GuardSession`] with its
//! own child [`StopSignal`].  A timer thread fires that signal with
//! [`StopReason::Expired`] once the duration runs out; an operator interrupt
//! on the caller's signal reaches the session through the parent link.  The
//! session's own completion never fires the caller's signal, so several
//! sessions can run one after another under the same interrupt.
//!
//! Cleanup lives in a drop guard.  It runs exactly once per session whether
//! the activator returns, fails or panics: keep-alive is disabled on every
//! device first, then each display is cleared if requested.  Clearing waits
//! for the device's command lock for a bounded time only.

use std::error::Error;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use matrix_core::{StopReason, StopSignal};

use crate::application::controller::MatrixController;

/// Default bound on command-lock acquisition during cleanup.
pub const DEFAULT_CLEANUP_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Error returned by an activator.
pub type ActivationError = Box<dyn Error + Send + Sync>;

/// A device-level failure during cleanup.
#[derive(Debug)]
pub struct CleanupFailure {
    pub device: String,
    pub source: Box<dyn Error + Send + Sync>,
}

/// Every failure collected while cleaning up one session.
#[derive(Debug, Error)]
#[error("cleanup failed on {} device(s): {}", .failures.len(), summary(.failures))]
pub struct CleanupError {
    pub failures: Vec<CleanupFailure>,
}

fn summary(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.device, failure.source))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by [`ExecutionGuard::run`].
#[derive(Debug, Error)]
pub enum GuardError {
    /// The requested duration is zero, negative or not finite.
    #[error("run duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),

    /// The activator failed; cleanup has already run.
    #[error("activation failed: {source}")]
    Activation {
        #[source]
        source: ActivationError,
        cleanup: Option<CleanupError>,
    },

    /// The activator succeeded but cleanup did not.
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error("failed to spawn guard timer thread: {0}")]
    TimerSpawn(#[source] std::io::Error),
}

/// Session lifecycle, reported through logs and the return value of `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Running,
    /// The session ended on its own: expiry or activator completion.
    Completed,
    /// An operator interrupt ended the session.
    Cancelled,
    Failed,
}

// ── Guarded devices ───────────────────────────────────────────────────────────

/// The cleanup surface the guard needs from a device.
pub trait Guarded: Send + Sync {
    /// Label used in logs and cleanup failures.
    fn label(&self) -> String;

    fn disable_keep_alive(&self) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Clears the display, waiting at most `timeout` for the device.
    fn clear_within(&self, timeout: Duration) -> Result<(), Box<dyn Error + Send + Sync>>;
}

impl Guarded for MatrixController {
    fn label(&self) -> String {
        self.device().to_string()
    }

    fn disable_keep_alive(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.set_keep_alive(false)?;
        Ok(())
    }

    fn clear_within(&self, timeout: Duration) -> Result<(), Box<dyn Error + Send + Sync>> {
        MatrixController::clear_within(self, timeout)?;
        Ok(())
    }
}

impl<T: Guarded + ?Sized> Guarded for Arc<T> {
    fn label(&self) -> String {
        (**self).label()
    }

    fn disable_keep_alive(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        (**self).disable_keep_alive()
    }

    fn clear_within(&self, timeout: Duration) -> Result<(), Box<dyn Error + Send + Sync>> {
        (**self).clear_within(timeout)
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// State of one guarded run.
#[derive(Debug)]
pub struct GuardSession<'a, D> {
    pub devices: &'a [D],
    pub duration: Option<Duration>,
    pub clear_after: bool,
    pub stop_signal: StopSignal,
}

/// Runs cleanup once, either explicitly or on drop.
struct CleanupGuard<'a, D: Guarded> {
    devices: &'a [D],
    clear_after: bool,
    lock_timeout: Duration,
    signal: StopSignal,
    done: bool,
}

impl<D: Guarded> CleanupGuard<'_, D> {
    fn finish(mut self) -> Result<(), CleanupError> {
        self.done = true;
        self.cleanup()
    }

    fn cleanup(&self) -> Result<(), CleanupError> {
        // Releases the timer thread on every path, including unwinding.
        self.signal.stop(StopReason::Finished);

        let mut failures = Vec::new();
        for device in self.devices {
            if let Err(source) = device.disable_keep_alive() {
                failures.push(CleanupFailure {
                    device: device.label(),
                    source,
                });
            }
        }
        if self.clear_after {
            for device in self.devices {
                if let Err(source) = device.clear_within(self.lock_timeout) {
                    failures.push(CleanupFailure {
                        device: device.label(),
                        source,
                    });
                }
            }
        }

        for failure in &failures {
            warn!("cleanup failed on {}: {}", failure.device, failure.source);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError { failures })
        }
    }
}

impl<D: Guarded> Drop for CleanupGuard<'_, D> {
    fn drop(&mut self) {
        if !self.done {
            self.done = true;
            let _ = self.cleanup();
        }
    }
}

// ── Guard ─────────────────────────────────────────────────────────────────────

/// Runs activators under a time limit and cleans up afterwards.
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    name: String,
    wait_for_interrupt: bool,
    cleanup_lock_timeout: Duration,
}

impl ExecutionGuard {
    /// `name` labels the session's timer thread and log lines.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wait_for_interrupt: false,
            cleanup_lock_timeout: DEFAULT_CLEANUP_LOCK_TIMEOUT,
        }
    }

    /// Keep the session open after the activator returns until the signal
    /// fires, even without a duration.
    pub fn wait_for_interrupt(mut self, wait: bool) -> Self {
        self.wait_for_interrupt = wait;
        self
    }

    pub fn cleanup_lock_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_lock_timeout = timeout;
        self
    }

    /// Same settings under a different session name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `activator` on the calling thread inside a new session.
    ///
    /// `duration` is in seconds; `None` means no time limit.  Returns the
    /// final [`GuardState`] ([`Completed`](GuardState::Completed) or
    /// [`Cancelled`](GuardState::Cancelled)) on success.
    ///
    /// # Errors
    ///
    /// - [`GuardError::InvalidDuration`] before anything runs.
    /// - [`GuardError::TimerSpawn`] if the timer thread cannot be started.
    /// - [`GuardError::Activation`] if the activator fails.
    /// - [`GuardError::Cleanup`] if only cleanup fails.
    pub fn run<D, F>(
        &self,
        devices: &[D],
        activator: F,
        duration: Option<f64>,
        clear_after: bool,
        parent: &StopSignal,
    ) -> Result<GuardState, GuardError>
    where
        D: Guarded,
        F: FnOnce(&[D], &StopSignal) -> Result<(), ActivationError>,
    {
        let duration = match duration {
            Some(secs) if !secs.is_finite() || secs <= 0.0 => {
                return Err(GuardError::InvalidDuration(secs))
            }
            Some(secs) => Some(Duration::from_secs_f64(secs)),
            None => None,
        };

        let session = GuardSession {
            devices,
            duration,
            clear_after,
            stop_signal: parent.child(),
        };
        let timer = self.spawn_timer(&session)?;
        self.transition(GuardState::Idle, GuardState::Running);

        let cleanup = CleanupGuard {
            devices: session.devices,
            clear_after: session.clear_after,
            lock_timeout: self.cleanup_lock_timeout,
            signal: session.stop_signal.clone(),
            done: false,
        };

        let activation = activator(session.devices, &session.stop_signal);
        if activation.is_ok() {
            if session.duration.is_some() || self.wait_for_interrupt {
                let reason = session.stop_signal.wait();
                debug!("guard {} released by {reason:?}", self.name);
            } else {
                session.stop_signal.stop(StopReason::Finished);
            }
        }

        let cleaned = cleanup.finish();
        if timer.join().is_err() {
            warn!("guard {} timer thread panicked", self.name);
        }

        match (activation, cleaned) {
            (Err(source), cleanup) => {
                self.transition(GuardState::Running, GuardState::Failed);
                Err(GuardError::Activation {
                    source,
                    cleanup: cleanup.err(),
                })
            }
            (Ok(()), Err(cleanup)) => {
                self.transition(GuardState::Running, GuardState::Failed);
                Err(GuardError::Cleanup(cleanup))
            }
            (Ok(()), Ok(())) => {
                let end = match session.stop_signal.reason() {
                    Some(StopReason::Interrupted) => GuardState::Cancelled,
                    _ => GuardState::Completed,
                };
                self.transition(GuardState::Running, end);
                Ok(end)
            }
        }
    }

    fn spawn_timer<D>(&self, session: &GuardSession<'_, D>) -> Result<JoinHandle<()>, GuardError> {
        let signal = session.stop_signal.clone();
        let duration = session.duration;
        thread::Builder::new()
            .name(format!("{}-timer", self.name))
            .spawn(move || match duration {
                Some(duration) => {
                    if signal.wait_timeout(duration).is_none() {
                        signal.stop(StopReason::Expired);
                    }
                }
                None => {
                    signal.wait();
                }
            })
            .map_err(GuardError::TimerSpawn)
    }

    fn transition(&self, from: GuardState, to: GuardState) {
        match to {
            GuardState::Failed => warn!("guard {}: {from:?} -> {to:?}", self.name),
            _ => info!("guard {}: {from:?} -> {to:?}", self.name),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct Failure(&'static str);

    /// Device double that records cleanup calls.
    #[derive(Default)]
    struct FakeDevice {
        events: Mutex<Vec<&'static str>>,
        fail_clear: bool,
    }

    impl FakeDevice {
        fn failing_clear() -> Self {
            Self {
                fail_clear: true,
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Guarded for FakeDevice {
        fn label(&self) -> String {
            "fake".to_string()
        }

        fn disable_keep_alive(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push("keep_alive_off");
            Ok(())
        }

        fn clear_within(&self, _timeout: Duration) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push("clear");
            if self.fail_clear {
                return Err(Box::new(Failure("clear refused")));
            }
            Ok(())
        }
    }

    #[test]
    fn test_non_positive_durations_are_rejected_before_activation() {
        let guard = ExecutionGuard::new("test");
        let devices = [FakeDevice::default()];

        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            // Arrange
            let called = AtomicBool::new(false);

            // Act
            let result = guard.run(
                &devices,
                |_, _| {
                    called.store(true, Ordering::SeqCst);
                    Ok(())
                },
                Some(duration),
                true,
                &StopSignal::new(),
            );

            // Assert
            assert!(matches!(result, Err(GuardError::InvalidDuration(_))));
            assert!(!called.load(Ordering::SeqCst));
        }
        assert!(devices[0].events().is_empty());
    }

    #[test]
    fn test_completes_immediately_without_duration() {
        // Arrange
        let devices = [FakeDevice::default()];

        // Act
        let state = ExecutionGuard::new("test")
            .run(&devices, |_, _| Ok(()), None, true, &StopSignal::new())
            .unwrap();

        // Assert: keep-alive is disabled before the clear.
        assert_eq!(state, GuardState::Completed);
        assert_eq!(devices[0].events(), vec!["keep_alive_off", "clear"]);
    }

    #[test]
    fn test_duration_expiry_fires_session_signal() {
        // Arrange
        let devices = [FakeDevice::default()];
        let seen = Mutex::new(None);
        let start = Instant::now();

        // Act
        let state = ExecutionGuard::new("expiry")
            .run(
                &devices,
                |_, stop| {
                    *seen.lock().unwrap() = Some(stop.clone());
                    Ok(())
                },
                Some(0.05),
                false,
                &StopSignal::new(),
            )
            .unwrap();

        // Assert
        assert_eq!(state, GuardState::Completed);
        assert!(start.elapsed() >= Duration::from_millis(50));
        let session_signal = seen.lock().unwrap().clone().unwrap();
        assert_eq!(session_signal.reason(), Some(StopReason::Expired));
        assert_eq!(devices[0].events(), vec!["keep_alive_off"]);
    }

    #[test]
    fn test_parent_interrupt_cancels_session() {
        // Arrange
        let devices = [FakeDevice::default()];
        let parent = StopSignal::new();
        let interrupter = parent.clone();

        // Act
        let state = ExecutionGuard::new("interrupt")
            .wait_for_interrupt(true)
            .run(
                &devices,
                move |_, _| {
                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(20));
                        interrupter.stop(StopReason::Interrupted);
                    });
                    Ok(())
                },
                None,
                false,
                &parent,
            )
            .unwrap();

        // Assert
        assert_eq!(state, GuardState::Cancelled);
    }

    #[test]
    fn test_session_completion_does_not_fire_parent() {
        let parent = StopSignal::new();
        let devices = [FakeDevice::default()];

        ExecutionGuard::new("child")
            .run(&devices, |_, _| Ok(()), Some(0.01), false, &parent)
            .unwrap();

        assert!(!parent.is_stopped());
    }

    #[test]
    fn test_activator_error_cleans_up_once_and_propagates() {
        // Arrange
        let devices = [FakeDevice::default(), FakeDevice::default()];

        // Act
        let result = ExecutionGuard::new("failing").run(
            &devices,
            |_, _| Err(Box::new(Failure("device unplugged")) as ActivationError),
            Some(10.0),
            true,
            &StopSignal::new(),
        );

        // Assert
        match result {
            Err(GuardError::Activation { source, cleanup }) => {
                assert_eq!(source.to_string(), "device unplugged");
                assert!(cleanup.is_none());
            }
            other => panic!("expected activation error, got {other:?}"),
        }
        for device in &devices {
            assert_eq!(device.events(), vec!["keep_alive_off", "clear"]);
        }
    }

    #[test]
    fn test_cleanup_failures_are_collected() {
        // Arrange
        let devices = [FakeDevice::failing_clear(), FakeDevice::default()];

        // Act
        let result =
            ExecutionGuard::new("cleanup").run(&devices, |_, _| Ok(()), None, true, &StopSignal::new());

        // Assert: the second device is still cleared.
        let Err(GuardError::Cleanup(error)) = result else {
            panic!("expected cleanup error");
        };
        assert_eq!(error.failures.len(), 1);
        assert_eq!(error.failures[0].device, "fake");
        assert_eq!(devices[1].events(), vec!["keep_alive_off", "clear"]);
    }

    #[test]
    fn test_cleanup_runs_when_activator_panics() {
        // Arrange
        let devices = [FakeDevice::default()];

        // Act
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ExecutionGuard::new("panicking").run(
                &devices,
                |_, _| panic!("activator exploded"),
                None,
                true,
                &StopSignal::new(),
            )
        }));

        // Assert
        assert!(result.is_err());
        assert_eq!(devices[0].events(), vec!["keep_alive_off", "clear"]);
    }
}

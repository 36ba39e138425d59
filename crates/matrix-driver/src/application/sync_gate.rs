//! Serialized, breather-aware access to one device.
//!
//! Every command a controller sends passes through its [`SyncGate`]:
//!
//! 1. If a pause is requested, the attached [`Pausable`] (the breather) is
//!    paused for the duration of the call.  A drop guard resumes it, so an
//!    error or panic inside the operation cannot leave it paused.
//! 2. With thread safety on, the device's [`CommandLock`] is held while the
//!    operation runs.
//! 3. With thread safety off, calls from any thread other than the one that
//!    built the gate are logged as misuse (unless that warning is disabled)
//!    and then allowed through.
//!
//! The lock is a `Mutex<bool>` plus `Condvar` rather than a bare `Mutex<()>`
//! so that acquisition can be bounded by a timeout; guard cleanup relies on
//! that to never hang on a wedged device.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Errors raised by [`SyncGate::enter`].
#[derive(Debug, Error)]
pub enum GateError<E: std::error::Error + 'static> {
    /// A pause was requested but no [`Pausable`] is attached.
    #[error("breather pause requested but no breather is attached")]
    BreatherContextUnavailable,

    /// The command lock could not be acquired in time.
    #[error("timed out after {0:?} waiting for the command lock")]
    LockTimeout(Duration),

    /// The wrapped operation failed.
    #[error(transparent)]
    Operation(E),
}

// ── Command lock ──────────────────────────────────────────────────────────────

/// Per-device mutual exclusion with optional timed acquisition.
///
/// Waiters are not served in FIFO order.
#[derive(Debug, Default)]
pub struct CommandLock {
    held: Mutex<bool>,
    released: Condvar,
}

/// Releases the [`CommandLock`] when dropped.
#[derive(Debug)]
pub struct CommandLockGuard<'a> {
    lock: &'a CommandLock,
}

impl CommandLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is free, then takes it.
    pub fn acquire(&self) -> CommandLockGuard<'_> {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let mut held = self
            .released
            .wait_while(held, |held| *held)
            .unwrap_or_else(PoisonError::into_inner);
        *held = true;
        CommandLockGuard { lock: self }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<CommandLockGuard<'_>> {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut held, result) = self
            .released
            .wait_timeout_while(held, timeout, |held| *held)
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && *held {
            return None;
        }
        *held = true;
        Some(CommandLockGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CommandLockGuard<'_> {
    fn drop(&mut self) {
        *self.lock.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.lock.released.notify_one();
    }
}

// ── Pausable ──────────────────────────────────────────────────────────────────

/// Something that can be paused around device commands.
///
/// Calls nest: every `pause` is matched by exactly one `resume`, and the
/// implementation stays paused until the outermost `resume`.
#[cfg_attr(test, mockall::automock)]
pub trait Pausable: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

/// Whether an operation needs the breather paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    Required,
    /// Used by keep-alive pings, which must not disturb the breather.
    Skip,
}

struct PauseGuard<'a>(&'a dyn Pausable);

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.0.resume();
    }
}

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Wraps device operations with pausing, locking and thread checks.
pub struct SyncGate {
    lock: Arc<CommandLock>,
    pausable: Option<Arc<dyn Pausable>>,
    thread_safe: bool,
    warn_on_misuse: bool,
    owner: ThreadId,
}

impl SyncGate {
    /// Creates a gate owned by the calling thread.
    pub fn new(lock: Arc<CommandLock>, thread_safe: bool) -> Self {
        Self {
            lock,
            pausable: None,
            thread_safe,
            warn_on_misuse: true,
            owner: thread::current().id(),
        }
    }

    /// Attaches the capability paused by [`Pause::Required`] operations.
    pub fn with_pausable(mut self, pausable: Arc<dyn Pausable>) -> Self {
        self.pausable = Some(pausable);
        self
    }

    pub fn with_misuse_warning(mut self, enabled: bool) -> Self {
        self.warn_on_misuse = enabled;
        self
    }

    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    pub fn lock(&self) -> &Arc<CommandLock> {
        &self.lock
    }

    /// Runs `op` inside the gate, blocking as long as needed for the lock.
    ///
    /// # Errors
    ///
    /// - [`GateError::BreatherContextUnavailable`] if `pause` is
    ///   [`Pause::Required`] and no [`Pausable`] is attached; `op` is not run.
    /// - [`GateError::Operation`] wrapping the error returned by `op`.
    pub fn enter<T, E, F>(&self, pause: Pause, op: F) -> Result<T, GateError<E>>
    where
        E: std::error::Error + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        self.run(pause, None, op)
    }

    /// Like [`enter`](Self::enter) but waits at most `timeout` for the lock.
    ///
    /// # Errors
    ///
    /// Additionally returns [`GateError::LockTimeout`] if the lock stays busy.
    pub fn enter_timeout<T, E, F>(
        &self,
        pause: Pause,
        timeout: Duration,
        op: F,
    ) -> Result<T, GateError<E>>
    where
        E: std::error::Error + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        self.run(pause, Some(timeout), op)
    }

    fn run<T, E, F>(
        &self,
        pause: Pause,
        timeout: Option<Duration>,
        op: F,
    ) -> Result<T, GateError<E>>
    where
        E: std::error::Error + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let current = thread::current();
        if !self.thread_safe && self.warn_on_misuse && current.id() != self.owner {
            let name = current.name().unwrap_or("<unnamed>");
            warn!("device called from thread {name:?} but thread_safe is off");
        }

        let _paused = match (pause, &self.pausable) {
            (Pause::Skip, _) => None,
            (Pause::Required, None) => return Err(GateError::BreatherContextUnavailable),
            (Pause::Required, Some(pausable)) => {
                pausable.pause();
                Some(PauseGuard(pausable.as_ref()))
            }
        };

        let _locked = if self.thread_safe {
            match timeout {
                None => Some(self.lock.acquire()),
                Some(timeout) => Some(
                    self.lock
                        .acquire_timeout(timeout)
                        .ok_or(GateError::LockTimeout(timeout))?,
                ),
            }
        } else {
            None
        };

        op().map_err(GateError::Operation)
    }
}

impl std::fmt::Debug for SyncGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncGate")
            .field("thread_safe", &self.thread_safe)
            .field("warn_on_misuse", &self.warn_on_misuse)
            .field("has_pausable", &self.pausable.is_some())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    fn gate() -> SyncGate {
        SyncGate::new(Arc::new(CommandLock::new()), true)
    }

    // ── CommandLock ───────────────────────────────────────────────────────────

    #[test]
    fn test_lock_is_released_when_guard_drops() {
        let lock = CommandLock::new();
        {
            let _guard = lock.acquire();
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_acquire_timeout_gives_up_while_held() {
        // Arrange
        let lock = CommandLock::new();
        let _held = lock.acquire();

        // Act
        let second = lock.acquire_timeout(Duration::from_millis(20));

        // Assert
        assert!(second.is_none());
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let lock = Arc::new(CommandLock::new());
        let guard = lock.acquire();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire_timeout(Duration::from_secs(5)).is_some())
        };
        thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_lock_serializes_concurrent_operations() {
        // Arrange
        let gate = Arc::new(gate());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        // Act
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let (gate, inside, overlaps) =
                    (Arc::clone(&gate), Arc::clone(&inside), Arc::clone(&overlaps));
                thread::spawn(move || {
                    for _ in 0..10 {
                        gate.enter(Pause::Skip, || {
                            if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            thread::sleep(Duration::from_micros(200));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, Boom>(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        // Assert
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    // ── Pausing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_required_pause_without_pausable_fails_before_running() {
        let ran = AtomicUsize::new(0);
        let result = gate().enter(Pause::Required, || {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Boom>(())
        });
        assert!(matches!(result, Err(GateError::BreatherContextUnavailable)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_required_pause_pauses_and_resumes_once() {
        // Arrange
        let mut pausable = MockPausable::new();
        pausable.expect_pause().times(1).return_const(());
        pausable.expect_resume().times(1).return_const(());
        let gate = gate().with_pausable(Arc::new(pausable));

        // Act
        let value = gate.enter(Pause::Required, || Ok::<_, Boom>(7)).unwrap();

        // Assert
        assert_eq!(value, 7);
    }

    #[test]
    fn test_pausable_is_resumed_when_operation_fails() {
        let mut pausable = MockPausable::new();
        pausable.expect_pause().times(1).return_const(());
        pausable.expect_resume().times(1).return_const(());
        let gate = gate().with_pausable(Arc::new(pausable));

        let result = gate.enter(Pause::Required, || Err::<(), _>(Boom));

        assert!(matches!(result, Err(GateError::Operation(Boom))));
    }

    #[test]
    fn test_pausable_is_resumed_when_operation_panics() {
        let mut pausable = MockPausable::new();
        pausable.expect_pause().times(1).return_const(());
        pausable.expect_resume().times(1).return_const(());
        let gate = gate().with_pausable(Arc::new(pausable));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            gate.enter(Pause::Required, || -> Result<(), Boom> { panic!("inside gate") })
        }));

        assert!(result.is_err());
        assert!(!gate.lock().is_held());
    }

    #[test]
    fn test_skip_does_not_touch_pausable() {
        let mut pausable = MockPausable::new();
        pausable.expect_pause().times(0);
        pausable.expect_resume().times(0);
        let gate = gate().with_pausable(Arc::new(pausable));

        assert!(gate.enter(Pause::Skip, || Ok::<_, Boom>(())).is_ok());
    }

    // ── Timeouts and thread safety ────────────────────────────────────────────

    #[test]
    fn test_enter_timeout_reports_busy_lock() {
        // Arrange
        let gate = gate();
        let _held = gate.lock().acquire();

        // Act
        let result = gate.enter_timeout(Pause::Skip, Duration::from_millis(10), || {
            Ok::<_, Boom>(())
        });

        // Assert
        assert!(matches!(result, Err(GateError::LockTimeout(_))));
    }

    #[test]
    fn test_thread_unsafe_gate_ignores_lock_and_allows_other_threads() {
        // Arrange
        let gate = Arc::new(SyncGate::new(Arc::new(CommandLock::new()), false));
        let _held = gate.lock().acquire();

        // Act
        let worker = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.enter(Pause::Skip, || Ok::<_, Boom>(1)).is_ok())
        };

        // Assert
        assert!(worker.join().unwrap());
        assert!(!gate.is_thread_safe());
    }

    // ── Misuse warning ────────────────────────────────────────────────────────

    /// In-memory sink for `tracing` output.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Enters `gate` once on the current thread and returns what was logged.
    fn enter_and_capture(gate: &SyncGate) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            gate.enter(Pause::Skip, || Ok::<_, Boom>(())).unwrap();
        });

        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn enter_from_named_thread(gate: &SyncGate) -> String {
        thread::scope(|scope| {
            thread::Builder::new()
                .name("foreign".into())
                .spawn_scoped(scope, || enter_and_capture(gate))
                .unwrap()
                .join()
                .unwrap()
        })
    }

    #[test]
    fn test_thread_unsafe_gate_warns_on_foreign_thread() {
        // Arrange
        let gate = SyncGate::new(Arc::new(CommandLock::new()), false);

        // Act
        let logs = enter_from_named_thread(&gate);

        // Assert
        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(logs.contains("thread_safe is off"), "logs: {logs}");
        assert!(logs.contains("foreign"), "logs: {logs}");
    }

    #[test]
    fn test_thread_unsafe_gate_is_quiet_on_owner_thread() {
        let gate = SyncGate::new(Arc::new(CommandLock::new()), false);

        let logs = enter_and_capture(&gate);

        assert!(!logs.contains("thread_safe is off"), "logs: {logs}");
    }

    #[test]
    fn test_misuse_warning_can_be_disabled() {
        let gate = SyncGate::new(Arc::new(CommandLock::new()), false).with_misuse_warning(false);

        let logs = enter_from_named_thread(&gate);

        assert!(!logs.contains("thread_safe is off"), "logs: {logs}");
    }

    #[test]
    fn test_thread_safe_gate_never_warns() {
        let logs = enter_from_named_thread(&gate());
        assert!(logs.is_empty(), "logs: {logs}");
    }
}

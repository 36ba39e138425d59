//! Cooperative cancellation shared between playback loops and timers.
//!
//! A [`StopSignal`] is a one-shot latch.  Any thread may fire it with a
//! [`StopReason`]; every thread blocked in [`StopSignal::wait`] or
//! [`StopSignal::wait_timeout`] wakes up immediately.  Only the first reason
//! is kept.
//!
//! Signals form a tree: [`StopSignal::child`] derives a signal that fires when
//! its parent fires, but firing the child leaves the parent untouched.  The
//! execution guard uses this so that an operator interrupt reaches every
//! session while a session's own timer only ends that session.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Why a stop signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The session's run-for duration elapsed.
    Expired,
    /// An operator (Ctrl-C) or caller asked to stop.
    Interrupted,
    /// The work completed on its own.
    Finished,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Expired => "expired",
            StopReason::Interrupted => "interrupted",
            StopReason::Finished => "finished",
        };
        f.write_str(text)
    }
}

struct Inner {
    reason: Mutex<Option<StopReason>>,
    cond: Condvar,
    children: Mutex<Vec<Weak<Inner>>>,
    // Keeps intermediate ancestors alive so propagation reaches grandchildren.
    _parent: Option<Arc<Inner>>,
}

impl Inner {
    fn new(reason: Option<StopReason>, parent: Option<Arc<Inner>>) -> Self {
        Self {
            reason: Mutex::new(reason),
            cond: Condvar::new(),
            children: Mutex::new(Vec::new()),
            _parent: parent,
        }
    }

    fn fire(&self, reason: StopReason) -> bool {
        {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            self.cond.notify_all();
        }

        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire(reason);
        }
        true
    }

    fn reason(&self) -> Option<StopReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clonable one-shot cancellation latch.
///
/// Clones share the same state; use [`StopSignal::child`] for a signal that
/// follows this one without being able to fire it.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    /// Creates a new, un-fired signal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None, None)),
        }
    }

    /// Derives a child signal.
    ///
    /// The child fires (with the same reason) whenever this signal fires.  If
    /// this signal has already fired the child is returned already fired.
    pub fn child(&self) -> StopSignal {
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Checked while holding `children` so a concurrent `stop` cannot slip
        // between the check and the registration.
        let child = Arc::new(Inner::new(
            self.inner.reason(),
            Some(Arc::clone(&self.inner)),
        ));
        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(&child));
        StopSignal { inner: child }
    }

    /// Fires the signal.
    ///
    /// Returns `true` if this call fired it, `false` if it was already fired
    /// (in which case the original reason is kept).
    pub fn stop(&self, reason: StopReason) -> bool {
        self.inner.fire(reason)
    }

    /// Returns `true` once the signal has fired.
    pub fn is_stopped(&self) -> bool {
        self.inner.reason().is_some()
    }

    /// The reason the signal fired with, if it has.
    pub fn reason(&self) -> Option<StopReason> {
        self.inner.reason()
    }

    /// Blocks until the signal fires and returns the reason.
    pub fn wait(&self) -> StopReason {
        let mut slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reason) = *slot {
                return reason;
            }
            slot = self
                .inner
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks for at most `timeout`.
    ///
    /// Returns `Some(reason)` if the signal fired before the timeout elapsed,
    /// `None` otherwise.  A zero timeout just polls.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<StopReason> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reason) = *slot {
                return Some(reason);
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                // Overflowing deadline: treat as "forever".
                None => Duration::from_secs(u32::MAX as u64),
            };
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("reason", &self.reason())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

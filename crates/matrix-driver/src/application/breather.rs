//! Breathing brightness effect.
//!
//! A worker walks the display brightness up and down between `min` and
//! `max` in `step` increments (a triangle wave) at `fps` updates per second.
//!
//! The breather is the [`Pausable`] a controller's [`SyncGate`] pauses around
//! draw commands.  Each brightness update runs while holding the breather's
//! state lock, so once `pause()` returns no brightness command is in flight
//! and none will be sent until the matching `resume()`.
//!
//! [`SyncGate`]: crate::application::sync_gate::SyncGate

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use matrix_core::{StopReason, StopSignal};

use crate::application::keep_alive::PingError;
use crate::application::sync_gate::Pausable;

/// Fallback update interval when `fps` is not a positive number.
const FALLBACK_FRAME: Duration = Duration::from_millis(50);

/// Where brightness levels go.
pub trait BrightnessOutput: Send + Sync {
    /// Sets brightness as a 0–100 percentage.
    fn set_brightness_percent(&self, percent: u8) -> Result<(), PingError>;
}

/// Triangle-wave parameters, all brightness values in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreatherSettings {
    pub min: u8,
    pub max: u8,
    pub step: u8,
    pub fps: f64,
}

impl BreatherSettings {
    /// Normalizes the settings: values are clamped to 100, `min`/`max` are
    /// swapped if reversed and `step` is at least 1.
    pub fn new(min: u8, max: u8, step: u8, fps: f64) -> Self {
        let (min, max) = (min.min(100), max.min(100));
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            step: step.max(1),
            fps,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        if self.fps.is_finite() && self.fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.fps).unwrap_or(FALLBACK_FRAME)
        } else {
            FALLBACK_FRAME
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Wave {
    level: u8,
    rising: bool,
}

impl Wave {
    fn advance(&mut self, settings: &BreatherSettings) {
        if self.rising {
            self.level = self.level.saturating_add(settings.step).min(settings.max);
            if self.level >= settings.max {
                self.rising = false;
            }
        } else {
            self.level = self.level.saturating_sub(settings.step).max(settings.min);
            if self.level <= settings.min {
                self.rising = true;
            }
        }
    }
}

struct BreathState {
    pause_depth: usize,
    wave: Wave,
}

/// Triangle-wave brightness driver for one device.
pub struct Breather {
    output: Arc<dyn BrightnessOutput>,
    settings: BreatherSettings,
    state: Arc<Mutex<BreathState>>,
    worker: Mutex<Option<(StopSignal, JoinHandle<()>)>>,
}

impl Breather {
    pub fn new(output: Arc<dyn BrightnessOutput>, settings: BreatherSettings) -> Self {
        Self {
            output,
            settings,
            state: Arc::new(Mutex::new(BreathState {
                pause_depth: 0,
                wave: Wave {
                    level: settings.min,
                    rising: true,
                },
            })),
            worker: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> BreatherSettings {
        self.settings
    }

    /// Starts the worker thread.  Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the thread cannot be spawned.
    pub fn start(&self, label: &str) -> std::io::Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }
        let stop = StopSignal::new();
        let handle = {
            let stop = stop.clone();
            let output = Arc::clone(&self.output);
            let state = Arc::clone(&self.state);
            let settings = self.settings;
            let label = label.to_string();
            thread::Builder::new()
                .name(format!("breather-{label}"))
                .spawn(move || breathe(output.as_ref(), &state, settings, &stop, &label))?
        };
        *worker = Some((stop, handle));
        debug!("breather started for {label}");
        Ok(())
    }

    /// Stops and joins the worker thread, if running.
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((stop, handle)) = worker {
            stop.stop(StopReason::Finished);
            if handle.join().is_err() {
                warn!("breather worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause_depth
            > 0
    }

    /// The brightness most recently sent (or the starting level).
    pub fn level(&self) -> u8 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wave
            .level
    }
}

fn breathe(
    output: &dyn BrightnessOutput,
    state: &Mutex<BreathState>,
    settings: BreatherSettings,
    stop: &StopSignal,
    label: &str,
) {
    let frame = settings.frame_interval();
    loop {
        {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.pause_depth == 0 {
                state.wave.advance(&settings);
                if let Err(e) = output.set_brightness_percent(state.wave.level) {
                    warn!("breather update for {label} failed: {e}");
                }
            }
        }
        if stop.wait_timeout(frame).is_some() {
            break;
        }
    }
}

impl Pausable for Breather {
    fn pause(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause_depth += 1;
    }

    fn resume(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pause_depth = state.pause_depth.saturating_sub(1);
    }
}

impl Drop for Breather {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Breather {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breather")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

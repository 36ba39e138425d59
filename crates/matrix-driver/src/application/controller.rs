//! Per-device controller assembled from explicit components.
//!
//! ```text
//! MatrixController
//!  ├─ DeviceLink        device handle + shared transport
//!  ├─ SyncGate          command lock, breather pause, thread checks
//!  ├─ Breather          optional triangle-wave brightness (Pausable)
//!  ├─ KeepAliveService  periodic wake pings through the gate
//!  └─ DisplayHistory    bounded record of what was shown
//! ```
//!
//! [`MatrixControllerBuilder`] wires these together in a fixed order
//! (link → command lock → breather → gate → keep-alive → history) and then
//! runs the optional init steps (clear, default brightness, breather start).
//! A missing transport fails the build before anything is created.
//!
//! Every device command goes through the gate.  Draw-type commands pause
//! the breather when one is attached; keep-alive pings never do.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use matrix_core::{
    Animation, DeviceCommand, DeviceHandle, DisplayGeometry, FrameSink, GlyphError, GlyphTable,
    Grid, Location, PlaybackError, PlaybackOutcome, Positioned, ProtocolError, ScrollConfig,
    StopReason, StopSignal, TextScroller,
};

use crate::application::breather::{Breather, BreatherSettings, BrightnessOutput};
use crate::application::history::{
    DisplayAction, DisplayEvent, DisplayHistory, DEFAULT_HISTORY_LEN,
};
use crate::application::keep_alive::{
    KeepAliveError, KeepAliveService, Ping, PingError, DEFAULT_KEEP_ALIVE_INTERVAL,
};
use crate::application::sync_gate::{CommandLock, GateError, Pausable, Pause, SyncGate};
use crate::infrastructure::storage::config::{AppConfig, ConfigError};
use crate::infrastructure::transport::{DeviceTransport, TransportError};

/// Failure of a single command on the wire.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failure of a gated device command.
pub type CommandError = GateError<LinkError>;

/// Errors returned by controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Glyph(#[from] GlyphError),

    #[error(transparent)]
    Playback(#[from] PlaybackError<CommandError>),

    #[error(transparent)]
    KeepAlive(#[from] KeepAliveError),
}

/// Errors raised while building a controller.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no transport supplied for the device")]
    MissingTransport,

    /// An init command (clear or default brightness) failed.
    #[error("controller init failed: {0}")]
    Init(#[source] CommandError),

    #[error("failed to start breather: {0}")]
    Breather(#[source] std::io::Error),
}

// ── DeviceLink ────────────────────────────────────────────────────────────────

/// A device plus the transport that reaches it.
pub struct DeviceLink {
    device: DeviceHandle,
    transport: Arc<dyn DeviceTransport>,
}

impl DeviceLink {
    pub fn new(device: DeviceHandle, transport: Arc<dyn DeviceTransport>) -> Self {
        Self { device, transport }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Encodes and writes one command, bypassing the gate.
    pub fn send(&self, command: &DeviceCommand) -> Result<(), LinkError> {
        self.transport.send(&self.device, &command.encode())?;
        Ok(())
    }
}

impl BrightnessOutput for DeviceLink {
    fn set_brightness_percent(&self, percent: u8) -> Result<(), PingError> {
        self.send(&DeviceCommand::brightness_percent(percent))?;
        Ok(())
    }
}

struct GatedPinger {
    link: Arc<DeviceLink>,
    gate: Arc<SyncGate>,
}

impl Ping for GatedPinger {
    fn ping(&self) -> Result<(), PingError> {
        self.gate
            .enter(Pause::Skip, || self.link.send(&DeviceCommand::Sleep(false)))?;
        Ok(())
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

/// High-level operations on one LED matrix.
pub struct MatrixController {
    link: Arc<DeviceLink>,
    gate: Arc<SyncGate>,
    breather: Option<Arc<Breather>>,
    keep_alive: KeepAliveService,
    history: DisplayHistory,
    brightness: AtomicU8,
    animating: AtomicBool,
    playback: Mutex<Option<StopSignal>>,
    geometry: DisplayGeometry,
    scroll: ScrollConfig,
    glyphs: Arc<GlyphTable>,
}

impl MatrixController {
    pub fn builder(device: DeviceHandle) -> MatrixControllerBuilder {
        MatrixControllerBuilder::new(device)
    }

    pub fn device(&self) -> &DeviceHandle {
        self.link.device()
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    pub fn glyphs(&self) -> &Arc<GlyphTable> {
        &self.glyphs
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    pub fn breather(&self) -> Option<&Arc<Breather>> {
        self.breather.as_ref()
    }

    pub fn history(&self) -> &DisplayHistory {
        &self.history
    }

    /// The most recent display event.
    pub fn current_display(&self) -> Option<DisplayEvent> {
        self.history.current()
    }

    /// Picture recorded with the most recent display event.
    pub fn current_grid(&self) -> Option<Grid> {
        self.history.current_grid()
    }

    fn pause_mode(&self) -> Pause {
        if self.breather.is_some() {
            Pause::Required
        } else {
            Pause::Skip
        }
    }

    /// Sends `grid` without adding a history event.
    fn send_grid(&self, grid: &Grid) -> Result<(), CommandError> {
        self.gate.enter(self.pause_mode(), || {
            let command = DeviceCommand::draw(grid)?;
            self.link.send(&command)
        })?;
        self.history.note_frame(grid);
        Ok(())
    }

    /// Draws `grid`, which must be 9x34.
    pub fn draw_grid(&self, grid: &Grid) -> Result<(), CommandError> {
        self.send_grid(grid)?;
        self.history.record(DisplayAction::Grid, Some(grid.clone()));
        Ok(())
    }

    /// Turns every pixel off.
    pub fn clear(&self) -> Result<(), CommandError> {
        let blank = self.geometry.blank_grid();
        self.send_grid(&blank)?;
        self.history.record(DisplayAction::Clear, Some(blank));
        Ok(())
    }

    /// Like [`clear`](Self::clear) but waits at most `timeout` for the
    /// command lock.  Used by cleanup paths that must not hang.
    pub fn clear_within(&self, timeout: Duration) -> Result<(), CommandError> {
        let blank = self.geometry.blank_grid();
        self.gate.enter_timeout(self.pause_mode(), timeout, || {
            let command = DeviceCommand::draw(&blank)?;
            self.link.send(&command)
        })?;
        self.history.record(DisplayAction::Clear, Some(blank));
        Ok(())
    }

    /// Shows `text` statically, stacked top to bottom from the top edge.
    pub fn show_text(&self, text: &str) -> Result<(), ControllerError> {
        let grid = TextScroller::new(self.scroll, self.geometry).render_static(text, &self.glyphs)?;
        self.send_grid(&grid)?;
        self.history.record(DisplayAction::Text(text.to_string()), Some(grid));
        Ok(())
    }

    /// Shows a level gauge filled from the bottom (`percent` clamped to 100).
    pub fn draw_percentage(&self, percent: u8) -> Result<(), CommandError> {
        let percent = percent.min(100);
        let grid = self.geometry.percent_bar(percent);
        self.send_grid(&grid)?;
        self.history.record(DisplayAction::Percentage(percent), Some(grid));
        Ok(())
    }

    /// Redraws the picture of the event `steps` entries before the current
    /// one and records it as a restore.
    ///
    /// Returns `Ok(None)` when the history is not that deep or the event has
    /// no picture (brightness changes, for example).
    pub fn go_back(&self, steps: usize) -> Result<Option<DisplayEvent>, CommandError> {
        let Some(event) = self.history.steps_back(steps) else {
            return Ok(None);
        };
        let Some(grid) = event.grid.clone() else {
            return Ok(None);
        };
        self.send_grid(&grid)?;
        self.history.record(DisplayAction::Restore { steps }, Some(grid));
        Ok(Some(event))
    }

    /// Plays `animation` on this device until it finishes, `stop` fires or
    /// [`halt_animation`](Self::halt_animation) is called.
    pub fn play_animation(
        &self,
        animation: &Animation,
        stop: &StopSignal,
    ) -> Result<PlaybackOutcome, ControllerError> {
        let session = stop.child();
        *self.playback.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        let result = animation.play(&[self], &session);
        *self.playback.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let outcome = result?;
        self.history.record(
            DisplayAction::Animation {
                frames_shown: outcome.frames_shown(),
            },
            self.history.on_screen(),
        );
        Ok(outcome)
    }

    /// Scrolls `text` using this controller's scroll settings.
    pub fn scroll_text(
        &self,
        text: &str,
        stop: &StopSignal,
    ) -> Result<PlaybackOutcome, ControllerError> {
        let animation = TextScroller::new(self.scroll, self.geometry).build(text, &self.glyphs)?;
        self.play_animation(&animation, stop)
    }

    /// Sets brightness in percent (clamped to 100).
    pub fn set_brightness(&self, percent: u8) -> Result<(), CommandError> {
        let percent = percent.min(100);
        self.gate.enter(self.pause_mode(), || {
            self.link.send(&DeviceCommand::brightness_percent(percent))
        })?;
        self.brightness.store(percent, Ordering::Relaxed);
        self.history.record_brightness(percent);
        Ok(())
    }

    /// Sets the brightness that was in effect before the latest change.
    ///
    /// Returns the restored value, or `None` if there was no earlier value.
    pub fn restore_last_brightness(&self) -> Result<Option<u8>, CommandError> {
        let Some(previous) = self.history.last_brightness() else {
            return Ok(None);
        };
        self.set_brightness(previous)?;
        Ok(Some(previous))
    }

    /// Last brightness set through [`set_brightness`](Self::set_brightness).
    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Relaxed)
    }

    /// Sends one wake command, the same one keep-alive uses.
    pub fn ping(&self) -> Result<(), CommandError> {
        self.gate
            .enter(Pause::Skip, || self.link.send(&DeviceCommand::Sleep(false)))
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.enabled()
    }

    pub fn set_keep_alive(&self, enable: bool) -> Result<(), KeepAliveError> {
        self.keep_alive.set_enabled(enable)
    }

    /// Starts or stops the firmware's built-in animation mode.
    pub fn animate(&self, enable: bool) -> Result<(), CommandError> {
        self.gate
            .enter(self.pause_mode(), || self.link.send(&DeviceCommand::Animate(enable)))?;
        self.animating.store(enable, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_animating(&self) -> bool {
        self.animating.load(Ordering::Relaxed)
    }

    /// Interrupts a running host-side playback and leaves firmware
    /// animation mode if it is active.
    pub fn halt_animation(&self) -> Result<(), CommandError> {
        if let Some(playback) = self
            .playback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            playback.stop(StopReason::Interrupted);
        }
        if self.is_animating() {
            self.animate(false)?;
        }
        Ok(())
    }
}

impl FrameSink for MatrixController {
    type Error = CommandError;

    /// Animation frames update the on-screen picture but add no history
    /// event of their own.
    fn show_grid(&self, grid: &Grid) -> Result<(), CommandError> {
        self.send_grid(grid)
    }
}

impl Positioned for MatrixController {
    fn location(&self) -> Location {
        self.device().location()
    }
}

impl std::fmt::Debug for MatrixController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixController")
            .field("device", self.device())
            .field("gate", &self.gate)
            .field("keep_alive", &self.keep_alive)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl Drop for MatrixController {
    fn drop(&mut self) {
        if let Some(breather) = &self.breather {
            breather.stop();
        }
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Ordered, fail-fast construction of a [`MatrixController`].
pub struct MatrixControllerBuilder {
    device: DeviceHandle,
    transport: Option<Arc<dyn DeviceTransport>>,
    thread_safe: bool,
    warn_on_thread_misuse: bool,
    keep_alive_interval: Duration,
    history_len: usize,
    breather: Option<BreatherSettings>,
    clear_on_init: bool,
    default_brightness: Option<u8>,
    geometry: DisplayGeometry,
    scroll: ScrollConfig,
    glyphs: Option<Arc<GlyphTable>>,
}

impl MatrixControllerBuilder {
    pub fn new(device: DeviceHandle) -> Self {
        Self {
            device,
            transport: None,
            thread_safe: true,
            warn_on_thread_misuse: true,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            history_len: DEFAULT_HISTORY_LEN,
            breather: None,
            clear_on_init: false,
            default_brightness: None,
            geometry: DisplayGeometry::default(),
            scroll: ScrollConfig::default(),
            glyphs: None,
        }
    }

    /// Applies the `[driver]`, `[display]`, `[scroll]`, `[keep_alive]` and
    /// `[breather]` sections of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FrameDuration`] for an invalid scroll frame duration.
    pub fn configure(mut self, config: &AppConfig) -> Result<Self, ConfigError> {
        self.thread_safe = config.driver.thread_safe;
        self.warn_on_thread_misuse = config.driver.warn_on_thread_misuse;
        self.clear_on_init = config.driver.clear_on_init;
        self.default_brightness = config.driver.default_brightness;
        self.history_len = config.driver.history_len;
        self.geometry = config.display.geometry();
        self.scroll = config.scroll.to_scroll_config()?;
        self.keep_alive_interval = config.keep_alive.interval();
        self.breather = config.breather.enabled.then(|| {
            let b = &config.breather;
            BreatherSettings::new(b.min, b.max, b.step, b.fps)
        });
        Ok(self)
    }

    pub fn transport(mut self, transport: Arc<dyn DeviceTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    pub fn warn_on_thread_misuse(mut self, warn: bool) -> Self {
        self.warn_on_thread_misuse = warn;
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Number of display events kept for [`MatrixController::go_back`].
    pub fn history_len(mut self, len: usize) -> Self {
        self.history_len = len;
        self
    }

    /// Attaches a breather; it starts once the controller is built.
    pub fn breather(mut self, settings: BreatherSettings) -> Self {
        self.breather = Some(settings);
        self
    }

    pub fn clear_on_init(mut self, clear: bool) -> Self {
        self.clear_on_init = clear;
        self
    }

    pub fn default_brightness(mut self, percent: Option<u8>) -> Self {
        self.default_brightness = percent;
        self
    }

    pub fn geometry(mut self, geometry: DisplayGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn scroll_config(mut self, scroll: ScrollConfig) -> Self {
        self.scroll = scroll;
        self
    }

    /// Glyph table for text operations; defaults to the bundled font.
    pub fn glyphs(mut self, glyphs: Arc<GlyphTable>) -> Self {
        self.glyphs = Some(glyphs);
        self
    }

    /// Builds the controller.
    ///
    /// # Errors
    ///
    /// - [`BuildError::MissingTransport`] if no transport was supplied.
    /// - [`BuildError::Init`] if clear-on-init or the default brightness fails.
    /// - [`BuildError::Breather`] if the breather thread cannot be spawned.
    pub fn build(self) -> Result<MatrixController, BuildError> {
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let label = self.device.name().to_string();

        let link = Arc::new(DeviceLink::new(self.device, transport));
        let lock = Arc::new(CommandLock::new());
        let breather = self.breather.map(|settings| {
            Arc::new(Breather::new(
                Arc::clone(&link) as Arc<dyn BrightnessOutput>,
                settings,
            ))
        });

        let mut gate = SyncGate::new(lock, self.thread_safe)
            .with_misuse_warning(self.warn_on_thread_misuse);
        if let Some(breather) = &breather {
            gate = gate.with_pausable(Arc::clone(breather) as Arc<dyn Pausable>);
        }
        let gate = Arc::new(gate);

        let pinger = GatedPinger {
            link: Arc::clone(&link),
            gate: Arc::clone(&gate),
        };
        let keep_alive =
            KeepAliveService::new(Arc::new(pinger), self.keep_alive_interval, label.as_str());

        let controller = MatrixController {
            link,
            gate,
            breather,
            keep_alive,
            history: DisplayHistory::new(self.history_len),
            brightness: AtomicU8::new(0),
            animating: AtomicBool::new(false),
            playback: Mutex::new(None),
            geometry: self.geometry,
            scroll: self.scroll,
            glyphs: self
                .glyphs
                .unwrap_or_else(|| Arc::new(GlyphTable::bundled())),
        };

        if self.clear_on_init {
            controller.clear().map_err(BuildError::Init)?;
        }
        if let Some(percent) = self.default_brightness {
            controller.set_brightness(percent).map_err(BuildError::Init)?;
        }
        if let Some(breather) = &controller.breather {
            breather.start(&label).map_err(BuildError::Breather)?;
        }

        info!("controller ready for {}", controller.device());
        debug!("{controller:?}");
        Ok(controller)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

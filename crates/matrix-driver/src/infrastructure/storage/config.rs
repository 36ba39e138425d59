//! TOML-based configuration for the matrix driver.
//!
//! The driver keeps one `config.toml` per user:
//! - Windows:  `%APPDATA%\LedMatrix\config.toml`
//! - Linux:    `~/.config/ledmatrix/config.toml`
//! - macOS:    `~/Library/Application Support/LedMatrix/config.toml`
//!
//! A typical file only lists the attached displays:
//!
//! ```toml
//! [driver]
//! startup_text = "HELLO"
//!
//! [[devices]]
//! name = "left"
//! serial = "FRAKDEBZ0100000000"
//! port = "/dev/ttyACM0"
//! location = "L1"
//!
//! [[devices]]
//! name = "right"
//! serial = "FRAKDEBZ0100000001"
//! port = "/dev/ttyACM1"
//! side = "right"
//! slot = 1
//! ```
//!
//! # Defaults
//!
//! Every section and field falls back to a default when absent, so an empty
//! file (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use matrix_core::{
    duration_from_secs, DeviceError, DisplayGeometry, FitPolicy, Location, ModelError,
    ScrollConfig, ScrollDirection, MATRIX_HEIGHT, MATRIX_WIDTH,
};

use crate::application::history::DEFAULT_HISTORY_LEN;

/// Failures while loading, saving or interpreting the driver config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `APPDATA`, `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// Reading, writing or creating the config location failed.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`AppConfig`].
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `scroll.frame_duration` is negative or not finite.
    #[error("invalid scroll.frame_duration: {0}")]
    FrameDuration(#[from] ModelError),

    /// A `[[devices]]` entry has an unusable location.
    #[error("device {name:?}: {source}")]
    DeviceLocation {
        name: String,
        #[source]
        source: DeviceError,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Everything the driver reads from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub scroll: ScrollSection,
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
    #[serde(default)]
    pub breather: BreatherConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// General driver behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    /// Config format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Serialize every device command behind the per-device command lock.
    #[serde(default = "default_true")]
    pub thread_safe: bool,
    /// Warn when a non-owning thread drives a device with `thread_safe` off.
    #[serde(default = "default_true")]
    pub warn_on_thread_misuse: bool,
    /// Brightness (percent) applied when a controller is built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_brightness: Option<u8>,
    /// Blank every display when its controller is built.
    #[serde(default = "default_true")]
    pub clear_on_init: bool,
    /// Text scrolled across all displays when the binary starts.
    #[serde(default = "default_startup_text")]
    pub startup_text: String,
    /// JSON glyph table to use instead of the bundled font.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
    /// Display events kept per device for `go_back`; `0` keeps none.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

/// Size of one display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
}

/// Scrolling text settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScrollSection {
    #[serde(default)]
    pub direction: ScrollDirection,
    #[serde(default = "default_spacing")]
    pub spacing: usize,
    /// Seconds each frame stays on screen.
    #[serde(default = "default_frame_duration")]
    pub frame_duration: f64,
    #[serde(default)]
    pub fit: FitPolicy,
    #[serde(default)]
    pub wrap: bool,
    /// Treat all displays as one wide surface.
    #[serde(default = "default_true")]
    pub span: bool,
}

/// Keep-alive ping settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct KeepAliveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keep_alive_interval")]
    pub interval_secs: u64,
}

/// Breathing brightness effect settings (percent values).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BreatherConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_breather_min")]
    pub min: u8,
    #[serde(default = "default_breather_max")]
    pub max: u8,
    #[serde(default = "default_breather_step")]
    pub step: u8,
    #[serde(default = "default_breather_fps")]
    pub fps: f64,
}

/// Execution guard settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GuardConfig {
    /// Upper bound on waiting for a device's command lock during cleanup.
    #[serde(default = "default_cleanup_lock_timeout_ms")]
    pub cleanup_lock_timeout_ms: u64,
    /// Keep sessions open until Ctrl-C after the work is done.
    #[serde(default)]
    pub wait_for_interrupt: bool,
    /// Seconds to run before stopping; absent means "until done".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_for: Option<f64>,
}

/// One attached display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub name: String,
    #[serde(default)]
    pub serial: String,
    /// Serial port path, e.g. `/dev/ttyACM0` or `COM3`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Abbreviation (`"L1"`) or USB port location (`"1-4.2"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<matrix_core::Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<i32>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_startup_text() -> String {
    "HELLO".to_string()
}
fn default_history_len() -> usize {
    DEFAULT_HISTORY_LEN
}
fn default_width() -> usize {
    MATRIX_WIDTH
}
fn default_height() -> usize {
    MATRIX_HEIGHT
}
fn default_spacing() -> usize {
    1
}
fn default_frame_duration() -> f64 {
    0.05
}
fn default_keep_alive_interval() -> u64 {
    50
}
fn default_breather_min() -> u8 {
    5
}
fn default_breather_max() -> u8 {
    60
}
fn default_breather_step() -> u8 {
    5
}
fn default_breather_fps() -> f64 {
    20.0
}
fn default_cleanup_lock_timeout_ms() -> u64 {
    1000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
            thread_safe: true,
            warn_on_thread_misuse: true,
            default_brightness: None,
            clear_on_init: true,
            startup_text: default_startup_text(),
            font_path: None,
            history_len: default_history_len(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for ScrollSection {
    fn default() -> Self {
        Self {
            direction: ScrollDirection::default(),
            spacing: default_spacing(),
            frame_duration: default_frame_duration(),
            fit: FitPolicy::default(),
            wrap: false,
            span: true,
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_keep_alive_interval(),
        }
    }
}

impl Default for BreatherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min: default_breather_min(),
            max: default_breather_max(),
            step: default_breather_step(),
            fps: default_breather_fps(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cleanup_lock_timeout_ms: default_cleanup_lock_timeout_ms(),
            wait_for_interrupt: false,
            run_for: None,
        }
    }
}

// ── Conversions into domain types ─────────────────────────────────────────────

impl DisplayConfig {
    pub fn geometry(&self) -> DisplayGeometry {
        DisplayGeometry::new(self.width, self.height)
    }
}

impl ScrollSection {
    /// Converts to the renderer's [`ScrollConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FrameDuration`] for a negative or non-finite
    /// `frame_duration`.
    pub fn to_scroll_config(&self) -> Result<ScrollConfig, ConfigError> {
        Ok(ScrollConfig {
            direction: self.direction,
            spacing: self.spacing,
            frame_duration: duration_from_secs(self.frame_duration)?,
            wrap: self.wrap,
            fit: self.fit,
        })
    }
}

impl KeepAliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl GuardConfig {
    pub fn cleanup_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_lock_timeout_ms)
    }
}

impl DeviceEntry {
    /// Resolves the entry's physical location.
    ///
    /// `location` wins over `side`/`slot`.  It is read as an abbreviation
    /// first and as a USB port location second.  An entry with neither is
    /// unranked.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DeviceLocation`] when `location` is neither a
    /// valid abbreviation nor a known port location.
    pub fn resolve_location(&self) -> Result<Location, ConfigError> {
        if let Some(location) = &self.location {
            return Location::from_abbrev(location)
                .or_else(|err| Location::from_port_location(location).ok_or(err))
                .map_err(|source| ConfigError::DeviceLocation {
                    name: self.name.clone(),
                    source,
                });
        }
        Ok(match self.side {
            Some(side) => Location::new(side, self.slot.unwrap_or(0)),
            None => Location::default(),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Directory holding `config.toml` and `state.toml`.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] when no base directory is known.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// `config_dir()/config.toml`.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Reads the driver config from [`config_file_path`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`; a missing file yields the defaults.
///
/// # Errors
///
/// [`ConfigError::Io`] when the file exists but cannot be read,
/// [`ConfigError::Parse`] when its contents do not deserialize.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to [`config_file_path`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Writes `config` to `path` as pretty TOML, creating missing parent
/// directories.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the app subdirectory.
pub(crate) fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LedMatrix"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("ledmatrix"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LedMatrix")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

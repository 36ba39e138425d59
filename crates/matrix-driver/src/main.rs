//! LED matrix driver entry point.
//!
//! Headless runner: loads the config, builds one controller per configured
//! display, identifies displays seen for the first time and scrolls the
//! startup text.  Ctrl-C interrupts whatever is running; guard cleanup still
//! clears the displays before the process exits.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML, defaults when missing
//!  └─ ConfiguredDevices          -- handles + serial port map
//!  └─ MatrixController (each)    -- gate, keep-alive, breather
//!  └─ run_until_shutdown()       -- blocking pool vs. Ctrl-C
//!       ├─ identify_new_devices  (first run only)
//!       └─ scroll_text           (startup text)
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use matrix_core::{GlyphTable, StopSignal};
use matrix_driver::application::controller::MatrixController;
use matrix_driver::application::execution_guard::ExecutionGuard;
use matrix_driver::application::operations::{
    identify_new_devices, scroll_text, IdentifyRequest, ScrollTextRequest,
};
use matrix_driver::application::runtime::{ctrl_c, run_until_shutdown};
use matrix_driver::infrastructure::discovery::{ConfiguredDevices, DeviceSource};
use matrix_driver::infrastructure::storage::config::{load_config, AppConfig};
use matrix_driver::infrastructure::storage::state::FileStateStore;
use matrix_driver::infrastructure::transport::mock::RecordingTransport;
use matrix_driver::infrastructure::transport::serial::SerialTransport;
use matrix_driver::infrastructure::transport::DeviceTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match load_config() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.driver.log_level)),
        )
        .init();

    info!("LED matrix driver {} starting", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!("failed to load config, using defaults: {e}");
    }

    let glyphs = Arc::new(load_glyphs(&config)?);
    let devices = ConfiguredDevices::from_entries(&config.devices)?;
    if devices.is_empty() {
        warn!("no [[devices]] configured; nothing to drive");
        return Ok(());
    }

    // ── Transport ─────────────────────────────────────────────────────────────
    let transport: Arc<dyn DeviceTransport> = if devices.port_map().is_empty() {
        info!("no serial ports configured; dry run against the recording transport");
        Arc::new(RecordingTransport::new())
    } else {
        Arc::new(SerialTransport::new(devices.port_map().clone()))
    };

    // ── Controllers ───────────────────────────────────────────────────────────
    let mut controllers = Vec::new();
    for device in devices.devices() {
        let name = device.to_string();
        let controller = MatrixController::builder(device)
            .configure(&config)?
            .transport(Arc::clone(&transport))
            .glyphs(Arc::clone(&glyphs))
            .build()
            .with_context(|| format!("failed to initialise {name}"))?;
        controllers.push(Arc::new(controller));
    }

    let guard = ExecutionGuard::new("driver")
        .cleanup_lock_timeout(config.guard.cleanup_lock_timeout())
        .wait_for_interrupt(config.guard.wait_for_interrupt);
    let store = FileStateStore::in_config_dir()?;
    let mut request = ScrollTextRequest::new(config.driver.startup_text.as_str());
    request.scroll = config.scroll.to_scroll_config()?;
    request.span = config.scroll.span;
    request.run_for = config.guard.run_for;
    request.clear_after = true;
    request.keep_alive = config.keep_alive.enabled;

    info!("driving {} matrices.  Press Ctrl-C to stop.", controllers.len());

    run_until_shutdown(StopSignal::new(), ctrl_c(), move |stop| -> anyhow::Result<()> {
        identify_new_devices(
            &controllers,
            &store,
            &IdentifyRequest::default(),
            &guard,
            &stop,
        )?;
        if stop.is_stopped() {
            return Ok(());
        }

        scroll_text(&controllers, &request, &guard, &stop)?;
        Ok(())
    })
    .await??;

    info!("LED matrix driver stopped");
    Ok(())
}

/// The configured font file, or the bundled font.
fn load_glyphs(config: &AppConfig) -> anyhow::Result<GlyphTable> {
    let Some(path) = &config.driver.font_path else {
        return Ok(GlyphTable::bundled());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read font {}", path.display()))?;
    let table = GlyphTable::from_json_str(&text)
        .with_context(|| format!("failed to parse font {}", path.display()))?;
    info!("loaded {} glyphs from {}", table.len(), path.display());
    Ok(table)
}

//! Integration tests for spanning text across several matrices.
//!
//! Devices come from a TOML config, controllers talk to the recording
//! transport, and the bytes each device received are decoded back into
//! frames and compared with the compositor's segments.

use std::sync::Arc;

use matrix_core::protocol::command::unpack_grid;
use matrix_core::{DeviceCommand, Grid, SpanCompositor, StopSignal};
use matrix_driver::application::controller::MatrixController;
use matrix_driver::application::execution_guard::{ExecutionGuard, GuardState};
use matrix_driver::application::operations::{scroll_text, ScrollTextRequest};
use matrix_driver::infrastructure::discovery::{ConfiguredDevices, DeviceSource};
use matrix_driver::infrastructure::storage::config::AppConfig;
use matrix_driver::infrastructure::transport::mock::RecordingTransport;

const CONFIG: &str = r#"
[driver]
clear_on_init = false

[scroll]
frame_duration = 0.0
span = true

[[devices]]
name = "left-inner"
serial = "SN-A"
location = "L1"

[[devices]]
name = "left-outer"
serial = "SN-B"
side = "left"
slot = 2

[[devices]]
name = "right"
serial = "SN-C"
location = "1-3.2"
"#;

fn setup() -> (AppConfig, RecordingTransport, Vec<Arc<MatrixController>>) {
    let config: AppConfig = toml::from_str(CONFIG).unwrap();
    let transport = RecordingTransport::new();
    let controllers = ConfiguredDevices::from_entries(&config.devices)
        .unwrap()
        .devices()
        .into_iter()
        .map(|device| {
            Arc::new(
                MatrixController::builder(device)
                    .configure(&config)
                    .unwrap()
                    .transport(Arc::new(transport.clone()))
                    .build()
                    .unwrap(),
            )
        })
        .collect();
    (config, transport, controllers)
}

fn drawn_grids(transport: &RecordingTransport, controller: &MatrixController) -> Vec<Grid> {
    transport
        .commands_for(controller.device().id())
        .into_iter()
        .filter_map(|command| match command {
            DeviceCommand::DrawBw(packed) => Some(unpack_grid(&packed)),
            _ => None,
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_span_plays_segments_in_physical_order() {
    // Arrange
    let (config, transport, controllers) = setup();
    let mut request = ScrollTextRequest::new("HI");
    request.scroll = config.scroll.to_scroll_config().unwrap();
    request.span = config.scroll.span;

    // Act
    let states = scroll_text(
        &controllers,
        &request,
        &ExecutionGuard::new("span"),
        &StopSignal::new(),
    )
    .unwrap();

    // Assert: rightmost first, then alternate: right, left-inner, left-outer.
    assert_eq!(states, vec![GuardState::Completed]);
    let segments = SpanCompositor::new(request.scroll, config.display.geometry())
        .unwrap()
        .compose_segments("HI", 3, controllers[0].glyphs())
        .unwrap();
    let order = [&controllers[2], &controllers[0], &controllers[1]];
    for (controller, segment) in order.iter().zip(&segments) {
        let expected: Vec<Grid> = segment.frames().iter().map(|f| f.grid().clone()).collect();
        assert_eq!(
            drawn_grids(&transport, controller),
            expected,
            "segment for {}",
            controller.device()
        );
    }
}

#[test]
fn test_span_frame_counts_match_across_devices() {
    let (config, transport, controllers) = setup();
    let mut request = ScrollTextRequest::new("HI");
    request.scroll = config.scroll.to_scroll_config().unwrap();
    request.span = true;

    scroll_text(
        &controllers,
        &request,
        &ExecutionGuard::new("span"),
        &StopSignal::new(),
    )
    .unwrap();

    // 27-column window + 11-column canvas.
    for controller in &controllers {
        assert_eq!(drawn_grids(&transport, controller).len(), 38);
    }
}

#[test]
fn test_span_clears_every_device_afterwards_when_asked() {
    let (config, transport, controllers) = setup();
    let mut request = ScrollTextRequest::new("OK");
    request.scroll = config.scroll.to_scroll_config().unwrap();
    request.span = true;
    request.clear_after = true;

    scroll_text(
        &controllers,
        &request,
        &ExecutionGuard::new("span"),
        &StopSignal::new(),
    )
    .unwrap();

    for controller in &controllers {
        let grids = drawn_grids(&transport, controller);
        assert!(grids.last().unwrap().is_blank());
        assert!(!controller.keep_alive());
    }
}

//! # matrix-core
//!
//! Shared library for driving 9x34 LED matrix displays: the pixel model,
//! text rendering, physical topology and the firmware wire format.
//!
//! It has zero dependencies on serial ports, threads of its own or
//! configuration files; those live in `matrix-driver`.
//!
//! # Architecture overview (for beginners)
//!
//! Several small LED matrices can sit side by side around a keyboard.  This
//! crate knows how to draw text on one of them and how to treat a row of them
//! as one long display.  It defines:
//!
//! - **`domain`** – Pure data: the column-major [`Grid`], timed [`Frame`]s
//!   and [`Animation`]s, device identity ([`DeviceHandle`]) and the
//!   [`TopologyRanker`] that puts devices in physical order.
//!
//! - **`render`** – Turns strings into animations.  Glyphs from a
//!   [`GlyphTable`] are normalized, laid out on a canvas and sliced into
//!   frames by the [`TextScroller`] or, across several displays, by the
//!   [`SpanCompositor`].
//!
//! - **`protocol`** – How a [`DeviceCommand`] becomes bytes on the wire.

pub mod domain;
pub mod protocol;
pub mod render;

// Re-export the most-used types at the crate root so callers can write
// `matrix_core::Grid` instead of `matrix_core::domain::grid::Grid`.
pub use domain::animation::{
    duration_from_secs, Animation, Frame, FrameSink, PlaybackError, PlaybackOutcome,
};
pub use domain::device::{DeviceError, DeviceHandle, DeviceId, Location, Side};
pub use domain::grid::{
    Align, DisplayGeometry, Grid, HAlign, ModelError, VAlign, MATRIX_HEIGHT, MATRIX_WIDTH,
};
pub use domain::signal::{StopReason, StopSignal};
pub use domain::topology::{Positioned, SpanStart, TopologyRanker};
pub use protocol::command::{DeviceCommand, ProtocolError};
pub use render::font::GlyphTable;
pub use render::glyph::{BitOrder, FitPolicy, GlyphError, GlyphNormalizer, RawGlyph, RowMajorBitmap};
pub use render::span::{SpanCompositor, SpanError};
pub use render::text_scroll::{ScrollConfig, ScrollDirection, TextScroller};

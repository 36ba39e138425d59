//! Scrolling one string across several adjacent displays.
//!
//! The compositor renders the text once, exactly as a horizontal scroll
//! would, then slides a window `segment_width * devices` columns wide over
//! it.  At each tick the window is cut into one segment per device, in the
//! order the devices were given (see `TopologyRanker::order_for_span`).
//!
//! ```text
//!   window at offset k:  [ seg 0 | seg 1 | seg 2 ]
//!                           dev0    dev1    dev2
//! ```
//!
//! Every device receives the same number of frames with the same duration,
//! which keeps independently started playbacks in step.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::animation::Animation;
use crate::domain::device::{DeviceHandle, DeviceId};
use crate::domain::grid::{DisplayGeometry, Grid};
use crate::render::font::GlyphTable;
use crate::render::glyph::GlyphError;
use crate::render::text_scroll::{ScrollConfig, ScrollDirection, TextScroller};

/// Errors raised while composing a span.
#[derive(Debug, Error)]
pub enum SpanError {
    /// Spanning only works for horizontal scrolling.
    #[error("span compositing requires horizontal scrolling, got {0}")]
    UnsupportedSpanDirection(ScrollDirection),

    #[error(transparent)]
    Glyph(#[from] GlyphError),
}

/// Builds synchronized per-device animations for a multi-display span.
#[derive(Debug, Clone)]
pub struct SpanCompositor {
    scroller: TextScroller,
}

impl SpanCompositor {
    /// `geometry` is the size of one display (one segment).
    ///
    /// # Errors
    ///
    /// Returns [`SpanError::UnsupportedSpanDirection`] unless
    /// `config.direction` is horizontal.
    pub fn new(config: ScrollConfig, geometry: DisplayGeometry) -> Result<Self, SpanError> {
        if !config.direction.is_horizontal() {
            return Err(SpanError::UnsupportedSpanDirection(config.direction));
        }
        Ok(Self {
            scroller: TextScroller::new(config, geometry),
        })
    }

    /// Composes `text` across `ordered_devices`, keyed by device id.
    ///
    /// An empty device list yields an empty map.
    ///
    /// # Errors
    ///
    /// Any [`GlyphError`] raised while rendering the text.
    pub fn compose(
        &self,
        text: &str,
        ordered_devices: &[DeviceHandle],
        table: &GlyphTable,
    ) -> Result<HashMap<DeviceId, Animation>, SpanError> {
        let segments = self.compose_segments(text, ordered_devices.len(), table)?;
        Ok(ordered_devices
            .iter()
            .map(DeviceHandle::id)
            .zip(segments)
            .collect())
    }

    /// Composes `text` across `count` segments, returned in segment order.
    ///
    /// # Errors
    ///
    /// Any [`GlyphError`] raised while rendering the text.
    pub fn compose_segments(
        &self,
        text: &str,
        count: usize,
        table: &GlyphTable,
    ) -> Result<Vec<Animation>, SpanError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let DisplayGeometry {
            width: segment_width,
            height,
        } = self.scroller.geometry();
        let frame_duration = self.scroller.config().frame_duration;

        let glyphs = self.scroller.glyphs(text, table)?;
        let canvas = self.scroller.horizontal_canvas(&glyphs);
        if glyphs.is_empty() || canvas.is_empty() {
            let blank = Grid::blank(segment_width, height);
            return Ok((0..count)
                .map(|_| Animation::from_grids([blank.clone(), blank.clone()], frame_duration))
                .collect());
        }

        let window_width = (segment_width * count) as i64;
        let mut per_segment: Vec<Vec<Grid>> = vec![Vec::new(); count];
        for offset in -window_width..canvas.width() as i64 {
            for (index, grids) in per_segment.iter_mut().enumerate() {
                let x = offset + (index * segment_width) as i64;
                grids.push(canvas.window(x, 0, segment_width, height));
            }
        }

        Ok(per_segment
            .into_iter()
            .map(|grids| Animation::from_grids(grids, frame_duration))
            .collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

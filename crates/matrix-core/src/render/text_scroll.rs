//! Scrolling-text animation builder.
//!
//! # How scrolling works (for beginners)
//!
//! The whole string is drawn once onto a [`Canvas`] that is much wider (or
//! taller) than one display.  A display-sized window then slides across the
//! canvas one pixel per frame.  Starting the window fully off-canvas gives
//! the "text enters from the right edge" effect; the reads outside the canvas
//! are simply blank.
//!
//! ```text
//!   offset -9          offset 0           offset 3
//!   [.........]HELLO   [HELLO....]        HEL[LO.......]
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::animation::Animation;
use crate::domain::grid::{DisplayGeometry, Grid};
use crate::render::canvas::Canvas;
use crate::render::font::GlyphTable;
use crate::render::glyph::{FitPolicy, GlyphError, GlyphNormalizer, RowMajorBitmap};

/// Default time each scroll frame stays on screen.
pub const DEFAULT_SCROLL_FRAME: Duration = Duration::from_millis(50);

/// Direction text moves across the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// Right to left.
    #[default]
    #[serde(alias = "h")]
    Horizontal,
    /// Bottom to top.
    #[serde(alias = "vertical_up")]
    Up,
    /// Top to bottom.
    #[serde(alias = "vertical_down")]
    Down,
}

impl ScrollDirection {
    pub fn is_horizontal(self) -> bool {
        self == ScrollDirection::Horizontal
    }
}

impl std::fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScrollDirection::Horizontal => "horizontal",
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        })
    }
}

/// Tunables for [`TextScroller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollConfig {
    pub direction: ScrollDirection,
    /// Blank columns (horizontal) or rows (vertical) between glyphs.
    pub spacing: usize,
    pub frame_duration: Duration,
    /// Skip the off-screen lead-in of horizontal scrolls.
    pub wrap: bool,
    pub fit: FitPolicy,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            direction: ScrollDirection::Horizontal,
            spacing: 1,
            frame_duration: DEFAULT_SCROLL_FRAME,
            wrap: false,
            fit: FitPolicy::Error,
        }
    }
}

/// Builds scrolling and static text renderings for one display geometry.
#[derive(Debug, Clone)]
pub struct TextScroller {
    config: ScrollConfig,
    geometry: DisplayGeometry,
    normalizer: GlyphNormalizer,
}

impl TextScroller {
    pub fn new(config: ScrollConfig, geometry: DisplayGeometry) -> Self {
        Self {
            config,
            geometry,
            normalizer: GlyphNormalizer::new(config.fit),
        }
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    /// Builds the scrolling animation for `text`.
    ///
    /// Empty text (or a canvas with no area) yields a two-frame blank
    /// animation instead of an error.
    ///
    /// # Errors
    ///
    /// Any [`GlyphError`] from lookup or normalization, e.g.
    /// [`GlyphError::MissingGlyph`].
    pub fn build(&self, text: &str, table: &GlyphTable) -> Result<Animation, GlyphError> {
        let glyphs = self.glyphs(text, table)?;
        let DisplayGeometry { width, height } = self.geometry;

        let grids: Vec<Grid> = match self.config.direction {
            ScrollDirection::Horizontal => {
                let canvas = self.horizontal_canvas(&glyphs);
                if glyphs.is_empty() || canvas.is_empty() {
                    return Ok(self.blank_animation());
                }
                let start = if self.config.wrap { 0 } else { -(width as i64) };
                (start..canvas.width() as i64)
                    .map(|offset| canvas.window(offset, 0, width, height))
                    .collect()
            }
            direction @ (ScrollDirection::Up | ScrollDirection::Down) => {
                let canvas = self.vertical_canvas(&glyphs);
                if glyphs.is_empty() || canvas.is_empty() {
                    return Ok(self.blank_animation());
                }
                let total = canvas.height() as i64;
                // Ascending offsets move the content up the display: it
                // enters below the bottom row and leaves above the top row.
                let mut offsets: Vec<i64> = (-(height as i64)..=total).collect();
                if direction == ScrollDirection::Down {
                    offsets.reverse();
                }
                offsets
                    .into_iter()
                    .map(|offset| canvas.window(0, offset, width, height))
                    .collect()
            }
        };

        Ok(Animation::from_grids(grids, self.config.frame_duration))
    }

    /// Lays `text` out as a single still image: glyphs stacked top to bottom,
    /// horizontally centred, cropped to the display.
    ///
    /// # Errors
    ///
    /// Any [`GlyphError`] from lookup or normalization.
    pub fn render_static(&self, text: &str, table: &GlyphTable) -> Result<Grid, GlyphError> {
        let glyphs = self.glyphs(text, table)?;
        let canvas = self.vertical_canvas(&glyphs);
        Ok(canvas.window(0, 0, self.geometry.width, self.geometry.height))
    }

    /// Looks up and normalizes every character of `text`.
    pub(crate) fn glyphs(
        &self,
        text: &str,
        table: &GlyphTable,
    ) -> Result<Vec<RowMajorBitmap>, GlyphError> {
        text.chars()
            .map(|ch| {
                let raw = table.require(ch)?;
                self.normalizer.normalize(raw, self.geometry.height)
            })
            .collect()
    }

    /// Glyphs side by side, each vertically centred in the display height.
    pub(crate) fn horizontal_canvas(&self, glyphs: &[RowMajorBitmap]) -> Canvas {
        let spacing = self.config.spacing;
        let width = glyphs.iter().map(RowMajorBitmap::width).sum::<usize>()
            + spacing * glyphs.len().saturating_sub(1);
        let height = self.geometry.height;

        let mut canvas = Canvas::new(width, height);
        let mut x = 0usize;
        for glyph in glyphs {
            let y = height.saturating_sub(glyph.height()) / 2;
            canvas.blit(glyph, x as i64, y as i64);
            x += glyph.width() + spacing;
        }
        canvas
    }

    /// Glyphs stacked top to bottom, each horizontally centred in the display width.
    fn vertical_canvas(&self, glyphs: &[RowMajorBitmap]) -> Canvas {
        let spacing = self.config.spacing;
        let height = glyphs.iter().map(RowMajorBitmap::height).sum::<usize>()
            + spacing * glyphs.len().saturating_sub(1);
        let width = self.geometry.width;

        let mut canvas = Canvas::new(width, height);
        let mut y = 0usize;
        for glyph in glyphs {
            let x = (width as i64 - glyph.width() as i64).div_euclid(2);
            canvas.blit(glyph, x, y as i64);
            y += glyph.height() + spacing;
        }
        canvas
    }

    fn blank_animation(&self) -> Animation {
        let blank = self.geometry.blank_grid();
        Animation::from_grids([blank.clone(), blank], self.config.frame_duration)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::glyph::RawGlyph;

    fn scroller(direction: ScrollDirection, wrap: bool) -> TextScroller {
        TextScroller::new(
            ScrollConfig {
                direction,
                wrap,
                ..ScrollConfig::default()
            },
            DisplayGeometry::new(34, 34),
        )
    }

    /// Table with a 3x2 solid block for `#`.
    fn block_table() -> GlyphTable {
        let mut table = GlyphTable::new();
        table.insert('#', RawGlyph::Rows(vec![vec![1, 1, 1], vec![1, 1, 1]]));
        table
    }

    // ── horizontal ────────────────────────────────────────────────────────────

    #[test]
    fn test_hi_on_34_wide_display_produces_45_frames() {
        // Arrange
        let table = GlyphTable::bundled();

        // Act
        let animation = scroller(ScrollDirection::Horizontal, false)
            .build("HI", &table)
            .unwrap();

        // Assert: 34 lead-in offsets + canvas width (5 + 1 + 5)
        assert_eq!(animation.frame_count(), 45);
    }

    #[test]
    fn test_wrap_produces_canvas_width_frames() {
        let table = GlyphTable::bundled();
        let animation = scroller(ScrollDirection::Horizontal, true)
            .build("HI", &table)
            .unwrap();
        assert_eq!(animation.frame_count(), 11);
    }

    #[test]
    fn test_frame_count_law_holds_for_default_geometry() {
        let table = GlyphTable::bundled();
        for text in ["A", "HELLO", "12:30"] {
            let glyph_width = 5 * text.len() + (text.len() - 1);
            let plain = TextScroller::new(ScrollConfig::default(), DisplayGeometry::default())
                .build(text, &table)
                .unwrap();
            let wrapped = TextScroller::new(
                ScrollConfig {
                    wrap: true,
                    ..ScrollConfig::default()
                },
                DisplayGeometry::default(),
            )
            .build(text, &table)
            .unwrap();
            assert_eq!(plain.frame_count(), glyph_width + 9);
            assert_eq!(wrapped.frame_count(), glyph_width);
        }
    }

    #[test]
    fn test_first_frame_is_blank_and_text_enters_from_right() {
        let animation = scroller(ScrollDirection::Horizontal, false)
            .build("#", &block_table())
            .unwrap();
        let frames = animation.frames();

        assert!(frames[0].grid().is_blank());
        // At offset -33 the block's first column sits in the last display
        // column, vertically centred.
        let entering = frames[1].grid();
        assert!(entering.is_lit(33, 16));
        assert!(entering.is_lit(33, 17));
        assert!(!entering.is_lit(32, 16));
    }

    #[test]
    fn test_every_frame_gets_configured_duration() {
        let config = ScrollConfig {
            frame_duration: Duration::from_millis(80),
            ..ScrollConfig::default()
        };
        let animation = TextScroller::new(config, DisplayGeometry::default())
            .build("AB", &GlyphTable::bundled())
            .unwrap();
        assert!(animation
            .frames()
            .iter()
            .all(|f| f.duration() == Duration::from_millis(80)));
    }

    #[test]
    fn test_lowercase_text_uses_uppercase_glyphs() {
        let table = GlyphTable::bundled();
        let upper = scroller(ScrollDirection::Horizontal, false).build("HI", &table).unwrap();
        let lower = scroller(ScrollDirection::Horizontal, false).build("hi", &table).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_missing_glyph_fails() {
        let result = scroller(ScrollDirection::Horizontal, false).build("H~", &GlyphTable::bundled());
        assert!(matches!(result, Err(GlyphError::MissingGlyph('~'))));
    }

    #[test]
    fn test_empty_text_yields_two_blank_frames() {
        for direction in [ScrollDirection::Horizontal, ScrollDirection::Up, ScrollDirection::Down] {
            let animation = scroller(direction, false).build("", &GlyphTable::bundled()).unwrap();
            assert_eq!(animation.frame_count(), 2);
            assert!(animation.frames().iter().all(|f| f.grid().is_blank()));
        }
    }

    // ── vertical ──────────────────────────────────────────────────────────────

    #[test]
    fn test_vertical_frame_count_covers_both_ends() {
        // Two 7-row glyphs + 1 spacing row = 15 rows; offsets -34..=15.
        let animation = scroller(ScrollDirection::Up, false)
            .build("HI", &GlyphTable::bundled())
            .unwrap();
        assert_eq!(animation.frame_count(), 15 + 34 + 1);
    }

    #[test]
    fn test_up_and_down_are_reverses_of_each_other() {
        let table = GlyphTable::bundled();
        let up = scroller(ScrollDirection::Up, false).build("HI", &table).unwrap();
        let down = scroller(ScrollDirection::Down, false).build("HI", &table).unwrap();
        let up_grids: Vec<&Grid> = up.frames().iter().map(|f| f.grid()).collect();
        let mut down_grids: Vec<&Grid> = down.frames().iter().map(|f| f.grid()).collect();
        down_grids.reverse();
        assert_eq!(up_grids, down_grids);
    }

    #[test]
    fn test_up_enters_from_below_viewport() {
        let animation = scroller(ScrollDirection::Up, false)
            .build("#", &block_table())
            .unwrap();
        let frames = animation.frames();
        assert!(frames[0].grid().is_blank());
        assert!(frames.last().unwrap().grid().is_blank());
        // Centred horizontally: (34 - 3) / 2 = 15.
        let visible = frames.iter().find(|f| !f.grid().is_blank()).unwrap().grid();
        assert!(visible.is_lit(15, 33));
        assert!(!visible.is_lit(14, 33));
    }

    // ── static ────────────────────────────────────────────────────────────────

    #[test]
    fn test_render_static_places_glyphs_at_top_centre() {
        let scroller = TextScroller::new(ScrollConfig::default(), DisplayGeometry::default());
        let grid = scroller.render_static("I", &GlyphTable::bundled()).unwrap();
        assert_eq!((grid.width(), grid.height()), (9, 34));
        // 'I' upright is its middle column: (9 - 5) / 2 + 2 = 4.
        for y in 0..7 {
            assert!(grid.is_lit(4, y));
        }
        assert!(!grid.is_lit(4, 8));
    }
}

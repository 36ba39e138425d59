//! Oversized drawing surface that frames are sliced out of.
//!
//! Scrolling text is rendered once onto a [`Canvas`] that is wider (or
//! taller) than the display.  Each animation frame is then a display-sized
//! [`window`](Canvas::window) at a different offset.  Coordinates outside the
//! canvas read as blank, which is what produces the empty lead-in and
//! lead-out frames.

use crate::domain::grid::Grid;
use crate::render::glyph::RowMajorBitmap;

/// Row-major 0/1 drawing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Canvas {
    /// Creates a blank canvas.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `true` when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Reads the pixel at signed coordinates; anything outside is 0.
    pub fn get(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 {
            return 0;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.cells[y * self.width + x]
    }

    /// ORs `bitmap` onto the canvas with its top-left corner at `(x, y)`.
    ///
    /// Pixels falling outside the canvas are clipped.
    pub fn blit(&mut self, bitmap: &RowMajorBitmap, x: i64, y: i64) {
        for (row_index, row) in bitmap.rows().iter().enumerate() {
            let cy = y + row_index as i64;
            if cy < 0 || cy >= self.height as i64 {
                continue;
            }
            for (col_index, &value) in row.iter().enumerate() {
                let cx = x + col_index as i64;
                if value == 0 || cx < 0 || cx >= self.width as i64 {
                    continue;
                }
                self.cells[cy as usize * self.width + cx as usize] = 1;
            }
        }
    }

    /// Slices a `width` × `height` grid whose top-left corner sits at
    /// canvas coordinates `(x, y)`.
    pub fn window(&self, x: i64, y: i64, width: usize, height: usize) -> Grid {
        Grid::from_fn(width, height, |col, row| {
            self.get(x + col as i64, y + row as i64)
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::glyph::{FitPolicy, GlyphNormalizer, RawGlyph};

    fn bitmap(rows: Vec<Vec<u8>>) -> RowMajorBitmap {
        GlyphNormalizer::new(FitPolicy::Error)
            .normalize(&RawGlyph::Rows(rows), 100)
            .unwrap()
    }

    #[test]
    fn test_out_of_bounds_reads_are_blank() {
        let canvas = Canvas::new(2, 2);
        assert_eq!(canvas.get(-1, 0), 0);
        assert_eq!(canvas.get(0, 5), 0);
    }

    #[test]
    fn test_blit_clips_at_edges() {
        // Arrange
        let mut canvas = Canvas::new(2, 2);
        let block = bitmap(vec![vec![1, 1], vec![1, 1]]);

        // Act
        canvas.blit(&block, 1, -1);

        // Assert: only (1, 0) is covered.
        assert_eq!(canvas.get(1, 0), 1);
        assert_eq!(canvas.get(0, 0), 0);
        assert_eq!(canvas.get(1, 1), 0);
    }

    #[test]
    fn test_window_pads_outside_with_zero() {
        let mut canvas = Canvas::new(1, 1);
        canvas.blit(&bitmap(vec![vec![1]]), 0, 0);

        let grid = canvas.window(-1, 0, 3, 1);

        assert_eq!(grid.cells(), &[0, 1, 0]);
    }

    #[test]
    fn test_zero_width_canvas_is_empty() {
        assert!(Canvas::new(0, 34).is_empty());
        assert!(!Canvas::new(1, 1).is_empty());
    }
}

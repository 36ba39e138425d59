//! Pixel grid domain entity.
//!
//! A [`Grid`] is the unit exchanged with the transport layer: an immutable,
//! column-major buffer of pixel intensities.  Cell `(x, y)` is the pixel at
//! column `x`, row `y`, and lives at index `x * height + y` in the backing
//! vector.  The firmware packs pixels column by column, so keeping the same
//! layout in memory means encoding never has to transpose.
//!
//! # Why column-major? (for beginners)
//!
//! Most image code stores pixels row by row ("row-major").  The LED matrix is
//! physically 9 columns wide and 34 rows tall, and the firmware thinks about
//! it as nine tall strips of LEDs.  Storing one strip after another keeps each
//! column contiguous, so [`Grid::column`] can hand out a plain slice.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of LED columns on one physical matrix.
pub const MATRIX_WIDTH: usize = 9;

/// Number of LED rows on one physical matrix.
pub const MATRIX_HEIGHT: usize = 34;

/// Errors raised while constructing model values (grids, frames).
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// Columns (or rows) of the input matrix have different lengths.
    #[error("ragged pixel data: line {index} has length {found}, expected {expected}")]
    Ragged {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// A frame duration was negative, NaN or infinite.
    #[error("invalid frame duration: {0}s (must be finite and >= 0)")]
    InvalidFrameDuration(f64),
}

/// Size of one physical display in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayGeometry {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl DisplayGeometry {
    /// Creates a geometry of `width` columns by `height` rows.
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Returns a blank grid of this size.
    pub fn blank_grid(&self) -> Grid {
        Grid::blank(self.width, self.height)
    }

    /// A level gauge: the bottom `percent`% of rows lit, rounded to the
    /// nearest row.  Values above 100 fill the display.
    pub fn percent_bar(&self, percent: u8) -> Grid {
        let percent = usize::from(percent.min(100));
        let lit = (percent * self.height + 50) / 100;
        let top = self.height - lit;
        Grid::from_fn(self.width, self.height, |_, y| u8::from(y >= top))
    }
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self::new(MATRIX_WIDTH, MATRIX_HEIGHT)
    }
}

/// Horizontal placement used by [`Grid::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical placement used by [`Grid::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

/// Combined alignment for placing content inside a target area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Align {
    pub horizontal: HAlign,
    pub vertical: VAlign,
}

impl Align {
    /// Centres content on both axes.
    pub const CENTER: Align = Align {
        horizontal: HAlign::Center,
        vertical: VAlign::Center,
    };
}

/// Immutable column-major pixel buffer.
///
/// Once built a grid never changes; every animation frame gets a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// Creates an all-off grid.
    pub fn blank(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0)
    }

    /// Creates a grid with every cell set to `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width * height],
        }
    }

    /// Builds a grid from a list of columns (outer index = x, inner = y).
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Ragged`] if the columns differ in length.
    pub fn from_columns(columns: Vec<Vec<u8>>) -> Result<Self, ModelError> {
        let height = columns.first().map_or(0, Vec::len);
        let width = columns.len();
        let mut cells = Vec::with_capacity(width * height);
        for (index, column) in columns.into_iter().enumerate() {
            if column.len() != height {
                return Err(ModelError::Ragged {
                    index,
                    expected: height,
                    found: column.len(),
                });
            }
            cells.extend(column);
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Builds a grid from row-major data (outer index = y, inner = x).
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Ragged`] if the rows differ in length.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, ModelError> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ModelError::Ragged {
                index,
                expected: width,
                found: row.len(),
            });
        }
        let height = rows.len();
        let mut cells = vec![0u8; width * height];
        for (y, row) in rows.iter().enumerate() {
            for (x, &value) in row.iter().enumerate() {
                cells[x * height + y] = value;
            }
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Builds a grid by evaluating `f(x, y)` for every cell.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for x in 0..width {
            for y in 0..height {
                cells.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the size of this grid as a [`DisplayGeometry`].
    pub fn geometry(&self) -> DisplayGeometry {
        DisplayGeometry::new(self.width, self.height)
    }

    /// Returns the intensity at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.cells[x * self.height + y])
        } else {
            None
        }
    }

    /// Returns `true` if the pixel at `(x, y)` is on (non-zero).
    pub fn is_lit(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some_and(|v| v != 0)
    }

    /// Returns column `x` as a contiguous slice of `height` cells.
    ///
    /// # Panics
    ///
    /// Panics if `x >= width`.
    pub fn column(&self, x: usize) -> &[u8] {
        let start = x * self.height;
        &self.cells[start..start + self.height]
    }

    /// Iterates over all columns from left to right.
    pub fn columns(&self) -> impl Iterator<Item = &[u8]> {
        // `chunks(0)` panics, and a zero-height grid has no visible columns.
        self.cells.chunks(self.height.max(1)).take(if self.height == 0 { 0 } else { self.width })
    }

    /// Raw column-major cell storage.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Number of lit (non-zero) cells.
    pub fn lit_count(&self) -> usize {
        self.cells.iter().filter(|&&v| v != 0).count()
    }

    /// Returns `true` if no pixel is lit.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|&v| v == 0)
    }

    /// Places this grid inside a `width` × `height` area.
    ///
    /// Content is padded with zeros when smaller than the target and cropped
    /// when larger; `align` decides which edge (or the centre) is anchored.
    pub fn fit(&self, width: usize, height: usize, align: Align) -> Grid {
        let off_x = offset(self.width, width, match align.horizontal {
            HAlign::Left => Anchor::Start,
            HAlign::Center => Anchor::Middle,
            HAlign::Right => Anchor::End,
        });
        let off_y = offset(self.height, height, match align.vertical {
            VAlign::Top => Anchor::Start,
            VAlign::Center => Anchor::Middle,
            VAlign::Bottom => Anchor::End,
        });

        Grid::from_fn(width, height, |x, y| {
            let src_x = x as i64 - off_x;
            let src_y = y as i64 - off_y;
            if src_x < 0 || src_y < 0 {
                return 0;
            }
            self.get(src_x as usize, src_y as usize).unwrap_or(0)
        })
    }
}

enum Anchor {
    Start,
    Middle,
    End,
}

/// Offset (destination minus source) that anchors `src` inside `dst`.
fn offset(src: usize, dst: usize, anchor: Anchor) -> i64 {
    let diff = dst as i64 - src as i64;
    match anchor {
        Anchor::Start => 0,
        // Floor division so that odd overflow crops evenly from the top/left first.
        Anchor::Middle => diff.div_euclid(2),
        Anchor::End => diff,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_grid_has_width_times_height_cells() {
        let grid = Grid::blank(9, 34);
        assert_eq!(grid.cells().len(), 9 * 34);
        assert!(grid.is_blank());
    }

    #[test]
    fn test_from_columns_stores_column_major() {
        // Arrange
        let columns = vec![vec![1, 0, 0], vec![0, 1, 0]];

        // Act
        let grid = Grid::from_columns(columns).unwrap();

        // Assert
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.cells(), &[1, 0, 0, 0, 1, 0]);
        assert!(grid.is_lit(1, 1));
        assert!(!grid.is_lit(1, 0));
    }

    #[test]
    fn test_from_rows_matches_from_columns() {
        let rows = vec![vec![1, 0], vec![0, 1], vec![0, 0]];
        let by_rows = Grid::from_rows(&rows).unwrap();
        let by_cols = Grid::from_columns(vec![vec![1, 0, 0], vec![0, 1, 0]]).unwrap();
        assert_eq!(by_rows, by_cols);
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let result = Grid::from_columns(vec![vec![1, 0], vec![1]]);
        assert_eq!(
            result,
            Err(ModelError::Ragged {
                index: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_get_out_of_bounds_returns_none() {
        let grid = Grid::blank(2, 2);
        assert_eq!(grid.get(2, 0), None);
        assert_eq!(grid.get(0, 2), None);
    }

    #[test]
    fn test_column_returns_contiguous_slice() {
        let grid = Grid::from_fn(3, 4, |x, y| (x * 10 + y) as u8);
        assert_eq!(grid.column(2), &[20, 21, 22, 23]);
        assert_eq!(grid.columns().count(), 3);
    }

    #[test]
    fn test_fit_pads_left_top_by_default() {
        // Arrange
        let small = Grid::filled(2, 2, 1);

        // Act
        let fitted = small.fit(4, 4, Align::default());

        // Assert
        assert_eq!(fitted.width(), 4);
        assert!(fitted.is_lit(0, 0));
        assert!(fitted.is_lit(1, 1));
        assert!(!fitted.is_lit(2, 2));
        assert_eq!(fitted.lit_count(), 4);
    }

    #[test]
    fn test_fit_centers_content() {
        let small = Grid::filled(1, 1, 1);
        let fitted = small.fit(3, 3, Align::CENTER);
        assert!(fitted.is_lit(1, 1));
        assert_eq!(fitted.lit_count(), 1);
    }

    #[test]
    fn test_fit_right_bottom_crops_from_origin() {
        let wide = Grid::from_fn(4, 1, |x, _| x as u8 + 1);
        let fitted = wide.fit(
            2,
            1,
            Align {
                horizontal: HAlign::Right,
                vertical: VAlign::Bottom,
            },
        );
        assert_eq!(fitted.cells(), &[3, 4]);
    }

    #[test]
    fn test_percent_bar_fills_from_the_bottom() {
        // Arrange
        let geometry = DisplayGeometry::default();

        // Act
        let half = geometry.percent_bar(50);

        // Assert: 17 of 34 rows, every column.
        assert_eq!(half.lit_count(), 17 * MATRIX_WIDTH);
        assert!(half.is_lit(0, MATRIX_HEIGHT - 1));
        assert!(half.is_lit(MATRIX_WIDTH - 1, 17));
        assert!(!half.is_lit(0, 16));
    }

    #[test]
    fn test_percent_bar_extremes() {
        let geometry = DisplayGeometry::default();
        assert!(geometry.percent_bar(0).is_blank());
        assert_eq!(geometry.percent_bar(100).lit_count(), MATRIX_WIDTH * MATRIX_HEIGHT);
        assert_eq!(geometry.percent_bar(250), geometry.percent_bar(100));
        // 1% of 34 rows rounds down to nothing, 2% rounds up to one row.
        assert!(geometry.percent_bar(1).is_blank());
        assert_eq!(geometry.percent_bar(2).lit_count(), MATRIX_WIDTH);
    }

    #[test]
        fn test_default_geometry_is_physical_matrix() {
        let geometry = DisplayGeometry::default();
        assert_eq!(geometry, DisplayGeometry::new(9, 34));
        assert_eq!(geometry.blank_grid().cells().len(), 306);
    }
}

//! Glyph shapes and normalization to row-major bitmaps.
//!
//! Font tables in the wild store characters in several shapes: row matrices,
//! per-column bit masks, or rows of `'0'`/`'1'` strings.  [`RawGlyph`] names
//! each accepted shape explicitly and [`GlyphNormalizer`] turns any of them
//! into a [`RowMajorBitmap`] no taller than the display.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::grid::Grid;

/// Errors raised while decoding or normalizing glyphs.
#[derive(Debug, Error)]
pub enum GlyphError {
    /// The glyph data matches none of the accepted shapes.
    #[error("unsupported glyph format: {0}")]
    UnsupportedGlyphFormat(String),

    /// The glyph is taller than the target and the fit policy is `Error`.
    #[error("glyph height {height} exceeds display height {target}")]
    GlyphTooTall { height: usize, target: usize },

    /// The text contains a character the glyph table does not define.
    #[error("character {0:?} not found in glyph table")]
    MissingGlyph(char),

    /// A glyph table was not valid JSON.
    #[error("glyph table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which bit of a column mask holds the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    /// The most significant used bit is the top row.
    #[default]
    MsbTop,
    /// Bit 0 is the top row (classic 5x7 LCD fonts).
    LsbTop,
}

/// What to do with a glyph taller than the target height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Fail with [`GlyphError::GlyphTooTall`].
    #[default]
    Error,
    /// Keep the middle `target` rows.
    Crop,
    /// OR-pool row buckets down to `target` rows.
    Scale,
}

/// A glyph in one of the accepted source shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawGlyph {
    /// Row-major matrix; any non-zero value is lit.
    Rows(Vec<Vec<u8>>),
    /// One bit mask per column.
    Columns {
        masks: Vec<u64>,
        /// Number of rows; when `None` it is the widest mask's bit length (at least 1).
        height: Option<usize>,
        bit_order: BitOrder,
    },
    /// Rows written as strings of `'0'` and `'1'`.
    RowStrings(Vec<String>),
    /// No data; renders as a single blank column.
    Blank,
}

impl RawGlyph {
    /// Classifies a JSON value into one of the accepted shapes.
    ///
    /// Accepted: an array of integer arrays, an array of integers (column
    /// masks), an array of strings, `null`, `0`, `[]`, or an object with a
    /// `rows`/`grid` matrix or `cols` masks (plus optional `height` and
    /// `bit_order`).
    ///
    /// # Errors
    ///
    /// Returns [`GlyphError::UnsupportedGlyphFormat`] for anything else,
    /// including ragged rows and strings with characters other than `0`/`1`.
    pub fn from_json(value: &Value) -> Result<RawGlyph, GlyphError> {
        match value {
            Value::Null => Ok(RawGlyph::Blank),
            Value::Number(n) if n.as_u64() == Some(0) => Ok(RawGlyph::Blank),
            Value::Array(items) => Self::from_json_array(items),
            Value::Object(map) => {
                if let Some(rows) = map.get("rows").or_else(|| map.get("grid")) {
                    return match rows {
                        Value::Array(items) if items.first().is_some_and(Value::is_array) => {
                            Ok(RawGlyph::Rows(json_matrix(items)?))
                        }
                        other => Err(unsupported(format!("rows must be a matrix, got {other}"))),
                    };
                }
                if let Some(Value::Array(cols)) = map.get("cols") {
                    let height = match map.get("height") {
                        None | Some(Value::Null) => None,
                        Some(h) => Some(
                            h.as_u64()
                                .map(|h| h as usize)
                                .ok_or_else(|| unsupported(format!("invalid height {h}")))?,
                        ),
                    };
                    let bit_order = match map.get("bit_order") {
                        None | Some(Value::Null) => BitOrder::default(),
                        Some(order) => serde_json::from_value(order.clone())
                            .map_err(|_| unsupported(format!("invalid bit_order {order}")))?,
                    };
                    return Ok(RawGlyph::Columns {
                        masks: json_masks(cols)?,
                        height,
                        bit_order,
                    });
                }
                Err(unsupported("object without rows, grid or cols".to_string()))
            }
            other => Err(unsupported(format!("unexpected value {other}"))),
        }
    }

    fn from_json_array(items: &[Value]) -> Result<RawGlyph, GlyphError> {
        match items.first() {
            None => Ok(RawGlyph::Blank),
            Some(Value::Array(_)) => Ok(RawGlyph::Rows(json_matrix(items)?)),
            Some(Value::Number(_)) => Ok(RawGlyph::Columns {
                masks: json_masks(items)?,
                height: None,
                bit_order: BitOrder::MsbTop,
            }),
            Some(Value::String(_)) => {
                let rows = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| unsupported(format!("mixed string rows: {item}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RawGlyph::RowStrings(rows))
            }
            Some(other) => Err(unsupported(format!("unexpected array element {other}"))),
        }
    }

    /// Expands the glyph into row-major 0/1 rows without any height fitting.
    ///
    /// # Errors
    ///
    /// Returns [`GlyphError::UnsupportedGlyphFormat`] for ragged rows or
    /// row strings containing characters other than `0` and `1`.
    pub fn to_rows(&self) -> Result<Vec<Vec<u8>>, GlyphError> {
        let rows = match self {
            RawGlyph::Blank => vec![vec![0]],
            RawGlyph::Rows(rows) => {
                if rows.is_empty() {
                    return Ok(vec![vec![0]]);
                }
                rows.iter()
                    .map(|row| row.iter().map(|&v| u8::from(v != 0)).collect())
                    .collect()
            }
            RawGlyph::RowStrings(rows) => {
                if rows.is_empty() {
                    return Ok(vec![vec![0]]);
                }
                rows.iter()
                    .map(|row| {
                        row.chars()
                            .map(|c| match c {
                                '0' => Ok(0),
                                '1' => Ok(1),
                                other => Err(unsupported(format!(
                                    "row string {row:?} contains {other:?}"
                                ))),
                            })
                            .collect::<Result<Vec<u8>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            RawGlyph::Columns {
                masks,
                height,
                bit_order,
            } => {
                if masks.is_empty() {
                    return Ok(vec![vec![0]]);
                }
                let height = height
                    .unwrap_or_else(|| {
                        masks
                            .iter()
                            .map(|m| (u64::BITS - m.leading_zeros()) as usize)
                            .max()
                            .unwrap_or(0)
                    })
                    .max(1);
                (0..height)
                    .map(|row| {
                        let bit = match bit_order {
                            BitOrder::MsbTop => height - 1 - row,
                            BitOrder::LsbTop => row,
                        };
                        masks
                            .iter()
                            .map(|mask| {
                                let shifted = u32::try_from(bit)
                                    .ok()
                                    .and_then(|b| mask.checked_shr(b))
                                    .unwrap_or(0);
                                (shifted & 1) as u8
                            })
                            .collect()
                    })
                    .collect()
            }
        };
        ensure_rectangular(&rows)?;
        Ok(rows)
    }
}

/// A normalized glyph: row-major, 0/1 valued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMajorBitmap {
    width: usize,
    rows: Vec<Vec<u8>>,
}

impl RowMajorBitmap {
    /// Wraps already-validated rectangular rows.
    fn new(rows: Vec<Vec<u8>>) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        Self { width, rows }
    }

    /// The single-column blank glyph.
    pub fn blank() -> Self {
        Self::new(vec![vec![0]])
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    /// Returns `true` if the pixel at column `x`, row `y` is lit.
    pub fn is_lit(&self, x: usize, y: usize) -> bool {
        self.rows
            .get(y)
            .and_then(|row| row.get(x))
            .is_some_and(|&v| v != 0)
    }

    /// Converts to a column-major [`Grid`] of the same size.
    pub fn to_grid(&self) -> Grid {
        Grid::from_fn(self.width, self.height(), |x, y| self.rows[y][x])
    }
}

/// Converts [`RawGlyph`]s into bitmaps that fit a target height.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphNormalizer {
    fit: FitPolicy,
}

impl GlyphNormalizer {
    pub fn new(fit: FitPolicy) -> Self {
        Self { fit }
    }

    pub fn fit(&self) -> FitPolicy {
        self.fit
    }

    /// Normalizes `raw` to at most `target_height` rows.
    ///
    /// # Errors
    ///
    /// - [`GlyphError::UnsupportedGlyphFormat`] for malformed data.
    /// - [`GlyphError::GlyphTooTall`] when the glyph is too tall and the
    ///   policy is [`FitPolicy::Error`].
    pub fn normalize(
        &self,
        raw: &RawGlyph,
        target_height: usize,
    ) -> Result<RowMajorBitmap, GlyphError> {
        let rows = raw.to_rows()?;
        let height = rows.len();
        if height <= target_height {
            return Ok(RowMajorBitmap::new(rows));
        }

        let fitted = match self.fit {
            FitPolicy::Error => {
                return Err(GlyphError::GlyphTooTall {
                    height,
                    target: target_height,
                })
            }
            FitPolicy::Crop => {
                let top = (height - target_height) / 2;
                rows[top..top + target_height].to_vec()
            }
            FitPolicy::Scale => pool_rows(&rows, target_height),
        };
        Ok(RowMajorBitmap::new(fitted))
    }
}

/// OR-pools `rows` into `target` buckets; every bucket holds at least one row.
fn pool_rows(rows: &[Vec<u8>], target: usize) -> Vec<Vec<u8>> {
    let src = rows.len();
    let width = rows.first().map_or(0, Vec::len);
    (0..target)
        .map(|t| {
            let start = t * src / target;
            let mut end = (t + 1) * src / target;
            if end == start {
                end = (start + 1).min(src);
            }
            let mut pooled = vec![0u8; width];
            for row in &rows[start..end] {
                for (cell, &value) in pooled.iter_mut().zip(row) {
                    *cell |= value;
                }
            }
            pooled
        })
        .collect()
}

fn ensure_rectangular(rows: &[Vec<u8>]) -> Result<(), GlyphError> {
    let width = rows.first().map_or(0, Vec::len);
    match rows.iter().position(|row| row.len() != width) {
        Some(index) => Err(unsupported(format!(
            "ragged rows: row {index} has length {}, expected {width}",
            rows[index].len()
        ))),
        None => Ok(()),
    }
}

fn json_matrix(items: &[Value]) -> Result<Vec<Vec<u8>>, GlyphError> {
    let rows = items
        .iter()
        .map(|row| match row {
            Value::Array(cells) => cells
                .iter()
                .map(|cell| {
                    cell.as_u64()
                        .map(|v| u8::from(v != 0))
                        .ok_or_else(|| unsupported(format!("non-integer pixel {cell}")))
                })
                .collect::<Result<Vec<u8>, _>>(),
            other => Err(unsupported(format!("expected a row array, got {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    ensure_rectangular(&rows)?;
    Ok(rows)
}

fn json_masks(items: &[Value]) -> Result<Vec<u64>, GlyphError> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .ok_or_else(|| unsupported(format!("invalid column mask {item}")))
        })
        .collect()
}

fn unsupported(detail: String) -> GlyphError {
    GlyphError::UnsupportedGlyphFormat(detail)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(raw: &RawGlyph, target: usize, fit: FitPolicy) -> Result<RowMajorBitmap, GlyphError> {
        GlyphNormalizer::new(fit).normalize(raw, target)
    }

    // ── shape equivalence ─────────────────────────────────────────────────────

    #[test]
    fn test_three_formats_of_same_bitmap_normalize_identically() {
        // Arrange: a 3x3 "T"
        let rows = RawGlyph::Rows(vec![vec![1, 1, 1], vec![0, 1, 0], vec![0, 1, 0]]);
        let columns = RawGlyph::Columns {
            masks: vec![0b100, 0b111, 0b100],
            height: None,
            bit_order: BitOrder::MsbTop,
        };
        let strings = RawGlyph::RowStrings(vec!["111".into(), "010".into(), "010".into()]);

        // Act
        let a = normalize(&rows, 34, FitPolicy::Error).unwrap();
        let b = normalize(&columns, 34, FitPolicy::Error).unwrap();
        let c = normalize(&strings, 34, FitPolicy::Error).unwrap();

        // Assert
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!((a.width(), a.height()), (3, 3));
    }

    #[test]
    fn test_lsb_top_columns_flip_vertically() {
        let msb = RawGlyph::Columns {
            masks: vec![0b001],
            height: Some(3),
            bit_order: BitOrder::MsbTop,
        };
        let lsb = RawGlyph::Columns {
            masks: vec![0b001],
            height: Some(3),
            bit_order: BitOrder::LsbTop,
        };
        assert_eq!(msb.to_rows().unwrap(), vec![vec![0], vec![0], vec![1]]);
        assert_eq!(lsb.to_rows().unwrap(), vec![vec![1], vec![0], vec![0]]);
    }

    #[test]
    fn test_column_height_defaults_to_at_least_one() {
        let zeros = RawGlyph::Columns {
            masks: vec![0, 0],
            height: None,
            bit_order: BitOrder::MsbTop,
        };
        assert_eq!(zeros.to_rows().unwrap(), vec![vec![0, 0]]);
    }

    #[test]
    fn test_blank_renders_single_blank_column() {
        let bitmap = normalize(&RawGlyph::Blank, 34, FitPolicy::Error).unwrap();
        assert_eq!(bitmap, RowMajorBitmap::blank());
        assert_eq!(bitmap.rows(), &[vec![0]]);
    }

    // ── JSON classification ───────────────────────────────────────────────────

    #[test]
    fn test_from_json_classifies_each_shape() {
        assert_eq!(
            RawGlyph::from_json(&json!([[1, 0], [0, 1]])).unwrap(),
            RawGlyph::Rows(vec![vec![1, 0], vec![0, 1]])
        );
        assert!(matches!(
            RawGlyph::from_json(&json!([3, 1])).unwrap(),
            RawGlyph::Columns { height: None, .. }
        ));
        assert_eq!(
            RawGlyph::from_json(&json!(["10", "01"])).unwrap(),
            RawGlyph::RowStrings(vec!["10".into(), "01".into()])
        );
        for blank in [json!(null), json!(0), json!([])] {
            assert_eq!(RawGlyph::from_json(&blank).unwrap(), RawGlyph::Blank);
        }
    }

    #[test]
    fn test_from_json_reads_object_forms() {
        let grid = RawGlyph::from_json(&json!({"grid": [[1]]})).unwrap();
        assert_eq!(grid, RawGlyph::Rows(vec![vec![1]]));

        let cols = RawGlyph::from_json(&json!({"cols": [1, 2], "height": 4, "bit_order": "lsb_top"}))
            .unwrap();
        assert_eq!(
            cols,
            RawGlyph::Columns {
                masks: vec![1, 2],
                height: Some(4),
                bit_order: BitOrder::LsbTop
            }
        );
    }

    #[test]
    fn test_from_json_rejects_unsupported_values() {
        for bad in [
            json!("A"),
            json!(7),
            json!(true),
            json!({"pixels": []}),
            json!([[1, 0], [1]]),
            json!([1, "0"]),
        ] {
            assert!(
                matches!(RawGlyph::from_json(&bad), Err(GlyphError::UnsupportedGlyphFormat(_))),
                "value {bad}"
            );
        }
    }

    #[test]
    fn test_row_strings_with_other_characters_are_rejected() {
        let glyph = RawGlyph::RowStrings(vec!["1x1".into()]);
        assert!(matches!(
            glyph.to_rows(),
            Err(GlyphError::UnsupportedGlyphFormat(_))
        ));
    }

    // ── fit policies ──────────────────────────────────────────────────────────

    fn tall_glyph(height: usize) -> RawGlyph {
        RawGlyph::Rows((0..height).map(|r| vec![u8::from(r % 2 == 0)]).collect())
    }

    #[test]
    fn test_fit_error_rejects_tall_glyph() {
        let result = normalize(&tall_glyph(40), 34, FitPolicy::Error);
        assert!(matches!(
            result,
            Err(GlyphError::GlyphTooTall {
                height: 40,
                target: 34
            })
        ));
    }

    #[test]
    fn test_fit_crop_keeps_centre_rows() {
        // Rows numbered 0..6, crop to 2 keeps rows 2 and 3.
        let raw = RawGlyph::Rows((0..6).map(|r| vec![u8::from(r == 2), u8::from(r == 3)]).collect());
        let bitmap = normalize(&raw, 2, FitPolicy::Crop).unwrap();
        assert_eq!(bitmap.rows(), &[vec![1, 0], vec![0, 1]]);
    }

    #[test]
    fn test_fit_scale_or_pools_buckets() {
        // Only row 5 lit; with 6 -> 3 buckets it lands in bucket 2.
        let raw = RawGlyph::Rows((0..6).map(|r| vec![u8::from(r == 5)]).collect());
        let bitmap = normalize(&raw, 3, FitPolicy::Scale).unwrap();
        assert_eq!(bitmap.rows(), &[vec![0], vec![0], vec![1]]);
    }

    #[test]
    fn test_normalized_height_never_exceeds_target() {
        for fit in [FitPolicy::Crop, FitPolicy::Scale] {
            for height in [1, 7, 34, 35, 68, 100] {
                let bitmap = normalize(&tall_glyph(height), 34, fit).unwrap();
                assert!(bitmap.height() <= 34);
            }
        }
    }

    #[test]
    fn test_to_grid_transposes_to_column_major() {
        let bitmap = normalize(
            &RawGlyph::Rows(vec![vec![1, 0], vec![0, 0]]),
            34,
            FitPolicy::Error,
        )
        .unwrap();
        let grid = bitmap.to_grid();
        assert!(grid.is_lit(0, 0));
        assert!(!grid.is_lit(1, 0));
    }
}

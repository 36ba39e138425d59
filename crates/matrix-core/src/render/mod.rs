//! Text rendering: glyph normalization, layout and multi-display spans.
//!
//! Everything here produces [`Grid`](crate::domain::grid::Grid)s or
//! [`Animation`](crate::domain::animation::Animation)s and never touches a
//! device.  The pipeline is:
//!
//! ```text
//! GlyphTable ──lookup──▶ RawGlyph ──GlyphNormalizer──▶ RowMajorBitmap
//!     ──TextScroller / SpanCompositor──▶ Canvas ──window──▶ Grid per frame
//! ```

pub mod canvas;
pub mod font;
pub mod glyph;
pub mod span;
pub mod text_scroll;

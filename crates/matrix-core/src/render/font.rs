//! Character-to-glyph lookup tables.
//!
//! A [`GlyphTable`] maps characters to [`RawGlyph`]s.  Tables are either
//! loaded from JSON (`{"A": <glyph>, "B": <glyph>, ...}`, any shape accepted
//! by [`RawGlyph::from_json`]) or taken from the bundled 5x7 font.
//!
//! Lookup is case-normalized: the uppercase form of a character is tried
//! first, then the character itself, so fonts that only define capitals
//! still render lowercase text.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::render::glyph::{BitOrder, GlyphError, RawGlyph};

/// Row count of the bundled font.
pub const BUNDLED_FONT_HEIGHT: usize = 7;

/// Classic 5x7 LCD font, one byte per column, bit 0 = top row.
const BUNDLED_FONT: &[(char, [u8; 5])] = &[
    (' ', [0x00, 0x00, 0x00, 0x00, 0x00]),
    ('!', [0x00, 0x00, 0x5F, 0x00, 0x00]),
    ('%', [0x23, 0x13, 0x08, 0x64, 0x62]),
    ('-', [0x08, 0x08, 0x08, 0x08, 0x08]),
    ('.', [0x00, 0x60, 0x60, 0x00, 0x00]),
    (':', [0x00, 0x36, 0x36, 0x00, 0x00]),
    ('?', [0x02, 0x01, 0x51, 0x09, 0x06]),
    ('0', [0x3E, 0x51, 0x49, 0x45, 0x3E]),
    ('1', [0x00, 0x42, 0x7F, 0x40, 0x00]),
    ('2', [0x42, 0x61, 0x51, 0x49, 0x46]),
    ('3', [0x21, 0x41, 0x45, 0x4B, 0x31]),
    ('4', [0x18, 0x14, 0x12, 0x7F, 0x10]),
    ('5', [0x27, 0x45, 0x45, 0x45, 0x39]),
    ('6', [0x3C, 0x4A, 0x49, 0x49, 0x30]),
    ('7', [0x01, 0x71, 0x09, 0x05, 0x03]),
    ('8', [0x36, 0x49, 0x49, 0x49, 0x36]),
    ('9', [0x06, 0x49, 0x49, 0x29, 0x1E]),
    ('A', [0x7C, 0x12, 0x11, 0x12, 0x7C]),
    ('B', [0x7F, 0x49, 0x49, 0x49, 0x36]),
    ('C', [0x3E, 0x41, 0x41, 0x41, 0x22]),
    ('D', [0x7F, 0x41, 0x41, 0x41, 0x3E]),
    ('E', [0x7F, 0x49, 0x49, 0x49, 0x41]),
    ('F', [0x7F, 0x09, 0x09, 0x09, 0x01]),
    ('G', [0x3E, 0x41, 0x49, 0x49, 0x7A]),
    ('H', [0x7F, 0x08, 0x08, 0x08, 0x7F]),
    ('I', [0x00, 0x41, 0x7F, 0x41, 0x00]),
    ('J', [0x20, 0x40, 0x41, 0x3F, 0x01]),
    ('K', [0x7F, 0x08, 0x14, 0x22, 0x41]),
    ('L', [0x7F, 0x40, 0x40, 0x40, 0x40]),
    ('M', [0x7F, 0x02, 0x1C, 0x02, 0x7F]),
    ('N', [0x7F, 0x04, 0x08, 0x10, 0x7F]),
    ('O', [0x3E, 0x41, 0x41, 0x41, 0x3E]),
    ('P', [0x7F, 0x09, 0x09, 0x09, 0x06]),
    ('Q', [0x3E, 0x41, 0x51, 0x21, 0x5E]),
    ('R', [0x7F, 0x09, 0x19, 0x29, 0x46]),
    ('S', [0x26, 0x49, 0x49, 0x49, 0x32]),
    ('T', [0x03, 0x01, 0x7F, 0x01, 0x03]),
    ('U', [0x3F, 0x40, 0x40, 0x40, 0x3F]),
    ('V', [0x1F, 0x20, 0x40, 0x20, 0x1F]),
    ('W', [0x3F, 0x40, 0x38, 0x40, 0x3F]),
    ('X', [0x63, 0x14, 0x08, 0x14, 0x63]),
    ('Y', [0x03, 0x04, 0x78, 0x04, 0x03]),
    ('Z', [0x61, 0x59, 0x49, 0x4D, 0x43]),
];

/// Character → glyph map with case-normalized lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlyphTable {
    glyphs: HashMap<char, RawGlyph>,
}

impl GlyphTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled 5x7 font: `A`–`Z`, `0`–`9`, space and `! % - . : ?`.
    pub fn bundled() -> Self {
        let glyphs = BUNDLED_FONT
            .iter()
            .map(|(ch, columns)| {
                let glyph = RawGlyph::Columns {
                    masks: columns.iter().map(|&c| u64::from(c)).collect(),
                    height: Some(BUNDLED_FONT_HEIGHT),
                    bit_order: BitOrder::LsbTop,
                };
                (*ch, glyph)
            })
            .collect();
        Self { glyphs }
    }

    /// Parses a JSON object of single-character keys to glyph values.
    ///
    /// # Errors
    ///
    /// - [`GlyphError::Json`] if `text` is not valid JSON.
    /// - [`GlyphError::UnsupportedGlyphFormat`] if the document is not an
    ///   object, a key is not exactly one character, or a glyph value has an
    ///   unsupported shape.
    pub fn from_json_str(text: &str) -> Result<Self, GlyphError> {
        let document: Value = serde_json::from_str(text)?;
        let Value::Object(entries) = document else {
            return Err(GlyphError::UnsupportedGlyphFormat(
                "glyph table must be a JSON object".to_string(),
            ));
        };

        let mut table = Self::new();
        for (key, value) in &entries {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                return Err(GlyphError::UnsupportedGlyphFormat(format!(
                    "glyph key {key:?} must be a single character"
                )));
            };
            table.insert(ch, RawGlyph::from_json(value)?);
        }
        debug!(glyphs = table.len(), "loaded glyph table from JSON");
        Ok(table)
    }

    /// Adds or replaces the glyph for `ch`.
    pub fn insert(&mut self, ch: char, glyph: RawGlyph) {
        self.glyphs.insert(ch, glyph);
    }

    /// Looks up `ch`, trying its uppercase form first.
    pub fn lookup(&self, ch: char) -> Option<&RawGlyph> {
        let mut upper = ch.to_uppercase();
        let single_upper = match (upper.next(), upper.next()) {
            (Some(u), None) => Some(u),
            _ => None,
        };
        single_upper
            .and_then(|u| self.glyphs.get(&u))
            .or_else(|| self.glyphs.get(&ch))
    }

    /// Looks up `ch` or fails with [`GlyphError::MissingGlyph`].
    pub fn require(&self, ch: char) -> Result<&RawGlyph, GlyphError> {
        self.lookup(ch).ok_or(GlyphError::MissingGlyph(ch))
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Device identity and physical location.
//!
//! Every attached matrix is described by a read-only [`DeviceHandle`].  Its
//! physical position is a [`Side`] of the keyboard plus a numeric slot
//! (1 = nearest the keyboard's centre line on that side, 0 = unranked).
//!
//! Location comes from one of two places:
//!
//! - the USB port-location string reported by the OS, looked up in a fixed
//!   slot map (see [`Location::from_port_location`]);
//! - a short abbreviation such as `"L1"` or `"R2"` given in configuration
//!   (see [`Location::from_abbrev`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a device, assigned by discovery (UUID v4).
pub type DeviceId = Uuid;

/// Known USB port locations and the physical slot each one corresponds to.
const SLOT_MAP: &[(&str, Side, i32)] = &[
    ("1-3.2", Side::Right, 1),
    ("1-3.3", Side::Right, 2),
    ("1-4.2", Side::Left, 1),
    ("1-4.3", Side::Left, 2),
];

/// Errors raised while parsing device metadata.
#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    /// A side name was not one of `left`, `right`, `unknown`.
    #[error("unknown keyboard side: {0:?}")]
    UnknownSide(String),

    /// A location abbreviation could not be parsed.
    #[error("invalid location abbreviation {0:?} (expected e.g. \"L1\" or \"R2\")")]
    InvalidLocation(String),
}

/// Which side of the keyboard a device is mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    #[default]
    Unknown,
}

impl Side {
    /// The mirror image of this side.  `Unknown` stays `Unknown`.
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Unknown => Side::Unknown,
        }
    }

    /// Single-letter prefix used in location abbreviations.
    pub fn letter(self) -> char {
        match self {
            Side::Left => 'L',
            Side::Right => 'R',
            Side::Unknown => '?',
        }
    }

    fn from_letter(letter: char) -> Option<Side> {
        match letter.to_ascii_uppercase() {
            'L' => Some(Side::Left),
            'R' => Some(Side::Right),
            '?' => Some(Side::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Side::Left => "left",
            Side::Right => "right",
            Side::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

impl FromStr for Side {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Side::Left),
            "right" | "r" => Ok(Side::Right),
            "unknown" | "?" | "" => Ok(Side::Unknown),
            _ => Err(DeviceError::UnknownSide(s.to_string())),
        }
    }
}

/// Physical position of a device: side plus slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub side: Side,
    /// 1-based slot on `side`; 0 means unranked.
    pub slot: i32,
}

impl Location {
    pub const fn new(side: Side, slot: i32) -> Self {
        Self { side, slot }
    }

    /// Resolves a USB port-location string (e.g. `"1-4.2"`) via the slot map.
    ///
    /// Returns `None` for ports that are not part of the known layout.
    pub fn from_port_location(port: &str) -> Option<Location> {
        let port = port.trim();
        SLOT_MAP
            .iter()
            .find(|(known, _, _)| *known == port)
            .map(|&(_, side, slot)| Location::new(side, slot))
    }

    /// Parses an abbreviation such as `"L1"`, `"r12"` or `"?0"`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidLocation`] if the first character is not
    /// a side letter or the remainder is not a non-negative integer.
    pub fn from_abbrev(abbrev: &str) -> Result<Location, DeviceError> {
        let invalid = || DeviceError::InvalidLocation(abbrev.to_string());
        let trimmed = abbrev.trim();
        let mut chars = trimmed.chars();
        let side = chars.next().and_then(Side::from_letter).ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let slot = digits.parse::<i32>().map_err(|_| invalid())?;
        Ok(Location::new(side, slot))
    }

    /// Short form such as `"L1"`.
    pub fn abbrev(&self) -> String {
        format!("{}{}", self.side.letter(), self.slot)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.side.letter(), self.slot)
    }
}

/// Read-only description of one attached matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    id: DeviceId,
    side: Side,
    slot: i32,
    name: String,
    serial: String,
}

impl DeviceHandle {
    /// Creates a handle with a freshly generated id.
    pub fn new(name: impl Into<String>, serial: impl Into<String>, location: Location) -> Self {
        Self::with_id(Uuid::new_v4(), name, serial, location)
    }

    /// Creates a handle with a caller-chosen id.
    pub fn with_id(
        id: DeviceId,
        name: impl Into<String>,
        serial: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            id,
            side: location.side,
            slot: location.slot,
            name: name.into(),
            serial: serial.into(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn location(&self) -> Location {
        Location::new(self.side, self.slot)
    }

    /// Short location such as `"L1"`, `"R2"` or `"?0"`.
    pub fn location_abbrev(&self) -> String {
        self.location().abbrev()
    }

    /// The same device reflected across the keyboard's centre line.
    ///
    /// The side is swapped and the slot negated, so the leftmost ordering key
    /// of a device equals the rightmost ordering key of its mirror image.
    /// The id is preserved.
    pub fn mirrored(&self) -> DeviceHandle {
        Self {
            side: self.side.opposite(),
            slot: -self.slot,
            ..self.clone()
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.location())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

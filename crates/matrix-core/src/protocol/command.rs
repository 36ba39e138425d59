//! Byte encoding of LED matrix firmware commands.
//!
//! Wire format:
//! ```text
//! [0x32][0xAC][command_id:1][params:N]
//! ```
//! The two magic bytes open every command.  There is no length field: the
//! firmware knows each command's parameter count from its id.
//!
//! A black/white draw packs the 9×34 grid into 39 bytes.  Pixel `(x, y)`
//! maps to bit index `i = x + 9 * y`, stored in byte `i / 8` at bit `i % 8`.

use thiserror::Error;

use crate::domain::grid::{Grid, MATRIX_HEIGHT, MATRIX_WIDTH};

/// Magic prefix of every command.
pub const MAGIC: [u8; 2] = [0x32, 0xAC];

/// Packed size of one black/white frame: ceil(9 * 34 / 8).
pub const DRAW_BW_LEN: usize = (MATRIX_WIDTH * MATRIX_HEIGHT + 7) / 8;

/// Errors that can occur during command encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Only full 9x34 grids can be drawn.
    #[error("grid is {width}x{height}, the device draws exactly 9x34")]
    GridSize { width: usize, height: usize },

    /// The byte slice is shorter than the command requires.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The command does not start with the magic bytes.
    #[error("bad magic: expected 32 AC, got {0:02X} {1:02X}")]
    BadMagic(u8, u8),

    /// The command id byte is not a recognized value.
    #[error("unknown command id: 0x{0:02X}")]
    UnknownCommand(u8),
}

/// Numeric command identifiers understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    Brightness = 0x00,
    Sleep = 0x03,
    Animate = 0x04,
    DrawBw = 0x06,
    Version = 0x20,
}

impl TryFrom<u8> for CommandId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(CommandId::Brightness),
            0x03 => Ok(CommandId::Sleep),
            0x04 => Ok(CommandId::Animate),
            0x06 => Ok(CommandId::DrawBw),
            0x20 => Ok(CommandId::Version),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// One firmware command with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Global brightness, raw 0–255.
    Brightness(u8),
    /// `true` puts the display to sleep, `false` wakes it (used as keep-alive).
    Sleep(bool),
    /// Starts or stops the firmware's built-in scrolling animation.
    Animate(bool),
    /// Shows a packed black/white frame.
    DrawBw([u8; DRAW_BW_LEN]),
    /// Asks for the firmware version.
    Version,
}

impl DeviceCommand {
    /// Builds a draw command for `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::GridSize`] unless the grid is exactly 9×34.
    pub fn draw(grid: &Grid) -> Result<Self, ProtocolError> {
        pack_grid(grid).map(DeviceCommand::DrawBw)
    }

    /// Converts a 0–100 percentage into a brightness command.
    ///
    /// Values above 100 are clamped.
    pub fn brightness_percent(percent: u8) -> Self {
        DeviceCommand::Brightness(percent_to_raw(percent))
    }

    pub fn id(&self) -> CommandId {
        match self {
            DeviceCommand::Brightness(_) => CommandId::Brightness,
            DeviceCommand::Sleep(_) => CommandId::Sleep,
            DeviceCommand::Animate(_) => CommandId::Animate,
            DeviceCommand::DrawBw(_) => CommandId::DrawBw,
            DeviceCommand::Version => CommandId::Version,
        }
    }

    /// Encodes the command including the magic prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + DRAW_BW_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.push(self.id() as u8);
        match self {
            DeviceCommand::Brightness(value) => buf.push(*value),
            DeviceCommand::Sleep(flag) | DeviceCommand::Animate(flag) => buf.push(u8::from(*flag)),
            DeviceCommand::DrawBw(packed) => buf.extend_from_slice(packed),
            DeviceCommand::Version => {}
        }
        buf
    }

    /// Decodes a command previously produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the magic, id or parameter length is wrong.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 3 {
            return Err(ProtocolError::InsufficientData {
                needed: 3,
                available: bytes.len(),
            });
        }
        if bytes[..2] != MAGIC {
            return Err(ProtocolError::BadMagic(bytes[0], bytes[1]));
        }
        let id = CommandId::try_from(bytes[2])?;
        let params = &bytes[3..];
        let needed = match id {
            CommandId::Version => 0,
            CommandId::DrawBw => DRAW_BW_LEN,
            _ => 1,
        };
        if params.len() < needed {
            return Err(ProtocolError::InsufficientData {
                needed: 3 + needed,
                available: bytes.len(),
            });
        }

        Ok(match id {
            CommandId::Brightness => DeviceCommand::Brightness(params[0]),
            CommandId::Sleep => DeviceCommand::Sleep(params[0] != 0),
            CommandId::Animate => DeviceCommand::Animate(params[0] != 0),
            CommandId::DrawBw => {
                let mut packed = [0u8; DRAW_BW_LEN];
                packed.copy_from_slice(&params[..DRAW_BW_LEN]);
                DeviceCommand::DrawBw(packed)
            }
            CommandId::Version => DeviceCommand::Version,
        })
    }
}

/// Packs a 9×34 grid into the 39-byte draw payload.  Any non-zero cell is on.
///
/// # Errors
///
/// Returns [`ProtocolError::GridSize`] for any other grid size.
pub fn pack_grid(grid: &Grid) -> Result<[u8; DRAW_BW_LEN], ProtocolError> {
    if grid.width() != MATRIX_WIDTH || grid.height() != MATRIX_HEIGHT {
        return Err(ProtocolError::GridSize {
            width: grid.width(),
            height: grid.height(),
        });
    }
    let mut packed = [0u8; DRAW_BW_LEN];
    for x in 0..MATRIX_WIDTH {
        for (y, &value) in grid.column(x).iter().enumerate() {
            if value != 0 {
                let i = x + MATRIX_WIDTH * y;
                packed[i / 8] |= 1 << (i % 8);
            }
        }
    }
    Ok(packed)
}

/// Inverse of [`pack_grid`]; lit cells come back as `1`.
pub fn unpack_grid(packed: &[u8; DRAW_BW_LEN]) -> Grid {
    Grid::from_fn(MATRIX_WIDTH, MATRIX_HEIGHT, |x, y| {
        let i = x + MATRIX_WIDTH * y;
        (packed[i / 8] >> (i % 8)) & 1
    })
}

/// `round(percent * 255 / 100)`, with `percent` clamped to 100.
pub fn percent_to_raw(percent: u8) -> u8 {
    let percent = u32::from(percent.min(100));
    ((percent * 255 + 50) / 100) as u8
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Wire protocol of the LED matrix firmware.

pub mod command;

pub use command::{
    pack_grid, percent_to_raw, unpack_grid, CommandId, DeviceCommand, ProtocolError, DRAW_BW_LEN,
    MAGIC,
};

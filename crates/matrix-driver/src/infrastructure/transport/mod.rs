//! Device transport: how encoded command bytes reach a physical display.
//!
//! The application layer only ever sees the [`DeviceTransport`] trait.  Two
//! adapters are provided:
//!
//! - [`serial::SerialTransport`] writes to the display's USB serial port.
//! - [`mock::RecordingTransport`] keeps every write in memory.  Tests use it to
//!   assert on the exact commands a device received, and the binary uses it for
//!   dry runs when no port is configured.
//!
//! Transports are shared between the controller, its keep-alive worker and
//! its breather, so implementations must be `Send + Sync`.

use thiserror::Error;

use matrix_core::DeviceHandle;

pub mod mock;
pub mod serial;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No serial port is known for the device.
    #[error("no port configured for device {0}")]
    UnknownDevice(String),

    /// The serial port could not be opened.
    #[error("failed to open port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Writing to an open port failed.
    #[error("write to {device} failed: {source}")]
    Write {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// The device refused the command (used by test transports).
    #[error("device {0} rejected the command")]
    Rejected(String),
}

/// Sends raw command bytes to one device.
pub trait DeviceTransport: Send + Sync {
    /// Writes `bytes` to `device` in a single call.
    fn send(&self, device: &DeviceHandle, bytes: &[u8]) -> Result<(), TransportError>;
}

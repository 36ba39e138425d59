//! Serial-port transport for physical displays.
//!
//! Each display enumerates as a USB CDC serial device.  Ports are opened
//! lazily on the first write and cached per device.  A write error drops the
//! cached port so the next command reopens it, which recovers from a display
//! being unplugged and plugged back in.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, warn};

use matrix_core::{DeviceHandle, DeviceId};

use super::{DeviceTransport, TransportError};

/// Baud rate of the display firmware's serial interface.
pub const BAUD_RATE: u32 = 115_200;

/// Read/write timeout applied to every opened port.
const PORT_TIMEOUT: Duration = Duration::from_millis(500);

/// A [`DeviceTransport`] that writes to USB serial ports.
pub struct SerialTransport {
    port_names: HashMap<DeviceId, String>,
    open_ports: Mutex<HashMap<DeviceId, Box<dyn SerialPort>>>,
}

impl SerialTransport {
    /// Creates a transport that maps each device id to a port path such as
    /// `/dev/ttyACM0` or `COM3`.
    pub fn new(port_names: HashMap<DeviceId, String>) -> Self {
        Self {
            port_names,
            open_ports: Mutex::new(HashMap::new()),
        }
    }

    /// The port path configured for `device`, if any.
    pub fn port_name(&self, device: DeviceId) -> Option<&str> {
        self.port_names.get(&device).map(String::as_str)
    }

    fn open(&self, device: &DeviceHandle) -> Result<Box<dyn SerialPort>, TransportError> {
        let port = self
            .port_names
            .get(&device.id())
            .ok_or_else(|| TransportError::UnknownDevice(device.to_string()))?;
        debug!("opening {port} for {device}");
        serialport::new(port.as_str(), BAUD_RATE)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|source| TransportError::Open {
                port: port.clone(),
                source,
            })
    }
}

impl DeviceTransport for SerialTransport {
    fn send(&self, device: &DeviceHandle, bytes: &[u8]) -> Result<(), TransportError> {
        let mut ports = self.open_ports.lock().unwrap_or_else(PoisonError::into_inner);
        if !ports.contains_key(&device.id()) {
            let port = self.open(device)?;
            ports.insert(device.id(), port);
        }
        let Some(port) = ports.get_mut(&device.id()) else {
            return Err(TransportError::UnknownDevice(device.to_string()));
        };

        let result = port.write_all(bytes).and_then(|()| port.flush());
        if let Err(source) = result {
            warn!("write to {device} failed, port will be reopened: {source}");
            ports.remove(&device.id());
            return Err(TransportError::Write {
                device: device.to_string(),
                source,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_names", &self.port_names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::Location;

    #[test]
    fn test_unconfigured_device_is_reported() {
        // Arrange
        let transport = SerialTransport::new(HashMap::new());
        let device = DeviceHandle::new("matrix", "SN1", Location::default());

        // Act
        let result = transport.send(&device, &[0x32, 0xAC, 0x20]);

        // Assert
        assert!(matches!(result, Err(TransportError::UnknownDevice(_))));
    }

    #[test]
    fn test_port_name_lookup() {
        let device = DeviceHandle::new("matrix", "SN1", Location::default());
        let transport =
            SerialTransport::new(HashMap::from([(device.id(), "/dev/ttyACM0".to_string())]));
        assert_eq!(transport.port_name(device.id()), Some("/dev/ttyACM0"));
    }
}

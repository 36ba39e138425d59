//! Device discovery: which displays are attached and where they sit.
//!
//! Discovery assigns each display a fresh [`DeviceId`] and resolves its
//! physical location.  The only source today is the `[[devices]]` list in
//! the config file; the [`DeviceSource`] trait keeps callers independent of
//! that choice.

use std::collections::HashMap;

use tracing::debug;

use matrix_core::{DeviceHandle, DeviceId};

use super::storage::config::{ConfigError, DeviceEntry};

/// Produces the handles of all attached displays.
pub trait DeviceSource {
    fn devices(&self) -> Vec<DeviceHandle>;
}

/// Devices declared in configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDevices {
    devices: Vec<DeviceHandle>,
    ports: HashMap<DeviceId, String>,
}

impl ConfiguredDevices {
    /// Builds one handle per entry, in entry order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DeviceLocation`] for the first entry whose
    /// location cannot be resolved.
    pub fn from_entries(entries: &[DeviceEntry]) -> Result<Self, ConfigError> {
        let mut devices = Vec::with_capacity(entries.len());
        let mut ports = HashMap::new();
        for entry in entries {
            let location = entry.resolve_location()?;
            let handle = DeviceHandle::new(entry.name.as_str(), entry.serial.as_str(), location);
            debug!("configured device {handle}");
            if let Some(port) = &entry.port {
                ports.insert(handle.id(), port.clone());
            }
            devices.push(handle);
        }
        Ok(Self { devices, ports })
    }

    /// Serial port path per device, for devices that declared one.
    pub fn port_map(&self) -> &HashMap<DeviceId, String> {
        &self.ports
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DeviceSource for ConfiguredDevices {
    fn devices(&self) -> Vec<DeviceHandle> {
        self.devices.clone()
    }
}

//! In-memory transport for tests and dry runs.
//!
//! Every successful write is appended to a shared log.  Failures can be
//! injected per device to exercise error paths in the guard and controller.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use matrix_core::{DeviceCommand, DeviceHandle, DeviceId};

use super::{DeviceTransport, TransportError};

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBytes {
    pub device: DeviceId,
    pub bytes: Vec<u8>,
}

/// A [`DeviceTransport`] that records writes instead of performing I/O.
///
/// Clones share the same log, so a test can keep one handle while the
/// controller owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<SentBytes>>>,
    failing: Arc<Mutex<HashSet<DeviceId>>>,
    latency: Arc<Mutex<Duration>>,
}

impl RecordingTransport {
    /// Creates an empty transport with no latency and no failing devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write to `device` fail with
    /// [`TransportError::Rejected`].
    pub fn fail_device(&self, device: DeviceId) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device);
    }

    /// Undoes [`fail_device`](Self::fail_device).
    pub fn restore_device(&self, device: DeviceId) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&device);
    }

    /// Sleeps for `latency` inside every write, like a slow serial link.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Snapshot of every write so far, in order.
    pub fn sent(&self) -> Vec<SentBytes> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Decoded commands written to `device`, in order.  Undecodable writes
    /// are skipped.
    pub fn commands_for(&self, device: DeviceId) -> Vec<DeviceCommand> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.device == device)
            .filter_map(|entry| DeviceCommand::decode(&entry.bytes).ok())
            .collect()
    }

    /// Forgets every recorded write.
    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DeviceTransport for RecordingTransport {
    fn send(&self, device: &DeviceHandle, bytes: &[u8]) -> Result<(), TransportError> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&device.id())
        {
            return Err(TransportError::Rejected(device.to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentBytes {
                device: device.id(),
                bytes: bytes.to_vec(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::Location;

    fn device() -> DeviceHandle {
        DeviceHandle::new("matrix", "SN1", Location::from_abbrev("L1").unwrap())
    }

    #[test]
    fn test_recording_transport_keeps_writes_in_order() {
        // Arrange
        let transport = RecordingTransport::new();
        let device = device();

        // Act
        transport
            .send(&device, &DeviceCommand::Brightness(10).encode())
            .unwrap();
        transport
            .send(&device, &DeviceCommand::Sleep(false).encode())
            .unwrap();

        // Assert
        assert_eq!(
            transport.commands_for(device.id()),
            vec![DeviceCommand::Brightness(10), DeviceCommand::Sleep(false)]
        );
    }

    #[test]
    fn test_failing_device_is_rejected_until_restored() {
        let transport = RecordingTransport::new();
        let device = device();
        transport.fail_device(device.id());

        assert!(matches!(
            transport.send(&device, &[0x32]),
            Err(TransportError::Rejected(_))
        ));
        assert!(transport.sent().is_empty());

        transport.restore_device(device.id());
        assert!(transport.send(&device, &[0x32]).is_ok());
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_clones_share_one_log() {
        let transport = RecordingTransport::new();
        let clone = transport.clone();
        clone.send(&device(), &[1, 2, 3]).unwrap();
        assert_eq!(transport.sent()[0].bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_undecodable_writes_are_skipped_by_commands_for() {
        let transport = RecordingTransport::new();
        let device = device();
        transport.send(&device, &[0xFF]).unwrap();
        assert!(transport.commands_for(device.id()).is_empty());
        transport.clear();
        assert!(transport.sent().is_empty());
    }
}

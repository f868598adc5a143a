//! Server record — a running process and the index of devices it hosts.

use serde::{Deserialize, Serialize};

use crate::name::{DeviceName, ServerName};
use crate::time::{Timestamp, now};

/// A server identity plus its device index.
///
/// The index is sorted by canonical device name and never holds duplicates.
/// It is derived state: each [`Device`](crate::device::Device)'s `server`
/// field is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub name: ServerName,
    pub registered_at: Timestamp,
    #[serde(default)]
    pub devices: Vec<DeviceName>,
}

impl ServerRecord {
    #[must_use]
    pub fn new(name: ServerName) -> Self {
        Self {
            name,
            registered_at: now(),
            devices: Vec::new(),
        }
    }

    /// Add a device to the index; returns `false` if it was already listed.
    pub fn add_device(&mut self, device: DeviceName) -> bool {
        match self.devices.binary_search(&device) {
            Ok(_) => false,
            Err(pos) => {
                self.devices.insert(pos, device);
                true
            }
        }
    }

    /// Remove a device from the index; returns `false` if it was not listed.
    pub fn remove_device(&mut self, device: &DeviceName) -> bool {
        match self.devices.binary_search(device) {
            Ok(pos) => {
                self.devices.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn hosts(&self, device: &DeviceName) -> bool {
        self.devices.binary_search(device).is_ok()
    }

    /// Restore the sorted, de-duplicated shape after loading from storage.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.devices.sort();
        self.devices.dedup();
        self
    }
}

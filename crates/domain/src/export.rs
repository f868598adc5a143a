//! Export records — the live network location of a running device.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::name::{ClassName, DeviceName, ServerName};
use crate::time::{Timestamp, now};

/// Location details a server publishes when it exports a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub host: String,
    /// Opaque network address (IOR or endpoint string).
    pub address: String,
    pub pid: u32,
    pub version: String,
}

/// Live export of one device. Overwritten on re-export, deleted on unexport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub device: DeviceName,
    pub server: ServerName,
    pub host: String,
    pub address: String,
    pub pid: u32,
    pub version: String,
    pub started_at: Timestamp,
}

impl ExportRecord {
    #[must_use]
    pub fn new(device: DeviceName, server: ServerName, info: ExportInfo) -> Self {
        Self {
            device,
            server,
            host: info.host,
            address: info.address,
            pid: info.pid,
            version: info.version,
            started_at: now(),
        }
    }
}

/// Result of importing a device: its registration plus the live export, if
/// any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceImport {
    pub device: Device,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportRecord>,
}

impl DeviceImport {
    #[must_use]
    pub fn is_exported(&self) -> bool {
        self.export.is_some()
    }
}

/// Flat summary of a device's registration and last known export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: DeviceName,
    pub class: ClassName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerName>,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
}

impl From<DeviceImport> for DeviceInfo {
    fn from(import: DeviceImport) -> Self {
        let DeviceImport { device, export } = import;
        let exported = export.is_some();
        let (host, address, version, pid, started_at) = match export {
            Some(export) => (
                Some(export.host),
                Some(export.address),
                Some(export.version),
                Some(export.pid),
                Some(export.started_at),
            ),
            None => (None, None, None, None, None),
        };
        Self {
            name: device.name,
            class: device.class,
            server: device.server,
            exported,
            host,
            address,
            version,
            pid,
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_copy_export_info_fields() {
        let record = ExportRecord::new(
            DeviceName::parse("test/dev/1").unwrap(),
            ServerName::parse("MyClass/inst1").unwrap(),
            ExportInfo {
                host: "h1".to_string(),
                address: "tcp://h1:10000".to_string(),
                pid: 100,
                version: "5".to_string(),
            },
        );
        assert_eq!(record.host, "h1");
        assert_eq!(record.pid, 100);
        assert_eq!(record.version, "5");
        assert_eq!(record.server.to_string(), "MyClass/inst1");
    }

    #[test]
    fn should_flatten_import_into_device_info() {
        let device = Device::builder()
            .name("test/dev/1")
            .class("PowerSupply")
            .server("MyClass/inst1")
            .build()
            .unwrap();
        let info = DeviceInfo::from(DeviceImport {
            device: device.clone(),
            export: None,
        });
        assert!(!info.exported);
        assert!(info.host.is_none() && info.pid.is_none());

        let export = ExportRecord::new(
            device.name.clone(),
            ServerName::parse("MyClass/inst1").unwrap(),
            ExportInfo {
                host: "h1".to_string(),
                address: "tcp://h1:10000".to_string(),
                pid: 7,
                version: "5".to_string(),
            },
        );
        let info = DeviceInfo::from(DeviceImport {
            device,
            export: Some(export),
        });
        assert!(info.exported);
        assert_eq!(info.host.as_deref(), Some("h1"));
        assert_eq!(info.pid, Some(7));
        assert_eq!(info.class.as_str(), "PowerSupply");
    }
}

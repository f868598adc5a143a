//! Mapping from registry keys to paths under the tree root.

use std::path::{Path, PathBuf};

use devreg_domain::name::{AliasName, ClassName, DeviceName, ServerName};
use devreg_domain::property::PropertyOwner;

pub(crate) const DEVICE_FILE: &str = "device.toml";
pub(crate) const EXPORT_FILE: &str = "export.toml";
pub(crate) const SERVER_FILE: &str = "server.toml";
pub(crate) const CLASS_FILE: &str = "class.toml";
pub(crate) const PROPERTIES_FILE: &str = "properties.toml";
pub(crate) const HISTORY_FILE: &str = "history.toml";
pub(crate) const ATTRIBUTES_DIR: &str = "attributes";
pub(crate) const ATTRIBUTE_ALIAS_FILE: &str = "alias.toml";

#[derive(Debug, Clone)]
pub(crate) struct Layout {
    root: PathBuf,
}

impl Layout {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn devices(&self) -> PathBuf {
        self.root.join("devices")
    }

    pub(crate) fn servers(&self) -> PathBuf {
        self.root.join("servers")
    }

    pub(crate) fn classes(&self) -> PathBuf {
        self.root.join("classes")
    }

    pub(crate) fn free(&self) -> PathBuf {
        self.root.join("free")
    }

    pub(crate) fn attribute_aliases(&self) -> PathBuf {
        self.root.join("attribute_aliases")
    }

    pub(crate) fn device_dir(&self, device: &DeviceName) -> PathBuf {
        self.devices()
            .join(device.domain())
            .join(device.family())
            .join(device.member())
    }

    pub(crate) fn server_dir(&self, server: &ServerName) -> PathBuf {
        self.servers().join(server.key())
    }

    pub(crate) fn class_dir(&self, class: &ClassName) -> PathBuf {
        self.classes().join(class.key())
    }

    pub(crate) fn attribute_alias_dir(&self, alias: &AliasName) -> PathBuf {
        self.attribute_aliases().join(alias.key())
    }

    /// Directory holding the properties and history of `owner`.
    pub(crate) fn owner_dir(&self, owner: &PropertyOwner) -> PathBuf {
        match owner {
            PropertyOwner::Device(device) => self.device_dir(device),
            PropertyOwner::DeviceAttribute(device, attribute) => self
                .device_dir(device)
                .join(ATTRIBUTES_DIR)
                .join(attribute.key()),
            PropertyOwner::Class(class) => self.class_dir(class),
            PropertyOwner::ClassAttribute(class, attribute) => self
                .class_dir(class)
                .join(ATTRIBUTES_DIR)
                .join(attribute.key()),
            PropertyOwner::Free(object) => self.free().join(object.key()),
        }
    }

    /// Top-level directory an owner lives under; directory pruning stops there.
    pub(crate) fn owner_base(&self, owner: &PropertyOwner) -> PathBuf {
        match owner {
            PropertyOwner::Device(_) | PropertyOwner::DeviceAttribute(..) => self.devices(),
            PropertyOwner::Class(_) | PropertyOwner::ClassAttribute(..) => self.classes(),
            PropertyOwner::Free(_) => self.free(),
        }
    }
}

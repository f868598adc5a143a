//! Properties — ordered, multi-valued configuration entries.
//!
//! Every property belongs to exactly one [`PropertyOwner`]: a device, a
//! class, an attribute of either, or a free object. Keys are unique per
//! owner and compared case-insensitively. An empty value list is a real
//! value; absence is modelled by the property not existing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NameError;
use crate::name::{AttributeName, ClassName, DeviceName, ObjectName, PropertyName};
use crate::time::{Timestamp, now};

/// Namespace a property lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyScope {
    Device,
    Class,
    DeviceAttribute,
    ClassAttribute,
    Free,
}

impl PropertyScope {
    pub const ALL: [Self; 5] = [
        Self::Device,
        Self::Class,
        Self::DeviceAttribute,
        Self::ClassAttribute,
        Self::Free,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Class => "class",
            Self::DeviceAttribute => "device_attribute",
            Self::ClassAttribute => "class_attribute",
            Self::Free => "free",
        }
    }

    /// Whether owners of this scope carry an attribute name.
    #[must_use]
    pub fn has_attribute(self) -> bool {
        matches!(self, Self::DeviceAttribute | Self::ClassAttribute)
    }
}

impl fmt::Display for PropertyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyScope {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| NameError::UnknownScope(s.to_string()))
    }
}

/// The entity a property belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyOwner {
    Device(DeviceName),
    Class(ClassName),
    DeviceAttribute(DeviceName, AttributeName),
    ClassAttribute(ClassName, AttributeName),
    Free(ObjectName),
}

impl PropertyOwner {
    #[must_use]
    pub fn scope(&self) -> PropertyScope {
        match self {
            Self::Device(_) => PropertyScope::Device,
            Self::Class(_) => PropertyScope::Class,
            Self::DeviceAttribute(..) => PropertyScope::DeviceAttribute,
            Self::ClassAttribute(..) => PropertyScope::ClassAttribute,
            Self::Free(_) => PropertyScope::Free,
        }
    }

    /// Canonical key of the device, class, or object owning the property.
    #[must_use]
    pub fn owner_key(&self) -> &str {
        match self {
            Self::Device(device) | Self::DeviceAttribute(device, _) => device.key(),
            Self::Class(class) | Self::ClassAttribute(class, _) => class.key(),
            Self::Free(object) => object.key(),
        }
    }

    /// Owner name as first written; device names are always canonical.
    #[must_use]
    pub fn owner_name(&self) -> &str {
        match self {
            Self::Device(device) | Self::DeviceAttribute(device, _) => device.key(),
            Self::Class(class) | Self::ClassAttribute(class, _) => class.as_str(),
            Self::Free(object) => object.as_str(),
        }
    }

    #[must_use]
    pub fn attribute(&self) -> Option<&AttributeName> {
        match self {
            Self::DeviceAttribute(_, attribute) | Self::ClassAttribute(_, attribute) => {
                Some(attribute)
            }
            _ => None,
        }
    }

    /// Canonical attribute key, or `""` for owners without one.
    #[must_use]
    pub fn attribute_key(&self) -> &str {
        self.attribute().map_or("", AttributeName::key)
    }

    /// The device, class, or free object this owner ultimately belongs to.
    #[must_use]
    pub fn root(&self) -> Self {
        match self {
            Self::Device(device) | Self::DeviceAttribute(device, _) => {
                Self::Device(device.clone())
            }
            Self::Class(class) | Self::ClassAttribute(class, _) => Self::Class(class.clone()),
            Self::Free(object) => Self::Free(object.clone()),
        }
    }

    /// Stable string identifying the root owner, used as a lock key.
    #[must_use]
    pub fn root_key(&self) -> String {
        let root = self.root();
        format!("{}:{}", root.scope(), root.owner_key())
    }

    /// Scope of the attributes hanging off this owner's root, if it can have
    /// any.
    #[must_use]
    pub fn attribute_scope(&self) -> Option<PropertyScope> {
        match self {
            Self::Device(_) | Self::DeviceAttribute(..) => Some(PropertyScope::DeviceAttribute),
            Self::Class(_) | Self::ClassAttribute(..) => Some(PropertyScope::ClassAttribute),
            Self::Free(_) => None,
        }
    }

    /// Whether `other` is this owner's root or one of its attributes.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.root() == self.root()
    }

    /// Rebuild an owner from the canonical keys a backend stores.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when a key is not a valid name for the scope.
    pub fn from_keys(
        scope: PropertyScope,
        owner_key: &str,
        attribute_key: &str,
    ) -> Result<Self, NameError> {
        Ok(match scope {
            PropertyScope::Device => Self::Device(DeviceName::parse(owner_key)?),
            PropertyScope::Class => Self::Class(ClassName::parse(owner_key)?),
            PropertyScope::DeviceAttribute => Self::DeviceAttribute(
                DeviceName::parse(owner_key)?,
                AttributeName::parse(attribute_key)?,
            ),
            PropertyScope::ClassAttribute => Self::ClassAttribute(
                ClassName::parse(owner_key)?,
                AttributeName::parse(attribute_key)?,
            ),
            PropertyScope::Free => Self::Free(ObjectName::parse(owner_key)?),
        })
    }
}

impl fmt::Display for PropertyOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.attribute() {
            Some(attribute) => write!(f, "{} {}/{}", self.scope(), self.owner_key(), attribute),
            None => write!(f, "{} {}", self.scope(), self.owner_key()),
        }
    }
}

/// A stored property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub owner: PropertyOwner,
    pub name: PropertyName,
    pub values: Vec<String>,
    pub updated_at: Timestamp,
    /// Identity of the last writer.
    pub writer: String,
}

impl Property {
    #[must_use]
    pub fn new(
        owner: PropertyOwner,
        name: PropertyName,
        values: Vec<String>,
        writer: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            name,
            values,
            updated_at: now(),
            writer: writer.into(),
        }
    }

    /// Snapshot of this value for the history log.
    #[must_use]
    pub fn to_history_entry(&self) -> PropertyHistoryEntry {
        PropertyHistoryEntry {
            name: self.name.clone(),
            values: self.values.clone(),
            recorded_at: self.updated_at,
            writer: self.writer.clone(),
        }
    }
}

/// A value set a property held before it was overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyHistoryEntry {
    pub name: PropertyName,
    pub values: Vec<String>,
    /// When the value was written, not when it was replaced.
    pub recorded_at: Timestamp,
    pub writer: String,
}

/// One entry of a multi-property read. `values` is `None` when the requested
/// name matched nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValues {
    pub name: String,
    pub values: Option<Vec<String>>,
}

//! Device — a named unit of control, instantiated from a class and hosted by
//! at most one server at a time.

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::name::{AliasName, ClassName, DeviceName, ServerName};
use crate::time::{Timestamp, now};

/// A registered device.
///
/// `server` is the authoritative owner reference; the server's device index
/// is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: DeviceName,
    pub class: ClassName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<AliasName>,
    pub registered_at: Timestamp,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Whether `server` currently owns this device.
    #[must_use]
    pub fn is_hosted_by(&self, server: &ServerName) -> bool {
        self.server.as_ref() == Some(server)
    }
}

/// Step-by-step builder for [`Device`]. Names are given as raw strings and
/// parsed in [`build`](DeviceBuilder::build).
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    name: Option<String>,
    class: Option<String>,
    server: Option<String>,
    alias: Option<String>,
    registered_at: Option<Timestamp>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn registered_at(mut self, at: Timestamp) -> Self {
        self.registered_at = Some(at);
        self
    }

    /// Consume the builder, parse every name, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] if the name or class is missing
    /// or any given name is malformed.
    pub fn build(self) -> Result<Device, RegistryError> {
        let name = DeviceName::parse(self.name.as_deref().unwrap_or_default())?;
        let class = ClassName::parse(self.class.as_deref().unwrap_or_default())?;
        let server = self.server.as_deref().map(ServerName::parse).transpose()?;
        let alias = self.alias.as_deref().map(AliasName::parse).transpose()?;
        Ok(Device {
            name,
            class,
            server,
            alias,
            registered_at: self.registered_at.unwrap_or_else(now),
        })
    }
}

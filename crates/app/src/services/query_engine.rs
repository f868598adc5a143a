//! Query engine — wildcard listings over servers, devices, classes, exports.
//!
//! Every listing narrows the backend scan with the pattern's literal prefix,
//! then applies the full [`Pattern`] to the materialized keys, so both
//! backends agree on the result by construction. Each record is read
//! atomically; a record removed between listing and reading is skipped.
//! Results are sorted by canonical key and de-duplicated.

use std::collections::BTreeMap;
use std::sync::Arc;

use devreg_domain::device::Device;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{AliasName, ClassName, DeviceName, ServerName};
use devreg_domain::pattern::Pattern;

use crate::ports::StorageBackend;

/// Devices of the registry's own database servers.
pub const DATABASE_DEVICE_PATTERN: &str = "sys/database/*";

/// Devices currently hosted by `server`: entries of its index whose device
/// record still points back at it.
pub(crate) async fn hosted_devices<B: StorageBackend>(
    backend: &B,
    server: &ServerName,
) -> Result<Vec<Device>, RegistryError> {
    let Some(record) = backend.get_server(server).await? else {
        return Ok(Vec::new());
    };
    let mut devices = Vec::with_capacity(record.devices.len());
    for name in &record.devices {
        if let Some(device) = backend.get_device(name).await?
            && device.is_hosted_by(server)
        {
            devices.push(device);
        }
    }
    Ok(devices)
}

/// Collect display strings keyed by their lower-case form: sorted,
/// case-insensitively unique, first spelling wins.
fn sorted_unique(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut unique = BTreeMap::new();
    for value in values {
        unique.entry(value.to_ascii_lowercase()).or_insert(value);
    }
    unique.into_values().collect()
}

/// Application service answering read-only wildcard queries.
pub struct QueryEngine<B> {
    backend: Arc<B>,
}

impl<B: StorageBackend> QueryEngine<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    async fn servers_matching(&self, pattern: &Pattern) -> Result<Vec<ServerName>, RegistryError> {
        let mut servers: Vec<ServerName> = self
            .backend
            .list_server_names(pattern.literal_prefix())
            .await?
            .into_iter()
            .filter(|server| pattern.matches(server.key()))
            .collect();
        servers.sort();
        servers.dedup();
        Ok(servers)
    }

    async fn devices_matching(&self, pattern: &Pattern) -> Result<Vec<Device>, RegistryError> {
        let mut names = self
            .backend
            .list_device_names(pattern.literal_prefix())
            .await?;
        names.retain(|name| pattern.matches(name.key()));
        names.sort();
        names.dedup();

        let mut devices = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(device) = self.backend.get_device(name).await? {
                devices.push(device);
            }
        }
        Ok(devices)
    }

    async fn all_devices(&self) -> Result<Vec<Device>, RegistryError> {
        self.devices_matching(&Pattern::any()).await
    }

    /// Servers (`class/instance`, display case) matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn server_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        let pattern = Pattern::new(pattern);
        Ok(self
            .servers_matching(&pattern)
            .await?
            .into_iter()
            .map(|server| server.to_string())
            .collect())
    }

    /// Distinct server classes (executable names) matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn server_name_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let servers = self.servers_matching(&Pattern::any()).await?;
        Ok(sorted_unique(
            servers
                .iter()
                .filter(|server| pattern.matches(server.class()))
                .map(|server| server.class().to_string()),
        ))
    }

    /// Instances of the server classes matching `class_pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn instance_name_list(
        &self,
        class_pattern: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let pattern = Pattern::new(class_pattern);
        let servers = self.servers_matching(&Pattern::any()).await?;
        Ok(sorted_unique(
            servers
                .iter()
                .filter(|server| pattern.matches(server.class()))
                .map(|server| server.instance().to_string()),
        ))
    }

    /// Registered devices whose canonical name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn device_list(&self, pattern: &str) -> Result<Vec<DeviceName>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let mut names = self
            .backend
            .list_device_names(pattern.literal_prefix())
            .await?;
        names.retain(|name| pattern.matches(name.key()));
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Distinct device domains matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn device_domain_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let names = self.device_list("*").await?;
        Ok(sorted_unique(
            names
                .iter()
                .filter(|name| pattern.matches(name.domain()))
                .map(|name| name.domain().to_string()),
        ))
    }

    /// Distinct families of devices whose `domain/family` matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn device_family_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let names = self.device_list("*").await?;
        Ok(sorted_unique(
            names
                .iter()
                .filter(|name| pattern.matches(&format!("{}/{}", name.domain(), name.family())))
                .map(|name| name.family().to_string()),
        ))
    }

    /// Distinct members of devices whose full name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn device_member_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        let names = self.device_list(pattern).await?;
        Ok(sorted_unique(
            names.iter().map(|name| name.member().to_string()),
        ))
    }

    /// Devices of `server` whose class matches `class_pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self, server), fields(server = %server))]
    pub async fn device_list_for_server_class(
        &self,
        server: &ServerName,
        class_pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        let pattern = Pattern::new(class_pattern);
        let mut names: Vec<DeviceName> = hosted_devices(self.backend.as_ref(), server)
            .await?
            .into_iter()
            .filter(|device| pattern.matches(device.class.key()))
            .map(|device| device.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Known device classes matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn class_list(&self, pattern: &str) -> Result<Vec<ClassName>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let mut classes = self
            .backend
            .list_class_names(pattern.literal_prefix())
            .await?;
        classes.retain(|class| pattern.matches(class.key()));
        classes.sort();
        classes.dedup();
        Ok(classes)
    }

    /// Classes of the devices hosted by servers matching `server_pattern`,
    /// excluding the admin class.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn server_class_list(
        &self,
        server_pattern: &str,
    ) -> Result<Vec<ClassName>, RegistryError> {
        let pattern = Pattern::new(server_pattern);
        let admin = ClassName::admin();
        let mut classes = Vec::new();
        for server in self.servers_matching(&pattern).await? {
            classes.extend(
                hosted_devices(self.backend.as_ref(), &server)
                    .await?
                    .into_iter()
                    .map(|device| device.class)
                    .filter(|class| *class != admin),
            );
        }
        classes.sort();
        classes.dedup();
        Ok(classes)
    }

    /// `(device, class)` pairs of every device hosted by `server`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self, server), fields(server = %server))]
    pub async fn device_class_list(
        &self,
        server: &ServerName,
    ) -> Result<Vec<(DeviceName, ClassName)>, RegistryError> {
        let mut pairs: Vec<(DeviceName, ClassName)> =
            hosted_devices(self.backend.as_ref(), server)
                .await?
                .into_iter()
                .map(|device| (device.name, device.class))
                .collect();
        pairs.sort();
        Ok(pairs)
    }

    /// Devices with a live export whose name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn exported_device_list(
        &self,
        pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let mut names = self
            .backend
            .list_exported_names(pattern.literal_prefix())
            .await?;
        names.retain(|name| pattern.matches(name.key()));
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Exported devices whose class matches `class_pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn exported_device_list_for_class(
        &self,
        class_pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        let pattern = Pattern::new(class_pattern);
        let mut names = Vec::new();
        for name in self.exported_device_list("*").await? {
            if let Some(device) = self.backend.get_device(&name).await?
                && pattern.matches(device.class.key())
            {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Distinct hosts with at least one export, matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn host_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let mut hosts = Vec::new();
        for name in self.exported_device_list("*").await? {
            if let Some(export) = self.backend.get_export(&name).await?
                && pattern.matches(&export.host)
            {
                hosts.push(export.host);
            }
        }
        Ok(sorted_unique(hosts))
    }

    /// Servers with at least one export on a host matching `host_pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn host_server_list(&self, host_pattern: &str) -> Result<Vec<String>, RegistryError> {
        let pattern = Pattern::new(host_pattern);
        let mut servers = Vec::new();
        for name in self.exported_device_list("*").await? {
            if let Some(export) = self.backend.get_export(&name).await?
                && pattern.matches(&export.host)
            {
                servers.push(export.server);
            }
        }
        servers.sort();
        servers.dedup();
        Ok(servers.into_iter().map(|server| server.to_string()).collect())
    }

    /// Addresses of every exported database device (`sys/database/*`).
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn database_addresses(&self) -> Result<Vec<String>, RegistryError> {
        let mut addresses = Vec::new();
        for name in self.exported_device_list(DATABASE_DEVICE_PATTERN).await? {
            if let Some(export) = self.backend.get_export(&name).await? {
                addresses.push(export.address);
            }
        }
        Ok(addresses)
    }

    /// Device aliases matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn device_alias_list(&self, pattern: &str) -> Result<Vec<AliasName>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let mut aliases: Vec<AliasName> = self
            .all_devices()
            .await?
            .into_iter()
            .filter_map(|device| device.alias)
            .filter(|alias| pattern.matches(alias.key()))
            .collect();
        aliases.sort();
        aliases.dedup();
        Ok(aliases)
    }
}

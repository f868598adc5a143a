//! Registry — the store handle exposing the complete operation set.
//!
//! Every method takes raw strings, parses them into names first, and fails
//! with [`RegistryError::InvalidName`] before any storage access when a name
//! is malformed. A transport layer maps wire requests onto these calls.

use std::sync::Arc;

use devreg_domain::alias::AttributeAlias;
use devreg_domain::class::DeviceClass;
use devreg_domain::device::Device;
use devreg_domain::error::RegistryError;
use devreg_domain::export::{DeviceImport, DeviceInfo, ExportInfo, ExportRecord};
use devreg_domain::history::HistoryPolicy;
use devreg_domain::name::{
    AliasName, AttributeName, ClassName, DeviceName, ObjectName, PropertyName, ServerName,
};
use devreg_domain::pattern::Pattern;
use devreg_domain::property::{
    Property, PropertyHistoryEntry, PropertyOwner, PropertyScope, PropertyValues,
};
use devreg_domain::server::ServerRecord;

use crate::consistency::KeyedLocks;
use crate::ports::StorageBackend;
use crate::services::attribute_aliases::AttributeAliases;
use crate::services::export_registry::ExportRegistry;
use crate::services::property_store::PropertyStore;
use crate::services::query_engine::QueryEngine;

/// Class property listing the classes a class inherits from.
pub const INHERITANCE_PROPERTY: &str = "InheritedFrom";

fn device_owner(device: &str) -> Result<PropertyOwner, RegistryError> {
    Ok(PropertyOwner::Device(DeviceName::parse(device)?))
}

fn class_owner(class: &str) -> Result<PropertyOwner, RegistryError> {
    Ok(PropertyOwner::Class(ClassName::parse(class)?))
}

fn device_attribute_owner(device: &str, attribute: &str) -> Result<PropertyOwner, RegistryError> {
    Ok(PropertyOwner::DeviceAttribute(
        DeviceName::parse(device)?,
        AttributeName::parse(attribute)?,
    ))
}

fn class_attribute_owner(class: &str, attribute: &str) -> Result<PropertyOwner, RegistryError> {
    Ok(PropertyOwner::ClassAttribute(
        ClassName::parse(class)?,
        AttributeName::parse(attribute)?,
    ))
}

fn free_owner(object: &str) -> Result<PropertyOwner, RegistryError> {
    Ok(PropertyOwner::Free(ObjectName::parse(object)?))
}

/// Explicit store handle over one active [`StorageBackend`].
pub struct Registry<B> {
    backend: Arc<B>,
    locks: KeyedLocks,
    properties: Arc<PropertyStore<B>>,
    exports: ExportRegistry<B>,
    queries: QueryEngine<B>,
    aliases: AttributeAliases<B>,
}

impl<B: StorageBackend> Registry<B> {
    /// Attach a registry to an opened backend.
    pub fn new(backend: B, policy: HistoryPolicy) -> Self {
        let backend = Arc::new(backend);
        let locks = KeyedLocks::new();
        let properties = Arc::new(PropertyStore::new(
            Arc::clone(&backend),
            locks.clone(),
            policy,
        ));
        let exports = ExportRegistry::new(
            Arc::clone(&backend),
            locks.clone(),
            Arc::clone(&properties),
        );
        let queries = QueryEngine::new(Arc::clone(&backend));
        let aliases = AttributeAliases::new(Arc::clone(&backend), locks.clone());
        tracing::debug!(backend = backend.name(), "registry attached");
        Self {
            backend,
            locks,
            properties,
            exports,
            queries,
            aliases,
        }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn properties(&self) -> &PropertyStore<B> {
        &self.properties
    }

    #[must_use]
    pub fn exports(&self) -> &ExportRegistry<B> {
        &self.exports
    }

    #[must_use]
    pub fn queries(&self) -> &QueryEngine<B> {
        &self.queries
    }

    #[must_use]
    pub fn attribute_aliases(&self) -> &AttributeAliases<B> {
        &self.aliases
    }

    /// Start reclaiming idle lock entries in the background.
    pub fn spawn_lock_cleanup(&self) -> tokio::task::JoinHandle<()> {
        self.locks.clone().spawn_cleanup_task()
    }

    /// Flush and close the backend.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend fails to shut down cleanly.
    pub async fn close(&self) -> Result<(), RegistryError> {
        tracing::debug!(backend = self.backend.name(), "closing registry");
        self.backend.close().await
    }

    // Devices and exports

    /// Register a device under a server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::AlreadyExists`],
    /// or a storage error.
    pub async fn add_device(
        &self,
        device: &str,
        class: &str,
        server: &str,
    ) -> Result<Device, RegistryError> {
        let device = DeviceName::parse(device)?;
        let class = ClassName::parse(class)?;
        let server = ServerName::parse(server)?;
        self.exports.register_device(device, class, server).await
    }

    /// Deregister a device with its export, properties, and index entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_device(&self, device: &str) -> Result<(), RegistryError> {
        let device = DeviceName::parse(device)?;
        self.exports.deregister_device(&device).await
    }

    /// Registration and live export of a device, looked up by name or alias.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn import_device(&self, device_or_alias: &str) -> Result<DeviceImport, RegistryError> {
        let device = match DeviceName::parse(device_or_alias) {
            Ok(device) => device,
            Err(err) => match AliasName::parse(device_or_alias) {
                Ok(alias) => self.exports.get_alias_device(&alias).await?,
                Err(_) => return Err(err.into()),
            },
        };
        self.exports.import_device(&device).await
    }

    /// Publish the live location of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// [`RegistryError::ServerMismatch`], or a storage error.
    pub async fn export_device(
        &self,
        device: &str,
        server: &str,
        info: ExportInfo,
    ) -> Result<ExportRecord, RegistryError> {
        let device = DeviceName::parse(device)?;
        let server = ServerName::parse(server)?;
        self.exports.export_device(&device, &server, info).await
    }

    /// Remove the live export of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn unexport_device(&self, device: &str) -> Result<(), RegistryError> {
        let device = DeviceName::parse(device)?;
        self.exports.unexport_device(&device).await
    }

    /// Live export of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// [`RegistryError::NotExported`], or a storage error.
    pub async fn get_device_export_info(&self, device: &str) -> Result<ExportRecord, RegistryError> {
        let device = DeviceName::parse(device)?;
        self.exports.get_export_info(&device).await
    }

    /// Registration and export summary of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn get_device_info(&self, device: &str) -> Result<DeviceInfo, RegistryError> {
        let device = DeviceName::parse(device)?;
        self.exports.get_device_info(&device).await
    }

    /// Class a device is instantiated from.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn get_device_class(&self, device: &str) -> Result<ClassName, RegistryError> {
        let device = DeviceName::parse(device)?;
        Ok(self.exports.import_device(&device).await?.device.class)
    }

    /// A device's class followed by the classes listed in its
    /// `InheritedFrom` class property.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn get_class_inheritance_for_device(
        &self,
        device: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let class = self.get_device_class(device).await?;
        let inherited = match self
            .properties
            .get_property(
                &PropertyOwner::Class(class.clone()),
                &PropertyName::parse(INHERITANCE_PROPERTY)?,
            )
            .await
        {
            Ok(property) => property.values,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };
        let mut chain = vec![class.to_string()];
        chain.extend(inherited);
        Ok(chain)
    }

    /// Move a device to another server, unexporting it first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn rehome_device(&self, device: &str, server: &str) -> Result<Device, RegistryError> {
        let device = DeviceName::parse(device)?;
        let server = ServerName::parse(server)?;
        self.exports.rehome_device(&device, server).await
    }

    /// Unexport every device of a server; returns how many were exported.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn unexport_server(&self, server: &str) -> Result<usize, RegistryError> {
        let server = ServerName::parse(server)?;
        self.exports.unexport_server(&server).await
    }

    /// Deregister every device of a server, then remove the server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_server(&self, server: &str) -> Result<(), RegistryError> {
        let server = ServerName::parse(server)?;
        self.exports.delete_server(&server).await
    }

    /// Move every device of `old` under the new server name `new`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// [`RegistryError::AlreadyExists`], or a storage error.
    pub async fn rename_server(&self, old: &str, new: &str) -> Result<ServerRecord, RegistryError> {
        let old = ServerName::parse(old)?;
        let new = ServerName::parse(new)?;
        self.exports.rename_server(&old, new).await
    }

    /// Addresses of the exported database devices.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_csdb_server_list(&self) -> Result<Vec<String>, RegistryError> {
        self.queries.database_addresses().await
    }

    /// Known class record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn get_class(&self, class: &str) -> Result<DeviceClass, RegistryError> {
        let class = ClassName::parse(class)?;
        self.backend
            .get_class(&class)
            .await?
            .ok_or_else(|| RegistryError::not_found("Class", class.to_string()))
    }

    // Aliases

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// [`RegistryError::AlreadyExists`], or a storage error.
    pub async fn put_device_alias(&self, device: &str, alias: &str) -> Result<(), RegistryError> {
        let device = DeviceName::parse(device)?;
        let alias = AliasName::parse(alias)?;
        self.exports.put_device_alias(&device, alias).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_device_alias(&self, alias: &str) -> Result<(), RegistryError> {
        let alias = AliasName::parse(alias)?;
        self.exports.delete_device_alias(&alias).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn get_alias_device(&self, alias: &str) -> Result<DeviceName, RegistryError> {
        let alias = AliasName::parse(alias)?;
        self.exports.get_alias_device(&alias).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn get_device_alias(&self, device: &str) -> Result<AliasName, RegistryError> {
        let device = DeviceName::parse(device)?;
        self.exports.get_device_alias(&device).await
    }

    /// Bind `alias` to a full attribute name `domain/family/member/attribute`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::AlreadyExists`]
    /// when the alias names another attribute, or a storage error.
    pub async fn put_attribute_alias(
        &self,
        attribute: &str,
        alias: &str,
    ) -> Result<AttributeAlias, RegistryError> {
        let (device, attribute) = AttributeAlias::parse_target(attribute)?;
        let alias = AliasName::parse(alias)?;
        self.aliases.put_attribute_alias(alias, device, attribute).await
    }

    /// Full attribute name an alias stands for.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn get_attribute_alias(&self, alias: &str) -> Result<String, RegistryError> {
        let alias = AliasName::parse(alias)?;
        Ok(self.aliases.get_attribute_alias(&alias).await?.target())
    }

    /// Like [`get_attribute_alias`](Self::get_attribute_alias), but an unknown
    /// alias yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_alias_attribute(&self, alias: &str) -> Result<Vec<String>, RegistryError> {
        let alias = AliasName::parse(alias)?;
        match self.aliases.get_attribute_alias(&alias).await {
            Ok(record) => Ok(vec![record.target()]),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Aliases standing for a full attribute name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_attribute_aliases_of(
        &self,
        attribute: &str,
    ) -> Result<Vec<AliasName>, RegistryError> {
        let (device, attribute) = AttributeAlias::parse_target(attribute)?;
        self.aliases.aliases_of(&device, &attribute).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_attribute_alias(&self, alias: &str) -> Result<(), RegistryError> {
        let alias = AliasName::parse(alias)?;
        self.aliases.delete_attribute_alias(&alias).await
    }

    /// Attribute aliases matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_attribute_alias_list(
        &self,
        pattern: &str,
    ) -> Result<Vec<AliasName>, RegistryError> {
        self.aliases.list(pattern).await
    }

    // Listings

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_device_list(&self, pattern: &str) -> Result<Vec<DeviceName>, RegistryError> {
        self.queries.device_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_server_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        self.queries.server_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_server_name_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        self.queries.server_name_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_instance_name_list(
        &self,
        class_pattern: &str,
    ) -> Result<Vec<String>, RegistryError> {
        self.queries.instance_name_list(class_pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_device_domain_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        self.queries.device_domain_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_device_family_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        self.queries.device_family_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_device_member_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        self.queries.device_member_list(pattern).await
    }

    /// Devices hosted by servers matching `server_pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_device_list_for_server(
        &self,
        server_pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        self.exports.list_devices_for_server(server_pattern).await
    }

    /// Devices of one server whose class matches `class_pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_list_for_server_class(
        &self,
        server: &str,
        class_pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        let server = ServerName::parse(server)?;
        self.queries
            .device_list_for_server_class(&server, class_pattern)
            .await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_class_list(
        &self,
        server: &str,
    ) -> Result<Vec<(DeviceName, ClassName)>, RegistryError> {
        let server = ServerName::parse(server)?;
        self.queries.device_class_list(&server).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_class_list(&self, pattern: &str) -> Result<Vec<ClassName>, RegistryError> {
        self.queries.class_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_server_class_list(
        &self,
        server_pattern: &str,
    ) -> Result<Vec<ClassName>, RegistryError> {
        self.queries.server_class_list(server_pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_exported_device_list(
        &self,
        pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        self.queries.exported_device_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_exported_device_list_for_class(
        &self,
        class_pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        self.queries
            .exported_device_list_for_class(class_pattern)
            .await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_host_list(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        self.queries.host_list(pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_host_server_list(&self, host_pattern: &str) -> Result<Vec<String>, RegistryError> {
        self.queries.host_server_list(host_pattern).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_device_alias_list(&self, pattern: &str) -> Result<Vec<AliasName>, RegistryError> {
        self.queries.device_alias_list(pattern).await
    }

    // Device properties

    /// Values of the requested device properties; each request may be a
    /// wildcard pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_property(
        &self,
        device: &str,
        names: &[String],
    ) -> Result<Vec<PropertyValues>, RegistryError> {
        let owner = device_owner(device)?;
        self.properties.get_properties(&owner, names).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn put_device_property(
        &self,
        device: &str,
        name: &str,
        values: Vec<String>,
        writer: &str,
    ) -> Result<Property, RegistryError> {
        let owner = device_owner(device)?;
        let name = PropertyName::parse(name)?;
        self.properties.put_property(owner, name, values, writer).await
    }

    /// Delete a device property, keeping its history.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_device_property(&self, device: &str, name: &str) -> Result<(), RegistryError> {
        let owner = device_owner(device)?;
        let name = PropertyName::parse(name)?;
        self.properties.delete_property(&owner, &name, false).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_property_list(
        &self,
        device: &str,
        pattern: &str,
    ) -> Result<Vec<PropertyName>, RegistryError> {
        let owner = device_owner(device)?;
        self.properties
            .list_property_names(&owner, &Pattern::new(pattern))
            .await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_property_history(
        &self,
        device: &str,
        name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PropertyHistoryEntry>, RegistryError> {
        let owner = device_owner(device)?;
        let name = PropertyName::parse(name)?;
        self.properties.get_property_history(&owner, &name, limit).await
    }

    // Class properties

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_class_property(
        &self,
        class: &str,
        names: &[String],
    ) -> Result<Vec<PropertyValues>, RegistryError> {
        let owner = class_owner(class)?;
        self.properties.get_properties(&owner, names).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn put_class_property(
        &self,
        class: &str,
        name: &str,
        values: Vec<String>,
        writer: &str,
    ) -> Result<Property, RegistryError> {
        let owner = class_owner(class)?;
        let name = PropertyName::parse(name)?;
        self.properties.put_property(owner, name, values, writer).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_class_property(&self, class: &str, name: &str) -> Result<(), RegistryError> {
        let owner = class_owner(class)?;
        let name = PropertyName::parse(name)?;
        self.properties.delete_property(&owner, &name, false).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_class_property_list(
        &self,
        class: &str,
        pattern: &str,
    ) -> Result<Vec<PropertyName>, RegistryError> {
        let owner = class_owner(class)?;
        self.properties
            .list_property_names(&owner, &Pattern::new(pattern))
            .await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_class_property_history(
        &self,
        class: &str,
        name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PropertyHistoryEntry>, RegistryError> {
        let owner = class_owner(class)?;
        let name = PropertyName::parse(name)?;
        self.properties.get_property_history(&owner, &name, limit).await
    }

    // Attribute properties

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_attribute_property(
        &self,
        device: &str,
        attribute: &str,
        names: &[String],
    ) -> Result<Vec<PropertyValues>, RegistryError> {
        let owner = device_attribute_owner(device, attribute)?;
        self.properties.get_properties(&owner, names).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn put_device_attribute_property(
        &self,
        device: &str,
        attribute: &str,
        name: &str,
        values: Vec<String>,
        writer: &str,
    ) -> Result<Property, RegistryError> {
        let owner = device_attribute_owner(device, attribute)?;
        let name = PropertyName::parse(name)?;
        self.properties.put_property(owner, name, values, writer).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_device_attribute_property(
        &self,
        device: &str,
        attribute: &str,
        name: &str,
    ) -> Result<(), RegistryError> {
        let owner = device_attribute_owner(device, attribute)?;
        let name = PropertyName::parse(name)?;
        self.properties.delete_property(&owner, &name, false).await
    }

    /// Delete every property of one device attribute; returns how many were
    /// removed. Their history is kept.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn delete_device_attribute(
        &self,
        device: &str,
        attribute: &str,
    ) -> Result<usize, RegistryError> {
        let owner = device_attribute_owner(device, attribute)?;
        self.properties.delete_owner_properties(&owner).await
    }

    /// [`delete_device_attribute`](Self::delete_device_attribute) for several
    /// attributes of one device. Every name is validated before any deletion.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn delete_all_device_attribute_property(
        &self,
        device: &str,
        attributes: &[String],
    ) -> Result<usize, RegistryError> {
        let owners = attributes
            .iter()
            .map(|attribute| device_attribute_owner(device, attribute))
            .collect::<Result<Vec<_>, _>>()?;
        let mut removed = 0;
        for owner in &owners {
            removed += self.properties.delete_owner_properties(owner).await?;
        }
        Ok(removed)
    }

    /// Attributes of a device that carry properties.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_attribute_list(
        &self,
        device: &str,
        pattern: &str,
    ) -> Result<Vec<AttributeName>, RegistryError> {
        let owner = device_owner(device)?;
        self.properties
            .list_attributes(&owner, &Pattern::new(pattern))
            .await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_device_attribute_property_history(
        &self,
        device: &str,
        attribute: &str,
        name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PropertyHistoryEntry>, RegistryError> {
        let owner = device_attribute_owner(device, attribute)?;
        let name = PropertyName::parse(name)?;
        self.properties.get_property_history(&owner, &name, limit).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_class_attribute_property(
        &self,
        class: &str,
        attribute: &str,
        names: &[String],
    ) -> Result<Vec<PropertyValues>, RegistryError> {
        let owner = class_attribute_owner(class, attribute)?;
        self.properties.get_properties(&owner, names).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn put_class_attribute_property(
        &self,
        class: &str,
        attribute: &str,
        name: &str,
        values: Vec<String>,
        writer: &str,
    ) -> Result<Property, RegistryError> {
        let owner = class_attribute_owner(class, attribute)?;
        let name = PropertyName::parse(name)?;
        self.properties.put_property(owner, name, values, writer).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_class_attribute_property(
        &self,
        class: &str,
        attribute: &str,
        name: &str,
    ) -> Result<(), RegistryError> {
        let owner = class_attribute_owner(class, attribute)?;
        let name = PropertyName::parse(name)?;
        self.properties.delete_property(&owner, &name, false).await
    }

    /// Delete every property of one class attribute; returns how many were
    /// removed. Their history is kept.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn delete_class_attribute(
        &self,
        class: &str,
        attribute: &str,
    ) -> Result<usize, RegistryError> {
        let owner = class_attribute_owner(class, attribute)?;
        self.properties.delete_owner_properties(&owner).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_class_attribute_list(
        &self,
        class: &str,
        pattern: &str,
    ) -> Result<Vec<AttributeName>, RegistryError> {
        let owner = class_owner(class)?;
        self.properties
            .list_attributes(&owner, &Pattern::new(pattern))
            .await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_class_attribute_property_history(
        &self,
        class: &str,
        attribute: &str,
        name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PropertyHistoryEntry>, RegistryError> {
        let owner = class_attribute_owner(class, attribute)?;
        let name = PropertyName::parse(name)?;
        self.properties.get_property_history(&owner, &name, limit).await
    }

    // Free-object properties

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_property(
        &self,
        object: &str,
        names: &[String],
    ) -> Result<Vec<PropertyValues>, RegistryError> {
        let owner = free_owner(object)?;
        self.properties.get_properties(&owner, names).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn put_property(
        &self,
        object: &str,
        name: &str,
        values: Vec<String>,
        writer: &str,
    ) -> Result<Property, RegistryError> {
        let owner = free_owner(object)?;
        let name = PropertyName::parse(name)?;
        self.properties.put_property(owner, name, values, writer).await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`], [`RegistryError::NotFound`],
    /// or a storage error.
    pub async fn delete_property(&self, object: &str, name: &str) -> Result<(), RegistryError> {
        let owner = free_owner(object)?;
        let name = PropertyName::parse(name)?;
        self.properties.delete_property(&owner, &name, false).await
    }

    /// Free objects carrying at least one property.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn get_object_list(&self, pattern: &str) -> Result<Vec<ObjectName>, RegistryError> {
        let owners = self
            .properties
            .list_owners(PropertyScope::Free, &Pattern::new(pattern))
            .await?;
        Ok(owners
            .into_iter()
            .filter_map(|owner| match owner {
                PropertyOwner::Free(object) => Some(object),
                _ => None,
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_object_property_list(
        &self,
        object: &str,
        pattern: &str,
    ) -> Result<Vec<PropertyName>, RegistryError> {
        let owner = free_owner(object)?;
        self.properties
            .list_property_names(&owner, &Pattern::new(pattern))
            .await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] or a storage error.
    pub async fn get_property_history(
        &self,
        object: &str,
        name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PropertyHistoryEntry>, RegistryError> {
        let owner = free_owner(object)?;
        let name = PropertyName::parse(name)?;
        self.properties.get_property_history(&owner, &name, limit).await
    }
}

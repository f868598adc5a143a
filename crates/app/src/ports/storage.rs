//! Storage port — repository traits for persistence.
//!
//! Each record kind has its own repository trait; [`StorageBackend`] ties them
//! together into the single capability a backend must offer. Every method is
//! atomic for the key it touches. Listing methods take a lower-case literal
//! prefix and return a finite snapshot of matching keys; wildcard evaluation
//! happens in the services, never in a backend.

use std::future::Future;

use devreg_domain::alias::AttributeAlias;
use devreg_domain::class::DeviceClass;
use devreg_domain::device::Device;
use devreg_domain::error::RegistryError;
use devreg_domain::export::ExportRecord;
use devreg_domain::name::{AliasName, AttributeName, ClassName, DeviceName, PropertyName, ServerName};
use devreg_domain::property::{Property, PropertyHistoryEntry, PropertyOwner, PropertyScope};
use devreg_domain::server::ServerRecord;
use devreg_domain::time::Timestamp;

/// Persistence for [`Device`] records.
pub trait DeviceRepository {
    fn get_device(
        &self,
        name: &DeviceName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send;

    /// Insert or overwrite a device record.
    fn put_device(&self, device: &Device) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Returns `false` when no record existed.
    fn delete_device(
        &self,
        name: &DeviceName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send;

    /// Names of every device whose canonical key starts with `prefix`.
    fn list_device_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<DeviceName>, RegistryError>> + Send;

    fn find_device_by_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send;
}

/// Persistence for [`ServerRecord`]s and their device index.
pub trait ServerRepository {
    fn get_server(
        &self,
        name: &ServerName,
    ) -> impl Future<Output = Result<Option<ServerRecord>, RegistryError>> + Send;

    fn put_server(
        &self,
        server: &ServerRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn delete_server(
        &self,
        name: &ServerName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send;

    /// Server names as registered (display case), filtered by key prefix.
    fn list_server_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ServerName>, RegistryError>> + Send;
}

/// Persistence for [`DeviceClass`] records.
pub trait ClassRepository {
    fn get_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<Option<DeviceClass>, RegistryError>> + Send;

    fn put_class(
        &self,
        class: &DeviceClass,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn delete_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send;

    fn list_class_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ClassName>, RegistryError>> + Send;
}

/// Persistence for live [`ExportRecord`]s, keyed by device.
pub trait ExportRepository {
    fn get_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<Option<ExportRecord>, RegistryError>> + Send;

    fn put_export(
        &self,
        export: &ExportRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn delete_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send;

    fn list_exported_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<DeviceName>, RegistryError>> + Send;
}

/// Persistence for properties and their history.
pub trait PropertyRepository {
    fn get_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<Option<Property>, RegistryError>> + Send;

    fn put_property(
        &self,
        property: &Property,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn delete_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send;

    /// Property names of one owner, sorted by canonical key.
    fn list_property_names(
        &self,
        owner: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<PropertyName>, RegistryError>> + Send;

    /// Every owner of `scope` holding at least one property.
    fn list_property_owners(
        &self,
        scope: PropertyScope,
    ) -> impl Future<Output = Result<Vec<PropertyOwner>, RegistryError>> + Send;

    /// Attributes of a device or class holding at least one property.
    fn list_property_attributes(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<AttributeName>, RegistryError>> + Send;

    fn append_history(
        &self,
        owner: &PropertyOwner,
        entry: &PropertyHistoryEntry,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// History of one property, most recent first, at most `limit` entries.
    fn property_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<PropertyHistoryEntry>, RegistryError>> + Send;

    /// Drop the whole history of a property; returns the number of entries removed.
    fn delete_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send;

    /// Drop every history entry of `root` and of its attributes, whether or
    /// not the properties still exist. Returns the number of entries removed.
    fn delete_owner_history(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send;

    /// Keep at most `keep` newest entries and drop every entry recorded
    /// before `older_than`. Returns the number of entries removed.
    fn prune_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        keep: Option<usize>,
        older_than: Option<Timestamp>,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send;
}

/// Persistence for [`AttributeAlias`]es, keyed by alias.
pub trait AttributeAliasRepository {
    fn get_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<AttributeAlias>, RegistryError>> + Send;

    fn put_attribute_alias(
        &self,
        alias: &AttributeAlias,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn delete_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send;

    /// Every alias whose key starts with `prefix`, sorted by key.
    fn list_attribute_aliases(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<AttributeAlias>, RegistryError>> + Send;
}

/// A complete storage backend. Exactly one is active per deployment.
pub trait StorageBackend:
    DeviceRepository
    + ServerRepository
    + ClassRepository
    + ExportRepository
    + PropertyRepository
    + AttributeAliasRepository
    + Send
    + Sync
    + 'static
{
    /// Short backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Flush and release every resource held by the backend.
    fn close(&self) -> impl Future<Output = Result<(), RegistryError>> + Send;
}

//! Export registry — device registration, live exports, and server indexes.
//!
//! Multi-record mutations are ordered sequences of idempotent single-record
//! steps run under one [`LockSet`](crate::consistency::LockSet). A storage
//! failure halfway leaves every completed step in place; re-issuing the same
//! operation finishes the job.
//!
//! Registration writes the server index before the device record, and
//! deregistration removes the device record last. Readers verify index
//! entries against device records, so an interrupted sequence is never
//! visible as a device hosted by a server it does not belong to.

use std::sync::Arc;

use devreg_domain::class::DeviceClass;
use devreg_domain::device::Device;
use devreg_domain::error::RegistryError;
use devreg_domain::export::{DeviceImport, DeviceInfo, ExportInfo, ExportRecord};
use devreg_domain::name::{AliasName, ClassName, DeviceName, ServerName};
use devreg_domain::pattern::Pattern;
use devreg_domain::property::PropertyOwner;
use devreg_domain::server::ServerRecord;
use devreg_domain::time::now;

use crate::consistency::{KeyedLocks, LockKey};
use crate::ports::StorageBackend;
use crate::services::property_store::PropertyStore;
use crate::services::query_engine::hosted_devices;

/// Application service owning device registration and export state.
pub struct ExportRegistry<B> {
    backend: Arc<B>,
    locks: KeyedLocks,
    properties: Arc<PropertyStore<B>>,
}

impl<B: StorageBackend> ExportRegistry<B> {
    /// Create a new registry. `properties` is used for the deregistration
    /// cascade and must share `locks`.
    pub fn new(backend: Arc<B>, locks: KeyedLocks, properties: Arc<PropertyStore<B>>) -> Self {
        Self {
            backend,
            locks,
            properties,
        }
    }

    async fn require_device(&self, name: &DeviceName) -> Result<Device, RegistryError> {
        self.backend
            .get_device(name)
            .await?
            .ok_or_else(|| RegistryError::not_found("Device", name.to_string()))
    }

    async fn ensure_class_locked(&self, class: &ClassName) -> Result<(), RegistryError> {
        if self.backend.get_class(class).await?.is_none() {
            self.backend.put_class(&DeviceClass::new(class.clone())).await?;
            tracing::debug!(class = %class, "registered class");
        }
        Ok(())
    }

    /// Load the server record, creating it together with its admin device
    /// when missing. Caller holds the server, admin device, and admin class
    /// locks.
    async fn ensure_server_locked(&self, server: &ServerName) -> Result<ServerRecord, RegistryError> {
        let mut record = match self.backend.get_server(server).await? {
            Some(record) => record.normalized(),
            None => ServerRecord::new(server.clone()),
        };

        let admin = server.admin_device();
        if self.backend.get_device(&admin).await?.is_none() {
            let admin_class = ClassName::admin();
            self.ensure_class_locked(&admin_class).await?;
            record.add_device(admin.clone());
            self.backend.put_server(&record).await?;
            self.backend
                .put_device(&Device {
                    name: admin,
                    class: admin_class,
                    server: Some(server.clone()),
                    alias: None,
                    registered_at: now(),
                })
                .await?;
            tracing::info!(server = %server, "registered server");
        } else if record.add_device(admin) {
            self.backend.put_server(&record).await?;
        }
        Ok(record)
    }

    fn server_locks(server: &ServerName) -> [LockKey; 3] {
        [
            LockKey::server(server),
            LockKey::device(&server.admin_device()),
            LockKey::class(&ClassName::admin()),
        ]
    }

    /// Register a new device under `server`, creating the class and server
    /// records (and the server's admin device) when missing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyExists`] when a device with that name
    /// is registered, or a storage error.
    #[tracing::instrument(skip(self, name, class, server), fields(device = %name, class = %class, server = %server))]
    pub async fn register_device(
        &self,
        name: DeviceName,
        class: ClassName,
        server: ServerName,
    ) -> Result<Device, RegistryError> {
        let mut keys = Vec::from(Self::server_locks(&server));
        keys.push(LockKey::device(&name));
        keys.push(LockKey::class(&class));
        let _locks = self.locks.acquire(keys).await;

        if self.backend.get_device(&name).await?.is_some() {
            return Err(RegistryError::already_exists("Device", name.to_string()));
        }

        self.ensure_class_locked(&class).await?;
        let mut record = self.ensure_server_locked(&server).await?;
        if record.add_device(name.clone()) {
            self.backend.put_server(&record).await?;
        }

        let device = Device {
            name,
            class,
            server: Some(server),
            alias: None,
            registered_at: now(),
        };
        self.backend.put_device(&device).await?;
        tracing::info!("registered device");
        Ok(device)
    }

    /// Publish the live location of a device on behalf of `server`,
    /// overwriting any previous export.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown device,
    /// [`RegistryError::ServerMismatch`] when `server` does not own it, or a
    /// storage error.
    #[tracing::instrument(skip(self, name, server, info), fields(device = %name, server = %server, host = %info.host, pid = info.pid))]
    pub async fn export_device(
        &self,
        name: &DeviceName,
        server: &ServerName,
        info: ExportInfo,
    ) -> Result<ExportRecord, RegistryError> {
        let _locks = self
            .locks
            .acquire([LockKey::export(name), LockKey::device(name)])
            .await;

        let device = self.require_device(name).await?;
        if !device.is_hosted_by(server) {
            return Err(RegistryError::ServerMismatch {
                device: name.to_string(),
                expected: device
                    .server
                    .map_or_else(|| "none".to_string(), |owner| owner.to_string()),
                actual: server.to_string(),
            });
        }

        let record = ExportRecord::new(name.clone(), server.clone(), info);
        self.backend.put_export(&record).await?;
        tracing::debug!("exported device");
        Ok(record)
    }

    /// Remove the live export of a device; its registration stays.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the device is unknown or has
    /// no export record, or a storage error.
    #[tracing::instrument(skip(self, name), fields(device = %name))]
    pub async fn unexport_device(&self, name: &DeviceName) -> Result<(), RegistryError> {
        let _locks = self
            .locks
            .acquire([LockKey::export(name), LockKey::device(name)])
            .await;

        self.require_device(name).await?;
        if !self.backend.delete_export(name).await? {
            return Err(RegistryError::not_found("ExportRecord", name.to_string()));
        }
        tracing::debug!("unexported device");
        Ok(())
    }

    /// Remove a device and everything hanging off it: export record, device
    /// and device-attribute properties, server index entry, device record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the device is not registered,
    /// or a storage error (the operation can be re-issued to finish).
    #[tracing::instrument(skip(self, name), fields(device = %name))]
    pub async fn deregister_device(&self, name: &DeviceName) -> Result<(), RegistryError> {
        loop {
            let server = self.require_device(name).await?.server;

            let mut keys = vec![
                LockKey::export(name),
                LockKey::property(&PropertyOwner::Device(name.clone())),
                LockKey::device(name),
            ];
            if let Some(server) = &server {
                keys.push(LockKey::server(server));
            }
            let _locks = self.locks.acquire(keys).await;

            let device = self.require_device(name).await?;
            if device.server != server {
                tracing::debug!("device re-homed while waiting for locks, retrying");
                continue;
            }

            self.backend.delete_export(name).await?;
            let removed = self
                .properties
                .purge_owner_locked(&PropertyOwner::Device(name.clone()))
                .await?;
            if let Some(server) = &server
                && let Some(mut record) = self.backend.get_server(server).await?
                && record.remove_device(name)
            {
                self.backend.put_server(&record).await?;
            }
            self.backend.delete_device(name).await?;
            tracing::info!(properties = removed, "deregistered device");
            return Ok(());
        }
    }

    /// Live export of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown device,
    /// [`RegistryError::NotExported`] when it has no live export, or a
    /// storage error.
    #[tracing::instrument(skip(self, name), fields(device = %name))]
    pub async fn get_export_info(&self, name: &DeviceName) -> Result<ExportRecord, RegistryError> {
        self.require_device(name).await?;
        self.backend
            .get_export(name)
            .await?
            .ok_or_else(|| RegistryError::NotExported {
                device: name.to_string(),
            })
    }

    /// Registration of a device plus its live export, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown device, or a
    /// storage error.
    #[tracing::instrument(skip(self, name), fields(device = %name))]
    pub async fn import_device(&self, name: &DeviceName) -> Result<DeviceImport, RegistryError> {
        let device = self.require_device(name).await?;
        let export = self.backend.get_export(name).await?;
        Ok(DeviceImport { device, export })
    }

    /// Flat summary of a device's registration and live export.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown device, or a
    /// storage error.
    pub async fn get_device_info(&self, name: &DeviceName) -> Result<DeviceInfo, RegistryError> {
        self.import_device(name).await.map(DeviceInfo::from)
    }

    /// Devices hosted by servers matching `server_pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self))]
    pub async fn list_devices_for_server(
        &self,
        server_pattern: &str,
    ) -> Result<Vec<DeviceName>, RegistryError> {
        let pattern = Pattern::new(server_pattern);
        let mut names = Vec::new();
        for server in self
            .backend
            .list_server_names(pattern.literal_prefix())
            .await?
        {
            if !pattern.matches(server.key()) {
                continue;
            }
            names.extend(
                hosted_devices(self.backend.as_ref(), &server)
                    .await?
                    .into_iter()
                    .map(|device| device.name),
            );
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Move a device to another server. Its export is removed first, then it
    /// moves between server indexes, then the device record is updated.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown device, or a
    /// storage error.
    #[tracing::instrument(skip(self, name, target), fields(device = %name, server = %target))]
    pub async fn rehome_device(
        &self,
        name: &DeviceName,
        target: ServerName,
    ) -> Result<Device, RegistryError> {
        loop {
            let current = self.require_device(name).await?.server;
            if current.as_ref() == Some(&target) {
                return self.require_device(name).await;
            }

            let mut keys = Vec::from(Self::server_locks(&target));
            keys.push(LockKey::export(name));
            keys.push(LockKey::device(name));
            if let Some(current) = &current {
                keys.push(LockKey::server(current));
            }
            let _locks = self.locks.acquire(keys).await;

            let mut device = self.require_device(name).await?;
            if device.server != current {
                continue;
            }

            if self.backend.delete_export(name).await? {
                tracing::debug!("unexported device before re-homing");
            }
            if let Some(current) = &current
                && let Some(mut record) = self.backend.get_server(current).await?
                && record.remove_device(name)
            {
                self.backend.put_server(&record).await?;
            }
            let mut record = self.ensure_server_locked(&target).await?;
            if record.add_device(name.clone()) {
                self.backend.put_server(&record).await?;
            }
            device.server = Some(target);
            self.backend.put_device(&device).await?;
            tracing::info!("re-homed device");
            return Ok(device);
        }
    }

    /// Remove the export of every device hosted by `server`. Returns the
    /// number of exports removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown server, or a
    /// storage error.
    #[tracing::instrument(skip(self, server), fields(server = %server))]
    pub async fn unexport_server(&self, server: &ServerName) -> Result<usize, RegistryError> {
        let record = self
            .backend
            .get_server(server)
            .await?
            .ok_or_else(|| RegistryError::not_found("Server", server.to_string()))?;

        let mut removed = 0;
        for name in &record.devices {
            let _locks = self
                .locks
                .acquire([LockKey::export(name), LockKey::device(name)])
                .await;
            let hosted = self
                .backend
                .get_device(name)
                .await?
                .is_some_and(|device| device.is_hosted_by(server));
            if hosted && self.backend.delete_export(name).await? {
                removed += 1;
            }
        }
        tracing::info!(removed, "unexported server");
        Ok(removed)
    }

    /// Deregister every device of `server`, including its admin device, then
    /// remove the server record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown server, or a
    /// storage error (the operation can be re-issued to finish).
    #[tracing::instrument(skip(self, server), fields(server = %server))]
    pub async fn delete_server(&self, server: &ServerName) -> Result<(), RegistryError> {
        if self.backend.get_server(server).await?.is_none() {
            return Err(RegistryError::not_found("Server", server.to_string()));
        }

        loop {
            for device in hosted_devices(self.backend.as_ref(), server).await? {
                match self.deregister_device(&device.name).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }

            let _locks = self.locks.acquire(Self::server_locks(server)).await;
            let Some(record) = self.backend.get_server(server).await? else {
                return Ok(());
            };
            let mut still_hosted = false;
            for name in &record.devices {
                if self
                    .backend
                    .get_device(name)
                    .await?
                    .is_some_and(|device| device.is_hosted_by(server))
                {
                    still_hosted = true;
                    break;
                }
            }
            if still_hosted {
                continue;
            }
            self.backend.delete_server(server).await?;
            tracing::info!("deleted server");
            return Ok(());
        }
    }

    /// Move every device of `old` to a new server `new`, which gets its own
    /// admin device. Exports of moved devices are removed; the old admin
    /// device and the old server record are deleted last.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown server,
    /// [`RegistryError::AlreadyExists`] when `new` is already registered, or
    /// a storage error.
    #[tracing::instrument(skip(self, old, new), fields(server = %old, new = %new))]
    pub async fn rename_server(
        &self,
        old: &ServerName,
        new: ServerName,
    ) -> Result<ServerRecord, RegistryError> {
        let old_admin = old.admin_device();
        loop {
            let hosted: Vec<DeviceName> = hosted_devices(self.backend.as_ref(), old)
                .await?
                .into_iter()
                .map(|device| device.name)
                .collect();

            let mut keys = Vec::from(Self::server_locks(old));
            keys.extend(Self::server_locks(&new));
            keys.push(LockKey::property(&PropertyOwner::Device(old_admin.clone())));
            keys.push(LockKey::export(&old_admin));
            for name in &hosted {
                keys.push(LockKey::export(name));
                keys.push(LockKey::device(name));
            }
            let _locks = self.locks.acquire(keys).await;

            if self.backend.get_server(old).await?.is_none() {
                return Err(RegistryError::not_found("Server", old.to_string()));
            }
            if *old == new || self.backend.get_server(&new).await?.is_some() {
                return Err(RegistryError::already_exists("Server", new.to_string()));
            }
            let current: Vec<DeviceName> = hosted_devices(self.backend.as_ref(), old)
                .await?
                .into_iter()
                .map(|device| device.name)
                .collect();
            if current != hosted {
                tracing::debug!("server devices changed while waiting for locks, retrying");
                continue;
            }

            let mut record = self.ensure_server_locked(&new).await?;
            let mut moved = 0;
            for name in hosted.iter().filter(|name| **name != old_admin) {
                let Some(mut device) = self.backend.get_device(name).await? else {
                    continue;
                };
                self.backend.delete_export(name).await?;
                if record.add_device(name.clone()) {
                    self.backend.put_server(&record).await?;
                }
                device.server = Some(new.clone());
                self.backend.put_device(&device).await?;
                moved += 1;
            }

            self.backend.delete_export(&old_admin).await?;
            self.properties
                .purge_owner_locked(&PropertyOwner::Device(old_admin.clone()))
                .await?;
            self.backend.delete_device(&old_admin).await?;
            self.backend.delete_server(old).await?;
            tracing::info!(moved, "renamed server");
            return Ok(record);
        }
    }

    /// Give a device an alias, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown device,
    /// [`RegistryError::AlreadyExists`] when another device uses the alias,
    /// or a storage error.
    #[tracing::instrument(skip(self, name, alias), fields(device = %name, alias = %alias))]
    pub async fn put_device_alias(
        &self,
        name: &DeviceName,
        alias: AliasName,
    ) -> Result<(), RegistryError> {
        let _locks = self
            .locks
            .acquire([LockKey::device(name), LockKey::alias(&alias)])
            .await;

        let mut device = self.require_device(name).await?;
        if let Some(other) = self.backend.find_device_by_alias(&alias).await?
            && other.name != *name
        {
            return Err(RegistryError::already_exists("Alias", alias.to_string()));
        }
        device.alias = Some(alias);
        self.backend.put_device(&device).await
    }

    /// Remove an alias.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no device uses the alias, or
    /// a storage error.
    #[tracing::instrument(skip(self, alias), fields(alias = %alias))]
    pub async fn delete_device_alias(&self, alias: &AliasName) -> Result<(), RegistryError> {
        loop {
            let name = self.get_alias_device(alias).await?;
            let _locks = self
                .locks
                .acquire([LockKey::device(&name), LockKey::alias(alias)])
                .await;

            let mut device = self.require_device(&name).await?;
            if device.alias.as_ref() != Some(alias) {
                continue;
            }
            device.alias = None;
            return self.backend.put_device(&device).await;
        }
    }

    /// Device known under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no device uses the alias, or
    /// a storage error.
    pub async fn get_alias_device(&self, alias: &AliasName) -> Result<DeviceName, RegistryError> {
        self.backend
            .find_device_by_alias(alias)
            .await?
            .map(|device| device.name)
            .ok_or_else(|| RegistryError::not_found("Alias", alias.to_string()))
    }

    /// Alias of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown device or one
    /// without alias, or a storage error.
    pub async fn get_device_alias(&self, name: &DeviceName) -> Result<AliasName, RegistryError> {
        self.require_device(name)
            .await?
            .alias
            .ok_or_else(|| RegistryError::not_found("Alias", name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{
        ClassRepository, DeviceRepository, ExportRepository, PropertyRepository, ServerRepository,
    };
    use crate::testing::InMemoryBackend;
    use devreg_domain::error::ErrorKind;
    use devreg_domain::history::HistoryPolicy;
    use devreg_domain::name::{AttributeName, PropertyName};

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        registry: ExportRegistry<InMemoryBackend>,
        properties: Arc<PropertyStore<InMemoryBackend>>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::default());
        let locks = KeyedLocks::new();
        let properties = Arc::new(PropertyStore::new(
            Arc::clone(&backend),
            locks.clone(),
            HistoryPolicy::default(),
        ));
        let registry = ExportRegistry::new(Arc::clone(&backend), locks, Arc::clone(&properties));
        Fixture {
            backend,
            registry,
            properties,
        }
    }

    fn device(raw: &str) -> DeviceName {
        DeviceName::parse(raw).unwrap()
    }

    fn server(raw: &str) -> ServerName {
        ServerName::parse(raw).unwrap()
    }

    fn class(raw: &str) -> ClassName {
        ClassName::parse(raw).unwrap()
    }

    fn info(host: &str, pid: u32) -> ExportInfo {
        ExportInfo {
            host: host.to_string(),
            address: format!("tcp://{host}:10000"),
            pid,
            version: "5".to_string(),
        }
    }

    async fn register(fixture: &Fixture, name: &str, server_name: &str) {
        fixture
            .registry
            .register_device(device(name), class("PowerSupply"), server(server_name))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_register_device_with_admin_device_and_class() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;

        let record = f.backend.get_server(&server("MyClass/inst1")).await.unwrap().unwrap();
        let keys: Vec<&str> = record.devices.iter().map(DeviceName::key).collect();
        assert_eq!(keys, vec!["dserver/myclass/inst1", "test/dev/1"]);

        let admin = f.backend.get_device(&device("dserver/MyClass/inst1")).await.unwrap().unwrap();
        assert_eq!(admin.class, ClassName::admin());
        assert!(f.backend.get_class(&class("powersupply")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_reject_duplicate_registration() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let err = f
            .registry
            .register_device(device("TEST/DEV/1"), class("Other"), server("Other/x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(f.backend.get_server(&server("Other/x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_run_export_lifecycle_scenario() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;

        f.registry
            .export_device(&device("test/dev/1"), &server("MyClass/inst1"), info("h1", 100))
            .await
            .unwrap();
        let export = f.registry.get_export_info(&device("test/dev/1")).await.unwrap();
        assert_eq!(export.host, "h1");
        assert_eq!(export.pid, 100);
        assert_eq!(export.address, "tcp://h1:10000");
        assert_eq!(export.version, "5");
        assert_eq!(export.server, server("MyClass/inst1"));

        f.registry.unexport_device(&device("test/dev/1")).await.unwrap();
        let err = f.registry.get_export_info(&device("test/dev/1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExported);

        let err = f
            .registry
            .export_device(&device("test/dev/1"), &server("OtherClass/inst2"), info("h2", 200))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::ServerMismatch { ref expected, ref actual, .. }
                if expected == "MyClass/inst1" && actual == "OtherClass/inst2"
        ));
        assert!(f.backend.get_export(&device("test/dev/1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_overwrite_export_on_reexport() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        f.registry
            .export_device(&device("test/dev/1"), &server("MyClass/inst1"), info("h1", 1))
            .await
            .unwrap();
        f.registry
            .export_device(&device("test/dev/1"), &server("myclass/INST1"), info("h2", 2))
            .await
            .unwrap();
        let export = f.registry.get_export_info(&device("test/dev/1")).await.unwrap();
        assert_eq!(export.host, "h2");
        assert_eq!(export.pid, 2);
    }

    #[tokio::test]
    async fn should_report_not_found_for_unknown_device() {
        let f = fixture();
        let name = device("test/dev/404");
        assert!(f.registry.get_export_info(&name).await.unwrap_err().is_not_found());
        assert!(f.registry.unexport_device(&name).await.unwrap_err().is_not_found());
        assert!(f.registry.import_device(&name).await.unwrap_err().is_not_found());
        let err = f
            .registry
            .export_device(&name, &server("MyClass/inst1"), info("h1", 1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn should_report_not_found_when_unexporting_twice() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let err = f.registry.unexport_device(&device("test/dev/1")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn should_cascade_deregistration() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let name = device("test/dev/1");
        f.registry
            .export_device(&name, &server("MyClass/inst1"), info("h1", 100))
            .await
            .unwrap();
        f.properties
            .put_property(
                PropertyOwner::Device(name.clone()),
                PropertyName::parse("speed").unwrap(),
                vec!["1".to_string()],
                "w",
            )
            .await
            .unwrap();
        f.properties
            .put_property(
                PropertyOwner::DeviceAttribute(name.clone(), AttributeName::parse("current").unwrap()),
                PropertyName::parse("unit").unwrap(),
                vec!["A".to_string()],
                "w",
            )
            .await
            .unwrap();

        f.registry.deregister_device(&name).await.unwrap();

        assert!(f.backend.get_device(&name).await.unwrap().is_none());
        assert!(f.backend.get_export(&name).await.unwrap().is_none());
        assert!(
            f.backend
                .list_property_names(&PropertyOwner::Device(name.clone()))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            f.backend
                .list_property_attributes(&PropertyOwner::Device(name.clone()))
                .await
                .unwrap()
                .is_empty()
        );
        let record = f.backend.get_server(&server("MyClass/inst1")).await.unwrap().unwrap();
        assert!(!record.hosts(&name));

        let err = f.registry.deregister_device(&name).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn should_finish_interrupted_deregistration_on_retry() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let name = device("test/dev/1");
        f.registry
            .export_device(&name, &server("MyClass/inst1"), info("h1", 100))
            .await
            .unwrap();

        f.backend.fail_once("put_server");
        let err = f.registry.deregister_device(&name).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(f.backend.get_export(&name).await.unwrap().is_none());
        assert!(f.backend.get_device(&name).await.unwrap().is_some());

        f.registry.deregister_device(&name).await.unwrap();
        assert!(f.backend.get_device(&name).await.unwrap().is_none());
        let record = f.backend.get_server(&server("MyClass/inst1")).await.unwrap().unwrap();
        assert!(!record.hosts(&name));
    }

    #[tokio::test]
    async fn should_hide_devices_whose_record_is_missing() {
        let f = fixture();
        f.backend.fail_once("put_device");
        let err = f
            .registry
            .register_device(device("test/dev/1"), class("PowerSupply"), server("MyClass/inst1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);

        let hosted = f.registry.list_devices_for_server("MyClass/inst1").await.unwrap();
        assert!(hosted.is_empty());

        register(&f, "test/dev/1", "MyClass/inst1").await;
        let hosted = f.registry.list_devices_for_server("MyClass/inst1").await.unwrap();
        let keys: Vec<&str> = hosted.iter().map(DeviceName::key).collect();
        assert_eq!(keys, vec!["dserver/myclass/inst1", "test/dev/1"]);
    }

    #[tokio::test]
    async fn should_import_device_with_and_without_export() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let name = device("test/dev/1");

        let import = f.registry.import_device(&name).await.unwrap();
        assert!(!import.is_exported());
        assert_eq!(import.device.class.as_str(), "PowerSupply");

        f.registry
            .export_device(&name, &server("MyClass/inst1"), info("h1", 100))
            .await
            .unwrap();
        let import = f.registry.import_device(&name).await.unwrap();
        assert_eq!(import.export.unwrap().host, "h1");
    }

    #[tokio::test]
    async fn should_unexport_before_rehoming() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let name = device("test/dev/1");
        f.registry
            .export_device(&name, &server("MyClass/inst1"), info("h1", 100))
            .await
            .unwrap();

        let moved = f
            .registry
            .rehome_device(&name, server("OtherClass/inst2"))
            .await
            .unwrap();
        assert_eq!(moved.server, Some(server("OtherClass/inst2")));
        assert_eq!(
            f.registry.get_export_info(&name).await.unwrap_err().kind(),
            ErrorKind::NotExported
        );

        let old = f.registry.list_devices_for_server("MyClass/inst1").await.unwrap();
        assert!(!old.contains(&name));
        let new = f.registry.list_devices_for_server("OtherClass/*").await.unwrap();
        assert!(new.contains(&name));

        f.registry
            .export_device(&name, &server("OtherClass/inst2"), info("h2", 200))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_unexport_and_delete_whole_server() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        register(&f, "test/dev/2", "MyClass/inst1").await;
        for raw in ["test/dev/1", "test/dev/2", "dserver/MyClass/inst1"] {
            f.registry
                .export_device(&device(raw), &server("MyClass/inst1"), info("h1", 1))
                .await
                .unwrap();
        }

        let removed = f.registry.unexport_server(&server("MyClass/inst1")).await.unwrap();
        assert_eq!(removed, 3);
        assert!(f.backend.list_exported_names("").await.unwrap().is_empty());

        f.registry.delete_server(&server("MyClass/inst1")).await.unwrap();
        assert!(f.backend.get_server(&server("MyClass/inst1")).await.unwrap().is_none());
        assert!(f.backend.list_device_names("").await.unwrap().is_empty());

        let err = f.registry.delete_server(&server("MyClass/inst1")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn should_manage_aliases() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        register(&f, "test/dev/2", "MyClass/inst1").await;
        let alias = AliasName::parse("ps1").unwrap();

        f.registry
            .put_device_alias(&device("test/dev/1"), alias.clone())
            .await
            .unwrap();
        assert_eq!(
            f.registry.get_alias_device(&AliasName::parse("PS1").unwrap()).await.unwrap(),
            device("test/dev/1")
        );
        assert_eq!(
            f.registry.get_device_alias(&device("test/dev/1")).await.unwrap(),
            alias
        );

        let err = f
            .registry
            .put_device_alias(&device("test/dev/2"), alias.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        f.registry.delete_device_alias(&alias).await.unwrap();
        assert!(f.registry.get_alias_device(&alias).await.unwrap_err().is_not_found());
        assert!(
            f.registry
                .get_device_alias(&device("test/dev/1"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn should_not_inherit_history_after_reregistration() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let name = device("test/dev/1");
        let speed = PropertyName::parse("speed").unwrap();
        let owners = [
            PropertyOwner::Device(name.clone()),
            PropertyOwner::DeviceAttribute(name.clone(), AttributeName::parse("current").unwrap()),
        ];
        for owner in &owners {
            for value in ["1", "2"] {
                f.properties
                    .put_property(owner.clone(), speed.clone(), vec![value.to_string()], "w")
                    .await
                    .unwrap();
            }
            f.properties
                .delete_property(owner, &speed, false)
                .await
                .unwrap();
        }

        f.registry.deregister_device(&name).await.unwrap();
        register(&f, "test/dev/1", "MyClass/inst1").await;

        for owner in &owners {
            assert!(
                f.properties
                    .get_property_history(owner, &speed, None)
                    .await
                    .unwrap()
                    .is_empty()
            );
        }
    }

    #[tokio::test]
    async fn should_summarise_device_info() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        let name = device("test/dev/1");

        let summary = f.registry.get_device_info(&name).await.unwrap();
        assert!(!summary.exported);
        assert_eq!(summary.server, Some(server("MyClass/inst1")));
        assert!(summary.address.is_none());

        f.registry
            .export_device(&name, &server("MyClass/inst1"), info("h1", 100))
            .await
            .unwrap();
        let summary = f.registry.get_device_info(&name).await.unwrap();
        assert!(summary.exported);
        assert_eq!(summary.address.as_deref(), Some("tcp://h1:10000"));
        assert_eq!(summary.pid, Some(100));

        let admin = f
            .registry
            .get_device_info(&device("dserver/MyClass/inst1"))
            .await
            .unwrap();
        assert_eq!(admin.class, ClassName::admin());
        assert!(
            f.registry
                .get_device_info(&device("test/dev/404"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn should_rename_server_and_move_its_devices() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        register(&f, "test/dev/2", "MyClass/inst1").await;
        let old_admin = device("dserver/MyClass/inst1");
        f.registry
            .export_device(&device("test/dev/1"), &server("MyClass/inst1"), info("h1", 1))
            .await
            .unwrap();
        f.properties
            .put_property(
                PropertyOwner::Device(old_admin.clone()),
                PropertyName::parse("polling_threads_pool_size").unwrap(),
                vec!["4".to_string()],
                "w",
            )
            .await
            .unwrap();

        let record = f
            .registry
            .rename_server(&server("MyClass/inst1"), server("MyClass/renamed"))
            .await
            .unwrap();
        let keys: Vec<&str> = record.devices.iter().map(DeviceName::key).collect();
        assert_eq!(keys, vec!["dserver/myclass/renamed", "test/dev/1", "test/dev/2"]);

        assert!(f.backend.get_server(&server("MyClass/inst1")).await.unwrap().is_none());
        assert!(f.backend.get_device(&old_admin).await.unwrap().is_none());
        assert!(
            f.backend
                .list_property_names(&PropertyOwner::Device(old_admin))
                .await
                .unwrap()
                .is_empty()
        );
        let moved = f.backend.get_device(&device("test/dev/1")).await.unwrap().unwrap();
        assert_eq!(moved.server, Some(server("MyClass/renamed")));
        assert_eq!(
            f.registry
                .get_export_info(&device("test/dev/1"))
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotExported
        );
        let hosted = f.registry.list_devices_for_server("MyClass/renamed").await.unwrap();
        assert_eq!(hosted.len(), 3);
    }

    #[tokio::test]
    async fn should_reject_rename_onto_used_or_unknown_server() {
        let f = fixture();
        register(&f, "test/dev/1", "MyClass/inst1").await;
        register(&f, "test/dev/2", "MyClass/inst2").await;

        let err = f
            .registry
            .rename_server(&server("MyClass/inst1"), server("myclass/INST2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = f
            .registry
            .rename_server(&server("MyClass/inst1"), server("MyClass/inst1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = f
            .registry
            .rename_server(&server("MyClass/nope"), server("MyClass/inst3"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let unchanged = f.backend.get_device(&device("test/dev/1")).await.unwrap().unwrap();
        assert_eq!(unchanged.server, Some(server("MyClass/inst1")));
    }

    #[tokio::test]
    async fn should_not_deadlock_concurrent_registrations_and_deregistrations() {
        let f = Arc::new(fixture());
        let mut handles = Vec::new();
        for i in 0..8 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                let name = format!("test/dev/{i}");
                f.registry
                    .register_device(device(&name), class("PowerSupply"), server("MyClass/inst1"))
                    .await
                    .unwrap();
                f.registry.deregister_device(&device(&name)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let hosted = f.registry.list_devices_for_server("MyClass/inst1").await.unwrap();
        let keys: Vec<&str> = hosted.iter().map(DeviceName::key).collect();
        assert_eq!(keys, vec!["dserver/myclass/inst1"]);
    }
}

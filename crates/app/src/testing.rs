//! In-memory storage backend used by the service tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;

use devreg_domain::alias::AttributeAlias;
use devreg_domain::class::DeviceClass;
use devreg_domain::device::Device;
use devreg_domain::error::RegistryError;
use devreg_domain::export::ExportRecord;
use devreg_domain::name::{
    AliasName, AttributeName, ClassName, DeviceName, PropertyName, ServerName,
};
use devreg_domain::property::{Property, PropertyHistoryEntry, PropertyOwner, PropertyScope};
use devreg_domain::server::ServerRecord;
use devreg_domain::time::Timestamp;

use crate::ports::{
    AttributeAliasRepository, ClassRepository, DeviceRepository, ExportRepository,
    PropertyRepository, ServerRepository, StorageBackend,
};

type PropertyKey = (PropertyScope, String, String, String);

fn property_key(owner: &PropertyOwner, name: &PropertyName) -> PropertyKey {
    (
        owner.scope(),
        owner.owner_key().to_string(),
        owner.attribute_key().to_string(),
        name.key().to_string(),
    )
}

#[derive(Default)]
struct State {
    devices: BTreeMap<String, Device>,
    servers: BTreeMap<String, ServerRecord>,
    classes: BTreeMap<String, DeviceClass>,
    exports: BTreeMap<String, ExportRecord>,
    properties: BTreeMap<PropertyKey, Property>,
    history: BTreeMap<PropertyKey, Vec<PropertyHistoryEntry>>,
    attribute_aliases: BTreeMap<String, AttributeAlias>,
    fail_on: Option<&'static str>,
}

/// Map-backed [`StorageBackend`] with one-shot failure injection.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    /// Make the next call of `operation` fail with a storage error.
    pub fn fail_once(&self, operation: &'static str) {
        self.state.lock().unwrap().fail_on = Some(operation);
    }

    fn with<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut State) -> T,
    ) -> Result<T, RegistryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_on == Some(operation) {
            state.fail_on = None;
            return Err(RegistryError::storage(std::io::Error::other(format!(
                "injected failure in {operation}"
            ))));
        }
        Ok(f(&mut state))
    }
}

impl DeviceRepository for InMemoryBackend {
    fn get_device(
        &self,
        name: &DeviceName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send {
        let result = self.with("get_device", |s| s.devices.get(name.key()).cloned());
        async { result }
    }

    fn put_device(&self, device: &Device) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let result = self.with("put_device", |s| {
            s.devices.insert(device.name.key().to_string(), device.clone());
        });
        async { result }
    }

    fn delete_device(
        &self,
        name: &DeviceName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let result = self.with("delete_device", |s| s.devices.remove(name.key()).is_some());
        async { result }
    }

    fn list_device_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<DeviceName>, RegistryError>> + Send {
        let result = self.with("list_device_names", |s| {
            s.devices
                .values()
                .filter(|d| d.name.key().starts_with(prefix))
                .map(|d| d.name.clone())
                .collect()
        });
        async { result }
    }

    fn find_device_by_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send {
        let result = self.with("find_device_by_alias", |s| {
            s.devices
                .values()
                .find(|d| d.alias.as_ref() == Some(alias))
                .cloned()
        });
        async { result }
    }
}

impl ServerRepository for InMemoryBackend {
    fn get_server(
        &self,
        name: &ServerName,
    ) -> impl Future<Output = Result<Option<ServerRecord>, RegistryError>> + Send {
        let result = self.with("get_server", |s| s.servers.get(name.key()).cloned());
        async { result }
    }

    fn put_server(
        &self,
        server: &ServerRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let result = self.with("put_server", |s| {
            s.servers.insert(server.name.key().to_string(), server.clone());
        });
        async { result }
    }

    fn delete_server(
        &self,
        name: &ServerName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let result = self.with("delete_server", |s| s.servers.remove(name.key()).is_some());
        async { result }
    }

    fn list_server_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ServerName>, RegistryError>> + Send {
        let result = self.with("list_server_names", |s| {
            s.servers
                .values()
                .filter(|r| r.name.key().starts_with(prefix))
                .map(|r| r.name.clone())
                .collect()
        });
        async { result }
    }
}

impl ClassRepository for InMemoryBackend {
    fn get_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<Option<DeviceClass>, RegistryError>> + Send {
        let result = self.with("get_class", |s| s.classes.get(name.key()).cloned());
        async { result }
    }

    fn put_class(
        &self,
        class: &DeviceClass,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let result = self.with("put_class", |s| {
            s.classes.insert(class.name.key().to_string(), class.clone());
        });
        async { result }
    }

    fn delete_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let result = self.with("delete_class", |s| s.classes.remove(name.key()).is_some());
        async { result }
    }

    fn list_class_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ClassName>, RegistryError>> + Send {
        let result = self.with("list_class_names", |s| {
            s.classes
                .values()
                .filter(|c| c.name.key().starts_with(prefix))
                .map(|c| c.name.clone())
                .collect()
        });
        async { result }
    }
}

impl ExportRepository for InMemoryBackend {
    fn get_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<Option<ExportRecord>, RegistryError>> + Send {
        let result = self.with("get_export", |s| s.exports.get(device.key()).cloned());
        async { result }
    }

    fn put_export(
        &self,
        export: &ExportRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let result = self.with("put_export", |s| {
            s.exports.insert(export.device.key().to_string(), export.clone());
        });
        async { result }
    }

    fn delete_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let result = self.with("delete_export", |s| s.exports.remove(device.key()).is_some());
        async { result }
    }

    fn list_exported_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<DeviceName>, RegistryError>> + Send {
        let result = self.with("list_exported_names", |s| {
            s.exports
                .values()
                .filter(|e| e.device.key().starts_with(prefix))
                .map(|e| e.device.clone())
                .collect()
        });
        async { result }
    }
}

impl PropertyRepository for InMemoryBackend {
    fn get_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<Option<Property>, RegistryError>> + Send {
        let result = self.with("get_property", |s| {
            s.properties.get(&property_key(owner, name)).cloned()
        });
        async { result }
    }

    fn put_property(
        &self,
        property: &Property,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let result = self.with("put_property", |s| {
            for other in s.properties.values_mut() {
                if other.owner == property.owner {
                    other.owner = property.owner.clone();
                }
            }
            s.properties.insert(
                property_key(&property.owner, &property.name),
                property.clone(),
            );
        });
        async { result }
    }

    fn delete_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let result = self.with("delete_property", |s| {
            s.properties.remove(&property_key(owner, name)).is_some()
        });
        async { result }
    }

    fn list_property_names(
        &self,
        owner: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<PropertyName>, RegistryError>> + Send {
        let result = self.with("list_property_names", |s| {
            s.properties
                .values()
                .filter(|p| &p.owner == owner)
                .map(|p| p.name.clone())
                .collect()
        });
        async { result }
    }

    fn list_property_owners(
        &self,
        scope: PropertyScope,
    ) -> impl Future<Output = Result<Vec<PropertyOwner>, RegistryError>> + Send {
        let result = self.with("list_property_owners", |s| {
            let mut owners: Vec<PropertyOwner> = s
                .properties
                .values()
                .filter(|p| p.owner.scope() == scope)
                .map(|p| p.owner.clone())
                .collect();
            owners.dedup();
            owners
        });
        async { result }
    }

    fn list_property_attributes(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<AttributeName>, RegistryError>> + Send {
        let result = self.with("list_property_attributes", |s| {
            let mut attributes: Vec<AttributeName> = s
                .properties
                .values()
                .filter(|p| p.owner.root() == *root && p.owner != *root)
                .filter_map(|p| p.owner.attribute().cloned())
                .collect();
            attributes.dedup();
            attributes
        });
        async { result }
    }

    fn append_history(
        &self,
        owner: &PropertyOwner,
        entry: &PropertyHistoryEntry,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let result = self.with("append_history", |s| {
            s.history
                .entry(property_key(owner, &entry.name))
                .or_default()
                .push(entry.clone());
        });
        async { result }
    }

    fn property_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<PropertyHistoryEntry>, RegistryError>> + Send {
        let result = self.with("property_history", |s| {
            s.history
                .get(&property_key(owner, name))
                .map(|entries| {
                    entries
                        .iter()
                        .rev()
                        .take(limit.unwrap_or(usize::MAX))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        });
        async { result }
    }

    fn delete_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let result = self.with("delete_history", |s| {
            s.history
                .remove(&property_key(owner, name))
                .map_or(0, |entries| entries.len())
        });
        async { result }
    }

    fn delete_owner_history(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let result = self.with("delete_owner_history", |s| {
            let root = root.root();
            let mut removed = 0;
            s.history.retain(|(scope, owner_key, _, _), entries| {
                let owned = owner_key == root.owner_key()
                    && (*scope == root.scope() || Some(*scope) == root.attribute_scope());
                if owned {
                    removed += entries.len();
                }
                !owned
            });
            removed
        });
        async { result }
    }

    fn prune_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        keep: Option<usize>,
        older_than: Option<Timestamp>,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let result = self.with("prune_history", |s| {
            let Some(entries) = s.history.get_mut(&property_key(owner, name)) else {
                return 0;
            };
            let before = entries.len();
            if let Some(cutoff) = older_than {
                entries.retain(|e| e.recorded_at >= cutoff);
            }
            if let Some(keep) = keep {
                let excess = entries.len().saturating_sub(keep);
                entries.drain(..excess);
            }
            before - entries.len()
        });
        async { result }
    }
}

impl AttributeAliasRepository for InMemoryBackend {
    fn get_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<AttributeAlias>, RegistryError>> + Send {
        let result = self.with("get_attribute_alias", |s| {
            s.attribute_aliases.get(alias.key()).cloned()
        });
        async { result }
    }

    fn put_attribute_alias(
        &self,
        alias: &AttributeAlias,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let result = self.with("put_attribute_alias", |s| {
            s.attribute_aliases
                .insert(alias.alias.key().to_string(), alias.clone());
        });
        async { result }
    }

    fn delete_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let result = self.with("delete_attribute_alias", |s| {
            s.attribute_aliases.remove(alias.key()).is_some()
        });
        async { result }
    }

    fn list_attribute_aliases(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<AttributeAlias>, RegistryError>> + Send {
        let result = self.with("list_attribute_aliases", |s| {
            s.attribute_aliases
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(_, alias)| alias.clone())
                .collect()
        });
        async { result }
    }
}

impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn close(&self) -> impl Future<Output = Result<(), RegistryError>> + Send {
        async { Ok(()) }
    }
}

//! Tree implementation of [`PropertyRepository`].
//!
//! Each owner directory holds one `properties.toml` with every property of
//! that owner and one `history.toml` with the superseded values of all of
//! them, oldest first. Both are rewritten whole under a per-file lock.
//!
//! The owner and attribute spelling stored in `properties.toml` follows the
//! latest write, so every property of one owner reports the same display
//! case.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};

use devreg_app::ports::PropertyRepository;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{AttributeName, PropertyName};
use devreg_domain::property::{Property, PropertyHistoryEntry, PropertyOwner, PropertyScope};
use devreg_domain::time::Timestamp;

use crate::backend::TreeBackend;
use crate::error::StorageError;
use crate::fs;
use crate::layout::{ATTRIBUTES_DIR, HISTORY_FILE, PROPERTIES_FILE};

#[derive(Debug, Serialize, Deserialize)]
struct PropertiesFile {
    owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    attribute: String,
    /// Keyed by canonical property name.
    #[serde(default)]
    properties: BTreeMap<String, StoredProperty>,
}

impl PropertiesFile {
    fn new(owner: &PropertyOwner) -> Self {
        Self {
            owner: owner.owner_name().to_string(),
            attribute: owner
                .attribute()
                .map_or_else(String::new, |attribute| attribute.as_str().to_string()),
            properties: BTreeMap::new(),
        }
    }

    fn owner(&self, scope: PropertyScope) -> Result<PropertyOwner, StorageError> {
        Ok(PropertyOwner::from_keys(scope, &self.owner, &self.attribute)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProperty {
    name: PropertyName,
    values: Vec<String>,
    updated_at: Timestamp,
    writer: String,
}

impl StoredProperty {
    fn into_property(self, owner: PropertyOwner) -> Property {
        Property {
            owner,
            name: self.name,
            values: self.values,
            updated_at: self.updated_at,
            writer: self.writer,
        }
    }
}

impl From<&Property> for StoredProperty {
    fn from(property: &Property) -> Self {
        Self {
            name: property.name.clone(),
            values: property.values.clone(),
            updated_at: property.updated_at,
            writer: property.writer.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    entries: Vec<PropertyHistoryEntry>,
}

impl HistoryFile {
    /// Positions of the entries of `name`, oldest first.
    fn positions(&self, name: &PropertyName) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.name == *name)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Persist `file`, or remove it and prune its directory once it is empty.
async fn store_history(
    path: &Path,
    base: &Path,
    file: &HistoryFile,
) -> Result<(), StorageError> {
    if file.entries.is_empty() {
        fs::remove_file(path).await?;
        if let Some(dir) = path.parent() {
            fs::prune_empty_dirs(dir, base).await;
        }
        Ok(())
    } else {
        fs::write_toml(path, file).await
    }
}

impl TreeBackend {
    async fn owners_in(
        &self,
        base: &Path,
        depth: usize,
        scope: PropertyScope,
        attributes: bool,
    ) -> Result<Vec<PropertyOwner>, StorageError> {
        let mut files = Vec::new();
        for key in fs::list_keys(base, depth, "", None).await? {
            let dir = base.join(&key);
            if attributes {
                for attribute in fs::list_dirs(&dir.join(ATTRIBUTES_DIR)).await? {
                    files.push(dir.join(ATTRIBUTES_DIR).join(attribute).join(PROPERTIES_FILE));
                }
            } else {
                files.push(dir.join(PROPERTIES_FILE));
            }
        }

        let mut owners = Vec::new();
        for path in files {
            let file: Option<PropertiesFile> = fs::read_toml(&path).await?;
            if let Some(file) = file
                && !file.properties.is_empty()
            {
                owners.push(file.owner(scope)?);
            }
        }
        owners.sort_by(|a, b| {
            (a.owner_key(), a.attribute_key()).cmp(&(b.owner_key(), b.attribute_key()))
        });
        Ok(owners)
    }
}

impl PropertyRepository for TreeBackend {
    fn get_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<Option<Property>, RegistryError>> + Send {
        let path = self.layout.owner_dir(owner).join(PROPERTIES_FILE);
        let owner = owner.clone();
        let key = name.key().to_string();
        async move {
            let file: Option<PropertiesFile> = fs::read_toml(&path).await?;
            let Some(mut file) = file else {
                return Ok(None);
            };
            let stored_owner = file.owner(owner.scope())?;
            Ok(file
                .properties
                .remove(&key)
                .map(|stored| stored.into_property(stored_owner)))
        }
    }

    fn put_property(
        &self,
        property: &Property,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let backend = self.clone();
        let path = self.layout.owner_dir(&property.owner).join(PROPERTIES_FILE);
        let property = property.clone();
        async move {
            let _guard = backend.lock_file(&path).await;
            let mut file = PropertiesFile::new(&property.owner);
            if let Some(stored) = fs::read_toml::<PropertiesFile>(&path).await? {
                file.properties = stored.properties;
            }
            file.properties.insert(
                property.name.key().to_string(),
                StoredProperty::from(&property),
            );
            fs::write_toml(&path, &file).await?;
            Ok(())
        }
    }

    fn delete_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let backend = self.clone();
        let dir = self.layout.owner_dir(owner);
        let base = self.layout.owner_base(owner);
        let key = name.key().to_string();
        async move {
            let path = dir.join(PROPERTIES_FILE);
            let _guard = backend.lock_file(&path).await;
            let file: Option<PropertiesFile> = fs::read_toml(&path).await?;
            let Some(mut file) = file else {
                return Ok(false);
            };
            if file.properties.remove(&key).is_none() {
                return Ok(false);
            }
            if file.properties.is_empty() {
                fs::remove_file(&path).await?;
                fs::prune_empty_dirs(&dir, &base).await;
            } else {
                fs::write_toml(&path, &file).await?;
            }
            Ok(true)
        }
    }

    fn list_property_names(
        &self,
        owner: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<PropertyName>, RegistryError>> + Send {
        let path = self.layout.owner_dir(owner).join(PROPERTIES_FILE);
        async move {
            let file: Option<PropertiesFile> = fs::read_toml(&path).await?;
            Ok(file
                .map(|file| {
                    file.properties
                        .into_values()
                        .map(|stored| stored.name)
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn list_property_owners(
        &self,
        scope: PropertyScope,
    ) -> impl Future<Output = Result<Vec<PropertyOwner>, RegistryError>> + Send {
        let backend = self.clone();
        async move {
            let layout = &backend.layout;
            let owners = match scope {
                PropertyScope::Device => {
                    backend.owners_in(&layout.devices(), 3, scope, false).await?
                }
                PropertyScope::DeviceAttribute => {
                    backend.owners_in(&layout.devices(), 3, scope, true).await?
                }
                PropertyScope::Class => {
                    backend.owners_in(&layout.classes(), 1, scope, false).await?
                }
                PropertyScope::ClassAttribute => {
                    backend.owners_in(&layout.classes(), 1, scope, true).await?
                }
                PropertyScope::Free => backend.owners_in(&layout.free(), 1, scope, false).await?,
            };
            Ok(owners)
        }
    }

    fn list_property_attributes(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<AttributeName>, RegistryError>> + Send {
        let attributes_dir = self.layout.owner_dir(&root.root()).join(ATTRIBUTES_DIR);
        let has_attributes = matches!(root, PropertyOwner::Device(_) | PropertyOwner::Class(_));
        async move {
            let mut attributes = Vec::new();
            if !has_attributes {
                return Ok(attributes);
            }
            for key in fs::list_dirs(&attributes_dir).await? {
                let path = attributes_dir.join(&key).join(PROPERTIES_FILE);
                let file: Option<PropertiesFile> = fs::read_toml(&path).await?;
                if let Some(file) = file
                    && !file.properties.is_empty()
                {
                    let attribute =
                        AttributeName::parse(&file.attribute).map_err(StorageError::from)?;
                    attributes.push(attribute);
                }
            }
            Ok(attributes)
        }
    }

    fn append_history(
        &self,
        owner: &PropertyOwner,
        entry: &PropertyHistoryEntry,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let backend = self.clone();
        let path = self.layout.owner_dir(owner).join(HISTORY_FILE);
        let entry = entry.clone();
        async move {
            let _guard = backend.lock_file(&path).await;
            let mut file: HistoryFile = fs::read_toml(&path).await?.unwrap_or_default();
            file.entries.push(entry);
            fs::write_toml(&path, &file).await?;
            Ok(())
        }
    }

    fn property_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<PropertyHistoryEntry>, RegistryError>> + Send {
        let path = self.layout.owner_dir(owner).join(HISTORY_FILE);
        let name = name.clone();
        async move {
            let file: HistoryFile = fs::read_toml(&path).await?.unwrap_or_default();
            Ok(file
                .entries
                .into_iter()
                .rev()
                .filter(|entry| entry.name == name)
                .take(limit.unwrap_or(usize::MAX))
                .collect())
        }
    }

    fn delete_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let backend = self.clone();
        let path = self.layout.owner_dir(owner).join(HISTORY_FILE);
        let base = self.layout.owner_base(owner);
        let name = name.clone();
        async move {
            let _guard = backend.lock_file(&path).await;
            let file: Option<HistoryFile> = fs::read_toml(&path).await?;
            let Some(mut file) = file else {
                return Ok(0);
            };
            let before = file.entries.len();
            file.entries.retain(|entry| entry.name != name);
            let removed = before - file.entries.len();
            if removed > 0 {
                store_history(&path, &base, &file).await?;
            }
            Ok(removed)
        }
    }

    fn prune_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        keep: Option<usize>,
        older_than: Option<Timestamp>,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let backend = self.clone();
        let path = self.layout.owner_dir(owner).join(HISTORY_FILE);
        let base = self.layout.owner_base(owner);
        let name = name.clone();
        async move {
            let _guard = backend.lock_file(&path).await;
            let file: Option<HistoryFile> = fs::read_toml(&path).await?;
            let Some(mut file) = file else {
                return Ok(0);
            };

            let positions = file.positions(&name);
            let mut doomed: Vec<usize> = Vec::new();
            let mut survivors = Vec::with_capacity(positions.len());
            for index in positions {
                match older_than {
                    Some(cutoff) if file.entries[index].recorded_at < cutoff => doomed.push(index),
                    _ => survivors.push(index),
                }
            }
            if let Some(keep) = keep {
                let excess = survivors.len().saturating_sub(keep);
                doomed.extend(survivors.drain(..excess));
            }
            if doomed.is_empty() {
                return Ok(0);
            }

            let mut index = 0;
            file.entries.retain(|_| {
                let kept = !doomed.contains(&index);
                index += 1;
                kept
            });
            store_history(&path, &base, &file).await?;
            Ok(doomed.len())
        }
    }

    fn delete_owner_history(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let backend = self.clone();
        let root = root.root();
        let dir = self.layout.owner_dir(&root);
        let base = self.layout.owner_base(&root);
        let has_attributes = root.attribute_scope().is_some();
        async move {
            let mut dirs = vec![dir.clone()];
            if has_attributes {
                let attributes_dir = dir.join(ATTRIBUTES_DIR);
                for key in fs::list_dirs(&attributes_dir).await? {
                    dirs.push(attributes_dir.join(key));
                }
            }

            let mut removed = 0;
            for dir in dirs {
                let path = dir.join(HISTORY_FILE);
                let _guard = backend.lock_file(&path).await;
                let file: Option<HistoryFile> = fs::read_toml(&path).await?;
                let Some(file) = file else {
                    continue;
                };
                removed += file.entries.len();
                store_history(&path, &base, &HistoryFile::default()).await?;
            }
            Ok(removed)
        }
    }
}

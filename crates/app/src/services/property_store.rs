//! Property store — multi-valued properties with bounded history.

use std::sync::Arc;

use devreg_domain::error::RegistryError;
use devreg_domain::history::HistoryPolicy;
use devreg_domain::name::{AttributeName, PropertyName};
use devreg_domain::pattern::Pattern;
use devreg_domain::property::{
    Property, PropertyHistoryEntry, PropertyOwner, PropertyScope, PropertyValues,
};
use devreg_domain::time::now;

use crate::consistency::{KeyedLocks, LockKey};
use crate::ports::StorageBackend;

/// Application service for reading and writing properties of any scope.
pub struct PropertyStore<B> {
    backend: Arc<B>,
    locks: KeyedLocks,
    policy: HistoryPolicy,
}

impl<B: StorageBackend> PropertyStore<B> {
    /// Create a new store sharing `locks` with the other services.
    pub fn new(backend: Arc<B>, locks: KeyedLocks, policy: HistoryPolicy) -> Self {
        Self {
            backend,
            locks,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &HistoryPolicy {
        &self.policy
    }

    /// Read one property.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the owner has no such
    /// property, or a storage error.
    #[tracing::instrument(skip(self, owner, name), fields(owner = %owner, property = %name))]
    pub async fn get_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> Result<Property, RegistryError> {
        self.backend
            .get_property(owner, name)
            .await?
            .ok_or_else(|| RegistryError::not_found("Property", format!("{owner}/{name}")))
    }

    /// Read several properties at once. Each requested name is treated as a
    /// pattern over the owner's property names; a request matching nothing
    /// is echoed back with no values.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] when a wildcard-free request is
    /// not a valid property name, or a storage error.
    #[tracing::instrument(skip(self, owner, requested), fields(owner = %owner, count = requested.len()))]
    pub async fn get_properties(
        &self,
        owner: &PropertyOwner,
        requested: &[String],
    ) -> Result<Vec<PropertyValues>, RegistryError> {
        let mut result = Vec::with_capacity(requested.len());
        for raw in requested {
            let pattern = Pattern::new(raw);
            if pattern.is_literal() {
                let name = PropertyName::parse(raw)?;
                let values = self
                    .backend
                    .get_property(owner, &name)
                    .await?
                    .map(|property| property.values);
                result.push(PropertyValues {
                    name: raw.clone(),
                    values,
                });
                continue;
            }

            let matched = self.list_property_names(owner, &pattern).await?;
            if matched.is_empty() {
                result.push(PropertyValues {
                    name: raw.clone(),
                    values: None,
                });
            }
            for name in matched {
                // Deleted between listing and reading: skip it.
                if let Some(property) = self.backend.get_property(owner, &name).await? {
                    result.push(PropertyValues {
                        name: property.name.to_string(),
                        values: Some(property.values),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Replace the whole value list of a property.
    ///
    /// When history is enabled for the owner's scope and the values change,
    /// the previous value list is appended to history once the new value is
    /// stored, then history is pruned according to the policy.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(
        skip(self, owner, name, values),
        fields(owner = %owner, property = %name, count = values.len())
    )]
    pub async fn put_property(
        &self,
        owner: PropertyOwner,
        name: PropertyName,
        values: Vec<String>,
        writer: &str,
    ) -> Result<Property, RegistryError> {
        let _locks = self.locks.acquire([LockKey::property(&owner)]).await;

        let previous = self.backend.get_property(&owner, &name).await?;
        let property = Property::new(owner, name, values, writer);
        self.backend.put_property(&property).await?;

        if let Some(previous) = previous
            .filter(|previous| previous.values != property.values)
            .filter(|_| self.policy.is_enabled(property.owner.scope()))
        {
            self.record_history_locked(&property.owner, previous.to_history_entry())
                .await?;
        }
        Ok(property)
    }

    /// Append `entry` unless it is already the newest one, then prune.
    async fn record_history_locked(
        &self,
        owner: &PropertyOwner,
        entry: PropertyHistoryEntry,
    ) -> Result<(), RegistryError> {
        let newest = self
            .backend
            .property_history(owner, &entry.name, Some(1))
            .await?;
        if newest.first() != Some(&entry) {
            self.backend.append_history(owner, &entry).await?;
        }
        let pruned = self
            .backend
            .prune_history(
                owner,
                &entry.name,
                self.policy.max_entries,
                self.policy.cutoff(now()),
            )
            .await?;
        if pruned > 0 {
            tracing::debug!(pruned, "pruned property history");
        }
        Ok(())
    }

    /// Delete a property, optionally dropping its history too.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the property does not exist,
    /// or a storage error.
    #[tracing::instrument(skip(self, owner, name), fields(owner = %owner, property = %name))]
    pub async fn delete_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        purge_history: bool,
    ) -> Result<(), RegistryError> {
        let _locks = self.locks.acquire([LockKey::property(owner)]).await;

        if !self.backend.delete_property(owner, name).await? {
            return Err(RegistryError::not_found(
                "Property",
                format!("{owner}/{name}"),
            ));
        }
        if purge_history {
            self.backend.delete_history(owner, name).await?;
        }
        Ok(())
    }

    /// Property names of one owner matching `pattern`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn list_property_names(
        &self,
        owner: &PropertyOwner,
        pattern: &Pattern,
    ) -> Result<Vec<PropertyName>, RegistryError> {
        let mut names: Vec<PropertyName> = self
            .backend
            .list_property_names(owner)
            .await?
            .into_iter()
            .filter(|name| pattern.matches(name.key()))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Previous value lists of a property, most recent first.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self, owner, name), fields(owner = %owner, property = %name))]
    pub async fn get_property_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        limit: Option<usize>,
    ) -> Result<Vec<PropertyHistoryEntry>, RegistryError> {
        self.backend.property_history(owner, name, limit).await
    }

    /// Owners of `scope` with at least one property whose owner key matches
    /// `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn list_owners(
        &self,
        scope: PropertyScope,
        pattern: &Pattern,
    ) -> Result<Vec<PropertyOwner>, RegistryError> {
        let mut owners: Vec<PropertyOwner> = self
            .backend
            .list_property_owners(scope)
            .await?
            .into_iter()
            .filter(|owner| pattern.matches(owner.owner_key()))
            .collect();
        owners.sort();
        owners.dedup();
        Ok(owners)
    }

    /// Attributes of a device or class carrying properties, matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn list_attributes(
        &self,
        root: &PropertyOwner,
        pattern: &Pattern,
    ) -> Result<Vec<AttributeName>, RegistryError> {
        let mut attributes: Vec<AttributeName> = self
            .backend
            .list_property_attributes(&root.root())
            .await?
            .into_iter()
            .filter(|attribute| pattern.matches(attribute.key()))
            .collect();
        attributes.sort();
        attributes.dedup();
        Ok(attributes)
    }

    /// Delete every property of one owner, keeping their history. Returns
    /// the number of properties removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn delete_owner_properties(
        &self,
        owner: &PropertyOwner,
    ) -> Result<usize, RegistryError> {
        let _locks = self.locks.acquire([LockKey::property(owner)]).await;

        let mut removed = 0;
        for name in self.backend.list_property_names(owner).await? {
            if self.backend.delete_property(owner, &name).await? {
                removed += 1;
            }
        }
        tracing::debug!(removed, "deleted owner properties");
        Ok(removed)
    }

    /// Delete every property and every history entry of a root owner and of
    /// its attributes, including history left behind by properties deleted
    /// earlier. The caller must hold the root owner's property lock.
    /// Returns the number of properties removed.
    pub(crate) async fn purge_owner_locked(
        &self,
        root: &PropertyOwner,
    ) -> Result<usize, RegistryError> {
        let mut owners = vec![root.clone()];
        for attribute in self.backend.list_property_attributes(root).await? {
            owners.push(match root {
                PropertyOwner::Device(device) => {
                    PropertyOwner::DeviceAttribute(device.clone(), attribute)
                }
                PropertyOwner::Class(class) => PropertyOwner::ClassAttribute(class.clone(), attribute),
                _ => continue,
            });
        }

        let mut removed = 0;
        for owner in &owners {
            for name in self.backend.list_property_names(owner).await? {
                if self.backend.delete_property(owner, &name).await? {
                    removed += 1;
                }
            }
        }
        let history = self.backend.delete_owner_history(root).await?;
        if history > 0 {
            tracing::debug!(history, "purged owner history");
        }
        Ok(removed)
    }
}

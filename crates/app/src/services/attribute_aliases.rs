//! Attribute aliases — registry-wide single-token names for one device
//! attribute.
//!
//! Aliases are independent of device registration: an alias may name an
//! attribute of a device that is not (or no longer) registered.

use std::sync::Arc;

use devreg_domain::alias::AttributeAlias;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{AliasName, AttributeName, DeviceName};
use devreg_domain::pattern::Pattern;

use crate::consistency::{KeyedLocks, LockKey};
use crate::ports::StorageBackend;

/// Application service owning attribute aliases.
pub struct AttributeAliases<B> {
    backend: Arc<B>,
    locks: KeyedLocks,
}

impl<B: StorageBackend> AttributeAliases<B> {
    pub fn new(backend: Arc<B>, locks: KeyedLocks) -> Self {
        Self { backend, locks }
    }

    /// Bind `alias` to `device/attribute`. Re-binding an alias to the
    /// attribute it already names is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyExists`] when the alias names another
    /// attribute, or a storage error.
    #[tracing::instrument(skip(self, alias, device, attribute), fields(alias = %alias, device = %device, attribute = %attribute))]
    pub async fn put_attribute_alias(
        &self,
        alias: AliasName,
        device: DeviceName,
        attribute: AttributeName,
    ) -> Result<AttributeAlias, RegistryError> {
        let _locks = self.locks.acquire([LockKey::attribute_alias(&alias)]).await;

        if let Some(existing) = self.backend.get_attribute_alias(&alias).await? {
            if existing.device == device && existing.attribute == attribute {
                return Ok(existing);
            }
            return Err(RegistryError::already_exists(
                "AttributeAlias",
                alias.to_string(),
            ));
        }
        let record = AttributeAlias::new(alias, device, attribute);
        self.backend.put_attribute_alias(&record).await?;
        tracing::debug!("put attribute alias");
        Ok(record)
    }

    /// The alias record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown alias, or a storage
    /// error.
    pub async fn get_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> Result<AttributeAlias, RegistryError> {
        self.backend
            .get_attribute_alias(alias)
            .await?
            .ok_or_else(|| RegistryError::not_found("AttributeAlias", alias.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown alias, or a storage
    /// error.
    #[tracing::instrument(skip(self, alias), fields(alias = %alias))]
    pub async fn delete_attribute_alias(&self, alias: &AliasName) -> Result<(), RegistryError> {
        let _locks = self.locks.acquire([LockKey::attribute_alias(alias)]).await;

        if !self.backend.delete_attribute_alias(alias).await? {
            return Err(RegistryError::not_found("AttributeAlias", alias.to_string()));
        }
        tracing::debug!("deleted attribute alias");
        Ok(())
    }

    /// Aliases matching `pattern`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn list(&self, pattern: &str) -> Result<Vec<AliasName>, RegistryError> {
        let pattern = Pattern::new(pattern);
        let mut aliases: Vec<AliasName> = self
            .backend
            .list_attribute_aliases(pattern.literal_prefix())
            .await?
            .into_iter()
            .map(|record| record.alias)
            .filter(|alias| pattern.matches(alias.key()))
            .collect();
        aliases.sort();
        aliases.dedup();
        Ok(aliases)
    }

    /// Every alias naming `device/attribute`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the backend.
    pub async fn aliases_of(
        &self,
        device: &DeviceName,
        attribute: &AttributeName,
    ) -> Result<Vec<AliasName>, RegistryError> {
        let mut aliases: Vec<AliasName> = self
            .backend
            .list_attribute_aliases("")
            .await?
            .into_iter()
            .filter(|record| record.device == *device && record.attribute == *attribute)
            .map(|record| record.alias)
            .collect();
        aliases.sort();
        Ok(aliases)
    }
}

//! Tree implementation of [`AttributeAliasRepository`].

use std::future::Future;

use devreg_app::ports::AttributeAliasRepository;
use devreg_domain::alias::AttributeAlias;
use devreg_domain::error::RegistryError;
use devreg_domain::name::AliasName;

use crate::backend::TreeBackend;
use crate::fs;
use crate::layout::ATTRIBUTE_ALIAS_FILE;

impl AttributeAliasRepository for TreeBackend {
    fn get_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<AttributeAlias>, RegistryError>> + Send {
        let path = self.layout.attribute_alias_dir(alias).join(ATTRIBUTE_ALIAS_FILE);
        async move { Ok(fs::read_toml(&path).await?) }
    }

    fn put_attribute_alias(
        &self,
        alias: &AttributeAlias,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let path = self
            .layout
            .attribute_alias_dir(&alias.alias)
            .join(ATTRIBUTE_ALIAS_FILE);
        let alias = alias.clone();
        async move { Ok(fs::write_toml(&path, &alias).await?) }
    }

    fn delete_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let dir = self.layout.attribute_alias_dir(alias);
        let base = self.layout.attribute_aliases();
        async move {
            let removed = fs::remove_file(&dir.join(ATTRIBUTE_ALIAS_FILE)).await?;
            fs::prune_empty_dirs(&dir, &base).await;
            Ok(removed)
        }
    }

    fn list_attribute_aliases(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<AttributeAlias>, RegistryError>> + Send {
        let base = self.layout.attribute_aliases();
        let prefix = prefix.to_string();
        async move {
            let keys = fs::list_keys(&base, 1, &prefix, Some(ATTRIBUTE_ALIAS_FILE)).await?;
            let mut aliases = Vec::with_capacity(keys.len());
            for key in keys {
                let alias: Option<AttributeAlias> =
                    fs::read_toml(&base.join(&key).join(ATTRIBUTE_ALIAS_FILE)).await?;
                aliases.extend(alias);
            }
            Ok(aliases)
        }
    }
}

//! `SQLite` implementation of [`AttributeAliasRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use devreg_app::ports::AttributeAliasRepository;
use devreg_domain::alias::AttributeAlias;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{AliasName, AttributeName, DeviceName};

use crate::backend::SqliteBackend;
use crate::error::StorageError;
use crate::sql::{decode, decode_time, encode_time, like_prefix};

struct Wrapper(AttributeAlias);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let alias: String = row.try_get("alias")?;
        let device: String = row.try_get("device_key")?;
        let attribute: String = row.try_get("attribute")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Self(AttributeAlias {
            alias: decode(AliasName::parse(&alias))?,
            device: decode(DeviceName::parse(&device))?,
            attribute: decode(AttributeName::parse(&attribute))?,
            created_at: decode_time(&created_at)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO attribute_aliases (alias_key, alias, device_key, attribute, created_at)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT (alias_key) DO UPDATE SET
        alias = excluded.alias,
        device_key = excluded.device_key,
        attribute = excluded.attribute,
        created_at = excluded.created_at
";
const SELECT_BY_KEY: &str = "SELECT * FROM attribute_aliases WHERE alias_key = ?";
const SELECT_BY_PREFIX: &str =
    r"SELECT * FROM attribute_aliases WHERE alias_key LIKE ? ESCAPE '\' ORDER BY alias_key";
const DELETE_BY_KEY: &str = "DELETE FROM attribute_aliases WHERE alias_key = ?";

impl AttributeAliasRepository for SqliteBackend {
    fn get_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<AttributeAlias>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = alias.key().to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(row.map(|w| w.0))
        }
    }

    fn put_attribute_alias(
        &self,
        alias: &AttributeAlias,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        let alias = alias.clone();
        async move {
            sqlx::query(UPSERT)
                .bind(alias.alias.key())
                .bind(alias.alias.as_str())
                .bind(alias.device.key())
                .bind(alias.attribute.as_str())
                .bind(encode_time(alias.created_at))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn delete_attribute_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = alias.key().to_string();
        async move {
            let result = sqlx::query(DELETE_BY_KEY)
                .bind(key)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(result.rows_affected() > 0)
        }
    }

    fn list_attribute_aliases(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<AttributeAlias>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let pattern = like_prefix(prefix);
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_PREFIX)
                .bind(pattern)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::setup;

    fn alias(name: &str, target: &str) -> AttributeAlias {
        let (device, attribute) = AttributeAlias::parse_target(target).unwrap();
        AttributeAlias::new(AliasName::parse(name).unwrap(), device, attribute)
    }

    #[tokio::test]
    async fn should_store_alias_with_display_case() {
        let backend = setup().await;
        let stored = alias("psCurrent", "Test/Dev/1/Current");
        backend.put_attribute_alias(&stored).await.unwrap();

        let fetched = backend
            .get_attribute_alias(&AliasName::parse("PSCURRENT").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.alias.as_str(), "psCurrent");
        assert_eq!(fetched.target(), "test/dev/1/Current");
    }

    #[tokio::test]
    async fn should_list_aliases_by_prefix_in_key_order() {
        let backend = setup().await;
        for (name, target) in [
            ("psCurrent", "test/dev/1/current"),
            ("motor_pos", "lab/motor/1/position"),
            ("psAmps", "test/dev/1/current"),
            ("motorXpos", "lab/motor/2/position"),
        ] {
            backend.put_attribute_alias(&alias(name, target)).await.unwrap();
        }

        let names: Vec<String> = backend
            .list_attribute_aliases("ps")
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.alias.to_string())
            .collect();
        assert_eq!(names, vec!["psAmps", "psCurrent"]);

        assert_eq!(backend.list_attribute_aliases("motor_").await.unwrap().len(), 1);
        assert_eq!(backend.list_attribute_aliases("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn should_report_whether_delete_removed_an_alias() {
        let backend = setup().await;
        let name = AliasName::parse("psCurrent").unwrap();
        backend
            .put_attribute_alias(&alias("psCurrent", "test/dev/1/current"))
            .await
            .unwrap();

        assert!(backend.delete_attribute_alias(&name).await.unwrap());
        assert!(!backend.delete_attribute_alias(&name).await.unwrap());
        assert!(backend.get_attribute_alias(&name).await.unwrap().is_none());
    }
}

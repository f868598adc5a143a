//! `SQLite` implementation of [`PropertyRepository`].
//!
//! Properties are keyed by `(scope, owner_key, attribute_key, name_key)`;
//! history rows carry the same key plus an autoincrement id that orders them.
//! Every row of one owner shares the owner and attribute spelling of the
//! latest write.

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use devreg_app::ports::PropertyRepository;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{AttributeName, PropertyName};
use devreg_domain::property::{Property, PropertyHistoryEntry, PropertyOwner, PropertyScope};
use devreg_domain::time::Timestamp;

use crate::backend::SqliteBackend;
use crate::error::StorageError;
use crate::sql::{decode, decode_time, decode_values, encode_time};

fn attribute_display(owner: &PropertyOwner) -> &str {
    owner.attribute().map_or("", AttributeName::as_str)
}

struct Wrapper(Property);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let scope: String = row.try_get("scope")?;
        let owner: String = row.try_get("owner")?;
        let attribute: String = row.try_get("attribute")?;
        let name: String = row.try_get("name")?;
        let values: String = row.try_get("value_list")?;
        let updated_at: String = row.try_get("updated_at")?;
        let writer: String = row.try_get("writer")?;

        let scope: PropertyScope = decode(scope.parse())?;

        Ok(Self(Property {
            owner: decode(PropertyOwner::from_keys(scope, &owner, &attribute))?,
            name: decode(PropertyName::parse(&name))?,
            values: decode_values(&values)?,
            updated_at: decode_time(&updated_at)?,
            writer,
        }))
    }
}

struct HistoryWrapper(PropertyHistoryEntry);

impl<'r> FromRow<'r, SqliteRow> for HistoryWrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let name: String = row.try_get("name")?;
        let values: String = row.try_get("value_list")?;
        let recorded_at: String = row.try_get("recorded_at")?;
        let writer: String = row.try_get("writer")?;

        Ok(Self(PropertyHistoryEntry {
            name: decode(PropertyName::parse(&name))?,
            values: decode_values(&values)?,
            recorded_at: decode_time(&recorded_at)?,
            writer,
        }))
    }
}

const KEY: &str = "scope = ? AND owner_key = ? AND attribute_key = ? AND name_key = ?";

const UPSERT: &str = r"
    INSERT INTO properties
        (scope, owner_key, owner, attribute_key, attribute, name_key, name, value_list, updated_at, writer)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (scope, owner_key, attribute_key, name_key) DO UPDATE SET
        name = excluded.name,
        value_list = excluded.value_list,
        updated_at = excluded.updated_at,
        writer = excluded.writer
";
const RESPELL_OWNER: &str = r"
    UPDATE properties SET owner = ?, attribute = ?
    WHERE scope = ? AND owner_key = ? AND attribute_key = ?
";
const SELECT_NAMES: &str = r"
    SELECT name FROM properties
    WHERE scope = ? AND owner_key = ? AND attribute_key = ?
    ORDER BY name_key
";
const SELECT_OWNERS: &str = r"
    SELECT MIN(owner), MIN(attribute) FROM properties
    WHERE scope = ?
    GROUP BY owner_key, attribute_key
    ORDER BY owner_key, attribute_key
";
const SELECT_ATTRIBUTES: &str = r"
    SELECT MIN(attribute) FROM properties
    WHERE scope = ? AND owner_key = ?
    GROUP BY attribute_key
    ORDER BY attribute_key
";
const DELETE_OWNER_HISTORY: &str = r"
    DELETE FROM property_history
    WHERE owner_key = ? AND (scope = ? OR scope = ?)
";
const INSERT_HISTORY: &str = r"
    INSERT INTO property_history
        (scope, owner_key, attribute_key, name_key, name, value_list, recorded_at, writer)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
";

fn select_property() -> String {
    format!("SELECT * FROM properties WHERE {KEY}")
}

fn delete_property() -> String {
    format!("DELETE FROM properties WHERE {KEY}")
}

fn select_history(limited: bool) -> String {
    let limit = if limited { " LIMIT ?" } else { "" };
    format!("SELECT * FROM property_history WHERE {KEY} ORDER BY id DESC{limit}")
}

fn delete_history() -> String {
    format!("DELETE FROM property_history WHERE {KEY}")
}

fn delete_history_before() -> String {
    format!("DELETE FROM property_history WHERE {KEY} AND recorded_at < ?")
}

fn delete_history_beyond() -> String {
    format!(
        "DELETE FROM property_history WHERE {KEY} AND id NOT IN \
         (SELECT id FROM property_history WHERE {KEY} ORDER BY id DESC LIMIT ?)"
    )
}

/// The four key columns of a property, in [`KEY`] order.
struct Key {
    scope: &'static str,
    owner: String,
    attribute: String,
    name: String,
}

impl Key {
    fn new(owner: &PropertyOwner, name: &PropertyName) -> Self {
        Self {
            scope: owner.scope().as_str(),
            owner: owner.owner_key().to_string(),
            attribute: owner.attribute_key().to_string(),
            name: name.key().to_string(),
        }
    }

    fn bind<'q, O>(
        &'q self,
        query: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>> {
        query
            .bind(self.scope)
            .bind(&self.owner)
            .bind(&self.attribute)
            .bind(&self.name)
    }

    fn bind_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query
            .bind(self.scope)
            .bind(&self.owner)
            .bind(&self.attribute)
            .bind(&self.name)
    }
}

fn to_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn to_usize(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

impl PropertyRepository for SqliteBackend {
    fn get_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<Option<Property>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = Key::new(owner, name);
        async move {
            let sql = select_property();
            let row: Option<Wrapper> = key
                .bind(sqlx::query_as(&sql))
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(row.map(|w| w.0))
        }
    }

    fn put_property(
        &self,
        property: &Property,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        let property = property.clone();
        async move {
            let values = serde_json::to_string(&property.values).map_err(StorageError::from)?;
            let mut tx = pool.begin().await.map_err(StorageError::from)?;

            sqlx::query(UPSERT)
                .bind(property.owner.scope().as_str())
                .bind(property.owner.owner_key())
                .bind(property.owner.owner_name())
                .bind(property.owner.attribute_key())
                .bind(attribute_display(&property.owner))
                .bind(property.name.key())
                .bind(property.name.as_str())
                .bind(values)
                .bind(encode_time(property.updated_at))
                .bind(&property.writer)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            sqlx::query(RESPELL_OWNER)
                .bind(property.owner.owner_name())
                .bind(attribute_display(&property.owner))
                .bind(property.owner.scope().as_str())
                .bind(property.owner.owner_key())
                .bind(property.owner.attribute_key())
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;

            tx.commit().await.map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn delete_property(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = Key::new(owner, name);
        async move {
            let sql = delete_property();
            let result = key
                .bind_query(sqlx::query(&sql))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(result.rows_affected() > 0)
        }
    }

    fn list_property_names(
        &self,
        owner: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<PropertyName>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let scope = owner.scope().as_str();
        let owner_key = owner.owner_key().to_string();
        let attribute_key = owner.attribute_key().to_string();
        async move {
            let rows: Vec<(String,)> = sqlx::query_as(SELECT_NAMES)
                .bind(scope)
                .bind(owner_key)
                .bind(attribute_key)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            let names = rows
                .iter()
                .map(|(name,)| decode(PropertyName::parse(name)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(names)
        }
    }

    fn list_property_owners(
        &self,
        scope: PropertyScope,
    ) -> impl Future<Output = Result<Vec<PropertyOwner>, RegistryError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<(String, String)> = sqlx::query_as(SELECT_OWNERS)
                .bind(scope.as_str())
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            let owners = rows
                .iter()
                .map(|(owner, attribute)| {
                    decode(PropertyOwner::from_keys(scope, owner, attribute))
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(owners)
        }
    }

    fn list_property_attributes(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<Vec<AttributeName>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let scope = root.attribute_scope();
        let owner_key = root.owner_key().to_string();
        async move {
            let Some(scope) = scope else {
                return Ok(Vec::new());
            };
            let rows: Vec<(String,)> = sqlx::query_as(SELECT_ATTRIBUTES)
                .bind(scope.as_str())
                .bind(owner_key)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            let attributes = rows
                .iter()
                .map(|(attribute,)| decode(AttributeName::parse(attribute)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(attributes)
        }
    }

    fn append_history(
        &self,
        owner: &PropertyOwner,
        entry: &PropertyHistoryEntry,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = Key::new(owner, &entry.name);
        let entry = entry.clone();
        async move {
            let values = serde_json::to_string(&entry.values).map_err(StorageError::from)?;

            key.bind_query(sqlx::query(INSERT_HISTORY))
                .bind(entry.name.as_str())
                .bind(values)
                .bind(encode_time(entry.recorded_at))
                .bind(&entry.writer)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn property_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<PropertyHistoryEntry>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = Key::new(owner, name);
        async move {
            let sql = select_history(limit.is_some());
            let mut query = key.bind(sqlx::query_as(&sql));
            if let Some(limit) = limit {
                query = query.bind(to_i64(limit));
            }
            let rows: Vec<HistoryWrapper> = query
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }

    fn delete_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = Key::new(owner, name);
        async move {
            let sql = delete_history();
            let result = key
                .bind_query(sqlx::query(&sql))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(to_usize(result.rows_affected()))
        }
    }

    fn delete_owner_history(
        &self,
        root: &PropertyOwner,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let pool = self.pool.clone();
        let root = root.root();
        let scope = root.scope();
        let attribute_scope = root.attribute_scope().unwrap_or(scope);
        let owner_key = root.owner_key().to_string();
        async move {
            let result = sqlx::query(DELETE_OWNER_HISTORY)
                .bind(owner_key)
                .bind(scope.as_str())
                .bind(attribute_scope.as_str())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(to_usize(result.rows_affected()))
        }
    }

    fn prune_history(
        &self,
        owner: &PropertyOwner,
        name: &PropertyName,
        keep: Option<usize>,
        older_than: Option<Timestamp>,
    ) -> impl Future<Output = Result<usize, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = Key::new(owner, name);
        async move {
            let mut tx = pool.begin().await.map_err(StorageError::from)?;
            let mut removed = 0;

            if let Some(cutoff) = older_than {
                let sql = delete_history_before();
                let result = key
                    .bind_query(sqlx::query(&sql))
                    .bind(encode_time(cutoff))
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
                removed += result.rows_affected();
            }
            if let Some(keep) = keep {
                let sql = delete_history_beyond();
                // The key appears twice: outer filter and the kept-ids subquery.
                let query = key.bind_query(sqlx::query(&sql));
                let result = key
                    .bind_query(query)
                    .bind(to_i64(keep))
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
                removed += result.rows_affected();
            }

            tx.commit().await.map_err(StorageError::from)?;
            Ok(to_usize(removed))
        }
    }
}

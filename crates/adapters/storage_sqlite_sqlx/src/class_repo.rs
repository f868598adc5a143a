//! `SQLite` implementation of [`ClassRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use devreg_app::ports::ClassRepository;
use devreg_domain::class::DeviceClass;
use devreg_domain::error::RegistryError;
use devreg_domain::name::ClassName;

use crate::backend::SqliteBackend;
use crate::error::StorageError;
use crate::sql::{decode, decode_time, encode_time, like_prefix};

struct Wrapper(DeviceClass);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let name: String = row.try_get("name")?;
        let registered_at: String = row.try_get("registered_at")?;

        Ok(Self(DeviceClass {
            name: decode(ClassName::parse(&name))?,
            registered_at: decode_time(&registered_at)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO classes (name_key, name, registered_at) VALUES (?, ?, ?)
    ON CONFLICT (name_key) DO UPDATE SET name = excluded.name, registered_at = excluded.registered_at
";
const SELECT_BY_KEY: &str = "SELECT * FROM classes WHERE name_key = ?";
const SELECT_BY_PREFIX: &str =
    r"SELECT name FROM classes WHERE name_key LIKE ? ESCAPE '\' ORDER BY name_key";
const DELETE_BY_KEY: &str = "DELETE FROM classes WHERE name_key = ?";

impl ClassRepository for SqliteBackend {
    fn get_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<Option<DeviceClass>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = name.key().to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(row.map(|w| w.0))
        }
    }

    fn put_class(
        &self,
        class: &DeviceClass,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        let class = class.clone();
        async move {
            sqlx::query(UPSERT)
                .bind(class.name.key())
                .bind(class.name.as_str())
                .bind(encode_time(class.registered_at))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn delete_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = name.key().to_string();
        async move {
            let result = sqlx::query(DELETE_BY_KEY)
                .bind(key)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(result.rows_affected() > 0)
        }
    }

    fn list_class_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ClassName>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let pattern = like_prefix(prefix);
        async move {
            let rows: Vec<(String,)> = sqlx::query_as(SELECT_BY_PREFIX)
                .bind(pattern)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            let names = rows
                .iter()
                .map(|(name,)| decode(ClassName::parse(name)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(names)
        }
    }
}

//! `SQLite` implementation of [`DeviceRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use devreg_app::ports::DeviceRepository;
use devreg_domain::device::Device;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{AliasName, ClassName, DeviceName, ServerName};

use crate::backend::SqliteBackend;
use crate::error::StorageError;
use crate::sql::{decode, decode_time, encode_time, like_prefix};

/// Wrapper for converting database rows into domain [`Device`].
struct Wrapper(Device);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Device> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let name: String = row.try_get("name_key")?;
        let class: String = row.try_get("class")?;
        let server: Option<String> = row.try_get("server")?;
        let alias: Option<String> = row.try_get("alias")?;
        let registered_at: String = row.try_get("registered_at")?;

        Ok(Self(Device {
            name: decode(DeviceName::parse(&name))?,
            class: decode(ClassName::parse(&class))?,
            server: decode(server.as_deref().map(ServerName::parse).transpose())?,
            alias: decode(alias.as_deref().map(AliasName::parse).transpose())?,
            registered_at: decode_time(&registered_at)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO devices (name_key, class, server, server_key, alias, alias_key, registered_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (name_key) DO UPDATE SET
        class = excluded.class,
        server = excluded.server,
        server_key = excluded.server_key,
        alias = excluded.alias,
        alias_key = excluded.alias_key,
        registered_at = excluded.registered_at
";
const SELECT_BY_KEY: &str = "SELECT * FROM devices WHERE name_key = ?";
const SELECT_BY_ALIAS: &str = "SELECT * FROM devices WHERE alias_key = ?";
const SELECT_BY_PREFIX: &str =
    r"SELECT name_key FROM devices WHERE name_key LIKE ? ESCAPE '\' ORDER BY name_key";
const DELETE_BY_KEY: &str = "DELETE FROM devices WHERE name_key = ?";

impl DeviceRepository for SqliteBackend {
    fn get_device(
        &self,
        name: &DeviceName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = name.key().to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }

    fn put_device(&self, device: &Device) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        let device = device.clone();
        async move {
            sqlx::query(UPSERT)
                .bind(device.name.key())
                .bind(device.class.as_str())
                .bind(device.server.as_ref().map(ServerName::as_str))
                .bind(device.server.as_ref().map(ServerName::key))
                .bind(device.alias.as_ref().map(AliasName::as_str))
                .bind(device.alias.as_ref().map(AliasName::key))
                .bind(encode_time(device.registered_at))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn delete_device(
        &self,
        name: &DeviceName,
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

    fn list_device_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<DeviceName>, RegistryError>> + Send {
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
                .map(|(name,)| decode(DeviceName::parse(name)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(names)
        }
    }

    fn find_device_by_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = alias.key().to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ALIAS)
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }
}

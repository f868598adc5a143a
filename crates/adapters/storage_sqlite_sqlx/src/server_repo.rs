//! `SQLite` implementation of [`ServerRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use devreg_app::ports::ServerRepository;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{DeviceName, ServerName};
use devreg_domain::server::ServerRecord;

use crate::backend::SqliteBackend;
use crate::error::StorageError;
use crate::sql::{decode, decode_time, encode_time, like_prefix};

struct Wrapper(ServerRecord);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let name: String = row.try_get("name")?;
        let devices: String = row.try_get("devices")?;
        let registered_at: String = row.try_get("registered_at")?;

        let devices: Vec<DeviceName> = decode(serde_json::from_str(&devices))?;

        Ok(Self(
            ServerRecord {
                name: decode(ServerName::parse(&name))?,
                registered_at: decode_time(&registered_at)?,
                devices,
            }
            .normalized(),
        ))
    }
}

const UPSERT: &str = r"
    INSERT INTO servers (name_key, name, devices, registered_at) VALUES (?, ?, ?, ?)
    ON CONFLICT (name_key) DO UPDATE SET
        name = excluded.name,
        devices = excluded.devices,
        registered_at = excluded.registered_at
";
const SELECT_BY_KEY: &str = "SELECT * FROM servers WHERE name_key = ?";
const SELECT_BY_PREFIX: &str =
    r"SELECT name FROM servers WHERE name_key LIKE ? ESCAPE '\' ORDER BY name_key";
const DELETE_BY_KEY: &str = "DELETE FROM servers WHERE name_key = ?";

impl ServerRepository for SqliteBackend {
    fn get_server(
        &self,
        name: &ServerName,
    ) -> impl Future<Output = Result<Option<ServerRecord>, RegistryError>> + Send {
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

    fn put_server(
        &self,
        server: &ServerRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        let server = server.clone();
        async move {
            let devices = serde_json::to_string(&server.devices).map_err(StorageError::from)?;

            sqlx::query(UPSERT)
                .bind(server.name.key())
                .bind(server.name.as_str())
                .bind(devices)
                .bind(encode_time(server.registered_at))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn delete_server(
        &self,
        name: &ServerName,
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

    fn list_server_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ServerName>, RegistryError>> + Send {
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
                .map(|(name,)| decode(ServerName::parse(name)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(names)
        }
    }
}

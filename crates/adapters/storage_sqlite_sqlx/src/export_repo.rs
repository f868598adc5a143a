//! `SQLite` implementation of [`ExportRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use devreg_app::ports::ExportRepository;
use devreg_domain::error::RegistryError;
use devreg_domain::export::ExportRecord;
use devreg_domain::name::{DeviceName, ServerName};

use crate::backend::SqliteBackend;
use crate::error::StorageError;
use crate::sql::{decode, decode_time, encode_time, like_prefix};

struct Wrapper(ExportRecord);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let device: String = row.try_get("device_key")?;
        let server: String = row.try_get("server")?;
        let host: String = row.try_get("host")?;
        let address: String = row.try_get("address")?;
        let pid: i64 = row.try_get("pid")?;
        let version: String = row.try_get("version")?;
        let started_at: String = row.try_get("started_at")?;

        Ok(Self(ExportRecord {
            device: decode(DeviceName::parse(&device))?,
            server: decode(ServerName::parse(&server))?,
            host,
            address,
            pid: decode(u32::try_from(pid))?,
            version,
            started_at: decode_time(&started_at)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO exports (device_key, server, host, address, pid, version, started_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (device_key) DO UPDATE SET
        server = excluded.server,
        host = excluded.host,
        address = excluded.address,
        pid = excluded.pid,
        version = excluded.version,
        started_at = excluded.started_at
";
const SELECT_BY_KEY: &str = "SELECT * FROM exports WHERE device_key = ?";
const SELECT_BY_PREFIX: &str =
    r"SELECT device_key FROM exports WHERE device_key LIKE ? ESCAPE '\' ORDER BY device_key";
const DELETE_BY_KEY: &str = "DELETE FROM exports WHERE device_key = ?";

impl ExportRepository for SqliteBackend {
    fn get_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<Option<ExportRecord>, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = device.key().to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(row.map(|w| w.0))
        }
    }

    fn put_export(
        &self,
        export: &ExportRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        let export = export.clone();
        async move {
            sqlx::query(UPSERT)
                .bind(export.device.key())
                .bind(export.server.as_str())
                .bind(&export.host)
                .bind(&export.address)
                .bind(i64::from(export.pid))
                .bind(&export.version)
                .bind(encode_time(export.started_at))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn delete_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let pool = self.pool.clone();
        let key = device.key().to_string();
        async move {
            let result = sqlx::query(DELETE_BY_KEY)
                .bind(key)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(result.rows_affected() > 0)
        }
    }

    fn list_exported_names(
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
}

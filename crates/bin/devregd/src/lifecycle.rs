//! Registry self-registration.
//!
//! The registry is itself a device server: it owns `sys/database/<name>`
//! under `DataBaseds/<name>` and exports that device on startup so clients
//! can locate it like any other device.

use devreg_app::ports::StorageBackend;
use devreg_app::registry::Registry;
use devreg_domain::error::{ErrorKind, RegistryError};
use devreg_domain::export::{ExportInfo, ExportRecord};
use devreg_domain::name::{DeviceName, ServerName};

use crate::config::{DATABASE_CLASS, RegistryConfig};

/// Register (if needed) and export the registry's own device.
///
/// # Errors
///
/// Returns an error if the configured names are invalid or if storage fails.
pub async fn register_self<B: StorageBackend>(
    registry: &Registry<B>,
    config: &RegistryConfig,
) -> Result<ExportRecord, Box<dyn std::error::Error + Send + Sync>> {
    let server = config.server_name()?;
    let device = config.device_name()?;

    match registry
        .add_device(device.key(), DATABASE_CLASS, server.as_str())
        .await
    {
        Ok(_) => tracing::info!(device = %device, server = %server, "registered database device"),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            tracing::debug!(device = %device, "database device already registered");
        }
        Err(err) => return Err(err.into()),
    }

    let record = match export_self(registry, &device, &server, config).await {
        Err(RegistryError::ServerMismatch { expected, .. }) => {
            tracing::warn!(
                device = %device,
                previous = %expected,
                "database device was hosted elsewhere, rehoming"
            );
            registry
                .rehome_device(device.key(), server.as_str())
                .await?;
            export_self(registry, &device, &server, config).await?
        }
        other => other?,
    };
    tracing::info!(
        device = %device,
        host = %record.host,
        pid = record.pid,
        "exported database device"
    );
    Ok(record)
}

async fn export_self<B: StorageBackend>(
    registry: &Registry<B>,
    device: &DeviceName,
    server: &ServerName,
    config: &RegistryConfig,
) -> Result<ExportRecord, RegistryError> {
    registry
        .export_device(
            device.key(),
            server.as_str(),
            ExportInfo {
                host: config.host.clone(),
                address: config.address.clone(),
                pid: std::process::id(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        )
        .await
}

/// Unexport every device of the registry's own server.
///
/// # Errors
///
/// Returns an error if the configured names are invalid or if storage fails.
pub async fn unregister_self<B: StorageBackend>(
    registry: &Registry<B>,
    config: &RegistryConfig,
) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
    let server = config.server_name()?;
    let count = registry.unexport_server(server.as_str()).await?;
    tracing::info!(server = %server, count, "unexported database server");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use devreg_adapter_storage_sqlite_sqlx::Config as DbConfig;
    use devreg_domain::history::HistoryPolicy;

    use super::*;

    async fn registry() -> Registry<devreg_adapter_storage_sqlite_sqlx::SqliteBackend> {
        let db = DbConfig {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        Registry::new(db.into_backend(), HistoryPolicy::default())
    }

    #[tokio::test]
    async fn should_register_and_export_database_device() {
        let registry = registry().await;
        let config = RegistryConfig::default();

        let record = register_self(&registry, &config).await.unwrap();

        assert_eq!(record.device.key(), "sys/database/2");
        assert_eq!(record.server.as_str(), "DataBaseds/2");
        assert_eq!(record.pid, std::process::id());
        let import = registry.import_device("sys/database/2").await.unwrap();
        assert!(import.is_exported());
        assert_eq!(import.device.class.as_str(), "DataBase");
    }

    #[tokio::test]
    async fn should_reexport_on_restart() {
        let registry = registry().await;
        let mut config = RegistryConfig::default();

        register_self(&registry, &config).await.unwrap();
        unregister_self(&registry, &config).await.unwrap();
        config.address = "tcp://localhost:20000".to_string();
        let record = register_self(&registry, &config).await.unwrap();

        assert_eq!(record.address, "tcp://localhost:20000");
    }

    #[tokio::test]
    async fn should_rehome_database_device_registered_elsewhere() {
        let registry = registry().await;
        let config = RegistryConfig::default();
        registry
            .add_device("sys/database/2", "DataBase", "Other/1")
            .await
            .unwrap();

        let record = register_self(&registry, &config).await.unwrap();

        assert_eq!(record.server.as_str(), "DataBaseds/2");
    }

    #[tokio::test]
    async fn should_unexport_database_server() {
        let registry = registry().await;
        let config = RegistryConfig::default();
        register_self(&registry, &config).await.unwrap();

        let count = unregister_self(&registry, &config).await.unwrap();

        assert_eq!(count, 1);
        let import = registry.import_device("sys/database/2").await.unwrap();
        assert!(!import.is_exported());
    }
}

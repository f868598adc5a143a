//! `SQLite` implementation of [`StorageBackend`].

use std::future::Future;

use sqlx::SqlitePool;

use devreg_app::ports::StorageBackend;
use devreg_domain::error::RegistryError;

/// `SQLite`-backed registry storage. Each repository trait is implemented in
/// its own module on this type.
#[derive(Clone)]
pub struct SqliteBackend {
    pub(crate) pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a new backend using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn close(&self) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let pool = self.pool.clone();
        async move {
            pool.close().await;
            tracing::debug!("sqlite pool closed");
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) async fn setup() -> SqliteBackend {
    crate::pool::Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .unwrap()
    .into_backend()
}

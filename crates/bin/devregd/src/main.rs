//! # devregd — device registry daemon
//!
//! Composition root that opens the configured storage backend and attaches
//! a registry to it.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize tracing
//! - Open the `SQLite` database or the directory tree and prepare it
//! - Construct the [`Registry`] with the configured history policy
//! - Register and export the registry's own database device
//! - Handle graceful shutdown (SIGTERM/SIGINT): unexport, then close storage
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;
mod lifecycle;

use devreg_adapter_storage_sqlite_sqlx::Config as DbConfig;
use devreg_adapter_storage_tree::TreeBackend;
use devreg_app::ports::StorageBackend;
use devreg_app::registry::Registry;
use devreg_domain::history::HistoryPolicy;
use tracing_subscriber::EnvFilter;

use crate::config::{BackendKind, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::load()?;
    init_tracing(&config.logging.filter);

    let policy = config.history.to_policy();
    match config.backend.kind {
        BackendKind::Sqlite => {
            let db = DbConfig {
                database_url: config.database.url.clone(),
            }
            .build()
            .await?;
            tracing::info!(url = %config.database.url, "opened sqlite database");
            run(db.into_backend(), &config, policy).await
        }
        BackendKind::Tree => {
            let backend = TreeBackend::open(config.tree.root.clone()).await?;
            let _cleanup = backend.spawn_lock_cleanup();
            tracing::info!(root = %backend.root().display(), "opened directory tree");
            run(backend, &config, policy).await
        }
    }
}

async fn run<B: StorageBackend>(
    backend: B,
    config: &Config,
    policy: HistoryPolicy,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Registry::new(backend, policy);
    let _cleanup = registry.spawn_lock_cleanup();

    lifecycle::register_self(&registry, &config.registry).await?;
    tracing::info!(backend = registry.backend_name(), "devregd ready");

    shutdown_signal().await;

    if let Err(err) = lifecycle::unregister_self(&registry, &config.registry).await {
        tracing::warn!(error = %err, "failed to unexport database server");
    }
    registry.close().await?;
    tracing::info!("devregd stopped");
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

//! # devreg-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `devreg-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `devreg-app` (for port traits) and `devreg-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod attribute_alias_repo;
mod backend;
mod class_repo;
mod device_repo;
pub mod error;
mod export_repo;
pub mod pool;
mod property_repo;
mod server_repo;
mod sql;

pub use backend::SqliteBackend;
pub use error::StorageError;
pub use pool::{Config, Database};

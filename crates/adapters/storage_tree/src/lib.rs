//! # devreg-adapter-storage-tree
//!
//! Directory-tree persistence adapter: every record is a TOML file placed
//! in a hierarchy that mirrors the naming scheme.
//!
//! ```text
//! devices/<domain>/<family>/<member>/{device,export,properties,history}.toml
//! devices/<domain>/<family>/<member>/attributes/<attr>/{properties,history}.toml
//! servers/<class>/<instance>/server.toml
//! classes/<class>/{class,properties,history}.toml
//! classes/<class>/attributes/<attr>/{properties,history}.toml
//! free/<object>/{properties,history}.toml
//! attribute_aliases/<alias>/alias.toml
//! ```
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `devreg-app::ports::storage`
//! - Write every file atomically (temp file, `fsync`, rename)
//! - Serialize read-modify-write cycles on shared files with per-file locks
//! - Sweep leftover temp files on open and prune empty directories on delete
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
mod fs;
mod layout;
mod property_repo;
mod server_repo;

pub use backend::TreeBackend;
pub use error::StorageError;

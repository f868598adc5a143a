//! Application services — registry use-case implementations.
//!
//! Each service is generic over a [`StorageBackend`](crate::ports::StorageBackend)
//! shared through an `Arc`, keeping this layer decoupled from concrete adapters.

pub mod attribute_aliases;
pub mod export_registry;
pub mod property_store;
pub mod query_engine;

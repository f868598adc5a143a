//! # devreg-app
//!
//! Application layer — registry use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define the **storage port** every backend adapter implements:
//!   - `DeviceRepository`, `ServerRepository`, `ClassRepository`
//!   - `ExportRepository` — live export records
//!   - `PropertyRepository` — properties and their history
//!   - `AttributeAliasRepository` — aliases naming one device attribute
//! - Provide the **services** built on that port:
//!   - `PropertyStore` — property get/put/delete with history rotation
//!   - `ExportRegistry` — registration, export, and cascading deletion
//!   - `QueryEngine` — pattern-driven listings
//!   - `AttributeAliases` — aliases naming one device attribute
//! - Serialize conflicting writes through `KeyedLocks`
//! - Expose everything through the `Registry` handle
//!
//! ## Dependency rule
//! Depends on `devreg-domain` only (plus `tokio::sync` for locks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod consistency;
pub mod ports;
pub mod registry;
pub mod services;

#[cfg(test)]
mod testing;

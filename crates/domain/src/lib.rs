//! # devreg-domain
//!
//! Pure domain model for the devreg device registry.
//!
//! ## Responsibilities
//! - Foundational types: error conventions, timestamps
//! - The **Name Model**: parsing and canonicalising device, server, class,
//!   attribute, object, alias, and property names, plus the wildcard
//!   [`Pattern`](pattern::Pattern) matcher used by every listing query
//! - Define **Devices** (named units of control, hosted by one server at a time)
//! - Define **Servers** (running processes and the index of devices they host)
//! - Define **Classes**, **Export records**, and **Properties** with history
//! - Define **Attribute aliases** naming one attribute of one device
//! - Contain all invariant enforcement that does not need storage
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod name;
pub mod pattern;
pub mod time;

pub mod alias;
pub mod class;
pub mod device;
pub mod export;
pub mod history;
pub mod property;
pub mod server;

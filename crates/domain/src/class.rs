//! Device class record.
//!
//! Class and class-attribute properties are kept in the property store under
//! a [`PropertyOwner::Class`](crate::property::PropertyOwner::Class) owner;
//! this record only marks the class as known.

use serde::{Deserialize, Serialize};

use crate::name::ClassName;
use crate::time::{Timestamp, now};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClass {
    pub name: ClassName,
    pub registered_at: Timestamp,
}

impl DeviceClass {
    #[must_use]
    pub fn new(name: ClassName) -> Self {
        Self {
            name,
            registered_at: now(),
        }
    }
}

//! Attribute aliases — single-token names standing for one attribute of one
//! device.
//!
//! An alias target is written in full as `domain/family/member/attribute`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NameError;
use crate::name::{AliasName, AttributeName, DeviceName};
use crate::time::{Timestamp, now};

/// An alias bound to `device/attribute`. Alias keys are unique registry-wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeAlias {
    pub alias: AliasName,
    pub device: DeviceName,
    pub attribute: AttributeName,
    pub created_at: Timestamp,
}

impl AttributeAlias {
    #[must_use]
    pub fn new(alias: AliasName, device: DeviceName, attribute: AttributeName) -> Self {
        Self {
            alias,
            device,
            attribute,
            created_at: now(),
        }
    }

    /// Split a full attribute name into its device and attribute parts.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] unless the input has exactly four valid
    /// segments.
    pub fn parse_target(input: &str) -> Result<(DeviceName, AttributeName), NameError> {
        if input.is_empty() {
            return Err(NameError::Empty { kind: "attribute" });
        }
        let Some((device, attribute)) = input.rsplit_once('/') else {
            return Err(NameError::SegmentCount {
                kind: "attribute",
                input: input.to_string(),
                expected: 4,
            });
        };
        let device = DeviceName::parse(device).map_err(|err| match err {
            NameError::SegmentCount { .. } => NameError::SegmentCount {
                kind: "attribute",
                input: input.to_string(),
                expected: 4,
            },
            other => other,
        })?;
        Ok((device, AttributeName::parse(attribute)?))
    }

    /// Full target name, `device/attribute`, device in canonical form.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}/{}", self.device, self.attribute)
    }
}

impl fmt::Display for AttributeAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.alias, self.target())
    }
}

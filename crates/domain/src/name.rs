//! Name Model — hierarchical and single-token names.
//!
//! Every name is validated at construction; an invalid string never reaches
//! storage. Tokens are non-empty runs of ASCII alphanumerics and `_ - . +`
//! that do not start with `.`. Comparison, hashing, and ordering are
//! case-insensitive and go through [`key`](DeviceName::key), the canonical
//! lower-case form used as the storage key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NameError;

/// Domain of the admin device every server owns.
pub const ADMIN_DOMAIN: &str = "dserver";

/// Class of the admin device every server owns.
pub const ADMIN_CLASS: &str = "DServer";

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+')
}

fn validate_token(kind: &'static str, input: &str, token: &str) -> Result<(), NameError> {
    if token.is_empty() {
        return Err(NameError::EmptySegment {
            kind,
            input: input.to_string(),
        });
    }
    if token.starts_with('.') {
        return Err(NameError::LeadingDot {
            kind,
            input: input.to_string(),
        });
    }
    if let Some(character) = token.chars().find(|c| !is_name_char(*c)) {
        return Err(NameError::InvalidCharacter {
            kind,
            input: input.to_string(),
            character,
        });
    }
    Ok(())
}

fn split_segments<'a>(
    kind: &'static str,
    input: &'a str,
    expected: usize,
) -> Result<Vec<&'a str>, NameError> {
    if input.is_empty() {
        return Err(NameError::Empty { kind });
    }
    let segments: Vec<&str> = input.split('/').collect();
    if segments.len() != expected {
        return Err(NameError::SegmentCount {
            kind,
            input: input.to_string(),
            expected,
        });
    }
    for segment in &segments {
        validate_token(kind, input, segment)?;
    }
    Ok(segments)
}

/// A device name `domain/family/member`, stored in canonical lower-case form.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceName {
    canonical: String,
    family_start: usize,
    member_start: usize,
}

impl DeviceName {
    /// Parse and canonicalise a device name.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when the input does not have exactly three valid
    /// tokens separated by `/`.
    pub fn parse(input: &str) -> Result<Self, NameError> {
        let segments = split_segments("device", input, 3)?;
        Ok(Self::from_tokens(segments[0], segments[1], segments[2]))
    }

    fn from_tokens(domain: &str, family: &str, member: &str) -> Self {
        let canonical = format!("{domain}/{family}/{member}").to_ascii_lowercase();
        let family_start = domain.len() + 1;
        let member_start = family_start + family.len() + 1;
        Self {
            canonical,
            family_start,
            member_start,
        }
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.canonical[..self.family_start - 1]
    }

    #[must_use]
    pub fn family(&self) -> &str {
        &self.canonical[self.family_start..self.member_start - 1]
    }

    #[must_use]
    pub fn member(&self) -> &str {
        &self.canonical[self.member_start..]
    }

    /// Canonical storage key (`domain/family/member`, lower-case).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.canonical
    }

    /// Whether this is the admin device of some server.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.domain() == ADMIN_DOMAIN
    }
}

impl PartialEq for DeviceName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for DeviceName {}

impl Hash for DeviceName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for DeviceName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeviceName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Debug for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceName({})", self.canonical)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for DeviceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceName> for String {
    fn from(value: DeviceName) -> Self {
        value.canonical
    }
}

/// A server identity `class/instance`; display case is preserved.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerName {
    display: String,
    key: String,
    instance_start: usize,
}

impl ServerName {
    /// Parse a server identity.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when the input does not have exactly two valid
    /// tokens separated by `/`.
    pub fn parse(input: &str) -> Result<Self, NameError> {
        let segments = split_segments("server", input, 2)?;
        Ok(Self {
            display: input.to_string(),
            key: input.to_ascii_lowercase(),
            instance_start: segments[0].len() + 1,
        })
    }

    /// Server class (executable) name, in display case.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.display[..self.instance_start - 1]
    }

    /// Instance name, in display case.
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.display[self.instance_start..]
    }

    /// Canonical storage key (`class/instance`, lower-case).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// The `dserver/<class>/<instance>` admin device of this server.
    #[must_use]
    pub fn admin_device(&self) -> DeviceName {
        DeviceName::from_tokens(ADMIN_DOMAIN, self.class(), self.instance())
    }
}

impl PartialEq for ServerName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ServerName {}

impl Hash for ServerName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for ServerName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Debug for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerName({})", self.display)
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl FromStr for ServerName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServerName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerName> for String {
    fn from(value: ServerName) -> Self {
        value.display
    }
}

macro_rules! define_token_name {
    ($(#[doc = $doc:expr])* $name:ident, $kind:literal) => {
        $(#[doc = $doc])*
        #[derive(Clone, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name {
            display: String,
            key: String,
        }

        impl $name {
            /// Parse and validate a single-token name.
            ///
            /// # Errors
            ///
            /// Returns [`NameError`] when the input is empty or contains
            /// characters outside the name alphabet.
            pub fn parse(input: &str) -> Result<Self, NameError> {
                if input.is_empty() {
                    return Err(NameError::Empty { kind: $kind });
                }
                validate_token($kind, input, input)?;
                Ok(Self {
                    display: input.to_string(),
                    key: input.to_ascii_lowercase(),
                })
            }

            /// Canonical storage key (lower-case).
            #[must_use]
            pub fn key(&self) -> &str {
                &self.key
            }

            /// Name as given.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.display
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.key == other.key
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.key.hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.key.cmp(&other.key)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.display)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.display)
            }
        }

        impl FromStr for $name {
            type Err = NameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = NameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.display
            }
        }
    };
}

define_token_name!(
    /// Name of a device class (e.g. `DataBase`, `PowerSupply`).
    ClassName,
    "class"
);

define_token_name!(
    /// Name of a device or class attribute.
    AttributeName,
    "attribute"
);

define_token_name!(
    /// Name of a free object owning global properties.
    ObjectName,
    "object"
);

define_token_name!(
    /// Alternative single-token name of a device.
    AliasName,
    "alias"
);

define_token_name!(
    /// Name of a property.
    PropertyName,
    "property"
);

impl ClassName {
    /// The class of every admin device.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            display: ADMIN_CLASS.to_string(),
            key: ADMIN_CLASS.to_ascii_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_canonicalise_device_name_to_lower_case() {
        let name = DeviceName::parse("Sys/DataBase/2").unwrap();
        assert_eq!(name.key(), "sys/database/2");
        assert_eq!(name.domain(), "sys");
        assert_eq!(name.family(), "database");
        assert_eq!(name.member(), "2");
    }

    #[test]
    fn should_roundtrip_device_name_through_display() {
        for raw in ["test/dev/1", "a.b/c-d/e_f+g", "X/Y/Z"] {
            let name = DeviceName::parse(raw).unwrap();
            let reparsed = DeviceName::parse(&name.to_string()).unwrap();
            assert_eq!(name, reparsed);
        }
    }

    #[test]
    fn should_compare_device_names_case_insensitively() {
        let a = DeviceName::parse("TEST/dev/1").unwrap();
        let b = DeviceName::parse("test/DEV/1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn should_reject_device_name_with_wrong_segment_count() {
        let err = DeviceName::parse("test/dev").unwrap_err();
        assert!(matches!(err, NameError::SegmentCount { expected: 3, .. }));
        assert!(DeviceName::parse("a/b/c/d").is_err());
    }

    #[test]
    fn should_reject_device_name_with_empty_segment() {
        let err = DeviceName::parse("test//1").unwrap_err();
        assert!(matches!(err, NameError::EmptySegment { .. }));
    }

    #[test]
    fn should_reject_empty_input() {
        assert!(matches!(
            DeviceName::parse(""),
            Err(NameError::Empty { kind: "device" })
        ));
        assert!(matches!(
            ClassName::parse(""),
            Err(NameError::Empty { kind: "class" })
        ));
    }

    #[test]
    fn should_reject_wildcards_and_spaces_in_names() {
        for raw in ["test/dev/*", "test/d?v/1", "test/de v/1"] {
            assert!(matches!(
                DeviceName::parse(raw),
                Err(NameError::InvalidCharacter { .. })
            ));
        }
    }

    #[test]
    fn should_reject_leading_dot_segments() {
        assert!(matches!(
            DeviceName::parse("../etc/passwd"),
            Err(NameError::LeadingDot { .. })
        ));
        assert!(matches!(
            AttributeName::parse(".hidden"),
            Err(NameError::LeadingDot { .. })
        ));
    }

    #[test]
    fn should_preserve_server_display_case_but_compare_by_key() {
        let a = ServerName::parse("DataBaseds/2").unwrap();
        let b = ServerName::parse("databaseds/2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "DataBaseds/2");
        assert_eq!(a.key(), "databaseds/2");
        assert_eq!(a.class(), "DataBaseds");
        assert_eq!(a.instance(), "2");
    }

    #[test]
    fn should_derive_admin_device_from_server() {
        let server = ServerName::parse("MyClass/Inst1").unwrap();
        let admin = server.admin_device();
        assert_eq!(admin.key(), "dserver/myclass/inst1");
        assert!(admin.is_admin());
    }

    #[test]
    fn should_reject_server_without_instance() {
        assert!(ServerName::parse("MyClass").is_err());
    }

    #[test]
    fn should_compare_token_names_case_insensitively() {
        let a = PropertyName::parse("Speed").unwrap();
        let b = PropertyName::parse("speed").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Speed");
        assert_eq!(a.key(), "speed");
    }

    #[test]
    fn should_roundtrip_names_through_serde_json() {
        let device = DeviceName::parse("test/dev/1").unwrap();
        let json = serde_json::to_string(&device).unwrap();
        assert_eq!(json, "\"test/dev/1\"");
        let parsed: DeviceName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, device);

        let invalid: Result<ServerName, _> = serde_json::from_str("\"no-instance\"");
        assert!(invalid.is_err());
    }
}

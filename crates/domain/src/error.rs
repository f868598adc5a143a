//! Common error types used across the workspace.
//!
//! Every operation of the registry returns [`RegistryError`]. Expected
//! outcomes (bad input, missing records, duplicates, ownership conflicts) are
//! typed variants; storage failures from any backend are boxed into
//! [`RegistryError::Storage`] by the adapter that produced them.

/// Top-level error returned by every registry operation.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Malformed name, rejected before any storage access.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// Lookup or delete on an absent record.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// Duplicate registration.
    #[error("{0}")]
    AlreadyExists(#[from] AlreadyExistsError),

    /// Export attempted by a server that does not own the device.
    #[error("device {device} belongs to server {expected}, not {actual}")]
    ServerMismatch {
        device: String,
        expected: String,
        actual: String,
    },

    /// The device is registered but has no live export record.
    #[error("device {device} is not exported")]
    NotExported { device: String },

    /// Storage-layer failure (disk full, permission denied, failed transaction, …).
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification of a [`RegistryError`], convenient for transports
/// and for comparing outcomes without comparing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidName,
    NotFound,
    AlreadyExists,
    ServerMismatch,
    NotExported,
    Storage,
}

impl RegistryError {
    /// Shorthand for a [`NotFoundError`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        NotFoundError {
            entity,
            id: id.into(),
        }
        .into()
    }

    /// Shorthand for an [`AlreadyExistsError`].
    #[must_use]
    pub fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        AlreadyExistsError {
            entity,
            id: id.into(),
        }
        .into()
    }

    /// Wrap any storage failure.
    #[must_use]
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_) => ErrorKind::InvalidName,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::ServerMismatch { .. } => ErrorKind::ServerMismatch,
            Self::NotExported { .. } => ErrorKind::NotExported,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether this error reports an absent record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Why a raw string could not be turned into a name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("{kind} name is empty")]
    Empty { kind: &'static str },

    #[error("{kind} name `{input}` must have {expected} segments separated by `/`")]
    SegmentCount {
        kind: &'static str,
        input: String,
        expected: usize,
    },

    #[error("{kind} name `{input}` has an empty segment")]
    EmptySegment { kind: &'static str, input: String },

    #[error("{kind} name `{input}` contains invalid character `{character}`")]
    InvalidCharacter {
        kind: &'static str,
        input: String,
        character: char,
    },

    #[error("{kind} name `{input}` must not start with `.`")]
    LeadingDot { kind: &'static str, input: String },

    #[error("unknown property scope `{0}`")]
    UnknownScope(String),
}

/// A record looked up by name does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A record with the same name is already registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} already exists: {id}")]
pub struct AlreadyExistsError {
    pub entity: &'static str,
    pub id: String,
}

//! Storage-specific error type for the tree backend.

use devreg_domain::error::{NameError, RegistryError};

/// Errors originating from the tree storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A filesystem call failed.
    #[error("filesystem error")]
    Io(#[from] std::io::Error),

    /// A stored file is not valid TOML for its record kind.
    #[error("malformed record file")]
    Decode(#[from] toml::de::Error),

    /// A record could not be rendered as TOML.
    #[error("record encoding error")]
    Encode(#[from] toml::ser::Error),

    /// A directory or file holds a name that does not parse.
    #[error("invalid stored name")]
    Name(#[from] NameError),
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        Self::storage(err)
    }
}

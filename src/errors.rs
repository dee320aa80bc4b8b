use std::{io, path::PathBuf};

/// Error type shared by the path interner and the trash subsystem.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// An identifier could not be decoded as a URI, or a trash path component is malformed.
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// Unknown trash-id or missing trash entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// A rendered path or URI does not fit into the caller supplied buffer.
    #[error("name too long: {0}")]
    NameTooLong(String),

    /// File system I/O failure.
    #[error("I/O error while accessing {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    /// A candidate trash directory failed the ownership/mode validation.
    #[error("trash directory {0} rejected: {1}")]
    SecurityRejected(PathBuf, String),

    /// The operation is not supported for the given paths.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl CoreError {
    pub fn invalid_uri(message: impl Into<String>) -> Self {
        Self::InvalidUri(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn name_too_long(message: impl Into<String>) -> Self {
        Self::NameTooLong(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        Self::Io(path.into(), error)
    }

    /// Returns the kind of the wrapped OS error, if any.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io(_, err) => Some(err.kind()),
            _ => None,
        }
    }

    /// `ENOENT`; treated as benign by most trash operations.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || self.io_kind() == Some(io::ErrorKind::NotFound)
    }

    /// `EEXIST`; recoverable while allocating `.trashinfo` files.
    pub fn is_already_exists(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::AlreadyExists)
    }
}

/// Shared result alias for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;

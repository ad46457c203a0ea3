use thiserror::Error;

/// Every way a VIM decode can fail. None of these are retriable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VimError {
    /// Structural byte-layout violation in a BFast container.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("unknown column type '{tag}' for column '{column}' in table '{table}'")]
    UnknownColumnType {
        table: String,
        column: String,
        tag: String,
    },

    /// Index, range or material bounds violation found while validating G3D.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("{context}: expected at least {expected} buffers, found {found}")]
    InsufficientBuffers {
        context: String,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, VimError>;

pub(crate) fn malformed(msg: impl Into<String>) -> VimError {
    VimError::MalformedContainer(msg.into())
}

pub(crate) fn invalid_geometry(msg: impl Into<String>) -> VimError {
    VimError::InvalidGeometry(msg.into())
}

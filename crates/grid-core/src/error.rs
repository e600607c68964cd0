//! Grid error types.

use crate::record::FieldKind;

use thiserror::Error;

/// Errors that can occur while configuring or editing a grid.
///
/// Data-shape problems (missing fields, bad dates, out-of-range pages) never
/// surface here; those are absorbed by the pipeline stages.
#[derive(Debug, Error)]
pub enum GridError {
    /// Column key does not name a field and has no render function.
    #[error("Column '{0}' matches no record field and has no render function")]
    UnknownColumnKey(String),

    /// Two columns registered under the same key.
    #[error("Duplicate column key: {0}")]
    DuplicateColumnKey(String),

    /// Editor text that cannot be read as the field's kind.
    #[error("Cannot read '{input}' as {kind:?}")]
    InvalidInput { kind: FieldKind, input: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<toml::de::Error> for GridError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for GridError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for grid operations.
pub type GridResult<T> = Result<T, GridError>;

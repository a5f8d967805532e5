//! Error types for array storage operations

use thiserror::Error;

/// Main error type for array operations
#[derive(Error, Debug)]
pub enum ArrayError {
    /// Malformed or inconsistent metadata.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Selection out of bounds or malformed. Raised before any I/O.
    #[error("Index error: {0}")]
    Index(String),

    /// Codec name or configuration not known to the registry.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Checksum or verification mismatch while decoding a chunk.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// The store failed to perform an operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl ArrayError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        ArrayError::Validation(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        ArrayError::Index(msg.into())
    }

    /// Create a store failure.
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        ArrayError::StoreUnavailable(msg.into())
    }

    /// Create a codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        ArrayError::Codec(msg.into())
    }
}

/// Specialized Result type for array operations
pub type Result<T> = std::result::Result<T, ArrayError>;

impl From<serde_json::Error> for ArrayError {
    fn from(err: serde_json::Error) -> Self {
        ArrayError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArrayError::index("index 5 is out of bounds for axis 0 with size 5");
        assert_eq!(
            err.to_string(),
            "Index error: index 5 is out of bounds for axis 0 with size 5"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ArrayError = err.into();
        assert!(matches!(err, ArrayError::Serialization(_)));
    }
}

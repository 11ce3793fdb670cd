//! Common error types for hmdxr.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using hmdxr's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for configuration and tooling operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file, pipe, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Settings file not found
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),
}

impl Error {
    /// Create a serialization error from any displayable type.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = Error::config("guardian_radius must be a number");
        assert_eq!(
            err.to_string(),
            "configuration error: guardian_radius must be a number"
        );
    }

    #[test]
    fn test_not_found_mentions_path() {
        let err = Error::NotFound(PathBuf::from("/tmp/missing.json"));
        assert!(err.to_string().contains("/tmp/missing.json"));
    }
}

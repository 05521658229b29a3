// src/error.rs

//! Error types for package extraction
//!
//! Anything that prevents reconstructing a filesystem to analyze surfaces as
//! an `Error`. Failures local to a single inspection are logged by the
//! analyzer and never reach this type, with the exception of timeouts.

use std::io;
use thiserror::Error;

/// Errors produced by the extraction engine
#[derive(Error, Debug)]
pub enum Error {
    /// The image directory has no usable manifest
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The manifest uses a schema version this engine does not understand
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// An external command exceeded its allotted time
    #[error("Running command {command:?} timed out after {seconds} seconds")]
    TimeoutExpired { command: String, seconds: u64 },

    /// A package identifier could not be decomposed
    #[error("Invalid package identifier: {0}")]
    InvalidIdentifier(String),

    /// An external command exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// An external command is not installed on the host
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Result submission failed
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is a timeout of an external command
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutExpired { .. })
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = Error::TimeoutExpired {
            command: "rpm -qa".to_string(),
            seconds: 5,
        };
        assert_eq!(
            err.to_string(),
            "Running command \"rpm -qa\" timed out after 5 seconds"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(!err.is_timeout());
    }
}

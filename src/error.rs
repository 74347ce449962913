//! Error types for arkmesh.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the arkmesh library.
#[derive(Debug, Error)]
pub enum ArkError {
    /// Missing or invalid configuration (including a missing API key).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation API answered with an error or an unreadable body.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The generation API rejected the credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A generation task failed, was cancelled, or polling gave up.
    #[error("Task error: {0}")]
    Task(String),

    /// Fetching the model archive failed.
    #[error("Download error: {0}")]
    Download(String),

    /// The archive could not be opened or unpacked.
    #[error("Archive error: {0}")]
    Archive(String),

    /// No model file was found in the extracted archive.
    #[error("No model file found under {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Cache directory or index failure.
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ArkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_display_includes_path() {
        let err = ArkError::ModelNotFound(PathBuf::from("/tmp/extracted"));
        assert_eq!(err.to_string(), "No model file found under /tmp/extracted");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ArkError = io.into();
        assert!(matches!(err, ArkError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}

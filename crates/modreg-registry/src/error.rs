//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// Artifact (tag, manifest or blob) not found in registry.
    #[error("Artifact not found: {reference}")]
    NotFound {
        /// Tag or digest that was requested.
        reference: String,
    },

    /// Manifest payload could not be decoded.
    #[error("Invalid artifact manifest: {message}")]
    InvalidManifest {
        /// Error message.
        message: String,
    },

    /// Content did not match its advertised digest.
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Expected digest.
        expected: String,
        /// Actual digest.
        actual: String,
    },

    /// The local cache could not be written.
    #[error("{message} {}: {source}", .path.display())]
    LocalStorage {
        /// Error message.
        message: String,
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// Blob upload failed.
    #[error("Failed to upload blob: {message}")]
    UploadFailed {
        /// Error message.
        message: String,
    },

    /// Manifest push failed.
    #[error("Failed to push manifest for {reference}: {message}")]
    ManifestPushFailed {
        /// Target reference.
        reference: String,
        /// Error message.
        message: String,
    },

    /// The module directory cannot be published.
    #[error("Invalid module: {message}")]
    InvalidModule {
        /// Error message.
        message: String,
    },

    /// The registry was handed a reference of a kind it does not handle.
    #[error("Reference \"{reference}\" is not supported by the \"{scheme}\" registry")]
    UnsupportedReference {
        /// Reference text.
        reference: String,
        /// Registry scheme.
        scheme: String,
    },

    /// The operation was cancelled.
    #[error("The operation was cancelled")]
    Cancelled,
}

impl RegistryError {
    /// Returns true if the registry reported the artifact does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else if err.is_status() {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        } else {
            Self::HttpError {
                status: 0,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

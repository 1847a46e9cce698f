// src/error.rs

use thiserror::Error;

/// Setup failures that prevent a valid package pool from being built.
///
/// Dependency findings are never errors; they are reported as
/// [`crate::resolver::Problem`] values.
#[derive(Error, Debug)]
pub enum Error {
    /// A package file could not be opened or read
    #[error("Failed to read package: {0}")]
    InitError(String),

    /// Repository or package download failed
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Malformed repository metadata
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Downloaded document does not match its declared checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Target architecture cannot be determined
    #[error("{0}")]
    ArchitectureError(String),

    /// Invalid command-line or configuration input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using deplint's Error type
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the manufacturer table crate.
//!
//! Lookups never fail; these cover loading, saving and refreshing the table.

use std::io;
use thiserror::Error;

/// Errors that can occur while loading or refreshing the manufacturer table.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The source parsed but produced no usable entries.
    #[error("No manufacturer entries found in {0}")]
    EmptyTable(String),

    /// Failed to load the table from storage.
    #[error("Failed to load manufacturer table: {0}")]
    LoadError(String),

    /// Failed to save the table to storage.
    #[error("Failed to save manufacturer table: {0}")]
    SaveError(String),

    /// The remote source could not be downloaded.
    #[error("Download failed: {0}")]
    Download(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl From<reqwest::Error> for DeviceError {
    fn from(err: reqwest::Error) -> Self {
        DeviceError::Download(err.to_string())
    }
}

/// Result type alias for manufacturer table operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

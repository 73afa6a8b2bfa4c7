//! Error types shared across fscache crates

use thiserror::Error;

/// Result type alias for shared fscache operations
pub type Result<T> = std::result::Result<T, FscacheError>;

/// Main error type for shared fscache helpers
#[derive(Error, Debug)]
pub enum FscacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
}

//! Error types for extraction runs
//!
//! Errors fall into four tiers. Run-level errors (bad URL, unreachable
//! service, no layers) abort [`crate::Extractor::run`]. Layer-level errors end
//! one layer with a `Failure` outcome. Window-level errors are recorded as
//! gaps and pagination continues. Record-level problems never become an
//! `ExtractError` at all; they are flagged on the outcome.

use fscache_common::FscacheError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The URL does not address a FeatureServer or MapServer resource
    #[error("Error, this tool only works with FeatureServer and MapServer services: {0}")]
    InvalidServiceUrl(String),

    /// The service definition could not be fetched or parsed
    #[error("Could not find feature service definition: {0}")]
    ServiceDefinition(String),

    #[error("Fatal error, no layers found!")]
    NoLayersFound,

    #[error("Layer '{layer}' has no object identifier field. Set an explicit id field to extract it.")]
    IdentifierFieldMissing { layer: String },

    #[error("Could not resolve identifier range for layer '{layer}': {reason}")]
    RangeUnresolved { layer: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The service answered with an `error` object in its JSON body
    #[error("Service error {code}: {message}")]
    RemoteError { code: i64, message: String },

    #[error("Unexpected response from {url}: {reason}")]
    UnexpectedResponse { url: String, reason: String },

    #[error("Invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request to {url} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<ExtractError>,
    },

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] FscacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("extraction cancelled")]
    Cancelled,

    #[error("Format conversion failed: {0}")]
    Conversion(String),
}

impl ExtractError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractError::Http(e) => !e.is_builder(),
            ExtractError::Timeout { .. } => true,
            ExtractError::Status { status, .. } => *status >= 500 || *status == 429,
            ExtractError::RemoteError { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// The message to report for a failed service definition request.
    ///
    /// Remote errors report the service's own message without the code prefix.
    pub(crate) fn definition_reason(&self) -> String {
        match self {
            ExtractError::RemoteError { message, .. } => message.clone(),
            ExtractError::RetriesExhausted { last, .. } => last.definition_reason(),
            other => other.to_string(),
        }
    }
}

//! Error types for the REST remote store

use thiserror::Error;

/// Reasons a REST remote store cannot be built from its credentials
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestConfigError {
    /// Endpoint URL is empty
    #[error("Remote endpoint URL is empty")]
    MissingUrl,

    /// Access key is empty
    #[error("Remote access key is empty")]
    MissingKey,

    /// Endpoint URL does not parse or is not http(s)
    #[error("Remote endpoint URL is invalid: {0}")]
    InvalidUrl(String),
}

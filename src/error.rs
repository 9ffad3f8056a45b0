//! Error types for unused disk inventory

use std::io;
use thiserror::Error;

use crate::meta::Meta;

/// Result type alias for unused operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error (missing project/profile/subscription, credentials, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A `KEY=VALUE` filter without a key
    #[error("missing key")]
    MissingKey,

    /// Vendor listing call or page fetch failed
    #[error("listing unused disks for {provider} {account}: {reason}")]
    List {
        provider: &'static str,
        account: String,
        reason: String,
    },

    /// Vendor deletion call failed
    #[error("deleting disk {disk}: {reason}")]
    Delete { disk: String, reason: String },

    /// Disk metadata could not be decoded
    #[error("cannot decode JSON description for disk {disk}: {source}")]
    Metadata {
        disk: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failure attributed to one provider during aggregation
    #[error("{provider} {meta}: {source}")]
    Provider {
        provider: String,
        meta: Meta,
        #[source]
        source: Box<Error>,
    },

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Network error (REST vendor clients)
    #[error("Network error: {0}")]
    Network(String),

    /// External command failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Background task panicked or could not be joined
    #[error("Task error: {0}")]
    Task(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl Error {
    /// Whether this error (or the error it wraps) is a configuration error
    pub fn is_config(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Provider { source, .. } => source.is_config(),
            _ => false,
        }
    }
}

//! Error taxonomy for the provisioner.
//!
//! Data errors (bad question records) never reach this type; they are
//! absorbed with a log line at the store boundary. What remains is synthesis
//! failures and cluster failures, both returned as values so a streaming
//! caller can forward them as terminal progress events instead of crashing
//! the stream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization failed: {0}")]
    Serialization(String),

    #[error("no packaged chart for '{chart_id}'")]
    ArchiveMissing { chart_id: String },

    #[error("{program} timed out after {secs}s")]
    CommandTimeout { program: String, secs: u64 },

    #[error("cluster operation failed: {0}")]
    Cluster(String),
}

impl From<serde_yaml::Error> for ProvisionError {
    fn from(err: serde_yaml::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

//! Error types for reconciliation operations.

use std::io;

use crate::reconcile::IpVersion;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while observing or changing interface state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from process spawning or file access.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP transport or status error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A mutating command still failed after the retry budget was spent.
    #[error("command failed after {attempts} attempts: {command}: {output}")]
    CommandFailed {
        /// The full command line.
        command: String,
        /// How many times it was run.
        attempts: u32,
        /// Combined stdout/stderr of the last attempt.
        output: String,
    },

    /// A read-only query exited unsuccessfully.
    #[error("query failed: {command}: {output}")]
    QueryFailed {
        /// The full command line.
        command: String,
        /// Combined stdout/stderr.
        output: String,
    },

    /// The desired-state document could not be fetched or decoded.
    #[error("failed to fetch {location}: {reason}")]
    Fetch {
        /// URL or path of the document.
        location: String,
        /// What went wrong.
        reason: String,
    },

    /// Settings file is missing required values or is inconsistent.
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Output or document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Interface has no address of the requested family.
    #[error("no {version} address found on interface {interface}")]
    NoAddress {
        /// The interface that was queried.
        interface: String,
        /// The address family that was requested.
        version: IpVersion,
    },
}

impl Error {
    /// Check if this is an actuation failure (a command that ran and failed).
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::QueryFailed { .. })
    }

    /// Check if this error came from reaching the desired-state source.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

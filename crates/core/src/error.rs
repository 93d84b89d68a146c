//! Typed errors surfaced by the core crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the sync transport, line parsing and preset API.
#[derive(Debug, Error)]
pub enum PidsError {
    /// A bus payload could not be encoded or decoded.
    #[error("malformed sync payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The snapshot cache could not be read or written.
    #[error("snapshot cache {path}: {source}")]
    Cache {
        /// Cache file.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// Every receiver of the bus has gone away.
    #[error("sync bus closed")]
    BusClosed,

    /// A line definition failed validation.
    #[error("invalid line file {path}: {reason}")]
    InvalidLine {
        /// File that failed to load.
        path: PathBuf,
        /// Human readable cause.
        reason: String,
    },

    /// The preset API answered with a non-success status.
    #[error("preset api returned {status}: {body}")]
    PresetApi {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The configured preset API base cannot be used to build request URLs.
    #[error("invalid preset api url '{0}'")]
    InvalidUrl(String),

    /// Transport-level HTTP failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

//! Error types for the discovery core.

use pylon_model::{AddressError, SourceError};
use thiserror::Error;

/// Errors that can occur while building or pushing assignments.
///
/// Per-endpoint and per-cluster failures are swallowed with counters by
/// the callers; only build-wide failures propagate here.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// An endpoint failed address validation.
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    /// An upstream registry query failed.
    #[error("registry error: {0}")]
    Registry(#[from] SourceError),

    /// A connection watches a cluster with no registry entry.
    #[error("no cluster entry for '{0}'")]
    MissingCluster(String),

    /// The transport send failed; the caller should close the stream.
    #[error("send failure on connection {0}")]
    SendFailure(String),

    /// The requested operation is not provided by this server.
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

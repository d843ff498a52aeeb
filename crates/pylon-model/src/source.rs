//! Registry source interface.
//!
//! The discovery core consumes endpoints from one or more named service
//! registries. Each registry answers point queries by host and port; the
//! aggregate case is just a list of them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::endpoint::NetworkEndpoint;
use crate::labels::{Labels, LabelsCollection};

/// Errors surfaced by registry queries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("registry query failed: {0}")]
    Query(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// One concrete instance of a service as a registry reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInstance {
    pub endpoint: NetworkEndpoint,
    pub labels: Labels,
    pub service_account: Option<String>,
}

impl ServiceInstance {
    /// The zone the instance runs in, read from its labels. May be "".
    pub fn zone(&self) -> &str {
        self.labels.zone()
    }
}

/// A queryable service registry. Implementations may block on upstream I/O.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// The instances of `hostname` reachable on `port` whose labels match
    /// the given selector collection.
    async fn instances_by_port(
        &self,
        hostname: &str,
        port: u16,
        labels: &LabelsCollection,
    ) -> Result<Vec<ServiceInstance>, SourceError>;
}

/// A named registry source. A deployment with a single registry is the
/// degenerate one-element case.
#[derive(Clone)]
pub struct Registry {
    pub cluster_id: String,
    pub source: Arc<dyn ServiceDiscovery>,
}

impl Registry {
    pub fn new(cluster_id: impl Into<String>, source: Arc<dyn ServiceDiscovery>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            source,
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("cluster_id", &self.cluster_id)
            .finish_non_exhaustive()
    }
}

//! pylon-model: the mesh domain model.
//!
//! Everything the discovery core reasons about lives here: validated
//! endpoints and their wire conversion, services with named ports, label
//! sets and subset matching, the cluster-key encoding, the per-push
//! configuration snapshot, and the registry-source interface the core
//! consumes endpoints from.

mod cluster_key;
mod context;
mod endpoint;
mod labels;
mod service;
mod source;

pub use cluster_key::{ClusterKey, KeyParseError, TrafficDirection};
pub use context::{ProxyStatus, PushContext, StatusEvent};
pub use endpoint::{AddressError, AddressFamily, Endpoint, EndpointAddress, NetworkEndpoint};
pub use labels::{Labels, LabelsCollection, ZONE_LABEL};
pub use service::{Port, PortList, Protocol, Service};
pub use source::{Registry, ServiceDiscovery, ServiceInstance, SourceError};

//! pylon-proto: wire-format types for the endpoint discovery channel.
//!
//! Defines the typed discovery response a control plane hands to its
//! transport layer: cluster load assignments grouped by locality, each
//! carrying normalized load-balancing weights and per-endpoint telemetry
//! metadata. The structures here are the contract with the data plane,
//! in particular the `istio` metadata entry, which downstream telemetry
//! filters depend on bit-exactly.

mod error;
mod serialize;
mod types;

pub use error::ProtoError;
pub use serialize::{decode, encode};
pub use types::{
    ClusterAssignment, DiscoveryResponse, EndpointMetadata, IstioMetadata, LbEndpoint, Locality,
    LocalityLbEndpoints, WireAddress, ENDPOINT_TYPE_URL,
};

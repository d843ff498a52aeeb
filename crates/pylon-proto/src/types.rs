//! Typed structures of the discovery response.
//!
//! A response carries a type tag, a version/nonce pair, and one
//! `ClusterAssignment` per pushed cluster. Assignments group endpoints by
//! locality; each group carries a load-balancing weight in `[1, 128]`
//! after normalization.

use serde::{Deserialize, Serialize};

/// Type tag carried on every endpoint discovery response.
pub const ENDPOINT_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment";

/// The network address of a single load-balancing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireAddress {
    /// A TCP socket address.
    Socket { address: String, port: u32 },
    /// A local pipe path (unix domain socket).
    Pipe { path: String },
}

/// Telemetry fields attached to an endpoint under the `istio` metadata key.
///
/// Downstream telemetry filters key off these values. A field is emitted
/// only when the source endpoint carries it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IstioMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Filter metadata map for an endpoint. Only the `istio` entry is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMetadata {
    pub istio: IstioMetadata,
}

/// One endpoint a proxy may balance traffic to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbEndpoint {
    pub address: WireAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EndpointMetadata>,
}

impl LbEndpoint {
    /// Creates an endpoint with a TCP socket address and no metadata.
    pub fn socket(address: impl Into<String>, port: u32) -> Self {
        Self {
            address: WireAddress::Socket {
                address: address.into(),
                port,
            },
            metadata: None,
        }
    }

    /// Creates an endpoint backed by a local pipe path.
    pub fn pipe(path: impl Into<String>) -> Self {
        Self {
            address: WireAddress::Pipe { path: path.into() },
            metadata: None,
        }
    }

    /// Attaches `istio` telemetry metadata when either field is present.
    ///
    /// Both fields absent leaves the endpoint without a metadata entry, so
    /// the wire encoding stays identical for plain endpoints.
    pub fn with_istio_metadata(mut self, uid: Option<String>, network: Option<String>) -> Self {
        if uid.is_some() || network.is_some() {
            self.metadata = Some(EndpointMetadata {
                istio: IstioMetadata { uid, network },
            });
        }
        self
    }
}

/// A locality tuple. Only `zone` is currently populated; `region` and
/// `subzone` are reserved for the richer locality key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subzone: String,
}

impl Locality {
    /// A locality identified by zone alone.
    pub fn zone(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            ..Self::default()
        }
    }
}

/// The endpoints of one locality, with their relative traffic share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalityLbEndpoints {
    pub locality: Locality,
    pub load_balancing_weight: u32,
    pub endpoints: Vec<LbEndpoint>,
}

impl LocalityLbEndpoints {
    /// An empty group for the given zone, weight to be filled in later.
    pub fn for_zone(zone: impl Into<String>) -> Self {
        Self {
            locality: Locality::zone(zone),
            load_balancing_weight: 0,
            endpoints: Vec::new(),
        }
    }
}

/// The materialized endpoint set of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<LocalityLbEndpoints>,
}

impl ClusterAssignment {
    /// Total endpoint count across all locality groups.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.iter().map(|g| g.endpoints.len()).sum()
    }
}

/// A discovery response: the unit the transport sends down a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub type_url: String,
    pub version_info: String,
    pub nonce: String,
    pub resources: Vec<ClusterAssignment>,
}

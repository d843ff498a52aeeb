//! Endpoint model and wire conversion.
//!
//! Two endpoint shapes exist on purpose. `NetworkEndpoint` is the raw,
//! unvalidated data a registry source hands over; converting it validates
//! the address and can fail per endpoint. `Endpoint` is the validated form
//! the shard store holds: immutable once placed in a shard, with the wire
//! representation materialized once and cached.

use std::net::IpAddr;
use std::sync::OnceLock;

use pylon_proto::LbEndpoint;
use thiserror::Error;

use crate::labels::Labels;

/// Errors from endpoint address validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("invalid ip address '{0}'")]
    InvalidIp(String),

    #[error("pipe path must be absolute, got '{0}'")]
    RelativePipePath(String),
}

/// Address family of a raw registry endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressFamily {
    #[default]
    Tcp,
    Pipe,
}

/// Raw endpoint data as reported by a registry source, not yet validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkEndpoint {
    pub family: AddressFamily,
    pub address: String,
    pub port: u16,
    pub uid: Option<String>,
    pub network: Option<String>,
}

impl NetworkEndpoint {
    /// Validates the address and produces the typed form.
    pub fn validate(&self) -> Result<EndpointAddress, AddressError> {
        if self.address.is_empty() {
            return Err(AddressError::Empty);
        }
        match self.family {
            AddressFamily::Tcp => {
                let ip: IpAddr = self
                    .address
                    .parse()
                    .map_err(|_| AddressError::InvalidIp(self.address.clone()))?;
                Ok(EndpointAddress::Tcp(ip))
            }
            AddressFamily::Pipe => {
                if !self.address.starts_with('/') {
                    return Err(AddressError::RelativePipePath(self.address.clone()));
                }
                Ok(EndpointAddress::Pipe(self.address.clone()))
            }
        }
    }

    /// Converts to the wire representation, validating the address first.
    pub fn to_wire(&self) -> Result<LbEndpoint, AddressError> {
        let address = self.validate()?;
        Ok(build_lb_endpoint(
            &address,
            self.port,
            self.uid.as_deref(),
            self.network.as_deref(),
        ))
    }
}

/// A validated endpoint address: a TCP socket or a local pipe, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddress {
    Tcp(IpAddr),
    Pipe(String),
}

/// An addressable instance of a service, validated at ingest.
///
/// Shards hold these behind `Arc` and replace whole shards rather than
/// mutating endpoints in place. The cached wire endpoint is the one piece
/// of interior state, materialized on first use.
#[derive(Debug)]
pub struct Endpoint {
    address: EndpointAddress,
    port: u16,
    service_port_name: String,
    labels: Labels,
    uid: Option<String>,
    network: Option<String>,
    service_account: Option<String>,
    wire: OnceLock<LbEndpoint>,
}

impl Endpoint {
    /// Builds an endpoint from raw registry data, validating the address.
    pub fn new(
        raw: &NetworkEndpoint,
        service_port_name: impl Into<String>,
        labels: Labels,
    ) -> Result<Self, AddressError> {
        let address = raw.validate()?;
        Ok(Self {
            address,
            port: raw.port,
            service_port_name: service_port_name.into(),
            labels,
            uid: raw.uid.clone(),
            network: raw.network.clone(),
            service_account: None,
            wire: OnceLock::new(),
        })
    }

    /// Builds an endpoint from a registry instance, stamping the service
    /// port name of the port that was queried.
    pub fn from_instance(
        instance: &crate::source::ServiceInstance,
        service_port_name: &str,
    ) -> Result<Self, AddressError> {
        let mut endpoint = Self::new(
            &instance.endpoint,
            service_port_name,
            instance.labels.clone(),
        )?;
        endpoint.service_account = instance.service_account.clone();
        Ok(endpoint)
    }

    pub fn with_service_account(mut self, account: impl Into<String>) -> Self {
        self.service_account = Some(account.into());
        self
    }

    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn service_port_name(&self) -> &str {
        &self.service_port_name
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn service_account(&self) -> Option<&str> {
        self.service_account.as_deref()
    }

    /// The zone this endpoint belongs to, read from its labels. May be "".
    pub fn zone(&self) -> &str {
        self.labels.zone()
    }

    /// The wire representation, materialized once and cached.
    pub fn wire(&self) -> &LbEndpoint {
        self.wire.get_or_init(|| {
            build_lb_endpoint(
                &self.address,
                self.port,
                self.uid.as_deref(),
                self.network.as_deref(),
            )
        })
    }
}

fn build_lb_endpoint(
    address: &EndpointAddress,
    port: u16,
    uid: Option<&str>,
    network: Option<&str>,
) -> LbEndpoint {
    let endpoint = match address {
        EndpointAddress::Tcp(ip) => LbEndpoint::socket(ip.to_string(), u32::from(port)),
        EndpointAddress::Pipe(path) => LbEndpoint::pipe(path.clone()),
    };
    endpoint.with_istio_metadata(uid.map(str::to_owned), network.map(str::to_owned))
}

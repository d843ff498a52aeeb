//! Cluster-key encoding.
//!
//! A cluster name is an opaque string of the form
//! `direction|port|subset|hostname`, e.g. `outbound|80|v2|reviews.default`.
//! The subset segment may be empty.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors that can occur when parsing a cluster key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    /// The key didn't have exactly four `|`-separated segments.
    #[error("expected 4 '|'-separated segments, got {0}")]
    Segments(usize),

    /// The port segment wasn't a valid port number.
    #[error("invalid port segment '{0}'")]
    Port(String),
}

/// Direction of traffic a cluster serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficDirection {
    Inbound,
    Outbound,
    /// An unrecognized direction token, preserved verbatim so keys
    /// re-encode to their original form.
    Other(String),
}

impl TrafficDirection {
    pub fn as_str(&self) -> &str {
        match self {
            TrafficDirection::Inbound => "inbound",
            TrafficDirection::Outbound => "outbound",
            TrafficDirection::Other(s) => s,
        }
    }

    /// True for the directions the full assignment path serves.
    pub fn is_routable(&self) -> bool {
        matches!(self, TrafficDirection::Inbound | TrafficDirection::Outbound)
    }
}

impl From<&str> for TrafficDirection {
    fn from(s: &str) -> Self {
        match s {
            "inbound" => TrafficDirection::Inbound,
            "outbound" => TrafficDirection::Outbound,
            other => TrafficDirection::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for TrafficDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decoded form of a cluster name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterKey {
    pub direction: TrafficDirection,
    pub port: u16,
    pub subset: String,
    pub hostname: String,
}

impl ClusterKey {
    pub fn new(
        direction: TrafficDirection,
        port: u16,
        subset: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            port,
            subset: subset.into(),
            hostname: hostname.into(),
        }
    }

    /// Shorthand for an outbound key, the common case.
    pub fn outbound(port: u16, subset: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self::new(TrafficDirection::Outbound, port, subset, hostname)
    }
}

impl FromStr for ClusterKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').collect();
        if parts.len() != 4 {
            return Err(KeyParseError::Segments(parts.len()));
        }
        let port: u16 = parts[1]
            .parse()
            .map_err(|_| KeyParseError::Port(parts[1].to_owned()))?;
        Ok(Self {
            direction: TrafficDirection::from(parts[0]),
            port,
            subset: parts[2].to_owned(),
            hostname: parts[3].to_owned(),
        })
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.direction, self.port, self.subset, self.hostname
        )
    }
}

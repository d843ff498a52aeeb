//! Services and their named ports.

use serde::{Deserialize, Serialize};

/// Application protocol of a service port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Grpc,
    Http,
    Http2,
    Https,
    #[default]
    Tcp,
    Tls,
    Udp,
}

impl Protocol {
    /// UDP ports carry no proxyable endpoints and are skipped by the
    /// registry reconciler.
    pub fn is_udp(&self) -> bool {
        matches!(self, Protocol::Udp)
    }
}

/// A named service port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Port {
    pub fn new(name: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            port,
            protocol,
        }
    }
}

/// The ordered port list of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortList(Vec<Port>);

impl PortList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, port: Port) {
        self.0.push(port);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.0.iter()
    }

    /// Looks a port up by its numeric value.
    pub fn get_by_port(&self, port: u16) -> Option<&Port> {
        self.0.iter().find(|p| p.port == port)
    }

    /// Looks a port up by its name.
    pub fn get_by_name(&self, name: &str) -> Option<&Port> {
        self.0.iter().find(|p| p.name == name)
    }
}

impl From<Vec<Port>> for PortList {
    fn from(ports: Vec<Port>) -> Self {
        Self(ports)
    }
}

impl FromIterator<Port> for PortList {
    fn from_iter<T: IntoIterator<Item = Port>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A service: a host identity with its ports. Held by the external model;
/// the core only reads the name↔number mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub hostname: String,
    pub ports: PortList,
}

impl Service {
    pub fn new(hostname: impl Into<String>, ports: impl Into<PortList>) -> Self {
        Self {
            hostname: hostname.into(),
            ports: ports.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_port_and_name() {
        let ports: PortList = vec![
            Port::new("http", 80, Protocol::Http),
            Port::new("grpc", 9090, Protocol::Grpc),
        ]
        .into();
        assert_eq!(ports.get_by_port(9090).map(|p| p.name.as_str()), Some("grpc"));
        assert_eq!(ports.get_by_name("http").map(|p| p.port), Some(80));
        assert!(ports.get_by_port(443).is_none());
        assert!(ports.get_by_name("https").is_none());
    }

    #[test]
    fn udp_detection() {
        assert!(Protocol::Udp.is_udp());
        assert!(!Protocol::Http.is_udp());
    }
}

//! The push context: a per-push snapshot of mesh configuration.
//!
//! A push context carries the service list, the subset→selector mapping,
//! and the service-port name↔number mapping the incremental assignment
//! path joins against. It also accumulates diagnostic status events
//! recorded while a push is computed.

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

use crate::labels::LabelsCollection;
use crate::service::{PortList, Service};

/// Diagnostic conditions recorded against a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyStatus {
    /// A cluster resolved to zero instances.
    ClusterNoInstances,
    /// A non-primary cluster reported a port mapping that diverges from
    /// the authoritative one.
    ServicePortConflict,
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyStatus::ClusterNoInstances => f.write_str("cluster_no_instances"),
            ProxyStatus::ServicePortConflict => f.write_str("service_port_conflict"),
        }
    }
}

/// One recorded status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub status: ProxyStatus,
    pub key: String,
}

/// Snapshot of mesh configuration used for one coherent push.
///
/// The service-port mapping has interior mutability: service callbacks
/// refresh it between pushes while readers join against the latest view.
#[derive(Default)]
pub struct PushContext {
    services: Vec<Arc<Service>>,
    subset_selectors: AHashMap<(String, String), LabelsCollection>,
    service_ports: RwLock<AHashMap<String, PortList>>,
    statuses: Mutex<Vec<StatusEvent>>,
}

impl PushContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service and seeds its port mapping.
    pub fn add_service(&mut self, service: Arc<Service>) {
        self.service_ports
            .write()
            .insert(service.hostname.clone(), service.ports.clone());
        self.services.push(service);
    }

    /// Registers the label selector for `(subset, hostname)`.
    pub fn set_subset_selector(
        &mut self,
        subset: impl Into<String>,
        hostname: impl Into<String>,
        labels: LabelsCollection,
    ) {
        self.subset_selectors
            .insert((subset.into(), hostname.into()), labels);
    }

    /// The label selector a subset of a host selects on.
    ///
    /// Unknown subsets resolve to the empty collection, which matches
    /// every endpoint.
    pub fn subset_labels(&self, subset: &str, hostname: &str) -> LabelsCollection {
        self.subset_selectors
            .get(&(subset.to_owned(), hostname.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    /// Resolves the name of `hostname`'s numeric port, if known.
    pub fn port_name(&self, hostname: &str, port: u16) -> Option<String> {
        self.service_ports
            .read()
            .get(hostname)
            .and_then(|ports| ports.get_by_port(port))
            .map(|p| p.name.clone())
    }

    /// The current port mapping for `hostname`, if known.
    pub fn service_ports(&self, hostname: &str) -> Option<PortList> {
        self.service_ports.read().get(hostname).cloned()
    }

    /// Replaces the port mapping for `hostname`.
    pub fn set_service_ports(&self, hostname: &str, ports: PortList) {
        self.service_ports.write().insert(hostname.to_owned(), ports);
    }

    /// Records a diagnostic status event against this push.
    pub fn record(&self, status: ProxyStatus, key: &str) {
        self.statuses.lock().push(StatusEvent {
            status,
            key: key.to_owned(),
        });
    }

    /// Snapshot of the recorded status events.
    pub fn statuses(&self) -> Vec<StatusEvent> {
        self.statuses.lock().clone()
    }
}

impl fmt::Debug for PushContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushContext")
            .field("services", &self.services.len())
            .field("subset_selectors", &self.subset_selectors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Labels;
    use crate::service::{Port, Protocol};

    fn context_with_service() -> PushContext {
        let mut push = PushContext::new();
        push.add_service(Arc::new(Service::new(
            "reviews.default",
            vec![
                Port::new("http", 80, Protocol::Http),
                Port::new("grpc", 9090, Protocol::Grpc),
            ],
        )));
        push
    }

    #[test]
    fn port_name_resolution() {
        let push = context_with_service();
        assert_eq!(push.port_name("reviews.default", 80).as_deref(), Some("http"));
        assert_eq!(push.port_name("reviews.default", 443), None);
        assert_eq!(push.port_name("unknown.host", 80), None);
    }

    #[test]
    fn unknown_subset_matches_everything() {
        let push = context_with_service();
        let selector = push.subset_labels("v9", "reviews.default");
        assert!(selector.is_empty());
        assert!(selector.has_subset_of(&Labels::new()));
    }

    #[test]
    fn subset_selector_round_trip() {
        let mut push = context_with_service();
        let labels: Labels = [("version", "v2")].into_iter().collect();
        push.set_subset_selector("v2", "reviews.default", labels.clone().into());

        let selector = push.subset_labels("v2", "reviews.default");
        assert!(selector.has_subset_of(&labels));
        assert!(!selector.has_subset_of(&Labels::new()));
    }

    #[test]
    fn port_mapping_can_be_replaced() {
        let push = context_with_service();
        push.set_service_ports(
            "reviews.default",
            vec![Port::new("http-alt", 8080, Protocol::Http)].into(),
        );
        assert_eq!(push.port_name("reviews.default", 80), None);
        assert_eq!(
            push.port_name("reviews.default", 8080).as_deref(),
            Some("http-alt")
        );
    }

    #[test]
    fn statuses_accumulate() {
        let push = context_with_service();
        push.record(ProxyStatus::ClusterNoInstances, "outbound|80||svc.ns");
        let events = push.statuses();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, ProxyStatus::ClusterNoInstances);
        assert_eq!(events[0].key, "outbound|80||svc.ns");
    }
}

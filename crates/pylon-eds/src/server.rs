//! The discovery server.
//!
//! Owns the shard store, the cluster registry, and the workload table;
//! receives asynchronous registry callbacks, classifies them, and signals
//! the transport layer through a push-request channel. All state is
//! explicitly constructed and injected; there are no ambient globals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use pylon_model::{
    Endpoint, Labels, LabelsCollection, Port, PortList, Protocol, ProxyStatus, PushContext,
    Registry, ServiceInstance, SourceError,
};
use pylon_proto::{DiscoveryResponse, LocalityLbEndpoints};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::DiscoveryConfig;
use crate::connection::Connection;
use crate::error::DiscoveryError;
use crate::registry::ClusterRegistry;
use crate::shards::{PushScope, ShardStore};

/// A workload whose labels and annotations are tracked for change
/// detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub labels: Labels,
    pub annotations: AHashMap<String, String>,
}

/// A push classification handed to the transport layer, which debounces
/// and drives the actual pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushRequest {
    /// Whether all configuration types must be recomputed, not just
    /// endpoint assignments.
    pub full: bool,
}

/// A registered endpoint filter: takes the locality groups and the target
/// connection, returns possibly-rewritten groups. Must not mutate the
/// input.
pub type EndpointFilter =
    Box<dyn Fn(&[LocalityLbEndpoints], &Connection) -> Vec<LocalityLbEndpoints> + Send + Sync>;

/// The endpoint discovery server.
pub struct DiscoveryServer {
    shards: ShardStore,
    clusters: ClusterRegistry,
    workloads: DashMap<String, Workload>,
    registries: Vec<Registry>,
    filters: RwLock<Vec<EndpointFilter>>,
    pending: Mutex<AHashSet<String>>,
    push_context: RwLock<Arc<PushContext>>,
    config: DiscoveryConfig,
    conn_seq: AtomicU64,
    version_seq: AtomicU64,
    push_tx: mpsc::UnboundedSender<PushRequest>,
}

impl DiscoveryServer {
    /// Creates a server over the given registry sources.
    ///
    /// Returns the server and the receiver of push requests; the
    /// transport layer consumes the channel, debounces, and invokes
    /// [`eds_incremental`](Self::eds_incremental) or per-connection
    /// pushes.
    pub fn new(registries: Vec<Registry>) -> (Arc<Self>, mpsc::UnboundedReceiver<PushRequest>) {
        Self::with_config(registries, DiscoveryConfig::default())
    }

    /// Creates a server with explicit tuning knobs.
    pub fn with_config(
        registries: Vec<Registry>,
        config: DiscoveryConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PushRequest>) {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let server = Arc::new(Self {
            shards: ShardStore::new(),
            clusters: ClusterRegistry::new(),
            workloads: DashMap::new(),
            registries,
            filters: RwLock::new(Vec::new()),
            pending: Mutex::new(AHashSet::new()),
            push_context: RwLock::new(Arc::new(PushContext::new())),
            config,
            conn_seq: AtomicU64::new(0),
            version_seq: AtomicU64::new(0),
            push_tx,
        });
        (server, push_rx)
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn shards(&self) -> &ShardStore {
        &self.shards
    }

    pub fn clusters(&self) -> &ClusterRegistry {
        &self.clusters
    }

    pub(crate) fn registries(&self) -> &[Registry] {
        &self.registries
    }

    /// The current global push context.
    pub fn push_context(&self) -> Arc<PushContext> {
        self.push_context.read().clone()
    }

    /// Installs a new configuration snapshot.
    pub fn set_push_context(&self, push: Arc<PushContext>) {
        *self.push_context.write() = push;
    }

    /// Allocates a unique connection id for a node.
    pub fn connection_id(&self, node: &str) -> String {
        let id = self.conn_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{node}-{id}")
    }

    /// Creates a connection handle and the receiving half the transport
    /// drains into the stream.
    pub fn new_connection(
        &self,
        node: &str,
        peer_addr: &str,
    ) -> (Arc<Connection>, mpsc::Receiver<DiscoveryResponse>) {
        let (tx, rx) = mpsc::channel(self.config.send_buffer);
        let conn = Arc::new(Connection::new(self.connection_id(node), peer_addr, tx));
        (conn, rx)
    }

    pub(crate) fn next_version(&self) -> String {
        (self.version_seq.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Registers an endpoint filter, applied per connection in
    /// registration order during pushes.
    pub fn register_endpoint_filter(&self, filter: EndpointFilter) {
        self.filters.write().push(filter);
    }

    pub(crate) fn apply_endpoint_filters(
        &self,
        groups: &[LocalityLbEndpoints],
        conn: &Connection,
    ) -> Vec<LocalityLbEndpoints> {
        let filters = self.filters.read();
        let mut current = groups.to_vec();
        for filter in filters.iter() {
            current = filter(&current, conn);
        }
        current
    }

    /// Subscribes a connection to a cluster, creating the entry on first
    /// use.
    pub fn add_eds_connection(&self, cluster_name: &str, node: &str, conn: &Arc<Connection>) {
        self.clusters.add_client(cluster_name, node, conn);
    }

    /// Unsubscribes a connection from a cluster; called for every watched
    /// cluster when a stream closes.
    pub fn remove_eds_connection(&self, cluster_name: &str, node: &str, conn: &Arc<Connection>) {
        self.clusters.remove_client(cluster_name, node, conn);
    }

    /// Registry callback: replaces one registry's slice of a service's
    /// endpoints and requests the appropriate push.
    pub fn eds_update(
        &self,
        shard: &str,
        service_name: &str,
        endpoints: Vec<Arc<Endpoint>>,
    ) -> Result<(), DiscoveryError> {
        self.shard_update(shard, service_name, endpoints, false);
        Ok(())
    }

    pub(crate) fn shard_update(
        &self,
        shard: &str,
        service_name: &str,
        endpoints: Vec<Arc<Endpoint>>,
        internal: bool,
    ) -> PushScope {
        let scope = self
            .shards
            .update_shard(shard, service_name, endpoints, internal);
        self.pending.lock().insert(service_name.to_owned());
        self.config_update(scope.is_full());
        scope
    }

    /// Drains the set of services updated since the last incremental push.
    pub fn take_updates(&self) -> AHashSet<String> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn config_update(&self, full: bool) {
        // the transport may not be consuming yet; classification is
        // re-derived on the next update either way
        let _ = self.push_tx.send(PushRequest { full });
    }

    /// Service callback: refreshes the port mapping of a host.
    ///
    /// Only the primary cluster (empty cluster id) is authoritative;
    /// divergent mappings from other clusters are recorded
    /// diagnostically and otherwise ignored.
    pub fn svc_update(
        &self,
        cluster: &str,
        hostname: &str,
        ports: &AHashMap<String, u16>,
        _rports: &AHashMap<u16, String>,
    ) {
        let push = self.push_context();
        if cluster.is_empty() {
            let mut list: Vec<Port> = ports
                .iter()
                .map(|(name, port)| Port::new(name.clone(), *port, Protocol::Tcp))
                .collect();
            list.sort_by_key(|p| p.port);
            push.set_service_ports(hostname, PortList::from(list));
            return;
        }

        if let Some(authoritative) = push.service_ports(hostname) {
            for (name, port) in ports {
                match authoritative.get_by_name(name) {
                    Some(existing) if existing.port == *port => {}
                    _ => {
                        warn!(
                            "cluster {cluster} reports divergent port {name}={port} for {hostname}"
                        );
                        push.record(ProxyStatus::ServicePortConflict, hostname);
                        return;
                    }
                }
            }
        }
    }

    /// Workload callback: tracks label changes.
    ///
    /// `None` labels forget the workload without a push. A first sighting
    /// is recorded without a push. A label change triggers a full
    /// configuration push; equal labels are a no-op.
    pub fn workload_update(
        &self,
        id: &str,
        labels: Option<Labels>,
        annotations: AHashMap<String, String>,
    ) {
        let Some(labels) = labels else {
            // the endpoint membership change arrives separately
            self.workloads.remove(id);
            return;
        };

        match self.workloads.entry(id.to_owned()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                // first sighting, likely never connected
                slot.insert(Workload {
                    labels,
                    annotations,
                });
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                if slot.get().labels == labels {
                    return;
                }
                slot.insert(Workload {
                    labels,
                    annotations,
                });
                info!("label change, full push {id}");
                self.config_update(true);
            }
        }
    }

    /// The tracked workload for `id`, if any.
    pub fn workload(&self, id: &str) -> Option<Workload> {
        self.workloads.get(id).map(|w| w.clone())
    }

    /// Queries every registry for the instances of `hostname` on `port`.
    pub(crate) async fn instances_by_port(
        &self,
        hostname: &str,
        port: u16,
        labels: &LabelsCollection,
    ) -> Result<Vec<ServiceInstance>, SourceError> {
        let mut instances = Vec::new();
        for registry in &self.registries {
            instances.extend(
                registry
                    .source
                    .instances_by_port(hostname, port, labels)
                    .await?,
            );
        }
        Ok(instances)
    }

    /// Single-shot endpoint fetch is not provided; only streaming.
    pub fn fetch_endpoints(&self) -> Result<DiscoveryResponse, DiscoveryError> {
        Err(DiscoveryError::Unimplemented("single-shot endpoint fetch"))
    }

    /// Load-stats streaming is not provided.
    pub fn stream_load_stats(&self) -> Result<(), DiscoveryError> {
        Err(DiscoveryError::Unimplemented("load-stats streaming"))
    }
}

impl std::fmt::Debug for DiscoveryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryServer")
            .field("services", &self.shards.len())
            .field("clusters", &self.clusters.len())
            .field("registries", &self.registries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pylon_model::NetworkEndpoint;

    fn server() -> (Arc<DiscoveryServer>, mpsc::UnboundedReceiver<PushRequest>) {
        DiscoveryServer::new(Vec::new())
    }

    fn endpoint(ip: &str) -> Arc<Endpoint> {
        let raw = NetworkEndpoint {
            address: ip.into(),
            port: 80,
            ..NetworkEndpoint::default()
        };
        Arc::new(Endpoint::new(&raw, "http", Labels::new()).unwrap())
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn connection_ids_are_unique_and_suffixed() {
        let (server, _rx) = server();
        let a = server.connection_id("sidecar~10.0.0.1");
        let b = server.connection_id("sidecar~10.0.0.1");
        assert_ne!(a, b);
        assert!(a.starts_with("sidecar~10.0.0.1-"));
    }

    #[tokio::test]
    async fn eds_update_classification_reaches_the_channel() {
        let (server, mut rx) = server();

        server.eds_update("r1", "svc.ns", vec![endpoint("10.0.0.1")]).unwrap();
        assert_eq!(rx.recv().await, Some(PushRequest { full: true }));

        server.eds_update("r1", "svc.ns", vec![endpoint("10.0.0.2")]).unwrap();
        assert_eq!(rx.recv().await, Some(PushRequest { full: false }));

        let updates = server.take_updates();
        assert!(updates.contains("svc.ns"));
        assert!(server.take_updates().is_empty(), "drained");
    }

    #[tokio::test]
    async fn workload_update_lifecycle() {
        let (server, mut rx) = server();
        let v1 = labels(&[("version", "v1")]);
        let v2 = labels(&[("version", "v2")]);

        // first sighting: recorded, no push
        server.workload_update("pod-1", Some(v1.clone()), AHashMap::new());
        assert!(server.workload("pod-1").is_some());
        assert!(rx.try_recv().is_err());

        // equal labels: no-op
        server.workload_update("pod-1", Some(v1), AHashMap::new());
        assert!(rx.try_recv().is_err());

        // label change: full push
        server.workload_update("pod-1", Some(v2.clone()), AHashMap::new());
        assert_eq!(rx.try_recv().unwrap(), PushRequest { full: true });
        assert_eq!(server.workload("pod-1").unwrap().labels, v2);

        // forget: removed, no push
        server.workload_update("pod-1", None, AHashMap::new());
        assert!(server.workload("pod-1").is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn svc_update_primary_is_authoritative() {
        let (server, _rx) = server();
        let push = server.push_context();

        let ports: AHashMap<String, u16> = [("http".to_owned(), 80u16)].into_iter().collect();
        server.svc_update("", "svc.ns", &ports, &AHashMap::new());
        assert_eq!(push.port_name("svc.ns", 80).as_deref(), Some("http"));

        // divergent secondary mapping is recorded, not applied
        let divergent: AHashMap<String, u16> = [("http".to_owned(), 8080u16)].into_iter().collect();
        server.svc_update("west", "svc.ns", &divergent, &AHashMap::new());
        assert_eq!(push.port_name("svc.ns", 80).as_deref(), Some("http"));
        assert!(push
            .statuses()
            .iter()
            .any(|e| e.status == ProxyStatus::ServicePortConflict && e.key == "svc.ns"));
    }

    #[tokio::test]
    async fn unimplemented_surfaces_explicitly() {
        let (server, _rx) = server();
        assert!(matches!(
            server.fetch_endpoints(),
            Err(DiscoveryError::Unimplemented(_))
        ));
        assert!(matches!(
            server.stream_load_stats(),
            Err(DiscoveryError::Unimplemented(_))
        ));
    }

    #[tokio::test]
    async fn endpoint_filters_apply_in_order() {
        let (server, _rx) = server();
        let (conn, _crx) = server.new_connection("node", "10.0.0.9:1");

        server.register_endpoint_filter(Box::new(|groups, _conn| {
            groups
                .iter()
                .filter(|g| g.locality.zone != "blocked")
                .cloned()
                .collect()
        }));
        server.register_endpoint_filter(Box::new(|groups, _conn| {
            let mut out = groups.to_vec();
            out.iter_mut().for_each(|g| g.load_balancing_weight += 1);
            out
        }));

        let groups = vec![
            pylon_proto::LocalityLbEndpoints {
                locality: pylon_proto::Locality::zone("blocked"),
                load_balancing_weight: 1,
                endpoints: Vec::new(),
            },
            pylon_proto::LocalityLbEndpoints {
                locality: pylon_proto::Locality::zone("kept"),
                load_balancing_weight: 1,
                endpoints: Vec::new(),
            },
        ];
        let filtered = server.apply_endpoint_filters(&groups, &conn);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].locality.zone, "kept");
        assert_eq!(filtered[0].load_balancing_weight, 2);
        // input untouched
        assert_eq!(groups[0].load_balancing_weight, 1);
    }
}

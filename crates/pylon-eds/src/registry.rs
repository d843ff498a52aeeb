//! The cluster registry.
//!
//! Process-wide map of every cluster some connection is watching. Locking
//! is two-level: a read/write lock on the registry topology, and one mutex
//! per entry guarding its assignment and client set. Assignment builds on
//! different clusters never contend with each other.

use std::sync::Arc;
use std::time::SystemTime;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use pylon_proto::ClusterAssignment;
use tracing::{debug, info, warn};

use crate::connection::Connection;

/// Per-cluster state: the latest materialized assignment and the
/// connections subscribed to it.
#[derive(Debug)]
pub struct ClusterEntry {
    first_use: SystemTime,
    state: Mutex<EntryState>,
}

#[derive(Debug, Default)]
struct EntryState {
    assignment: Option<Arc<ClusterAssignment>>,
    clients: AHashMap<String, Arc<Connection>>,
    non_empty_at: Option<SystemTime>,
}

impl ClusterEntry {
    fn new() -> Self {
        Self {
            first_use: SystemTime::now(),
            state: Mutex::new(EntryState::default()),
        }
    }

    /// When the cluster was first subscribed to, for diagnostics.
    pub fn first_use(&self) -> SystemTime {
        self.first_use
    }

    /// The latest assignment, or `None` for a fresh cluster.
    pub fn assignment(&self) -> Option<Arc<ClusterAssignment>> {
        self.state.lock().assignment.clone()
    }

    /// When the cluster first had a non-empty endpoint set.
    pub fn non_empty_at(&self) -> Option<SystemTime> {
        self.state.lock().non_empty_at
    }

    /// Installs a freshly built assignment. Concurrent builds are allowed;
    /// the last writer to take the mutex wins.
    pub(crate) fn set_assignment(&self, assignment: ClusterAssignment) {
        let non_empty = !assignment.endpoints.is_empty();
        let mut state = self.state.lock();
        state.assignment = Some(Arc::new(assignment));
        if non_empty && state.non_empty_at.is_none() {
            state.non_empty_at = Some(SystemTime::now());
        }
    }

    /// Number of subscribed connections.
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Snapshot of the subscribed connections.
    pub fn clients(&self) -> Vec<Arc<Connection>> {
        self.state.lock().clients.values().cloned().collect()
    }
}

/// Process-wide mapping: cluster name → entry.
///
/// Owned by the discovery server and injected where needed; there is no
/// ambient global.
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    clusters: RwLock<AHashMap<String, Arc<ClusterEntry>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `name`, if any connection is watching it.
    pub fn get(&self, name: &str) -> Option<Arc<ClusterEntry>> {
        self.clusters.read().get(name).cloned()
    }

    /// The entry for `name`, created with an empty client set on first use.
    pub fn get_or_add(&self, name: &str) -> Arc<ClusterEntry> {
        if let Some(entry) = self.get(name) {
            return entry;
        }
        let mut clusters = self.clusters.write();
        clusters
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(ClusterEntry::new()))
            .clone()
    }

    /// Subscribes `conn` to `name` under the node id.
    pub fn add_client(&self, name: &str, node: &str, conn: &Arc<Connection>) {
        let entry = self.get_or_add(name);
        let mut state = entry.state.lock();
        state.clients.insert(node.to_owned(), Arc::clone(conn));
    }

    /// Unsubscribes `conn` from `name`.
    ///
    /// If the node reconnected and a newer connection replaced this one,
    /// the newer one is left in place. The entry is garbage-collected once
    /// its client set empties.
    pub fn remove_client(&self, name: &str, node: &str, conn: &Arc<Connection>) {
        let Some(entry) = self.get(name) else {
            warn!("missing cluster {name} on client removal");
            return;
        };

        let now_empty = {
            let mut state = entry.state.lock();
            match state.clients.get(node) {
                None => {
                    warn!(
                        "peer restart {node} {}, old connection already gone",
                        conn.peer_addr()
                    );
                    return;
                }
                Some(existing) if !Arc::ptr_eq(existing, conn) => {
                    info!(
                        "peer restart {node} {}, keeping replacement connection {}",
                        conn.peer_addr(),
                        existing.id()
                    );
                    return;
                }
                Some(_) => {
                    state.clients.remove(node);
                    state.clients.is_empty()
                }
            }
        };

        if now_empty {
            let mut clusters = self.clusters.write();
            // re-check under the registry write lock; a subscribe may have
            // raced the removal
            let still_empty = clusters
                .get(name)
                .map(|e| e.state.lock().clients.is_empty())
                .unwrap_or(false);
            if still_empty {
                debug!("removing unwatched cluster node={node} cluster={name}");
                clusters.remove(name);
            }
        }
    }

    /// Snapshot of the current topology.
    pub fn snapshot(&self) -> Vec<(String, Arc<ClusterEntry>)> {
        self.clusters
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect()
    }

    /// Every distinct connection subscribed to any cluster.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        let clusters = self.clusters.read();
        let mut seen: AHashMap<String, Arc<Connection>> = AHashMap::new();
        for entry in clusters.values() {
            for conn in entry.state.lock().clients.values() {
                seen.entry(conn.id().to_owned())
                    .or_insert_with(|| Arc::clone(conn));
            }
        }
        seen.into_values().collect()
    }

    /// Number of watched clusters.
    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}

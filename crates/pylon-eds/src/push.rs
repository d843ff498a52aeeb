//! The push coordinator.
//!
//! Two entry points: `eds_incremental` rebuilds the clusters touched by a
//! batch of service updates and drives per-connection pushes with a
//! filter, and `push_endpoints` assembles and sends one response to one
//! connection (fresh streams, incremental batches, and periodic full
//! pushes all land here).

use std::time::Instant;

use ahash::AHashSet;
use pylon_model::{ClusterKey, PushContext};
use pylon_proto::{ClusterAssignment, DiscoveryResponse, ENDPOINT_TYPE_URL};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::DiscoveryError;
use crate::metrics;
use crate::server::DiscoveryServer;
use crate::weight::normalize_load_balancing_weight;

fn nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

impl DiscoveryServer {
    /// Rebuilds the assignments of every cluster whose hostname is in
    /// `updates`, then pushes to each connection with the filter set so
    /// unchanged clusters stay off the wire.
    pub async fn eds_incremental(
        &self,
        version: &str,
        push: &PushContext,
        updates: &AHashSet<String>,
    ) {
        let connections = self.clusters().connections();
        info!(
            "incremental endpoint push {version}: {} updated services, {} connections",
            updates.len(),
            connections.len()
        );
        let t0 = Instant::now();

        // recompute each touched cluster once per batch, not once per
        // endpoint event
        for (cluster_name, entry) in self.clusters().snapshot() {
            let touched = cluster_name
                .parse::<ClusterKey>()
                .map(|key| updates.contains(&key.hostname))
                .unwrap_or(false);
            if !touched {
                continue;
            }
            if let Err(err) = self
                .update_cluster_incremental(push, &cluster_name, &entry)
                .await
            {
                error!("assignment rebuild failed for cluster {cluster_name}: {err}");
            }
        }
        debug!("cluster init time {:?} {version}", t0.elapsed());

        for conn in connections {
            if let Err(err) = self.push_endpoints(push, &conn, false, Some(updates)).await {
                warn!("endpoint push to {} failed: {err}", conn.id());
            }
        }
    }

    /// Pushes endpoint assignments for every cluster `conn` watches.
    ///
    /// With `updated` set, clusters whose hostname is not in the set are
    /// skipped. Fresh clusters (no assignment yet) are built on the spot
    /// through the full path. Per-cluster failures are counted and
    /// skipped; only a transport send failure aborts the push.
    pub async fn push_endpoints(
        &self,
        push: &PushContext,
        conn: &Connection,
        full: bool,
        updated: Option<&AHashSet<String>>,
    ) -> Result<(), DiscoveryError> {
        let mut resources = Vec::new();
        let mut endpoints = 0usize;
        let mut empty_clusters = 0usize;

        for cluster_name in conn.clusters() {
            if let Some(filter) = updated {
                let touched = cluster_name
                    .parse::<ClusterKey>()
                    .map(|key| filter.contains(&key.hostname))
                    .unwrap_or(false);
                if !touched {
                    continue;
                }
            }

            let Some(entry) = self.clusters().get(&cluster_name) else {
                let err = DiscoveryError::MissingCluster(cluster_name.clone());
                metrics::incr_internal_errors();
                error!("skipping cluster: {err}");
                continue;
            };

            let mut assignment = entry.assignment();
            if assignment.is_none() {
                // fresh cluster: first subscriber arrived before any update
                if let Err(err) = self.update_cluster_full(push, &cluster_name, &entry).await {
                    error!("assignment build failed for fresh cluster {cluster_name}: {err}");
                    metrics::incr_internal_errors();
                    continue;
                }
                assignment = entry.assignment();
            }
            let Some(assignment) = assignment else {
                continue;
            };

            let groups = self.apply_endpoint_filters(&assignment.endpoints, conn);
            let groups = normalize_load_balancing_weight(&groups);

            let count: usize = groups.iter().map(|g| g.endpoints.len()).sum();
            endpoints += count;
            if count == 0 {
                empty_clusters += 1;
            }

            resources.push(ClusterAssignment {
                cluster_name: assignment.cluster_name.clone(),
                endpoints: groups,
            });
        }

        let response = self.endpoints_response(resources);
        if let Err(err) = conn.send(response).await {
            warn!("send failure, closing stream for {}: {err}", conn.id());
            metrics::incr_push("eds_senderr");
            return Err(err);
        }
        metrics::incr_push("eds");

        let kind = if full { "push" } else { "incremental push" };
        debug!(
            "endpoint {kind} for {}: clusters {} endpoints {} empty {}",
            conn.id(),
            conn.clusters().len(),
            endpoints,
            empty_clusters
        );
        Ok(())
    }

    fn endpoints_response(&self, resources: Vec<ClusterAssignment>) -> DiscoveryResponse {
        DiscoveryResponse {
            type_url: ENDPOINT_TYPE_URL.to_owned(),
            // latest state is always supplied; convergence over negotiation
            version_info: self.next_version(),
            nonce: nonce(),
            resources,
        }
    }
}

//! The assignment builder.
//!
//! Produces a cluster's locality-grouped endpoint list. The incremental
//! path joins the shard store against the service-port mapping and the
//! subset selector; when the shard model can't answer (unknown service or
//! port), the full path queries the registries directly. Either way the
//! result replaces the cluster entry's assignment under its mutex.
//!
//! Concurrent builds for the same cluster are deliberately allowed: a
//! build can be slow, and holding a lock across it would stall unrelated
//! sends. The last writer to take the entry mutex wins.

use ahash::AHashMap;
use pylon_model::{ClusterKey, ProxyStatus, PushContext, ServiceInstance};
use pylon_proto::{ClusterAssignment, LocalityLbEndpoints};
use tracing::{debug, error};

use crate::error::DiscoveryError;
use crate::metrics;
use crate::registry::ClusterEntry;
use crate::server::DiscoveryServer;

impl DiscoveryServer {
    /// Builds a cluster's assignment from the shard store.
    ///
    /// Falls back to [`update_cluster_full`](Self::update_cluster_full)
    /// when the port number can't be resolved to a name or the service has
    /// no shards yet.
    pub async fn update_cluster_incremental(
        &self,
        push: &PushContext,
        cluster_name: &str,
        entry: &ClusterEntry,
    ) -> Result<(), DiscoveryError> {
        let Ok(key) = cluster_name.parse::<ClusterKey>() else {
            return self.update_cluster_full(push, cluster_name, entry).await;
        };
        let selector = push.subset_labels(&key.subset, &key.hostname);

        let Some(port_name) = push.port_name(&key.hostname, key.port) else {
            return self.update_cluster_full(push, cluster_name, entry).await;
        };
        let Some(shards) = self.shards().get(&key.hostname) else {
            // the service was never updated through the shard model
            return self.update_cluster_full(push, cluster_name, entry).await;
        };

        let mut count = 0usize;
        let mut locality_map: AHashMap<String, LocalityLbEndpoints> = AHashMap::new();

        // shards update independently; filter and merge them for this cluster
        for shard in shards.shards() {
            for endpoint in &shard.endpoints {
                if endpoint.service_port_name() != port_name {
                    continue;
                }
                if !selector.has_subset_of(endpoint.labels()) {
                    continue;
                }
                count += 1;

                // zone-only locality for now; "" is a valid group key
                let zone = endpoint.zone();
                let group = locality_map
                    .entry(zone.to_owned())
                    .or_insert_with(|| LocalityLbEndpoints::for_zone(zone));
                group.endpoints.push(endpoint.wire().clone());
            }
        }

        let groups: Vec<LocalityLbEndpoints> = locality_map
            .into_values()
            .map(|mut group| {
                group.load_balancing_weight = group.endpoints.len() as u32;
                group
            })
            .collect();

        if count == 0 {
            push.record(ProxyStatus::ClusterNoInstances, cluster_name);
            debug!(
                "no instances for {cluster_name} (host={} port={} subset={})",
                key.hostname, key.port, key.subset
            );
        }
        metrics::set_instances(cluster_name, count);

        entry.set_assignment(ClusterAssignment {
            cluster_name: cluster_name.to_owned(),
            endpoints: groups,
        });
        Ok(())
    }

    /// Builds a cluster's assignment with a direct registry query.
    ///
    /// Used for services outside the shard model and as the fallback of
    /// the incremental path. A cluster whose direction is neither inbound
    /// nor outbound gets an empty assignment.
    pub async fn update_cluster_full(
        &self,
        push: &PushContext,
        cluster_name: &str,
        entry: &ClusterEntry,
    ) -> Result<(), DiscoveryError> {
        let mut groups = Vec::new();

        if let Ok(key) = cluster_name.parse::<ClusterKey>() {
            if key.direction.is_routable() {
                let selector = push.subset_labels(&key.subset, &key.hostname);
                let instances = match self
                    .instances_by_port(&key.hostname, key.port, &selector)
                    .await
                {
                    Ok(instances) => instances,
                    Err(err) => {
                        error!("endpoints for cluster {cluster_name} returned error: {err}");
                        metrics::incr_internal_errors();
                        return Err(err.into());
                    }
                };

                if instances.is_empty() {
                    push.record(ProxyStatus::ClusterNoInstances, cluster_name);
                    debug!(
                        "cluster {cluster_name} (host={} port={}) has no instances",
                        key.hostname, key.port
                    );
                }
                metrics::set_instances(cluster_name, instances.len());

                groups = locality_lb_endpoints_from_instances(&instances);
            }
        }

        for group in &mut groups {
            group.load_balancing_weight = group.endpoints.len() as u32;
        }

        entry.set_assignment(ClusterAssignment {
            cluster_name: cluster_name.to_owned(),
            endpoints: groups,
        });
        Ok(())
    }
}

/// Groups registry instances by zone. An instance whose address fails
/// validation is skipped with an error count; it never aborts the build.
fn locality_lb_endpoints_from_instances(
    instances: &[ServiceInstance],
) -> Vec<LocalityLbEndpoints> {
    let mut locality_map: AHashMap<String, LocalityLbEndpoints> = AHashMap::new();
    for instance in instances {
        let endpoint = match instance.endpoint.to_wire() {
            Ok(endpoint) => endpoint,
            Err(err) => {
                error!("invalid endpoint address, skipping instance: {err}");
                metrics::incr_internal_errors();
                continue;
            }
        };
        let zone = instance.zone();
        let group = locality_map
            .entry(zone.to_owned())
            .or_insert_with(|| LocalityLbEndpoints::for_zone(zone));
        group.endpoints.push(endpoint);
    }
    locality_map.into_values().collect()
}

//! The registry reconciler.
//!
//! Folds non-streaming registries into the shard model: a full sweep over
//! every registry, service, and non-UDP port, replacing each registry's
//! shard and the per-service service-account union with what the sweep
//! observed. Runs periodically and corrects drift for registries that
//! never push updates themselves.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use pylon_model::{Endpoint, LabelsCollection, PushContext};
use tokio::time::MissedTickBehavior;
use tracing::{error, warn};

use crate::error::DiscoveryError;
use crate::metrics;
use crate::server::DiscoveryServer;

impl DiscoveryServer {
    /// Sweeps every registry and rebuilds the shards of every service in
    /// the push context.
    ///
    /// Shard updates are marked internal so the sweep itself never
    /// escalates to a full push.
    pub async fn update_service_shards(&self, push: &PushContext) -> Result<(), DiscoveryError> {
        // hostname → service accounts seen during this sweep
        let mut accounts: AHashMap<String, AHashSet<String>> = AHashMap::new();

        for registry in self.registries() {
            // each registry stays its own shard; merging would break
            // registries that update their slice incrementally
            for service in push.services() {
                let mut entries: Vec<Arc<Endpoint>> = Vec::new();

                for port in service.ports.iter() {
                    if port.protocol.is_udp() {
                        continue;
                    }

                    let instances = registry
                        .source
                        .instances_by_port(&service.hostname, port.port, &LabelsCollection::new())
                        .await?;

                    for instance in instances {
                        let endpoint = match Endpoint::from_instance(&instance, &port.name) {
                            Ok(endpoint) => endpoint,
                            Err(err) => {
                                error!(
                                    "skipping endpoint with invalid address for {}: {err}",
                                    service.hostname
                                );
                                metrics::incr_internal_errors();
                                continue;
                            }
                        };
                        if let Some(account) = endpoint.service_account() {
                            if !account.is_empty() {
                                accounts
                                    .entry(service.hostname.clone())
                                    .or_default()
                                    .insert(account.to_owned());
                            }
                        }
                        entries.push(Arc::new(endpoint));
                    }
                }

                self.shard_update(&registry.cluster_id, &service.hostname, entries, true);
            }
        }

        for (hostname, seen) in accounts {
            self.shards().set_service_accounts(&hostname, seen);
        }
        Ok(())
    }

    /// Spawns the periodic reconcile sweep at the configured interval.
    ///
    /// `push_source` yields the configuration snapshot to sweep against;
    /// the first sweep runs immediately.
    pub fn spawn_reconcile_loop(
        self: &Arc<Self>,
        push_source: impl Fn() -> Arc<PushContext> + Send + Sync + 'static,
    ) -> tokio::task::JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(server.config().reconcile_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let push = push_source();
                if let Err(err) = server.update_service_shards(&push).await {
                    warn!("registry reconcile sweep failed: {err}");
                }
            }
        })
    }
}

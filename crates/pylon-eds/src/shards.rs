//! The endpoint shard store.
//!
//! Each registry contributes one shard per service and replaces it
//! wholesale on every update; the store never merges shards, so
//! registries that update incrementally stay isolated from one another.
//! An update is classified as needing a full push (previously-unknown
//! service, or an endpoint carrying a service-account identity not seen
//! before) or an incremental one.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use pylon_model::Endpoint;
use tracing::info;

/// How far a shard update has to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushScope {
    /// New service or new service-account identity: configuration-level
    /// refresh required.
    Full,
    /// Endpoint membership change only.
    Incremental,
}

impl PushScope {
    pub fn is_full(&self) -> bool {
        matches!(self, PushScope::Full)
    }
}

/// One registry's contribution for one service.
#[derive(Debug, Clone)]
pub struct EndpointShard {
    pub shard: String,
    pub endpoints: Vec<Arc<Endpoint>>,
}

/// Per-service aggregation: one shard per contributing registry, plus
/// the union of service-account identities observed across shards.
#[derive(Debug, Clone, Default)]
pub struct ServiceShards {
    shards: AHashMap<String, EndpointShard>,
    service_accounts: AHashSet<String>,
}

impl ServiceShards {
    /// The shard contributed by `shard_id`, if any.
    pub fn shard(&self, shard_id: &str) -> Option<&EndpointShard> {
        self.shards.get(shard_id)
    }

    pub fn shards(&self) -> impl Iterator<Item = &EndpointShard> {
        self.shards.values()
    }

    /// All endpoints across all shards, in no particular shard order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.shards.values().flat_map(|s| s.endpoints.iter())
    }

    /// The union of non-empty service-accounts over all shards.
    pub fn service_accounts(&self) -> &AHashSet<String> {
        &self.service_accounts
    }

    fn recompute_accounts(&mut self) {
        self.service_accounts = self
            .shards
            .values()
            .flat_map(|s| s.endpoints.iter())
            .filter_map(|e| e.service_account())
            .filter(|account| !account.is_empty())
            .map(str::to_owned)
            .collect();
    }
}

/// Sharded endpoint index: service hostname → per-registry shards.
///
/// All operations serialize under a single mutex; reads during an update
/// block. Updates replace shards by value, never mutate endpoints in
/// place.
#[derive(Debug, Default)]
pub struct ShardStore {
    inner: Mutex<AHashMap<String, ServiceShards>>,
}

impl ShardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `shard_id`'s shard of `service_name` wholesale and
    /// classifies the update.
    ///
    /// `internal` marks updates that are themselves part of a full
    /// reconciliation sweep; those never escalate to a full push.
    pub fn update_shard(
        &self,
        shard_id: &str,
        service_name: &str,
        endpoints: Vec<Arc<Endpoint>>,
        internal: bool,
    ) -> PushScope {
        let mut services = self.inner.lock();

        let known = services.contains_key(service_name);
        let record = services.entry(service_name.to_owned()).or_default();

        let mut require_full = false;
        if !known && !internal {
            info!("full push, new service {service_name}");
            require_full = true;
        }

        if !internal {
            for endpoint in &endpoints {
                if let Some(account) = endpoint.service_account() {
                    if !account.is_empty() && !record.service_accounts.contains(account) {
                        info!("endpoint updating service account {account} {service_name}");
                        require_full = true;
                    }
                }
            }
        }

        record.shards.insert(
            shard_id.to_owned(),
            EndpointShard {
                shard: shard_id.to_owned(),
                endpoints,
            },
        );
        record.recompute_accounts();

        if require_full {
            PushScope::Full
        } else {
            PushScope::Incremental
        }
    }

    /// The current shards of a service, or `None` when unknown.
    pub fn get(&self, service_name: &str) -> Option<ServiceShards> {
        self.inner.lock().get(service_name).cloned()
    }

    /// Replaces the service-account union of a service. Used by the
    /// reconciler after a full sweep.
    pub fn set_service_accounts(&self, service_name: &str, accounts: AHashSet<String>) {
        if let Some(record) = self.inner.lock().get_mut(service_name) {
            record.service_accounts = accounts;
        }
    }

    /// Number of known services.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pylon_model::{Labels, NetworkEndpoint};

    fn endpoint(ip: &str, account: Option<&str>) -> Arc<Endpoint> {
        let raw = NetworkEndpoint {
            address: ip.into(),
            port: 80,
            ..NetworkEndpoint::default()
        };
        let mut ep = Endpoint::new(&raw, "http", Labels::new()).unwrap();
        if let Some(account) = account {
            ep = ep.with_service_account(account);
        }
        Arc::new(ep)
    }

    #[test]
    fn unknown_service_requires_full_push() {
        let store = ShardStore::new();
        let scope = store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", None)], false);
        assert_eq!(scope, PushScope::Full);
    }

    #[test]
    fn known_service_without_new_accounts_is_incremental() {
        let store = ShardStore::new();
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", None)], false);

        let scope = store.update_shard(
            "r1",
            "svc.ns",
            vec![endpoint("10.0.0.1", None), endpoint("10.0.0.2", None)],
            false,
        );
        assert_eq!(scope, PushScope::Incremental);
    }

    #[test]
    fn new_service_account_requires_full_push_and_joins_union() {
        let store = ShardStore::new();
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", Some("a"))], false);

        let scope = store.update_shard(
            "r1",
            "svc.ns",
            vec![
                endpoint("10.0.0.1", Some("a")),
                endpoint("10.0.0.2", Some("b")),
            ],
            false,
        );
        assert_eq!(scope, PushScope::Full);

        let shards = store.get("svc.ns").unwrap();
        let mut accounts: Vec<&str> = shards.service_accounts().iter().map(String::as_str).collect();
        accounts.sort_unstable();
        assert_eq!(accounts, ["a", "b"]);
    }

    #[test]
    fn known_account_stays_incremental() {
        let store = ShardStore::new();
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", Some("a"))], false);

        let scope = store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.3", Some("a"))], false);
        assert_eq!(scope, PushScope::Incremental);
    }

    #[test]
    fn internal_updates_never_escalate() {
        let store = ShardStore::new();
        // unknown service AND unseen account, but internal
        let scope = store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", Some("a"))], true);
        assert_eq!(scope, PushScope::Incremental);
    }

    #[test]
    fn shards_are_replaced_wholesale() {
        let store = ShardStore::new();
        store.update_shard(
            "r1",
            "svc.ns",
            vec![endpoint("10.0.0.1", None), endpoint("10.0.0.2", None)],
            false,
        );
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.3", None)], false);

        let shards = store.get("svc.ns").unwrap();
        assert_eq!(shards.shard("r1").unwrap().endpoints.len(), 1);
        assert_eq!(shards.endpoints().count(), 1);
    }

    #[test]
    fn shards_from_different_registries_are_independent() {
        let store = ShardStore::new();
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", None)], false);
        store.update_shard("r2", "svc.ns", vec![endpoint("10.1.0.1", None)], false);

        let shards = store.get("svc.ns").unwrap();
        assert_eq!(shards.shards().count(), 2);
        assert_eq!(shards.endpoints().count(), 2);
    }

    #[test]
    fn account_union_shrinks_when_shard_drops_it() {
        let store = ShardStore::new();
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", Some("a"))], false);
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.2", Some("b"))], false);

        let shards = store.get("svc.ns").unwrap();
        assert!(!shards.service_accounts().contains("a"));
        assert!(shards.service_accounts().contains("b"));
    }

    #[test]
    fn repeated_update_is_observably_a_noop() {
        let store = ShardStore::new();
        let eps = vec![endpoint("10.0.0.1", Some("a"))];
        store.update_shard("r1", "svc.ns", eps.clone(), false);
        let before = store.get("svc.ns").unwrap();

        store.update_shard("r1", "svc.ns", eps, false);
        let after = store.get("svc.ns").unwrap();

        assert_eq!(before.endpoints().count(), after.endpoints().count());
        assert_eq!(before.service_accounts(), after.service_accounts());
    }

    #[test]
    fn set_service_accounts_replaces_the_union() {
        let store = ShardStore::new();
        store.update_shard("r1", "svc.ns", vec![endpoint("10.0.0.1", Some("a"))], false);

        let replacement: AHashSet<String> = ["x".to_owned(), "y".to_owned()].into_iter().collect();
        store.set_service_accounts("svc.ns", replacement.clone());

        assert_eq!(store.get("svc.ns").unwrap().service_accounts(), &replacement);
    }
}

//! pylon-eds: the endpoint discovery core.
//!
//! Aggregates endpoint membership from independent service registries,
//! materializes per-cluster load-balancing assignments, and fans
//! incremental or full pushes out to long-lived proxy connections.
//!
//! # Architecture
//!
//! - **Shard store**: each registry independently replaces its slice of a
//!   service's endpoints; the store classifies every update as needing a
//!   full or an incremental push.
//! - **Cluster registry**: process-wide map of watched clusters, each entry
//!   tracking its latest assignment and subscribed connections behind a
//!   two-level lock (registry topology vs. entry contents).
//! - **Assignment builder**: joins shards, service ports, and subset
//!   selectors into a locality-grouped assignment; falls back to a direct
//!   registry query when the shard model can't answer.
//! - **Push coordinator**: rebuilds affected clusters and drives
//!   per-connection pushes, normalizing locality weights into `[1, 128]`
//!   on the way out.
//! - **Reconciler**: periodic full sweep that folds non-streaming
//!   registries into the shard model and corrects drift.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use pylon_eds::{Connection, DiscoveryServer};
//! use pylon_model::Registry;
//!
//! let (server, mut pushes) = DiscoveryServer::new(vec![Registry::new("k8s", source)]);
//! let (conn, mut rx) = server.new_connection("sidecar~10.0.0.1", "10.0.0.1:52801");
//! conn.watch("outbound|80||reviews.default");
//! server.add_eds_connection("outbound|80||reviews.default", conn.id(), &conn);
//! ```

mod assignment;
mod config;
mod connection;
mod error;
pub mod metrics;
mod push;
mod reconcile;
mod registry;
mod server;
mod shards;
mod weight;

pub use config::{parse_duration, DiscoveryConfig};
pub use connection::Connection;
pub use error::DiscoveryError;
pub use registry::{ClusterEntry, ClusterRegistry};
pub use server::{DiscoveryServer, EndpointFilter, PushRequest, Workload};
pub use shards::{EndpointShard, PushScope, ServiceShards, ShardStore};
pub use weight::{normalize_load_balancing_weight, MAX_LOAD_BALANCING_WEIGHT};

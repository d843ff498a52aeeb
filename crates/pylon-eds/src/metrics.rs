//! Metric names recorded through the global `metrics` recorder.
//!
//! The core records through the facade only; installing an exporter is
//! the embedding server's concern.

use metrics::{counter, gauge};

/// Per-cluster gauge: instance count of the latest assignment.
pub const EDS_INSTANCES: &str = "pylon_eds_instances";

/// Counter of internal discovery errors: missing cluster entries, failed
/// assignment builds, endpoints with invalid addresses.
pub const XDS_INTERNAL_ERRORS: &str = "pylon_xds_internal_errors_total";

/// Counter of endpoint pushes, labelled by outcome (`eds`, `eds_senderr`).
pub const XDS_PUSHES: &str = "pylon_xds_pushes_total";

pub(crate) fn set_instances(cluster: &str, count: usize) {
    gauge!(EDS_INSTANCES, "cluster" => cluster.to_owned()).set(count as f64);
}

pub(crate) fn incr_internal_errors() {
    counter!(XDS_INTERNAL_ERRORS).increment(1);
}

pub(crate) fn incr_push(kind: &'static str) {
    counter!(XDS_PUSHES, "type" => kind).increment(1);
}

//! Locality load-balancing weight normalization.

use pylon_proto::LocalityLbEndpoints;

/// Upper bound of the normalized locality weight range `[1, 128]`.
pub const MAX_LOAD_BALANCING_WEIGHT: u64 = 128;

/// Rescales locality weights proportionally into `[1, 128]`.
///
/// Each group's weight becomes `ceil(raw * 128 / total)`, so any group
/// with a non-zero raw weight keeps at least 1. A zero total returns the
/// input unchanged. The input list is never mutated.
pub fn normalize_load_balancing_weight(groups: &[LocalityLbEndpoints]) -> Vec<LocalityLbEndpoints> {
    let total: u64 = groups
        .iter()
        .map(|g| u64::from(g.load_balancing_weight))
        .sum();
    if total == 0 {
        return groups.to_vec();
    }

    groups
        .iter()
        .map(|group| {
            let scaled = u64::from(group.load_balancing_weight) * MAX_LOAD_BALANCING_WEIGHT;
            let weight = scaled.div_ceil(total);
            LocalityLbEndpoints {
                load_balancing_weight: weight as u32,
                ..group.clone()
            }
        })
        .collect()
}

//! Label sets and subset matching.
//!
//! Labels drive two decisions in the core: which endpoints a subset
//! selects (selector labels must be a subset of the endpoint's labels)
//! and which locality group an endpoint lands in (the zone label).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label key carrying the availability zone of a workload.
pub const ZONE_LABEL: &str = "failure-domain.kubernetes.io/zone";

/// An ordered string→string label mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when every key/value pair in `self` also appears in `other`.
    ///
    /// The empty set is a subset of everything.
    pub fn subset_of(&self, other: &Labels) -> bool {
        self.0.iter().all(|(k, v)| other.get(k) == Some(v))
    }

    /// The availability zone recorded on this label set, or "" when absent.
    pub fn zone(&self) -> &str {
        self.get(ZONE_LABEL).unwrap_or("")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A list of alternative label selectors.
///
/// A subset without a destination rule resolves to an empty collection,
/// which matches every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelsCollection(Vec<Labels>);

impl LabelsCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, labels: Labels) {
        self.0.push(labels);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the collection is empty, or any member selector is a
    /// subset of the endpoint's labels.
    pub fn has_subset_of(&self, endpoint_labels: &Labels) -> bool {
        self.0.is_empty() || self.0.iter().any(|l| l.subset_of(endpoint_labels))
    }
}

impl From<Labels> for LabelsCollection {
    fn from(labels: Labels) -> Self {
        Self(vec![labels])
    }
}

impl FromIterator<Labels> for LabelsCollection {
    fn from_iter<T: IntoIterator<Item = Labels>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().copied().collect()
    }

    #[test]
    fn empty_is_subset_of_anything() {
        assert!(Labels::new().subset_of(&labels(&[("app", "reviews")])));
        assert!(Labels::new().subset_of(&Labels::new()));
    }

    #[test]
    fn subset_requires_equal_values() {
        let selector = labels(&[("version", "v2")]);
        assert!(selector.subset_of(&labels(&[("version", "v2"), ("app", "reviews")])));
        assert!(!selector.subset_of(&labels(&[("version", "v1")])));
        assert!(!selector.subset_of(&Labels::new()));
    }

    #[test]
    fn empty_collection_matches_everything() {
        let collection = LabelsCollection::new();
        assert!(collection.has_subset_of(&Labels::new()));
        assert!(collection.has_subset_of(&labels(&[("app", "reviews")])));
    }

    #[test]
    fn collection_matches_when_any_member_matches() {
        let collection: LabelsCollection = [
            labels(&[("version", "v1")]),
            labels(&[("version", "v2")]),
        ]
        .into_iter()
        .collect();
        assert!(collection.has_subset_of(&labels(&[("version", "v2"), ("zone", "z1")])));
        assert!(!collection.has_subset_of(&labels(&[("version", "v3")])));
    }

    #[test]
    fn zone_reads_the_az_label() {
        let l = labels(&[(ZONE_LABEL, "us-east-1a")]);
        assert_eq!(l.zone(), "us-east-1a");
        assert_eq!(Labels::new().zone(), "");
    }
}

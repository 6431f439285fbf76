use std::collections::BTreeMap;

use crate::metrics::{Aggregate, GaugeSummary, RateSummary, TrendSummary};

/// One tagged series as it stood at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub name: String,
    /// Sorted by key.
    pub tags: Vec<(String, String)>,
    pub value: Aggregate,
}

impl SeriesSummary {
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Immutable end-of-run view of the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    metrics: BTreeMap<String, Aggregate>,
    series: Vec<SeriesSummary>,
}

impl Snapshot {
    pub(crate) fn new(metrics: BTreeMap<String, Aggregate>, series: Vec<SeriesSummary>) -> Self {
        Self { metrics, series }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Aggregate> {
        self.metrics.get(name)
    }

    #[must_use]
    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match self.get(name)? {
            Aggregate::Trend(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn rate(&self, name: &str) -> Option<RateSummary> {
        match self.get(name)? {
            Aggregate::Rate(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            Aggregate::Counter(c) => Some(*c),
            _ => None,
        }
    }

    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<GaugeSummary> {
        match self.get(name)? {
            Aggregate::Gauge(g) => Some(*g),
            _ => None,
        }
    }

    /// Aggregates by metric name, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Aggregate)> + '_ {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn series(&self) -> &[SeriesSummary] {
        &self.series
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

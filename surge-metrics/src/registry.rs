use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricStorage, RawSeries};
use crate::snapshot::{SeriesSummary, Snapshot};
use crate::tags::{TagSet, Tags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

/// Concurrent metric store shared by every virtual user of a run.
///
/// Writers only touch atomics or a per-series mutex, so no ordering between writers is
/// required for the final aggregate to be correct. `defs` is write-locked only when a new
/// metric name appears.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    by_name: DashMap<KeyId, MetricId>,
    storage: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
    snapshot_taken: AtomicBool,
}

impl Registry {
    /// Registers `name` with `kind`, or returns the existing id when it is already known with
    /// the same kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        let name_id = self.interner.get_or_intern(name);

        let known = self.by_name.get(&name_id).map(|id| *id);
        if let Some(id) = known {
            let registered = self.defs.read()[id.0 as usize].kind;
            return check_kind(name, id, registered, kind);
        }

        let mut defs = self.defs.write();

        // Another writer may have registered it between the two lookups.
        let known = self.by_name.get(&name_id).map(|id| *id);
        if let Some(id) = known {
            return check_kind(name, id, defs[id.0 as usize].kind, kind);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, DashMap::new());
        self.by_name.insert(name_id, id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        let id = *self.by_name.get(&name_id)?;
        let kind = self.defs.read().get(id.0 as usize)?.kind;
        Some((id, kind))
    }

    pub fn resolve_tags(&self, tags: &Tags) -> TagSet {
        let mut resolved: Vec<(KeyId, KeyId)> = tags
            .series_pairs()
            .map(|(k, v)| {
                (
                    self.interner.get_or_intern(k),
                    self.interner.get_or_intern(v),
                )
            })
            .collect();
        resolved.sort_unstable();
        TagSet::from_sorted_iter(resolved)
    }

    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        // Read the kind before touching `storage`: `register` locks `defs` then `storage`.
        let kind = {
            let defs = self.defs.read();
            defs.get(metric.0 as usize)?.kind
        };

        let series_map = self.storage.get(&metric)?;

        if let Some(storage) = series_map.get(&tags) {
            return Some(storage.handle());
        }

        // `entry` keeps two racing writers from each installing their own storage.
        let storage = series_map
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    fn handle_for(&self, name: &str, kind: MetricKind, tags: &Tags) -> Option<MetricHandle> {
        let metric = match self.register(name, kind) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(metric = name, %err, "dropping sample");
                return None;
            }
        };
        self.get_handle(metric, self.resolve_tags(tags))
    }

    pub fn observe_trend(&self, name: &str, value: f64, tags: &Tags) {
        if !value.is_finite() {
            tracing::warn!(metric = name, value, "dropping non-finite trend sample");
            return;
        }
        if let Some(h) = self.handle_for(name, MetricKind::Trend, tags) {
            h.observe_trend(value);
        }
    }

    pub fn observe_rate(&self, name: &str, hit: bool, tags: &Tags) {
        if let Some(h) = self.handle_for(name, MetricKind::Rate, tags) {
            h.observe_rate(hit);
        }
    }

    pub fn increment_counter(&self, name: &str, delta: u64, tags: &Tags) {
        if let Some(h) = self.handle_for(name, MetricKind::Counter, tags) {
            h.increment(delta);
        }
    }

    pub fn adjust_gauge(&self, name: &str, delta: i64, tags: &Tags) {
        if let Some(h) = self.handle_for(name, MetricKind::Gauge, tags) {
            h.adjust_gauge(delta);
        }
    }

    /// Builds the immutable end-of-run view. Only the first call succeeds.
    pub fn snapshot(&self) -> Result<Snapshot> {
        if self.snapshot_taken.swap(true, Ordering::AcqRel) {
            return Err(Error::SnapshotTaken);
        }

        let defs = self.defs.read();
        let mut merged: BTreeMap<String, RawSeries> = BTreeMap::new();
        let mut series: Vec<SeriesSummary> = Vec::new();

        for entry in self.storage.iter() {
            let Some(def) = defs.get(entry.key().0 as usize) else {
                continue;
            };
            let name = self.interner.resolve_string(def.name);
            let acc = merged
                .entry(name.clone())
                .or_insert_with(|| RawSeries::empty(def.kind));

            for s in entry.value().iter() {
                let raw = s.value().raw();
                acc.merge(raw.clone());

                let mut tags: Vec<(String, String)> = s
                    .key()
                    .iter()
                    .map(|(k, v)| {
                        (
                            self.interner.resolve_string(k),
                            self.interner.resolve_string(v),
                        )
                    })
                    .collect();
                tags.sort();

                series.push(SeriesSummary {
                    name: name.clone(),
                    tags,
                    value: raw.into_aggregate(),
                });
            }
        }

        series.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));

        Ok(Snapshot::new(
            merged
                .into_iter()
                .map(|(name, raw)| (name, raw.into_aggregate()))
                .collect(),
            series,
        ))
    }
}

fn check_kind(
    name: &str,
    id: MetricId,
    registered: MetricKind,
    requested: MetricKind,
) -> Result<MetricId> {
    if registered == requested {
        Ok(id)
    } else {
        Err(Error::KindMismatch {
            name: name.to_string(),
            registered,
            requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Aggregate;
    use std::sync::Arc;

    fn tags(component: &str) -> Tags {
        Tags::new(1, 0, Arc::from("ultralight"), Arc::from(component))
    }

    #[test]
    fn register_returns_same_id_for_same_kind() {
        let reg = Registry::default();
        let a = reg
            .register("total_requests", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        let b = reg
            .register("total_requests", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a, b);
        assert_eq!(reg.lookup("total_requests"), Some((a, MetricKind::Counter)));
        assert_eq!(reg.lookup("iterations"), None);
    }

    #[test]
    fn handles_write_without_reregistering() {
        let reg = Registry::default();
        let id = reg
            .register("iterations", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        let series = reg.resolve_tags(&tags("homepage"));
        let handle = reg
            .get_handle(id, series.clone())
            .unwrap_or_else(|| panic!("missing handle"));
        handle.increment(2);
        reg.increment_counter("iterations", 3, &tags("homepage"));

        let snap = reg.snapshot().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(snap.counter("iterations"), Some(5));
        assert_eq!(snap.series().len(), 1);
    }

    #[test]
    fn register_rejects_kind_mismatch() {
        let reg = Registry::default();
        let _ = reg.register("errors", MetricKind::Rate);
        let err = match reg.register("errors", MetricKind::Trend) {
            Ok(_) => panic!("expected kind mismatch"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("registered as rate"));
    }

    #[test]
    fn mismatched_writes_are_dropped() {
        let reg = Registry::default();
        reg.observe_rate("errors", true, &tags("homepage"));
        reg.observe_trend("errors", 10.0, &tags("homepage"));

        let snap = reg.snapshot().unwrap_or_else(|e| panic!("{e}"));
        match snap.get("errors") {
            Some(Aggregate::Rate(r)) => assert_eq!(r.total, 1),
            other => panic!("unexpected aggregate: {other:?}"),
        }
    }

    #[test]
    fn series_are_merged_per_metric_name() {
        let reg = Registry::default();
        reg.increment_counter("total_requests", 2, &tags("homepage"));
        reg.increment_counter("total_requests", 3, &tags("checkout"));
        reg.observe_trend("response_time", 30.0, &tags("homepage"));
        reg.observe_trend("response_time", 10.0, &tags("checkout"));
        reg.observe_trend("response_time", 20.0, &tags("checkout"));

        let snap = reg.snapshot().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(snap.get("total_requests"), Some(&Aggregate::Counter(5)));

        let Some(Aggregate::Trend(t)) = snap.get("response_time") else {
            panic!("expected trend");
        };
        assert_eq!(t.samples(), &[10.0, 20.0, 30.0]);

        let per_component: Vec<_> = snap
            .series()
            .iter()
            .filter(|s| s.name == "total_requests")
            .map(|s| (s.tag("component").unwrap_or_default().to_string(), s.value.clone()))
            .collect();
        assert_eq!(
            per_component,
            vec![
                ("checkout".to_string(), Aggregate::Counter(3)),
                ("homepage".to_string(), Aggregate::Counter(2)),
            ]
        );
    }

    #[test]
    fn snapshot_is_taken_once() {
        let reg = Registry::default();
        reg.adjust_gauge("active_users", 1, &tags("homepage"));
        assert!(reg.snapshot().is_ok());
        assert!(matches!(reg.snapshot(), Err(Error::SnapshotTaken)));
    }

    #[test]
    fn non_finite_trend_samples_are_ignored() {
        let reg = Registry::default();
        reg.observe_trend("response_time", f64::NAN, &tags("homepage"));
        reg.observe_trend("response_time", 5.0, &tags("homepage"));

        let snap = reg.snapshot().unwrap_or_else(|e| panic!("{e}"));
        let Some(Aggregate::Trend(t)) = snap.get("response_time") else {
            panic!("expected trend");
        };
        assert_eq!(t.count(), 1);
    }
}

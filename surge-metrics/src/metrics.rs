use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Trend,
    Rate,
    Counter,
    Gauge,
}

/// Final value of one metric (or one series of a metric).
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Trend(TrendSummary),
    Rate(RateSummary),
    Counter(u64),
    Gauge(GaugeSummary),
}

impl Aggregate {
    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Trend(_) => MetricKind::Trend,
            Self::Rate(_) => MetricKind::Rate,
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// Distribution of every value observed by a trend.
///
/// Percentiles use the nearest-rank definition over the full, sorted sample set:
/// `rank = ceil(p / 100 * n)` and the result is the `rank`-th smallest sample. Both the
/// percentiles and the mean depend only on the multiset of samples, never on the order in
/// which concurrent writers recorded them.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    sorted: Arc<[f64]>,
    sum: f64,
}

impl TrendSummary {
    pub(crate) fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.sort_by(f64::total_cmp);
        let sum = samples.iter().sum();
        Self {
            sorted: Arc::from(samples),
            sum,
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.sorted.len() as u64
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    #[must_use]
    pub fn avg(&self) -> Option<f64> {
        (!self.sorted.is_empty()).then(|| self.sum / self.sorted.len() as f64)
    }

    #[must_use]
    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Nearest-rank percentile; `None` for an empty trend or `p` outside `(0, 100]`.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.sorted.is_empty() || !(p > 0.0 && p <= 100.0) {
            return None;
        }

        let n = self.sorted.len();
        let rank = (p * n as f64 / 100.0).ceil() as usize;
        let idx = rank.clamp(1, n) - 1;
        self.sorted.get(idx).copied()
    }

    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.sorted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateSummary {
    pub hits: u64,
    pub total: u64,
}

impl RateSummary {
    /// Fraction of `true` observations, `None` when nothing was observed.
    #[must_use]
    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GaugeSummary {
    /// Level at snapshot time.
    pub value: i64,
    /// Highest level reached during the run.
    pub max: i64,
}

#[derive(Debug, Default)]
pub struct Rate {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

#[derive(Debug, Default)]
pub struct Gauge {
    pub value: AtomicI64,
    pub max: AtomicI64,
}

impl Gauge {
    pub fn adjust(&self, delta: i64) -> i64 {
        let new_value = self.value.fetch_add(delta, Ordering::Relaxed).saturating_add(delta);

        // CAS loop to keep the max without races.
        let mut cur = self.max.load(Ordering::Relaxed);
        while new_value > cur {
            match self.max.compare_exchange_weak(
                cur,
                new_value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }

        new_value
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Trend(Arc<Mutex<Vec<f64>>>),
    Rate(Arc<Rate>),
    Counter(Arc<AtomicU64>),
    Gauge(Arc<Gauge>), // Supports negative values
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Trend => MetricStorage::Trend(Arc::new(Mutex::new(Vec::new()))),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(Rate::default())),
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => MetricStorage::Gauge(Arc::new(Gauge::default())),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            MetricStorage::Trend(a) => MetricHandle::Trend(a.clone()),
            MetricStorage::Rate(a) => MetricHandle::Rate(a.clone()),
            MetricStorage::Counter(a) => MetricHandle::Counter(a.clone()),
            MetricStorage::Gauge(a) => MetricHandle::Gauge(a.clone()),
        }
    }

    pub(crate) fn raw(&self) -> RawSeries {
        match self {
            MetricStorage::Trend(t) => RawSeries::Trend(t.lock().clone()),
            MetricStorage::Rate(r) => RawSeries::Rate(RateSummary {
                hits: r.hits.load(Ordering::Relaxed),
                total: r.total.load(Ordering::Relaxed),
            }),
            MetricStorage::Counter(c) => RawSeries::Counter(c.load(Ordering::Relaxed)),
            MetricStorage::Gauge(g) => RawSeries::Gauge(GaugeSummary {
                value: g.value.load(Ordering::Relaxed),
                max: g.max.load(Ordering::Relaxed),
            }),
        }
    }
}

/// Point-in-time copy of one series, before trend samples are sorted.
#[derive(Debug, Clone)]
pub(crate) enum RawSeries {
    Trend(Vec<f64>),
    Rate(RateSummary),
    Counter(u64),
    Gauge(GaugeSummary),
}

impl RawSeries {
    pub(crate) fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Trend => Self::Trend(Vec::new()),
            MetricKind::Rate => Self::Rate(RateSummary::default()),
            MetricKind::Counter => Self::Counter(0),
            MetricKind::Gauge => Self::Gauge(GaugeSummary::default()),
        }
    }

    /// Folds another series of the same metric into this one. Every branch is commutative and
    /// associative, so the merge order never changes the result.
    pub(crate) fn merge(&mut self, other: RawSeries) {
        match (self, other) {
            (Self::Trend(a), Self::Trend(b)) => a.extend(b),
            (Self::Rate(a), Self::Rate(b)) => {
                a.hits = a.hits.saturating_add(b.hits);
                a.total = a.total.saturating_add(b.total);
            }
            (Self::Counter(a), Self::Counter(b)) => *a = a.saturating_add(b),
            (Self::Gauge(a), Self::Gauge(b)) => {
                a.value = a.value.saturating_add(b.value);
                a.max = a.max.max(b.max);
            }
            _ => {}
        }
    }

    pub(crate) fn into_aggregate(self) -> Aggregate {
        match self {
            Self::Trend(samples) => Aggregate::Trend(TrendSummary::from_samples(samples)),
            Self::Rate(r) => Aggregate::Rate(r),
            Self::Counter(c) => Aggregate::Counter(c),
            Self::Gauge(g) => Aggregate::Gauge(g),
        }
    }
}

/// Write handle for one series.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Trend(Arc<Mutex<Vec<f64>>>),
    Rate(Arc<Rate>),
    Counter(Arc<AtomicU64>),
    Gauge(Arc<Gauge>),
}

impl MetricHandle {
    #[inline]
    pub fn observe_trend(&self, value: f64) {
        if let MetricHandle::Trend(t) = self {
            t.lock().push(value);
        }
    }

    #[inline]
    pub fn observe_rate(&self, hit: bool) {
        if let MetricHandle::Rate(r) = self {
            if hit {
                r.hits.fetch_add(1, Ordering::Relaxed);
            }
            r.total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn increment(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn adjust_gauge(&self, delta: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.adjust(delta);
        }
    }

    pub fn get_gauge(&self) -> i64 {
        if let MetricHandle::Gauge(g) = self {
            g.value.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

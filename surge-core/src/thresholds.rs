use std::fmt;

use surge_metrics::{Aggregate, Snapshot};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Comparator {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "==")]
    Eq,
}

impl Comparator {
    fn compare(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Eq => left == right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Percentile(f64),
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

/// One pass/fail criterion on one metric, e.g. `response_time p(95)<2000`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: String,
    pub aggregation: Aggregation,
    pub comparator: Comparator,
    pub limit: f64,
}

impl ThresholdSpec {
    pub fn new(
        metric: impl Into<String>,
        aggregation: Aggregation,
        comparator: Comparator,
        limit: f64,
    ) -> Self {
        Self {
            metric: metric.into(),
            aggregation,
            comparator,
            limit,
        }
    }

    /// Parses a k6-style expression such as `p(95)<2000` or `rate < 0.01`.
    pub fn parse(metric: &str, expr: &str) -> Result<Self> {
        let invalid = |error: String| Error::InvalidThreshold {
            metric: metric.to_string(),
            error,
        };

        let s: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        if s.is_empty() {
            return Err(invalid("empty threshold".to_string()));
        }

        let ops = [
            ("<=", Comparator::Lte),
            (">=", Comparator::Gte),
            ("==", Comparator::Eq),
            ("<", Comparator::Lt),
            (">", Comparator::Gt),
        ];
        let (op_pos, op_len, comparator) = ops
            .iter()
            .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
            .ok_or_else(|| invalid(format!("missing comparator in `{expr}`")))?;

        let (left, right_with_op) = s.split_at(op_pos);
        let right = &right_with_op[op_len..];
        if left.is_empty() || right.is_empty() {
            return Err(invalid(format!("malformed expression `{expr}`")));
        }

        let aggregation = match left.to_ascii_lowercase().as_str() {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            "count" => Aggregation::Count,
            "rate" => Aggregation::Rate,
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|v| v.strip_suffix(')'))
                    .ok_or_else(|| invalid(format!("unknown aggregation `{left}`")))?;
                let p: f64 = inner
                    .parse()
                    .map_err(|_| invalid(format!("invalid percentile `{inner}`")))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(invalid(format!("percentile {p} out of range (0, 100]")));
                }
                Aggregation::Percentile(p)
            }
        };

        let limit: f64 = right
            .parse()
            .map_err(|_| invalid(format!("invalid limit `{right}`")))?;
        if !limit.is_finite() {
            return Err(invalid(format!("limit `{right}` is not finite")));
        }

        Ok(Self::new(metric, aggregation, comparator, limit))
    }

    pub fn expression(&self) -> String {
        format!("{}{}{}", self.aggregation, self.comparator, self.limit)
    }
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.metric, self.expression())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub spec: ThresholdSpec,
    pub actual: Option<f64>,
    pub passed: bool,
}

/// Thresholds applied to every scenario.
pub fn default_thresholds() -> Vec<ThresholdSpec> {
    vec![
        ThresholdSpec::new("errors", Aggregation::Rate, Comparator::Lt, 0.01),
        ThresholdSpec::new(
            "response_time",
            Aggregation::Percentile(95.0),
            Comparator::Lt,
            2000.0,
        ),
        ThresholdSpec::new(
            "response_time",
            Aggregation::Percentile(99.0),
            Comparator::Lt,
            3000.0,
        ),
        ThresholdSpec::new("successes", Aggregation::Rate, Comparator::Gt, 0.99),
    ]
}

/// Evaluates every spec against the final snapshot, preserving input order.
///
/// A missing metric, or an aggregation that makes no sense for the metric's kind, fails with
/// no actual value.
pub fn evaluate(snapshot: &Snapshot, specs: &[ThresholdSpec]) -> Vec<ThresholdResult> {
    specs
        .iter()
        .map(|spec| {
            let actual = snapshot
                .get(&spec.metric)
                .and_then(|agg| observed_value(agg, spec.aggregation));
            let passed = actual.is_some_and(|v| spec.comparator.compare(v, spec.limit));
            ThresholdResult {
                spec: spec.clone(),
                actual,
                passed,
            }
        })
        .collect()
}

fn observed_value(agg: &Aggregate, aggregation: Aggregation) -> Option<f64> {
    match (agg, aggregation) {
        (Aggregate::Trend(t), Aggregation::Avg) => t.avg(),
        (Aggregate::Trend(t), Aggregation::Min) => t.min(),
        (Aggregate::Trend(t), Aggregation::Max) => t.max(),
        (Aggregate::Trend(t), Aggregation::Med) => t.med(),
        (Aggregate::Trend(t), Aggregation::Count) => Some(t.count() as f64),
        (Aggregate::Trend(t), Aggregation::Percentile(p)) => t.percentile(p),

        (Aggregate::Rate(r), Aggregation::Rate) => r.rate(),
        (Aggregate::Rate(r), Aggregation::Count) => Some(r.total as f64),

        (Aggregate::Counter(v), Aggregation::Count) => Some(*v as f64),

        (Aggregate::Gauge(g), Aggregation::Avg) => Some(g.value as f64),
        (Aggregate::Gauge(g), Aggregation::Max) => Some(g.max as f64),

        (_, _) => None,
    }
}

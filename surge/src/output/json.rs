use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use surge_core::{Aggregate, LoadProfile, ProgressUpdate, Report};

use super::{OutputFormatter, RunHeader};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _header: &RunHeader<'_>) {}

    fn progress(&self, _header: &RunHeader<'_>) -> Option<surge_core::ProgressFn> {
        Some(Arc::new(move |u| {
            emit_json_line(&build_progress_line(&u));
        }))
    }

    fn print_summary(&self, report: &Report) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(report));
        Ok(())
    }

    fn print_profiles(&self, profiles: &[LoadProfile]) -> anyhow::Result<()> {
        emit_json_line(&JsonProfilesLine {
            kind: "profiles",
            profiles: profiles.iter().map(JsonProfile::from).collect(),
        });
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub state: String,
    pub target_vus: u64,
    pub active_vus: u64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        state: u.state.to_string(),
        target_vus: u.target_vus,
        active_vus: u.active_vus,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub profile: String,
    pub scenario: String,
    pub duration_minutes: f64,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub peak_vus: u64,
    pub passed: bool,
    pub metrics: BTreeMap<String, JsonMetric>,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonMetric {
    Trend {
        count: u64,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
    Rate {
        rate: Option<f64>,
        hits: u64,
        total: u64,
    },
    Counter {
        value: u64,
    },
    Gauge {
        value: i64,
        max: i64,
    },
}

impl From<&Aggregate> for JsonMetric {
    fn from(agg: &Aggregate) -> Self {
        match agg {
            Aggregate::Trend(t) => Self::Trend {
                count: t.count(),
                avg: t.avg(),
                min: t.min(),
                med: t.med(),
                max: t.max(),
                p90: t.percentile(90.0),
                p95: t.percentile(95.0),
                p99: t.percentile(99.0),
            },
            Aggregate::Rate(r) => Self::Rate {
                rate: r.rate(),
                hits: r.hits,
                total: r.total,
            },
            Aggregate::Counter(value) => Self::Counter { value: *value },
            Aggregate::Gauge(g) => Self::Gauge {
                value: g.value,
                max: g.max,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub actual: Option<f64>,
    pub passed: bool,
}

fn build_summary_line(report: &Report) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        profile: report.profile_name.clone(),
        scenario: report.scenario_name.clone(),
        duration_minutes: report.duration_minutes,
        elapsed_secs: report.elapsed.as_secs_f64(),
        cancelled: report.cancelled,
        peak_vus: report.peak_vus,
        passed: report.passed(),
        metrics: report
            .aggregates
            .iter()
            .map(|(name, agg)| (name.to_string(), JsonMetric::from(agg)))
            .collect(),
        thresholds: report
            .threshold_results
            .iter()
            .map(|r| JsonThreshold {
                metric: r.spec.metric.clone(),
                expression: r.spec.expression(),
                actual: r.actual,
                passed: r.passed,
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProfilesLine {
    pub kind: &'static str,
    pub profiles: Vec<JsonProfile>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProfile {
    pub name: String,
    pub base_vus: u64,
    pub max_vus: u64,
    pub ramp_up_step: u64,
    pub think_time_min_secs: f64,
    pub think_time_max_secs: f64,
    pub duration_minutes: f64,
    pub stages: Vec<JsonStage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    pub duration_secs: f64,
    pub target: u64,
}

impl From<&LoadProfile> for JsonProfile {
    fn from(p: &LoadProfile) -> Self {
        Self {
            name: p.name.clone(),
            base_vus: p.base_vus,
            max_vus: p.max_vus,
            ramp_up_step: p.ramp_up_step,
            think_time_min_secs: p.think_time_min.as_secs_f64(),
            think_time_max_secs: p.think_time_max.as_secs_f64(),
            duration_minutes: surge_core::profile::total_duration_minutes(p),
            stages: p
                .stages
                .iter()
                .map(|s| JsonStage {
                    duration_secs: s.duration.as_secs_f64(),
                    target: s.target,
                })
                .collect(),
        }
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;
    use surge_core::RunState;

    #[test]
    fn progress_line_has_kind_and_state() {
        let line = build_progress_line(&ProgressUpdate {
            tick: 3,
            elapsed: Duration::from_millis(1_500),
            state: RunState::Ramping(1),
            target_vus: 12,
            active_vus: 11,
        });
        let v = serde_json::to_value(&line).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v["kind"], "progress");
        assert_eq!(v["state"], "ramping(1)");
        assert_eq!(v["elapsed_secs"], 1.5);
        assert_eq!(v["active_vus"], 11);
    }

    #[test]
    fn metrics_are_tagged_by_type() {
        let v: Value = serde_json::to_value(JsonMetric::Gauge { value: 0, max: 40 })
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v["type"], "gauge");
        assert_eq!(v["max"], 40);
    }

    #[test]
    fn profiles_serialize_stages() {
        let p = surge_core::profile::resolve("ultralight");
        let v = serde_json::to_value(JsonProfile::from(&p)).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v["name"], "ultralight");
        assert_eq!(v["max_vus"], 50);
        assert_eq!(v["duration_minutes"], 6.0);
        assert_eq!(v["stages"][0]["duration_secs"], 30.0);
        assert_eq!(v["stages"][0]["target"], 10);
    }
}

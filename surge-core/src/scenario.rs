//! The contract between the engine and caller-supplied scenarios.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use surge_metrics::MetricKind;

use crate::thresholds::ThresholdSpec;

/// Static description of a scenario, read once before the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioMeta {
    pub name: String,
    /// Component tag attached to every sample.
    pub component: String,
    /// Fixed pause added on top of the profile's random think time.
    pub think_time_extension: Duration,
    /// Evaluated in addition to the default thresholds.
    pub thresholds: Vec<ThresholdSpec>,
}

impl ScenarioMeta {
    pub fn new(name: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component: component.into(),
            think_time_extension: Duration::ZERO,
            thresholds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_think_time_extension(mut self, extension: Duration) -> Self {
        self.think_time_extension = extension;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, spec: ThresholdSpec) -> Self {
        self.thresholds.push(spec);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub passed: bool,
}

/// A scenario-declared observation, recorded alongside the built-in metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    /// Extension tags; `profile` and `component` are always set by the engine.
    pub tags: BTreeMap<String, String>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            tags: BTreeMap::new(),
        }
    }

    pub fn trend(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Trend, value)
    }

    pub fn rate(name: impl Into<String>, hit: bool) -> Self {
        Self::new(name, MetricKind::Rate, if hit { 1.0 } else { 0.0 })
    }

    pub fn counter(name: impl Into<String>, delta: u64) -> Self {
        Self::new(name, MetricKind::Counter, delta as f64)
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// What a scenario reports for one iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationOutcome {
    /// Overrides the engine's wall-clock measurement when set.
    pub elapsed: Option<Duration>,
    pub checks: Vec<Check>,
    pub samples: Vec<MetricSample>,
}

impl IterationOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn check(mut self, name: impl Into<String>, passed: bool) -> Self {
        self.checks.push(Check {
            name: name.into(),
            passed,
        });
        self
    }

    #[must_use]
    pub fn sample(mut self, sample: MetricSample) -> Self {
        self.samples.push(sample);
        self
    }

    #[must_use]
    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Every check passed. An iteration without checks counts as a success.
    pub fn all_checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ScenarioError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum VuState {
    /// Between iterations, including think time.
    Idle,
    /// Inside `Scenario::iterate`.
    Running,
    /// Asked to stop; finishes the current iteration first.
    Retiring,
}

/// Per-iteration view of a virtual user handed to [`Scenario::iterate`].
#[derive(Debug, Clone)]
pub struct VuContext {
    pub vu_id: u64,
    pub iteration: u64,
    pub state: VuState,
    pub profile: Arc<str>,
    pub component: Arc<str>,
    pub base_url: Arc<str>,
}

/// A caller-supplied workload.
///
/// `setup` runs once before the ramp starts and `teardown` once after the run completes.
/// `iterate` may fail: errors and panics are converted into failed iterations by the engine.
pub trait Scenario: Send + Sync + 'static {
    fn meta(&self) -> ScenarioMeta;

    fn setup(&self) -> impl Future<Output = Result<(), ScenarioError>> + Send {
        async { Ok(()) }
    }

    fn iterate(
        &self,
        ctx: &VuContext,
    ) -> impl Future<Output = Result<IterationOutcome, ScenarioError>> + Send;

    fn teardown(&self) -> impl Future<Output = Result<(), ScenarioError>> + Send {
        async { Ok(()) }
    }
}

mod config;
mod engine;
mod error;
mod progress;
mod report;
mod scenario;
mod schedule;
mod scheduler;
mod signal;
mod thresholds;

pub mod profile;

pub use config::{
    Component, DEFAULT_BASE_URL, DEFAULT_ITERATION_TIMEOUT, ResolvedTarget, RunConfig,
    ScenarioOverrides,
};
pub use engine::{
    ACTIVE_USERS, BUILTIN_METRICS, CHECK_TAG, CHECKS, ERRORS, ITERATIONS, Outcome,
    RESPONSE_TIME, SUCCESSES, TOTAL_REQUESTS, ThinkTime,
};
pub use error::{Error, Result};
pub use profile::{LoadProfile, Stage};
pub use progress::{ProgressFn, ProgressUpdate, RunState};
pub use report::Report;
pub use scenario::{
    Check, IterationOutcome, MetricSample, Scenario, ScenarioError, ScenarioMeta, VuContext,
    VuState,
};
pub use schedule::{RampSchedule, StageSnapshot};
pub use scheduler::{Scheduler, SchedulerOptions};
pub use signal::{CancelHandle, Signal};
pub use thresholds::{
    Aggregation, Comparator, ThresholdResult, ThresholdSpec, default_thresholds, evaluate,
};
pub use surge_metrics::{Aggregate, MetricKind, Snapshot};

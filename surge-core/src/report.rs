use std::time::Duration;

use surge_metrics::Snapshot;

use crate::thresholds::ThresholdResult;

/// Final, immutable result of a run.
#[derive(Debug, Clone)]
pub struct Report {
    pub profile_name: String,
    pub scenario_name: String,
    /// Planned length: the sum of the profile's stage durations.
    pub duration_minutes: f64,
    /// Wall-clock time from ramp start to completion.
    pub elapsed: Duration,
    pub aggregates: Snapshot,
    pub threshold_results: Vec<ThresholdResult>,
    pub cancelled: bool,
    /// Highest `active_users` level observed.
    pub peak_vus: u64,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.threshold_results.iter().all(|r| r.passed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> + '_ {
        self.threshold_results.iter().filter(|r| !r.passed)
    }
}

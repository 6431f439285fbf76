//! Network-free scenario that simulates a page flow's latency and failures.

use std::time::Duration;

use rand::Rng;
use surge_core::{
    Component, IterationOutcome, MetricSample, ResolvedTarget, Scenario, ScenarioError,
    ScenarioMeta, VuContext,
};

#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    target: ResolvedTarget,
    latency: Duration,
    jitter: Duration,
    failure_rate: f64,
}

impl SyntheticScenario {
    pub fn new(
        target: ResolvedTarget,
        latency: Duration,
        jitter: Duration,
        failure_rate: f64,
    ) -> Self {
        Self {
            target,
            latency,
            jitter,
            failure_rate,
        }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> (Duration, bool) {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        let failed = self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate.min(1.0));
        (self.latency.saturating_add(extra), failed)
    }
}

impl Scenario for SyntheticScenario {
    fn meta(&self) -> ScenarioMeta {
        let mut meta = ScenarioMeta::new(
            format!("synthetic_{}", self.target.component),
            self.target.component.to_string(),
        )
        .with_think_time_extension(self.target.think_time_extension);
        for spec in self.target.component.thresholds() {
            meta = meta.with_threshold(spec);
        }
        meta
    }

    async fn setup(&self) -> Result<(), ScenarioError> {
        tracing::info!(
            component = %self.target.component,
            url = %self.target.url,
            latency_ms = self.latency.as_millis() as u64,
            failure_rate = self.failure_rate,
            "synthetic scenario ready"
        );
        Ok(())
    }

    async fn iterate(&self, ctx: &VuContext) -> Result<IterationOutcome, ScenarioError> {
        let (latency, failed) = self.draw(&mut rand::thread_rng());
        tokio::time::sleep(latency).await;

        let status = if failed { 503 } else { 200 };
        tracing::trace!(
            vu_id = ctx.vu_id,
            iteration = ctx.iteration,
            url = %self.target.url,
            status,
            "simulated request"
        );

        let mut outcome = IterationOutcome::new()
            .check("status is 200", status == 200)
            .check("body not empty", !failed);

        if self.target.component == Component::SearchFlow {
            outcome = outcome
                .sample(MetricSample::trend(
                    "search_response_time",
                    latency.as_secs_f64() * 1000.0,
                ))
                .sample(MetricSample::counter("total_requests", 1));
        }

        Ok(outcome)
    }
}

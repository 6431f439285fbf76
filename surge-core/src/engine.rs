//! Per-virtual-user execution: iterate, record, think, repeat.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use surge_metrics::{MetricHandle, MetricId, MetricKind, Registry, Tags};
use tokio::time::Instant;

use crate::scenario::{IterationOutcome, MetricSample, Scenario, VuContext, VuState};
use crate::signal::{CancelHandle, Signal};

pub const RESPONSE_TIME: &str = "response_time";
pub const SUCCESSES: &str = "successes";
pub const ERRORS: &str = "errors";
pub const TOTAL_REQUESTS: &str = "total_requests";
pub const ITERATIONS: &str = "iterations";
pub const CHECKS: &str = "checks";
pub const ACTIVE_USERS: &str = "active_users";

/// Extension tag carrying the check name on `checks` samples.
pub const CHECK_TAG: &str = "check";

/// Metrics every run records, with their kinds.
pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (RESPONSE_TIME, MetricKind::Trend),
    (SUCCESSES, MetricKind::Rate),
    (ERRORS, MetricKind::Rate),
    (TOTAL_REQUESTS, MetricKind::Counter),
    (ITERATIONS, MetricKind::Counter),
    (CHECKS, MetricKind::Rate),
    (ACTIVE_USERS, MetricKind::Gauge),
];

/// Ids of the built-in metrics, resolved once per run so VUs write through handles.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BuiltinIds {
    response_time: MetricId,
    successes: MetricId,
    errors: MetricId,
    total_requests: MetricId,
    iterations: MetricId,
    checks: MetricId,
    active_users: MetricId,
}

impl BuiltinIds {
    pub(crate) fn register(registry: &Registry) -> surge_metrics::Result<Self> {
        Ok(Self {
            response_time: registry.register(RESPONSE_TIME, MetricKind::Trend)?,
            successes: registry.register(SUCCESSES, MetricKind::Rate)?,
            errors: registry.register(ERRORS, MetricKind::Rate)?,
            total_requests: registry.register(TOTAL_REQUESTS, MetricKind::Counter)?,
            iterations: registry.register(ITERATIONS, MetricKind::Counter)?,
            checks: registry.register(CHECKS, MetricKind::Rate)?,
            active_users: registry.register(ACTIVE_USERS, MetricKind::Gauge)?,
        })
    }
}

/// Result of one guarded call to [`Scenario::iterate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(IterationOutcome),
    /// The scenario returned an error or panicked.
    Exception(String),
    TimedOut,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(o) if o.all_checks_passed())
    }
}

/// Random pause between iterations: uniform in `[min, max]` plus a fixed extension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
    pub extension: Duration,
}

impl ThinkTime {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_secs_f64();
        let max = self.max.as_secs_f64();
        let base = if max > min {
            rng.gen_range(min..=max)
        } else {
            min
        };
        Duration::from_secs_f64(base).saturating_add(self.extension)
    }
}

/// Control block shared between a virtual user task and the scheduler.
#[derive(Debug, Default)]
pub(crate) struct VuSlot {
    retire: Signal,
    running: AtomicBool,
}

impl VuSlot {
    pub(crate) fn retire(&self) {
        self.retire.fire();
    }

    pub(crate) fn state(&self) -> VuState {
        if self.retire.is_fired() {
            VuState::Retiring
        } else if self.running.load(Ordering::Acquire) {
            VuState::Running
        } else {
            VuState::Idle
        }
    }
}

/// Keeps `active_users` up for as long as a virtual user task is alive.
struct ActiveVuGuard {
    gauge: Option<MetricHandle>,
}

impl ActiveVuGuard {
    fn enter(gauge: Option<MetricHandle>) -> Self {
        if let Some(g) = &gauge {
            g.adjust_gauge(1);
        }
        Self { gauge }
    }
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        if let Some(g) = &self.gauge {
            g.adjust_gauge(-1);
        }
    }
}

/// Everything a virtual user needs, shared by all of them.
pub(crate) struct Engine<S> {
    pub(crate) scenario: Arc<S>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) builtin: BuiltinIds,
    pub(crate) profile: Arc<str>,
    pub(crate) component: Arc<str>,
    pub(crate) base_url: Arc<str>,
    pub(crate) think_time: ThinkTime,
    pub(crate) iteration_timeout: Duration,
    pub(crate) cancel: CancelHandle,
}

impl<S: Scenario> Engine<S> {
    pub(crate) async fn run_vu(self: Arc<Self>, vu_id: u64, slot: Arc<VuSlot>) {
        let tags = Tags::new(vu_id, 0, self.profile.clone(), self.component.clone());
        let _active = ActiveVuGuard::enter(self.handle(self.builtin.active_users, &tags));
        tracing::debug!(vu_id, "virtual user started");

        let mut iteration: u64 = 0;
        while !slot.retire.is_fired() && !self.cancel.is_cancelled() {
            slot.running.store(true, Ordering::Release);
            let ctx = VuContext {
                vu_id,
                iteration,
                state: slot.state(),
                profile: self.profile.clone(),
                component: self.component.clone(),
                base_url: self.base_url.clone(),
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(vu_id, iteration, "dropping in-flight iteration");
                    break;
                }
                outcome = self.call(&ctx) => outcome,
            };
            self.record(&ctx, &outcome, started.elapsed());
            slot.running.store(false, Ordering::Release);
            iteration += 1;

            if slot.retire.is_fired() {
                break;
            }

            let pause = self.think_time.sample(&mut rand::thread_rng());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = slot.retire.wait() => break,
                _ = self.cancel.cancelled() => break,
            }
        }

        slot.running.store(false, Ordering::Release);
        tracing::debug!(vu_id, iterations = iteration, "virtual user stopped");
    }

    /// Runs one iteration with panics caught and the timeout applied.
    async fn call(&self, ctx: &VuContext) -> Outcome {
        let guarded = AssertUnwindSafe(self.scenario.iterate(ctx)).catch_unwind();
        match tokio::time::timeout(self.iteration_timeout, guarded).await {
            Err(_) => Outcome::TimedOut,
            Ok(Err(panic)) => Outcome::Exception(panic_message(panic.as_ref())),
            Ok(Ok(Err(err))) => Outcome::Exception(err.to_string()),
            Ok(Ok(Ok(outcome))) => Outcome::Completed(outcome),
        }
    }

    fn record(&self, ctx: &VuContext, outcome: &Outcome, measured: Duration) {
        let tags = Tags::new(
            ctx.vu_id,
            ctx.iteration,
            self.profile.clone(),
            self.component.clone(),
        );

        let elapsed = match outcome {
            Outcome::Completed(o) => o.elapsed.unwrap_or(measured),
            Outcome::Exception(message) => {
                tracing::warn!(
                    vu_id = ctx.vu_id,
                    iteration = ctx.iteration,
                    error = %message,
                    "iteration failed"
                );
                measured
            }
            Outcome::TimedOut => {
                tracing::warn!(
                    vu_id = ctx.vu_id,
                    iteration = ctx.iteration,
                    timeout_ms = self.iteration_timeout.as_millis() as u64,
                    "iteration timed out"
                );
                measured
            }
        };

        let success = outcome.is_success();
        let ids = self.builtin;
        let series = self.registry.resolve_tags(&tags);
        let handle = |metric: MetricId| self.registry.get_handle(metric, series.clone());
        if let Some(h) = handle(ids.response_time) {
            h.observe_trend(elapsed.as_secs_f64() * 1000.0);
        }
        if let Some(h) = handle(ids.successes) {
            h.observe_rate(success);
        }
        if let Some(h) = handle(ids.errors) {
            h.observe_rate(!success);
        }
        for counter in [ids.total_requests, ids.iterations] {
            if let Some(h) = handle(counter) {
                h.increment(1);
            }
        }

        if let Outcome::Completed(o) = outcome {
            for check in &o.checks {
                let tags = tags.clone().with(CHECK_TAG, check.name.as_str());
                if let Some(h) = self.handle(ids.checks, &tags) {
                    h.observe_rate(check.passed);
                }
            }
            for sample in &o.samples {
                self.record_sample(sample, &tags);
            }
        }
    }

    fn handle(&self, metric: MetricId, tags: &Tags) -> Option<MetricHandle> {
        self.registry
            .get_handle(metric, self.registry.resolve_tags(tags))
    }

    fn record_sample(&self, sample: &MetricSample, base: &Tags) {
        let tags = sample
            .tags
            .iter()
            .fold(base.clone(), |t, (k, v)| t.with(k.as_str(), v.as_str()));
        let r = &self.registry;
        let name = sample.name.as_str();

        match sample.kind {
            MetricKind::Trend => r.observe_trend(name, sample.value, &tags),
            MetricKind::Rate => r.observe_rate(name, sample.value != 0.0, &tags),
            MetricKind::Counter if sample.value.is_finite() && sample.value >= 0.0 => {
                r.increment_counter(name, sample.value as u64, &tags);
            }
            MetricKind::Counter => {
                tracing::warn!(metric = name, value = sample.value, "dropping invalid counter delta");
            }
            MetricKind::Gauge => r.adjust_gauge(name, sample.value as i64, &tags),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn think_time_stays_within_bounds() {
        let think = ThinkTime {
            min: Duration::from_secs(3),
            max: Duration::from_secs(6),
            extension: Duration::from_secs(3),
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let d = think.sample(&mut rng).as_secs_f64();
            assert!((6.0..=9.0).contains(&d), "think time {d} out of bounds");
        }
    }

    #[test]
    fn fixed_think_time_when_range_is_empty() {
        let think = ThinkTime {
            min: Duration::from_secs(2),
            max: Duration::from_secs(2),
            extension: Duration::from_millis(500),
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(think.sample(&mut rng), Duration::from_millis(2_500));
    }

    #[test]
    fn outcome_success() {
        assert!(Outcome::Completed(IterationOutcome::new().check("ok", true)).is_success());
        assert!(!Outcome::Completed(IterationOutcome::new().check("ok", false)).is_success());
        assert!(!Outcome::Exception("boom".into()).is_success());
        assert!(!Outcome::TimedOut.is_success());
    }

    #[test]
    fn panic_payloads_are_described() {
        assert_eq!(panic_message(&"boom"), "panic: boom");
        assert_eq!(panic_message(&String::from("bang")), "panic: bang");
        assert_eq!(panic_message(&42_u8), "panic");
    }

    #[test]
    fn builtin_ids_match_declared_kinds() {
        let registry = Registry::default();
        let ids = BuiltinIds::register(&registry).unwrap_or_else(|e| panic!("{e}"));
        for (name, kind) in BUILTIN_METRICS {
            assert_eq!(registry.lookup(name).map(|(_, k)| k), Some(*kind), "{name}");
        }
        assert_eq!(
            registry.lookup(ACTIVE_USERS).map(|(id, _)| id),
            Some(ids.active_users)
        );
    }

    #[test]
    fn slot_state_follows_retirement() {
        let slot = VuSlot::default();
        assert_eq!(slot.state(), VuState::Idle);
        slot.running.store(true, Ordering::Release);
        assert_eq!(slot.state(), VuState::Running);
        slot.retire();
        assert_eq!(slot.state(), VuState::Retiring);
    }
}

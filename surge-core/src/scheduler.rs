//! Drives the number of live virtual users along a profile's stages.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use surge_metrics::Registry;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::RunConfig;
use crate::engine::{self, BuiltinIds, Engine, ThinkTime, VuSlot};
use crate::error::{Error, Result};
use crate::profile::{self, LoadProfile};
use crate::progress::{ProgressFn, ProgressUpdate, RunState};
use crate::report::Report;
use crate::scenario::Scenario;
use crate::schedule::RampSchedule;
use crate::signal::CancelHandle;
use crate::thresholds;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// How often the ramp target is re-sampled.
    pub tick: Duration,
    pub iteration_timeout: Duration,
    pub base_url: String,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            tick: Duration::from_secs(1),
            iteration_timeout: config.iteration_timeout,
            base_url: config.base_url.clone(),
        }
    }
}

struct LiveVu {
    id: u64,
    slot: Arc<VuSlot>,
    task: JoinHandle<()>,
}

struct ProgressEmitter {
    f: Option<ProgressFn>,
    tick: u64,
}

impl ProgressEmitter {
    fn emit(&mut self, elapsed: Duration, state: RunState, target_vus: u64, active_vus: u64) {
        let Some(f) = &self.f else {
            return;
        };
        self.tick += 1;
        f(ProgressUpdate {
            tick: self.tick,
            elapsed,
            state,
            target_vus,
            active_vus,
        });
    }
}

pub struct Scheduler<S> {
    profile: LoadProfile,
    scenario: Arc<S>,
    options: SchedulerOptions,
    progress: Option<ProgressFn>,
    cancel: CancelHandle,
}

impl<S: Scenario> Scheduler<S> {
    pub fn new(profile: LoadProfile, scenario: Arc<S>, options: SchedulerOptions) -> Self {
        Self {
            profile,
            scenario,
            options,
            progress: None,
            cancel: CancelHandle::new(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, f: ProgressFn) -> Self {
        self.progress = Some(f);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs the whole profile and returns the report.
    ///
    /// Fails only before the first virtual user is spawned: on a malformed profile, a rejected
    /// threshold or a failing scenario setup.
    pub async fn run(self) -> Result<Report> {
        let Self {
            profile,
            scenario,
            options,
            progress,
            cancel,
        } = self;

        profile.validate()?;
        let meta = scenario.meta();
        let mut specs = thresholds::default_thresholds();
        specs.extend(meta.thresholds.iter().cloned());

        let registry = Arc::new(Registry::default());
        let builtin = BuiltinIds::register(&registry)?;

        tracing::info!(
            profile = %profile.name,
            scenario = %meta.name,
            component = %meta.component,
            max_vus = profile.max_vus,
            stages = profile.stages.len(),
            "starting run"
        );

        scenario
            .setup()
            .await
            .map_err(|e| Error::Setup(e.to_string()))?;

        let engine = Arc::new(Engine {
            scenario: scenario.clone(),
            registry: registry.clone(),
            builtin,
            profile: Arc::from(profile.name.as_str()),
            component: Arc::from(meta.component.as_str()),
            base_url: Arc::from(options.base_url.as_str()),
            think_time: ThinkTime {
                min: profile.think_time_min,
                max: profile.think_time_max,
                extension: meta.think_time_extension,
            },
            iteration_timeout: options.iteration_timeout,
            cancel: cancel.clone(),
        });

        let schedule = RampSchedule::new(0, profile.max_vus, profile.stages.clone());
        let mut emitter = ProgressEmitter {
            f: progress,
            tick: 0,
        };
        let mut pool = Pool {
            engine,
            live: VecDeque::new(),
            retired: Vec::new(),
            next_id: 1,
        };

        let started = Instant::now();
        let mut state = RunState::NotStarted;
        emitter.emit(Duration::ZERO, state, 0, 0);

        let mut interval = tokio::time::interval(options.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut target = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let elapsed = started.elapsed();
            target = schedule.target_at(elapsed);
            pool.reconcile(target);

            let stage = schedule
                .stage_snapshot_at(elapsed)
                .map_or(0, |snap| snap.index);
            if state != RunState::Ramping(stage) {
                state = transition(state, RunState::Ramping(stage));
            }
            emitter.emit(elapsed, state, target, pool.active());

            if schedule.is_done(elapsed) {
                break;
            }
        }

        state = transition(state, RunState::Draining);
        emitter.emit(started.elapsed(), state, target, pool.active());
        pool.drain().await;

        let elapsed = started.elapsed();
        state = transition(state, RunState::Completed);
        emitter.emit(elapsed, state, 0, 0);

        if let Err(err) = scenario.teardown().await {
            tracing::warn!(%err, "scenario teardown failed");
        }

        let aggregates = registry.snapshot()?;
        let threshold_results = thresholds::evaluate(&aggregates, &specs);
        let peak_vus = aggregates
            .gauge(engine::ACTIVE_USERS)
            .map_or(0, |g| g.max.max(0) as u64);

        let report = Report {
            profile_name: profile.name.clone(),
            scenario_name: meta.name.clone(),
            duration_minutes: profile::total_duration_minutes(&profile),
            elapsed,
            aggregates,
            threshold_results,
            cancelled: cancel.is_cancelled(),
            peak_vus,
        };

        tracing::info!(
            profile = %report.profile_name,
            scenario = %report.scenario_name,
            elapsed_ms = elapsed.as_millis() as u64,
            peak_vus,
            passed = report.passed(),
            cancelled = report.cancelled,
            "run completed"
        );

        Ok(report)
    }
}

fn transition(from: RunState, to: RunState) -> RunState {
    tracing::info!(from = %from, to = %to, "run state changed");
    to
}

/// Live virtual users, oldest first, plus retired ones still finishing.
struct Pool<S> {
    engine: Arc<Engine<S>>,
    live: VecDeque<LiveVu>,
    retired: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl<S: Scenario> Pool<S> {
    fn active(&self) -> u64 {
        self.live.len() as u64
    }

    /// Retired VUs still finishing their iteration.
    fn finishing(&self) -> u64 {
        self.retired.len() as u64
    }

    /// Moves the live set towards `target`. Retired VUs that have not finished yet still hold a
    /// slot, so spawns that would overshoot wait for a later tick.
    fn reconcile(&mut self, target: u64) {
        self.retired.retain(|task| !task.is_finished());

        while self.active() > target {
            let Some(vu) = self.live.pop_front() else {
                break;
            };
            vu.slot.retire();
            tracing::debug!(vu_id = vu.id, state = %vu.slot.state(), target, "retiring virtual user");
            self.retired.push(vu.task);
        }

        while self.active() + self.finishing() < target {
            let id = self.next_id;
            self.next_id += 1;
            let slot = Arc::new(VuSlot::default());
            let task = tokio::spawn(self.engine.clone().run_vu(id, slot.clone()));
            tracing::debug!(vu_id = id, target, "spawned virtual user");
            self.live.push_back(LiveVu { id, slot, task });
        }

        if self.active() < target {
            tracing::debug!(
                target,
                active = self.active(),
                finishing = self.finishing(),
                "deferring spawns until retired virtual users finish"
            );
        }
    }

    /// Retires everyone and waits for every task to finish.
    async fn drain(&mut self) {
        self.reconcile(0);
        for task in self.retired.drain(..) {
            if let Err(err) = task.await {
                tracing::warn!(%err, "virtual user task failed");
            }
        }
    }
}

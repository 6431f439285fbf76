use anyhow::Context as _;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use surge_core::{LoadProfile, RunConfig, ScenarioOverrides, Scheduler, SchedulerOptions};

use crate::cli::{ProfilesArgs, RunArgs};
use crate::exit_codes::ExitCode;
use crate::output::{self, RunHeader};
use crate::run_error::RunError;
use crate::synthetic::SyntheticScenario;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let config = run_config(&args);
    config.validate()?;

    let profile = load_profile(&config, &args)?;
    let target = config.target(args.component);

    let scenario = Arc::new(SyntheticScenario::new(
        target.clone(),
        Duration::from_millis(args.latency_ms),
        Duration::from_millis(args.jitter_ms),
        args.failure_rate,
    ));

    let header = RunHeader {
        profile: &profile,
        target: &target,
    };
    out.print_header(&header);

    let mut scheduler = Scheduler::new(
        profile.clone(),
        scenario,
        SchedulerOptions::from_config(&config),
    );
    if let Some(progress) = out.progress(&header) {
        scheduler = scheduler.with_progress(progress);
    }

    let cancel = scheduler.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping run");
            cancel.cancel();
        }
    });

    let result = scheduler.run().await;
    ctrl_c.abort();
    let report = result?;

    out.print_summary(&report)
        .context("failed to print summary")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_thresholds(report.passed()))
}

pub fn profiles(args: ProfilesArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);
    let profiles: Vec<LoadProfile> = surge_core::profile::presets()
        .map(surge_core::profile::resolve)
        .collect();

    out.print_profiles(&profiles)
        .context("failed to print profiles")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::Success)
}

fn run_config(args: &RunArgs) -> RunConfig {
    let mut overrides = BTreeMap::new();
    if args.path.is_some() || args.think_time_extension.is_some() {
        overrides.insert(
            args.component,
            ScenarioOverrides {
                path: args.path.clone(),
                think_time_extension: args.think_time_extension,
            },
        );
    }

    RunConfig {
        profile: args.profile.clone(),
        base_url: args.base_url.clone(),
        ratio: args.ratio,
        iteration_timeout: args.iteration_timeout,
        overrides,
        stages: args.stages.clone(),
    }
}

/// The component's profile. `--stage` targets go through the same reduced-load scaling as the
/// preset's own stages.
fn load_profile(config: &RunConfig, args: &RunArgs) -> Result<LoadProfile, RunError> {
    let profile = config.load_profile(args.component)?;
    profile.validate()?;
    Ok(profile)
}

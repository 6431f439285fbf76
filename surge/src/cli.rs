use clap::{Args, Parser, Subcommand};
use std::str::FromStr;
use std::time::Duration;

use surge_core::{Component, DEFAULT_BASE_URL, Stage};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m)"))
}

/// Parses `DURATION:TARGET`, e.g. `30s:10`.
fn parse_stage(input: &str) -> Result<Stage, String> {
    let (duration, target) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 30s:10)"))?;
    let duration = parse_duration(duration)?;
    if duration.is_zero() {
        return Err(format!("stage '{input}' must have a positive duration"));
    }
    let target: u64 = target
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage target in '{input}'"))?;
    Ok(Stage::new(duration, target))
}

fn parse_component(input: &str) -> Result<Component, String> {
    Component::from_str(input.trim()).map_err(|_| {
        format!(
            "unknown component '{input}' (expected one of: homepage, events_page, event_details, search_flow, checkout)"
        )
    })
}

fn parse_probability(input: &str) -> Result<f64, String> {
    let v: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{input}'"))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(format!("'{input}' must be between 0 and 1"));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit JSON lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Staged load generation with pass/fail thresholds",
    long_about = "surge drives a population of virtual users through a named load profile (a staged concurrency ramp), records latency and outcome metrics, and evaluates pass/fail thresholds once the run completes.\n\nThe built-in scenario is synthetic: it simulates latency and failures without touching the network, which makes it useful for exercising profiles and thresholds.\n\nLogs go to stderr and are filtered with RUST_LOG (default: warn).",
    after_help = "Examples:\n  surge profiles\n  surge run --profile light --component checkout\n  TEST_PROFILE=heavy surge run --component search_flow --output json\n  surge run --stage 10s:5 --stage 20s:5 --stage 5s:0 --failure-rate 0.02"
)]
pub struct Cli {
    /// Log line format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load profile against the synthetic scenario
    #[command(
        long_about = "Resolve a load profile, ramp virtual users along its stages and print the report.\n\nExits with 11 when any threshold fails."
    )]
    Run(RunArgs),

    /// List the built-in load profiles
    Profiles(ProfilesArgs),
}

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Load profile (ultralight, light, medium, heavy); unknown names fall back to ultralight
    #[arg(long, env = "TEST_PROFILE", default_value = surge_core::profile::DEFAULT_PROFILE)]
    pub profile: String,

    /// Page flow to exercise
    #[arg(long, value_parser = parse_component, default_value = "homepage")]
    pub component: Component,

    /// Base URL of the system under test
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Scaling ratio for components that run reduced load (checkout defaults to 0.5)
    #[arg(long, env = "LOAD_RATIO")]
    pub ratio: Option<f64>,

    /// Override the component's request path
    #[arg(long)]
    pub path: Option<String>,

    /// Override the component's extra think time (e.g. 2s)
    #[arg(long, value_parser = parse_duration)]
    pub think_time_extension: Option<Duration>,

    /// Upper bound for one iteration before it counts as failed
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub iteration_timeout: Duration,

    /// Replace the profile's stages (repeatable, DURATION:TARGET); reduced-load components scale the targets
    #[arg(long = "stage", value_name = "DURATION:TARGET", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Simulated latency per iteration, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub latency_ms: u64,

    /// Random extra latency added on top, up to this many milliseconds
    #[arg(long, default_value_t = 0)]
    pub jitter_ms: u64,

    /// Probability that a simulated iteration fails (0..=1)
    #[arg(long, value_parser = parse_probability, default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

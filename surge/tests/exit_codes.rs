use std::process::{Command, Output};

use anyhow::Context as _;
use serde_json::Value;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn surge(args: &[&str]) -> anyhow::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_surge"))
        .args(args)
        .env_remove("TEST_PROFILE")
        .env_remove("BASE_URL")
        .env_remove("LOAD_RATIO")
        .output()
        .context("run surge binary")
}

fn expect_code(out: &Output, code: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == code,
        "expected exit code {code}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn summary_line(out: &Output) -> anyhow::Result<Value> {
    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|l| l.contains("\"kind\":\"summary\""))
        .context("no summary line on stdout")?;
    serde_json::from_str(line).context("parse summary line")
}

const SHORT_RUN: &[&str] = &[
    "run",
    "--stage",
    "1s:1",
    "--stage",
    "2s:1",
    "--latency-ms",
    "1",
    "--output",
    "json",
];

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = surge(&["run", "--stage", "10x:1"])?;
    expect_code(&out, 30)?;

    let out = surge(&["run", "--ratio", "abc"])?;
    expect_code(&out, 30)
}

#[test]
fn non_positive_ratio_exit_30() -> anyhow::Result<()> {
    let out = surge(&["run", "--component", "checkout", "--ratio", "0"])?;
    expect_code(&out, 30)?;
    anyhow::ensure!(
        String::from_utf8_lossy(&out.stderr).contains("ratio"),
        "stderr should name the ratio"
    );
    Ok(())
}

#[test]
fn help_exits_0() -> anyhow::Result<()> {
    let out = surge(&["--help"])?;
    expect_code(&out, 0)
}

#[test]
fn thresholds_failed_exit_11() -> anyhow::Result<()> {
    let mut args = SHORT_RUN.to_vec();
    args.extend(["--failure-rate", "1"]);
    let out = surge(&args)?;
    expect_code(&out, 11)?;

    let summary = summary_line(&out)?;
    anyhow::ensure!(summary["passed"] == false, "summary should report failure");
    anyhow::ensure!(
        summary["metrics"]["errors"]["rate"] == 1.0,
        "every iteration should be an error: {summary}"
    );
    Ok(())
}

#[test]
fn passing_run_exit_0() -> anyhow::Result<()> {
    let out = surge(SHORT_RUN)?;
    expect_code(&out, 0)?;

    let summary = summary_line(&out)?;
    anyhow::ensure!(summary["passed"] == true, "summary should pass: {summary}");
    anyhow::ensure!(summary["profile"] == "ultralight");
    anyhow::ensure!(summary["cancelled"] == false);
    Ok(())
}

#[test]
fn profiles_lists_presets_as_json() -> anyhow::Result<()> {
    let out = surge(&["profiles", "--output", "json"])?;
    expect_code(&out, 0)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let v: Value = serde_json::from_str(stdout.trim()).context("parse profiles line")?;
    let names: Vec<&str> = v["profiles"]
        .as_array()
        .context("profiles array")?
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    anyhow::ensure!(
        names == ["ultralight", "light", "medium", "heavy"],
        "unexpected presets: {names:?}"
    );
    Ok(())
}

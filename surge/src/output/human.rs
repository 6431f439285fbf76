use std::fmt::Write as _;
use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::format_duration_single;
use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, RunHeader};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, header: &RunHeader<'_>) {
        let p = header.profile;
        println!(
            "profile: {} max_vus={} stages={} duration={}",
            p.name,
            p.max_vus,
            p.stages.len(),
            format_duration_single(p.total_duration())
        );
        println!(
            "component: {} url={} think_time={}-{} +{}",
            header.target.component,
            header.target.url,
            format_duration_single(p.think_time_min),
            format_duration_single(p.think_time_max),
            format_duration_single(header.target.think_time_extension)
        );
        println!();
    }

    fn progress(&self, header: &RunHeader<'_>) -> Option<surge_core::ProgressFn> {
        let progress = self.progress.clone();
        let prefix = header.target.component.to_string();
        let total = header.profile.total_duration();

        Some(Arc::new(move |u| {
            let message = format!(
                "state={} target={} active={} elapsed={}",
                u.state,
                u.target_vus,
                u.active_vus,
                format_duration_single(u.elapsed)
            );
            progress.update(&prefix, total, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &surge_core::Report) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        if !report.passed() {
            eprintln!("thresholds failed:");
            for r in report.failed_thresholds() {
                match r.actual {
                    Some(actual) => eprintln!("  {} (observed {actual})", r.spec),
                    None => eprintln!("  {} (missing metric)", r.spec),
                }
            }
        }

        Ok(())
    }

    fn print_profiles(&self, profiles: &[surge_core::LoadProfile]) -> anyhow::Result<()> {
        let mut out = String::new();
        for p in profiles {
            let stages = p
                .stages
                .iter()
                .map(|s| format!("{}:{}", format_duration_single(s.duration), s.target))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                &mut out,
                "{:<11} base_vus={:<4} max_vus={:<5} think_time={}-{} duration={:.1}m",
                p.name,
                p.base_vus,
                p.max_vus,
                format_duration_single(p.think_time_min),
                format_duration_single(p.think_time_max),
                surge_core::profile::total_duration_minutes(p)
            )?;
            writeln!(&mut out, "            stages: {stages}")?;
        }
        print!("{out}");
        Ok(())
    }
}

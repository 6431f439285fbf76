use std::fmt::Write as _;

use surge_core::{Aggregate, CHECK_TAG, CHECKS, Report};

use super::format::*;

const LABEL_WIDTH: usize = 24;

pub(crate) fn render(report: &Report) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(&mut out, "  profile: {}", report.profile_name).ok();
    writeln!(&mut out, "  scenario: {}", report.scenario_name).ok();
    writeln!(
        &mut out,
        "  duration: planned {:.1}m, elapsed {}",
        report.duration_minutes,
        format_duration_single(report.elapsed)
    )
    .ok();
    writeln!(&mut out, "  peak_vus: {}", report.peak_vus).ok();
    if report.cancelled {
        out.push_str("  cancelled: yes\n");
    }

    render_metrics(report, &mut out);
    render_checks(report, &mut out);
    render_thresholds(report, &mut out);

    out
}

fn render_metrics(report: &Report, out: &mut String) {
    if report.aggregates.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    for (name, agg) in report.aggregates.iter() {
        let value = match agg {
            Aggregate::Trend(t) => format!(
                "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} count={}",
                format_ms(t.avg()),
                format_ms(t.min()),
                format_ms(t.med()),
                format_ms(t.max()),
                format_ms(t.percentile(90.0)),
                format_ms(t.percentile(95.0)),
                format_ms(t.percentile(99.0)),
                t.count()
            ),
            Aggregate::Rate(r) => format!("{} ({}/{})", format_pct(r.rate()), r.hits, r.total),
            Aggregate::Counter(c) => c.to_string(),
            Aggregate::Gauge(g) => format!("value={} max={}", g.value, g.max),
        };
        writeln!(out, "  {} {value}", dotted(name, LABEL_WIDTH)).ok();
    }
}

fn render_checks(report: &Report, out: &mut String) {
    let mut checks: Vec<(&str, u64, u64)> = Vec::new();
    for s in report.aggregates.series().iter().filter(|s| s.name == CHECKS) {
        let (Some(name), Aggregate::Rate(r)) = (s.tag(CHECK_TAG), &s.value) else {
            continue;
        };
        match checks.iter_mut().find(|(n, _, _)| *n == name) {
            Some(entry) => {
                entry.1 += r.hits;
                entry.2 += r.total;
            }
            None => checks.push((name, r.hits, r.total)),
        }
    }

    if checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for (name, hits, total) in checks {
        let mark = if hits == total { "✓" } else { "✗" };
        let rate = (total > 0).then(|| hits as f64 / total as f64);
        writeln!(out, "  {mark} {name}: {} ({hits}/{total})", format_pct(rate)).ok();
    }
}

fn render_thresholds(report: &Report, out: &mut String) {
    if report.threshold_results.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for r in &report.threshold_results {
        let mark = if r.passed { "✓" } else { "✗" };
        let actual = r.actual.map_or_else(|| "n/a".to_string(), format_value);
        writeln!(out, "  {mark} {} (actual {actual})", r.spec).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use surge_core::{MetricKind, default_thresholds, evaluate};
    use surge_metrics::{Registry, Tags};

    fn report() -> Report {
        let registry = Registry::default();
        for (name, kind) in [
            ("errors", MetricKind::Rate),
            ("successes", MetricKind::Rate),
            ("response_time", MetricKind::Trend),
            ("checks", MetricKind::Rate),
        ] {
            registry
                .register(name, kind)
                .unwrap_or_else(|e| panic!("{e}"));
        }

        let tags = Tags::new(1, 0, Arc::from("ultralight"), Arc::from("homepage"));
        for ms in [100.0, 120.0] {
            registry.observe_trend("response_time", ms, &tags);
            registry.observe_rate("successes", true, &tags);
            registry.observe_rate("errors", false, &tags);
        }
        registry.observe_rate("checks", true, &tags.clone().with(CHECK_TAG, "status is 200"));
        registry.observe_rate("checks", false, &tags.with(CHECK_TAG, "body not empty"));

        let aggregates = registry.snapshot().unwrap_or_else(|e| panic!("{e}"));
        let threshold_results = evaluate(&aggregates, &default_thresholds());
        Report {
            profile_name: "ultralight".to_string(),
            scenario_name: "synthetic_homepage".to_string(),
            duration_minutes: 6.0,
            elapsed: Duration::from_secs(360),
            aggregates,
            threshold_results,
            cancelled: false,
            peak_vus: 40,
        }
    }

    #[test]
    fn renders_every_section() {
        let text = render(&report());
        assert!(text.contains("profile: ultralight"));
        assert!(text.contains("peak_vus: 40"));
        assert!(text.contains("response_time ..."));
        assert!(text.contains("✓ status is 200: 100.00% (1/1)"));
        assert!(text.contains("✗ body not empty: 0.00% (0/1)"));
        assert!(text.contains("✓ errors rate<0.01 (actual 0)"));
        assert!(!text.contains("cancelled"));
    }
}

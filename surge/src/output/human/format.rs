use std::time::Duration;

pub(crate) fn format_ms(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.2}ms"),
        _ => "n/a".to_string(),
    }
}

pub(crate) fn format_pct(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{:.2}%", v * 100.0),
        _ => "n/a".to_string(),
    }
}

pub(crate) fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.4}")
    }
}

pub(crate) fn format_duration_single(d: Duration) -> String {
    // Single rounded component in one of: ms, s, m.
    let total_ms = d.as_millis();

    fn round_div(value: u128, unit: u128) -> u128 {
        (value + (unit / 2)) / unit
    }

    if total_ms >= 60_000 && total_ms % 60_000 == 0 {
        return format!("{}m", total_ms / 60_000);
    }
    if total_ms >= 1_000 {
        return format!("{}s", round_div(total_ms, 1_000));
    }
    format!("{total_ms}ms")
}

pub(crate) fn dotted(label: &str, width: usize) -> String {
    let dots = width.saturating_sub(label.chars().count() + 1).max(2);
    format!("{label} {}", ".".repeat(dots))
}

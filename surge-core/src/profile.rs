//! Load profiles: the fixed preset registry, ratio-scaled derivation and duration tokens.

use std::time::Duration;

use crate::error::{Error, Result};

/// Preset used when a profile name is empty or unknown.
pub const DEFAULT_PROFILE: &str = "ultralight";

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    #[must_use]
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }

    /// Builds a stage from a duration token such as `30s` or `2m`.
    ///
    /// A malformed token yields a zero-length stage, which [`LoadProfile::validate`] rejects.
    #[must_use]
    pub fn from_token(token: &str, target: u64) -> Self {
        Self {
            duration: minutes_to_duration(parse_duration_token(token)),
            target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    pub name: String,
    pub base_vus: u64,
    pub max_vus: u64,
    pub ramp_up_step: u64,
    pub think_time_min: Duration,
    pub think_time_max: Duration,
    pub stages: Vec<Stage>,

    /// Informational: nominal ramp-up length advertised by the preset.
    pub ramp_up_duration: Duration,
    /// Informational: nominal test length advertised by the preset. The schedule is driven by
    /// `stages` only.
    pub test_duration: Duration,
}

impl LoadProfile {
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::EmptyStages(self.name.clone()));
        }
        if let Some(index) = self.stages.iter().position(|s| s.duration.is_zero()) {
            return Err(Error::InvalidStage {
                profile: self.name.clone(),
                index,
            });
        }
        if self.base_vus > self.max_vus {
            return Err(Error::InvalidVus {
                profile: self.name.clone(),
                base_vus: self.base_vus,
                max_vus: self.max_vus,
            });
        }
        if self.think_time_min > self.think_time_max {
            return Err(Error::InvalidThinkTime {
                profile: self.name.clone(),
                min: self.think_time_min.as_secs_f64(),
                max: self.think_time_max.as_secs_f64(),
            });
        }
        Ok(())
    }

    /// Sum of all stage durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    #[must_use]
    pub fn peak_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

struct Preset {
    name: &'static str,
    base_vus: u64,
    max_vus: u64,
    ramp_up_step: u64,
    ramp_up_duration: &'static str,
    test_duration: &'static str,
    think_time: (u64, u64),
    stages: &'static [(&'static str, u64)],
}

impl Preset {
    fn build(&self) -> LoadProfile {
        LoadProfile {
            name: self.name.to_string(),
            base_vus: self.base_vus,
            max_vus: self.max_vus,
            ramp_up_step: self.ramp_up_step,
            think_time_min: Duration::from_secs(self.think_time.0),
            think_time_max: Duration::from_secs(self.think_time.1),
            stages: self
                .stages
                .iter()
                .map(|(token, target)| Stage::from_token(token, *target))
                .collect(),
            ramp_up_duration: minutes_to_duration(parse_duration_token(self.ramp_up_duration)),
            test_duration: minutes_to_duration(parse_duration_token(self.test_duration)),
        }
    }
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "ultralight",
        base_vus: 10,
        max_vus: 50,
        ramp_up_step: 10,
        ramp_up_duration: "1m",
        test_duration: "5m",
        think_time: (3, 6),
        stages: &[
            ("30s", 10),
            ("1m", 20),
            ("1m", 30),
            ("1m", 40),
            ("2m", 40),
            ("30s", 0),
        ],
    },
    Preset {
        name: "light",
        base_vus: 50,
        max_vus: 300,
        ramp_up_step: 50,
        ramp_up_duration: "2m",
        test_duration: "15m",
        think_time: (2, 5),
        stages: &[
            ("1m", 50),
            ("2m", 100),
            ("2m", 150),
            ("2m", 200),
            ("2m", 250),
            ("3m", 300),
            ("3m", 300),
            ("1m", 0),
        ],
    },
    Preset {
        name: "medium",
        base_vus: 100,
        max_vus: 600,
        ramp_up_step: 100,
        ramp_up_duration: "3m",
        test_duration: "25m",
        think_time: (1, 4),
        stages: &[
            ("2m", 100),
            ("3m", 200),
            ("3m", 300),
            ("3m", 400),
            ("3m", 500),
            ("3m", 600),
            ("5m", 600),
            ("3m", 0),
        ],
    },
    Preset {
        name: "heavy",
        base_vus: 200,
        max_vus: 1000,
        ramp_up_step: 200,
        ramp_up_duration: "3m",
        test_duration: "35m",
        think_time: (1, 3),
        stages: &[
            ("2m", 200),
            ("3m", 400),
            ("3m", 600),
            ("3m", 800),
            ("3m", 1000),
            ("10m", 1000),
            ("5m", 800),
            ("3m", 600),
            ("2m", 400),
            ("1m", 200),
            ("1m", 0),
        ],
    },
];

/// Names of every preset, in registry order.
pub fn presets() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|p| p.name)
}

/// Case-insensitive preset lookup. Unknown or empty names fall back to [`DEFAULT_PROFILE`].
#[must_use]
pub fn resolve(name: &str) -> LoadProfile {
    let wanted = name.trim();
    if let Some(preset) = PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(wanted)) {
        return preset.build();
    }

    if !wanted.is_empty() {
        tracing::warn!(
            profile = wanted,
            fallback = DEFAULT_PROFILE,
            "unknown load profile, using default"
        );
    }

    PRESETS
        .iter()
        .find(|p| p.name == DEFAULT_PROFILE)
        .map(Preset::build)
        .unwrap_or_else(|| PRESETS[0].build())
}

/// Scales every VU count of `profile` by `ratio`, flooring and clamping each to at least 1.
///
/// Floor and clamp make this non-associative: scaling by `a` then `b` is not the same as
/// scaling by `a * b`.
pub fn derive_scaled(profile: &LoadProfile, ratio: f64) -> Result<LoadProfile> {
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(Error::InvalidRatio(ratio));
    }

    let scale = |v: u64| ((v as f64) * ratio).floor().max(1.0) as u64;

    Ok(LoadProfile {
        base_vus: scale(profile.base_vus),
        max_vus: scale(profile.max_vus),
        ramp_up_step: scale(profile.ramp_up_step),
        stages: profile
            .stages
            .iter()
            .map(|s| Stage::new(s.duration, scale(s.target)))
            .collect(),
        ..profile.clone()
    })
}

/// Parses `<integer><unit>` with unit `s`, `m` or `h` into minutes.
///
/// Malformed tokens are not fatal: they log a warning and count as zero minutes.
#[must_use]
pub fn parse_duration_token(token: &str) -> f64 {
    let s = token.trim();
    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    let (number_str, unit) = s.split_at(number_end);
    let value = match number_str.parse::<u64>() {
        Ok(v) => v as f64,
        Err(_) => return malformed(token),
    };

    match unit {
        "s" => value / 60.0,
        "m" => value,
        "h" => value * 60.0,
        _ => malformed(token),
    }
}

fn malformed(token: &str) -> f64 {
    tracing::warn!(token, "malformed duration token, counting it as 0 minutes");
    0.0
}

/// Sum of every stage's duration, in minutes.
#[must_use]
pub fn total_duration_minutes(profile: &LoadProfile) -> f64 {
    profile
        .stages
        .iter()
        .map(|s| s.duration.as_secs_f64() / 60.0)
        .sum()
}

fn minutes_to_duration(minutes: f64) -> Duration {
    Duration::from_secs_f64((minutes * 60.0).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_tokens() {
        assert_eq!(parse_duration_token("90s"), 1.5);
        assert_eq!(parse_duration_token("2m"), 2.0);
        assert_eq!(parse_duration_token("1h"), 60.0);
        assert_eq!(parse_duration_token(" 30s "), 0.5);
    }

    #[test]
    fn malformed_duration_tokens_are_zero() {
        for token in ["bogus", "", "m", "10", "10x", "1.5m", "-3s", "5 m"] {
            assert_eq!(parse_duration_token(token), 0.0, "token={token:?}");
        }
    }

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(resolve("HEAVY"), resolve("heavy"));
        assert_eq!(resolve("Medium").max_vus, 600);
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let default = resolve(DEFAULT_PROFILE);
        assert_eq!(resolve("nonexistent"), default);
        assert_eq!(resolve(""), default);
        assert_eq!(default.name, "ultralight");
        assert_eq!(default.base_vus, 10);
        assert_eq!(default.max_vus, 50);
    }

    #[test]
    fn every_preset_is_valid() {
        for name in presets() {
            let p = resolve(name);
            assert_eq!(p.name, name);
            p.validate().unwrap_or_else(|e| panic!("{name}: {e}"));
            assert!(p.peak_target() <= p.max_vus, "{name}");
        }
    }

    #[test]
    fn total_duration_is_sum_of_stage_minutes() {
        assert_eq!(total_duration_minutes(&resolve("ultralight")), 6.0);
        assert_eq!(total_duration_minutes(&resolve("light")), 16.0);
        assert_eq!(total_duration_minutes(&resolve("medium")), 25.0);
        assert_eq!(total_duration_minutes(&resolve("heavy")), 36.0);
    }

    #[test]
    fn derive_scaled_halves_checkout_load() {
        let base = resolve("light");
        let derived = derive_scaled(&base, 0.5).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(derived.base_vus, 25);
        assert_eq!(derived.max_vus, 150);
        assert_eq!(derived.ramp_up_step, 25);
        let targets: Vec<u64> = derived.stages.iter().map(|s| s.target).collect();
        assert_eq!(targets, vec![25, 50, 75, 100, 125, 150, 150, 1]);

        let durations: Vec<Duration> = derived.stages.iter().map(|s| s.duration).collect();
        let base_durations: Vec<Duration> = base.stages.iter().map(|s| s.duration).collect();
        assert_eq!(durations, base_durations);
        assert_eq!(derived.think_time_min, base.think_time_min);
    }

    #[test]
    fn derive_scaled_clamps_to_one() {
        let derived =
            derive_scaled(&resolve("ultralight"), 0.001).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(derived.base_vus, 1);
        assert_eq!(derived.max_vus, 1);
        assert_eq!(derived.ramp_up_step, 1);
        assert!(derived.stages.iter().all(|s| s.target == 1));
    }

    #[test]
    fn derive_scaled_is_not_composable() {
        let p = resolve("ultralight");
        let direct = derive_scaled(&p, 0.25 * 4.0).unwrap_or_else(|e| panic!("{e}"));
        let step = derive_scaled(&p, 0.25).unwrap_or_else(|e| panic!("{e}"));
        let composed = derive_scaled(&step, 4.0).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(direct.base_vus, 10);
        assert_eq!(step.base_vus, 2);
        assert_eq!(composed.base_vus, 8);
        assert_eq!(direct.max_vus, 50);
        assert_eq!(composed.max_vus, 48);
        assert_eq!(direct.stages[5].target, 0u64.max(1));
        assert_eq!(composed.stages[5].target, 4);
    }

    #[test]
    fn derive_scaled_is_pure() {
        let p = resolve("heavy");
        assert_eq!(derive_scaled(&p, 0.37).ok(), derive_scaled(&p, 0.37).ok());
    }

    #[test]
    fn derive_scaled_rejects_non_positive_ratio() {
        let p = resolve("light");
        for ratio in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                derive_scaled(&p, ratio),
                Err(Error::InvalidRatio(_))
            ));
        }
    }

    #[test]
    fn validate_rejects_malformed_profiles() {
        let mut p = resolve("ultralight");
        p.stages.clear();
        assert!(matches!(p.validate(), Err(Error::EmptyStages(_))));

        let mut p = resolve("ultralight");
        p.stages.push(Stage::from_token("soon", 5));
        assert!(matches!(
            p.validate(),
            Err(Error::InvalidStage { index: 6, .. })
        ));

        let mut p = resolve("ultralight");
        p.base_vus = 100;
        assert!(matches!(p.validate(), Err(Error::InvalidVus { .. })));

        let mut p = resolve("ultralight");
        p.think_time_min = Duration::from_secs(10);
        assert!(matches!(p.validate(), Err(Error::InvalidThinkTime { .. })));
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::profile::{self, LoadProfile, Stage};
use crate::thresholds::{Aggregation, Comparator, ThresholdSpec};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// The page flows a run can exercise.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Component {
    Homepage,
    EventsPage,
    EventDetails,
    SearchFlow,
    Checkout,
}

impl Component {
    #[must_use]
    pub fn default_path(self) -> &'static str {
        match self {
            Self::Homepage => "/",
            Self::EventsPage => "/events",
            Self::EventDetails => "/event/buyticket",
            Self::SearchFlow => "/search",
            Self::Checkout => "/purchase/checkout-cart",
        }
    }

    /// Extra pause on top of the profile's think time: reading-heavy and payment pages linger.
    #[must_use]
    pub fn think_time_extension(self) -> Duration {
        match self {
            Self::EventDetails => Duration::from_secs(2),
            Self::Checkout => Duration::from_secs(3),
            Self::Homepage | Self::EventsPage | Self::SearchFlow => Duration::ZERO,
        }
    }

    /// Components that run a reduced-load profile derived from the selected one.
    #[must_use]
    pub fn load_ratio(self) -> Option<f64> {
        match self {
            Self::Checkout => Some(0.5),
            _ => None,
        }
    }

    /// Thresholds evaluated on top of the defaults.
    #[must_use]
    pub fn thresholds(self) -> Vec<ThresholdSpec> {
        match self {
            Self::SearchFlow => vec![ThresholdSpec::new(
                "search_response_time",
                Aggregation::Percentile(95.0),
                Comparator::Lt,
                2500.0,
            )],
            _ => Vec::new(),
        }
    }
}

/// Per-component replacements for the catalog defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioOverrides {
    pub path: Option<String>,
    pub think_time_extension: Option<Duration>,
}

/// Where a component sends its traffic and how long it lingers afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub component: Component,
    pub url: String,
    pub think_time_extension: Duration,
}

/// Settings for one run, built once by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub profile: String,
    pub base_url: String,
    /// Scaling applied to components that run a derived profile; defaults to the component's
    /// own ratio.
    pub ratio: Option<f64>,
    pub iteration_timeout: Duration,
    pub overrides: BTreeMap<Component, ScenarioOverrides>,
    /// Replaces the preset's stages before any derivation; empty keeps the preset.
    pub stages: Vec<Stage>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile: profile::DEFAULT_PROFILE.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            ratio: None,
            iteration_timeout: DEFAULT_ITERATION_TIMEOUT,
            overrides: BTreeMap::new(),
            stages: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        match self.ratio {
            Some(r) if !(r.is_finite() && r > 0.0) => Err(Error::InvalidRatio(r)),
            _ => Ok(()),
        }
    }

    /// Resolves the profile `component` runs under, deriving a scaled one when the component
    /// asks for reduced load.
    pub fn load_profile(&self, component: Component) -> Result<LoadProfile> {
        let mut base = profile::resolve(&self.profile);
        if !self.stages.is_empty() {
            base.stages = self.stages.clone();
            base.max_vus = base.max_vus.max(base.peak_target());
        }
        match component.load_ratio() {
            Some(default) => profile::derive_scaled(&base, self.ratio.unwrap_or(default)),
            None => Ok(base),
        }
    }

    pub fn target(&self, component: Component) -> ResolvedTarget {
        let overrides = self.overrides.get(&component);
        let path = overrides
            .and_then(|o| o.path.as_deref())
            .unwrap_or(component.default_path());
        let think_time_extension = overrides
            .and_then(|o| o.think_time_extension)
            .unwrap_or(component.think_time_extension());

        ResolvedTarget {
            component,
            url: join_url(&self.base_url, path),
            think_time_extension,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match path.trim_start_matches('/') {
        "" => format!("{base}/"),
        rest => format!("{base}/{rest}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn component_names_parse() {
        assert_eq!(Component::from_str("search_flow").ok(), Some(Component::SearchFlow));
        assert_eq!(Component::from_str("CHECKOUT").ok(), Some(Component::Checkout));
        assert!(Component::from_str("cart").is_err());
        assert_eq!(Component::EventDetails.to_string(), "event_details");
        assert_eq!(Component::iter().count(), 5);
    }

    #[test]
    fn checkout_runs_half_load_by_default() {
        let cfg = RunConfig {
            profile: "light".to_string(),
            ..RunConfig::default()
        };
        let checkout = cfg
            .load_profile(Component::Checkout)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(checkout.max_vus, 150);

        let homepage = cfg
            .load_profile(Component::Homepage)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(homepage.max_vus, 300);
    }

    #[test]
    fn explicit_ratio_replaces_component_default() {
        let cfg = RunConfig {
            profile: "heavy".to_string(),
            ratio: Some(0.1),
            ..RunConfig::default()
        };
        let checkout = cfg
            .load_profile(Component::Checkout)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(checkout.max_vus, 100);
        assert_eq!(checkout.base_vus, 20);
    }

    #[test]
    fn custom_stages_are_scaled_for_reduced_load() {
        let cfg = RunConfig {
            stages: vec![
                Stage::new(Duration::from_secs(10), 100),
                Stage::new(Duration::from_secs(5), 0),
            ],
            ..RunConfig::default()
        };

        let checkout = cfg
            .load_profile(Component::Checkout)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(checkout.max_vus, 50);
        assert_eq!(checkout.peak_target(), 50);
        assert_eq!(checkout.total_duration(), Duration::from_secs(15));

        let homepage = cfg
            .load_profile(Component::Homepage)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(homepage.max_vus, 100);
        assert_eq!(homepage.peak_target(), 100);
    }

    #[test]
    fn invalid_ratio_is_rejected() {
        let cfg = RunConfig {
            ratio: Some(0.0),
            ..RunConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidRatio(_))));
        assert!(matches!(
            cfg.load_profile(Component::Checkout),
            Err(Error::InvalidRatio(_))
        ));
    }

    #[test]
    fn overrides_replace_catalog_defaults() {
        let mut cfg = RunConfig {
            base_url: "https://tickets.example/".to_string(),
            ..RunConfig::default()
        };
        cfg.overrides.insert(
            Component::EventDetails,
            ScenarioOverrides {
                path: Some("/event/42".to_string()),
                think_time_extension: Some(Duration::from_secs(5)),
            },
        );

        let details = cfg.target(Component::EventDetails);
        assert_eq!(details.url, "https://tickets.example/event/42");
        assert_eq!(details.think_time_extension, Duration::from_secs(5));

        let checkout = cfg.target(Component::Checkout);
        assert_eq!(checkout.url, "https://tickets.example/purchase/checkout-cart");
        assert_eq!(checkout.think_time_extension, Duration::from_secs(3));

        assert_eq!(cfg.target(Component::Homepage).url, "https://tickets.example/");
    }

    #[test]
    fn search_flow_adds_threshold() {
        let extra = Component::SearchFlow.thresholds();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].to_string(), "search_response_time p(95)<2500");
        assert!(Component::Homepage.thresholds().is_empty());
    }
}

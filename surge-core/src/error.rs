pub type Result<T> = std::result::Result<T, Error>;

/// Conditions that stop a run before any virtual user is spawned.
///
/// Iteration failures and threshold violations are never errors: they are recorded as
/// metrics and surfaced in the [`crate::Report`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("profile `{0}` has no stages")]
    EmptyStages(String),

    #[error("profile `{profile}`: stage {index} must have a positive duration")]
    InvalidStage { profile: String, index: usize },

    #[error("profile `{profile}`: `base_vus` ({base_vus}) must be <= `max_vus` ({max_vus})")]
    InvalidVus {
        profile: String,
        base_vus: u64,
        max_vus: u64,
    },

    #[error("profile `{profile}`: `think_time_min` ({min}s) must be <= `think_time_max` ({max}s)")]
    InvalidThinkTime { profile: String, min: f64, max: f64 },

    #[error("derivation ratio must be a positive number (got {0})")]
    InvalidRatio(f64),

    #[error("invalid threshold for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("scenario setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Metrics(#[from] surge_metrics::Error),
}

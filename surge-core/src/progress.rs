use std::fmt;
use std::time::Duration;

/// Lifecycle of a run as driven by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    /// Zero-based index of the active stage.
    Ramping(usize),
    Draining,
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not_started"),
            Self::Ramping(stage) => write!(f, "ramping({stage})"),
            Self::Draining => f.write_str("draining"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic counter (1-based) of emitted updates.
    pub tick: u64,
    pub elapsed: Duration,
    pub state: RunState,
    pub target_vus: u64,
    /// VUs spawned and not yet asked to retire.
    pub active_vus: u64,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

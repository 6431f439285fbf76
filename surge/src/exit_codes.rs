#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// Invalid CLI/config/options (bad flags, non-positive ratio, malformed stages, etc.).
    InvalidInput = 30,

    /// Runtime error (scenario setup failed, metrics could not be collected).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_thresholds(passed: bool) -> Self {
        if passed {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_verdict_maps_to_exit_code() {
        assert_eq!(ExitCode::from_thresholds(true).as_i32(), 0);
        assert_eq!(ExitCode::from_thresholds(false).as_i32(), 11);
    }
}

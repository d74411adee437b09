//! Metric names and label values

/// Connection attempts, labelled by posture and outcome
pub const ATTEMPTS_TOTAL: &str = "connprobe_attempts_total";
/// Failures, labelled by posture and phase
pub const FAILURES_TOTAL: &str = "connprobe_failures_total";
/// Connection acquisition time in seconds
pub const CONNECT_DURATION_SECONDS: &str = "connprobe_connect_duration_seconds";

/// Posture label key
pub const POSTURE: &str = "posture";
/// Outcome label key
pub const OUTCOME: &str = "outcome";
/// Phase label key
pub const PHASE: &str = "phase";

/// Attempt ended with zero errors
pub const OUTCOME_OK: &str = "ok";
/// Attempt recorded at least one error
pub const OUTCOME_ERROR: &str = "error";

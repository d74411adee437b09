//! Counter helpers

use super::labels;

/// Count a finished attempt
pub fn attempt_completed(posture: &'static str, ok: bool) {
    let outcome = if ok {
        labels::OUTCOME_OK
    } else {
        labels::OUTCOME_ERROR
    };
    metrics::counter!(
        labels::ATTEMPTS_TOTAL,
        labels::POSTURE => posture,
        labels::OUTCOME => outcome
    )
    .increment(1);
}

/// Count a failure in `phase` (`connect` or `inspect`)
pub fn failure_recorded(posture: &'static str, phase: &'static str) {
    metrics::counter!(
        labels::FAILURES_TOTAL,
        labels::POSTURE => posture,
        labels::PHASE => phase
    )
    .increment(1);
}

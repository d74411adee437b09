//! Histogram helpers

use super::labels;
use std::time::Duration;

/// Record how long acquiring a connection took
pub fn connect_duration(posture: &'static str, elapsed: Duration) {
    metrics::histogram!(labels::CONNECT_DURATION_SECONDS, labels::POSTURE => posture)
        .record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        connect_duration("default", Duration::from_millis(3));
        crate::metrics::counters::attempt_completed("default", true);
        crate::metrics::counters::failure_recorded("required", "connect");
    }
}

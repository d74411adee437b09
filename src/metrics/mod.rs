//! Probe metrics
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the embedding
//! application installs a recorder.
//!
//! * `connprobe_attempts_total{posture,outcome}`
//! * `connprobe_failures_total{posture,phase}`
//! * `connprobe_connect_duration_seconds{posture}`

pub mod counters;
pub mod histograms;
pub mod labels;

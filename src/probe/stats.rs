//! Latency and outcome statistics for one variant

use super::attempt::OutcomeSignature;
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;

/// Running min/avg/max and outcome histogram
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    count: u32,
    min: Option<Duration>,
    max: Option<Duration>,
    sum: Duration,
    histogram: HashMap<OutcomeSignature, u32>,
}

impl RunStatistics {
    /// Empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one iteration in
    pub fn record(&mut self, elapsed: Duration, signature: OutcomeSignature) {
        self.count += 1;
        self.sum += elapsed;
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = Some(self.max.map_or(elapsed, |m| m.max(elapsed)));
        *self.histogram.entry(signature).or_insert(0) += 1;
    }

    /// Iterations recorded
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Fastest acquisition
    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    /// Slowest acquisition
    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    /// Total acquisition time
    pub fn sum(&self) -> Duration {
        self.sum
    }

    /// `sum / count`
    pub fn avg(&self) -> Option<Duration> {
        (self.count > 0).then(|| self.sum / self.count)
    }

    /// Occurrences per outcome signature
    pub fn histogram(&self) -> &HashMap<OutcomeSignature, u32> {
        &self.histogram
    }

    /// Buckets by descending count, ties by signature
    pub fn buckets(&self) -> Vec<(&OutcomeSignature, u32)> {
        let mut buckets: Vec<_> = self.histogram.iter().map(|(s, c)| (s, *c)).collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        buckets
    }

    /// Summary line followed by one line per bucket
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match (self.min, self.avg(), self.max) {
            (Some(min), Some(avg), Some(max)) => writeln!(
                out,
                "After {} connects: min={}ms avg={}ms max={}ms",
                self.count,
                millis(min),
                millis(avg),
                millis(max)
            )?,
            _ => writeln!(out, "After {} connects", self.count)?,
        }
        for (signature, count) in self.buckets() {
            writeln!(out, "{:>5} {}", count, signature)?;
        }
        Ok(())
    }
}

/// Milliseconds with microsecond resolution
pub(crate) fn millis(d: Duration) -> String {
    format!("{:.6}", d.as_secs_f64() * 1000.0)
}

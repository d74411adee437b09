//! Failure reporting shared by every variant of a run

use crate::Error;

/// Where a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Acquiring the connection
    Connect,
    /// Running the inspection query
    Inspect,
}

impl Phase {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Connect => "connect",
            Phase::Inspect => "inspect",
        }
    }
}

/// Logs the first failure in full and every later one in a single line.
///
/// One instance is shared across all variants, so the full diagnostic appears once per process.
#[derive(Debug, Default)]
pub struct FailureLog {
    verbose: usize,
    terse: usize,
}

impl FailureLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a failure
    pub fn record(&mut self, phase: Phase, err: &Error) {
        if self.verbose == 0 {
            self.verbose += 1;
            tracing::error!(
                phase = phase.as_str(),
                kind = err.kind(),
                "first failure:\n{}",
                err.diagnostic()
            );
        } else {
            self.terse += 1;
            tracing::warn!(phase = phase.as_str(), error = %err, "failure");
        }
    }

    /// Number of full diagnostics emitted (0 or 1)
    pub fn verbose_count(&self) -> usize {
        self.verbose
    }

    /// Number of one-line reports emitted
    pub fn terse_count(&self) -> usize {
        self.terse
    }

    /// Total failures reported
    pub fn total(&self) -> usize {
        self.verbose + self.terse
    }
}

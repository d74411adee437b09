//! Measurement pass for one posture

use super::attempt::ConnectionAttempt;
use super::failures::{FailureLog, Phase};
use super::inspect::{inspect, DEFAULT_INSPECTION_QUERY};
use super::probe::probe;
use super::state::VariantState;
use super::stats::{millis, RunStatistics};
use super::{ConnectionFactory, ProbeConnection};
use crate::metrics::{counters, histograms};
use crate::Result;
use std::io::Write;
use std::time::Duration;

/// Default number of measured iterations
pub const DEFAULT_ITERATIONS: u32 = 100;
/// Default pause between iterations
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(15);

/// Parameters shared by every variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Measured iterations after the warm-ups
    pub iterations: u32,
    /// Sleep after each iteration
    pub pause: Duration,
    /// Inspection query
    pub query: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            pause: DEFAULT_PAUSE,
            query: DEFAULT_INSPECTION_QUERY.to_string(),
        }
    }
}

/// How a variant ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// All iterations ran
    Completed(RunStatistics),
    /// A warm-up failed
    Aborted,
}

impl RunOutcome {
    /// Statistics, if the variant completed
    pub fn statistics(&self) -> Option<&RunStatistics> {
        match self {
            RunOutcome::Completed(stats) => Some(stats),
            RunOutcome::Aborted => None,
        }
    }
}

/// Drives warm-ups, iterations and the summary for one factory
pub struct VariantRunner<'a, F, W> {
    factory: &'a F,
    settings: &'a ProbeSettings,
    failures: &'a mut FailureLog,
    out: &'a mut W,
    posture: &'static str,
    state: VariantState,
}

impl<'a, F, W> VariantRunner<'a, F, W>
where
    F: ConnectionFactory,
    W: Write,
{
    /// Runner writing its report lines to `out`
    pub fn new(
        factory: &'a F,
        settings: &'a ProbeSettings,
        failures: &'a mut FailureLog,
        out: &'a mut W,
    ) -> Self {
        Self {
            factory,
            settings,
            failures,
            out,
            posture: "default",
            state: VariantState::Start,
        }
    }

    /// Posture label attached to metrics
    pub fn posture(mut self, label: &'static str) -> Self {
        self.posture = label;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> VariantState {
        self.state
    }

    /// Run the variant to completion.
    ///
    /// Both warm-ups always run; if either fails the variant stops with
    /// [`RunOutcome::Aborted`]. Errors are only returned for report write failures.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.state.transition(VariantState::Warmup1)?;
        let first_ok = self.warmup("First").await?;
        self.state.transition(VariantState::Warmup2)?;
        let second_ok = self.warmup("Second").await?;

        if !(first_ok && second_ok) {
            self.state.transition(VariantState::Aborted)?;
            tracing::warn!(posture = self.posture, "warm-up failed, skipping measurement");
            return Ok(RunOutcome::Aborted);
        }

        self.state.transition(VariantState::Iterating)?;
        let mut stats = RunStatistics::new();
        for iteration in 0..self.settings.iterations {
            let mut attempt = self.cycle().await;
            self.close(&mut attempt).await;
            stats.record(attempt.elapsed, attempt.signature());
            tracing::trace!(
                iteration,
                elapsed_ms = %millis(attempt.elapsed),
                ok = attempt.is_ok(),
                "iteration"
            );
            tokio::time::sleep(self.settings.pause).await;
        }

        self.state.transition(VariantState::Reporting)?;
        stats.write_summary(&mut *self.out)?;
        self.out.flush()?;
        self.state.transition(VariantState::Done)?;
        Ok(RunOutcome::Completed(stats))
    }

    async fn warmup(&mut self, label: &str) -> Result<bool> {
        let mut attempt = self.cycle().await;
        let server = attempt
            .connection
            .as_ref()
            .map(|c| c.server_description())
            .unwrap_or_else(|| "server=none".to_string());
        writeln!(
            self.out,
            "{} Connection: {}  time={}ms   {}",
            label,
            attempt.signature(),
            millis(attempt.elapsed),
            server
        )?;
        self.close(&mut attempt).await;
        Ok(attempt.is_ok())
    }

    /// probe + inspect, with metrics
    async fn cycle(&mut self) -> ConnectionAttempt<F::Connection> {
        let mut attempt = probe(self.factory, &mut *self.failures).await;
        histograms::connect_duration(self.posture, attempt.elapsed);
        if !attempt.is_ok() {
            counters::failure_recorded(self.posture, Phase::Connect.as_str());
        }

        let before = attempt.error_count;
        inspect(&mut attempt, &self.settings.query, &mut *self.failures).await;
        if attempt.error_count > before {
            counters::failure_recorded(self.posture, Phase::Inspect.as_str());
        }

        counters::attempt_completed(self.posture, attempt.is_ok());
        attempt
    }

    async fn close(&mut self, attempt: &mut ConnectionAttempt<F::Connection>) {
        if let Some(connection) = attempt.connection.take() {
            if let Err(err) = connection.close().await {
                tracing::warn!(posture = self.posture, error = %err, "close failed");
            }
        }
    }
}

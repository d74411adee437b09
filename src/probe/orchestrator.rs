//! Runs one variant per posture

use super::failures::FailureLog;
use super::posture::{SecurityOptions, DEFAULT_POSTURES};
use super::runner::{ProbeSettings, RunOutcome, VariantRunner};
use super::FactoryProvider;
use crate::Result;
use std::io::Write;

/// Result of one variant
#[derive(Debug)]
pub struct VariantReport {
    /// Posture label as requested (`None` = unspecified)
    pub posture: Option<String>,
    /// Options the factory was built with
    pub options: SecurityOptions,
    /// Runner outcome, or the error that prevented building the factory
    pub outcome: Result<RunOutcome>,
}

/// Runs the measurement pass under each posture, sharing one failure log
pub struct Orchestrator<P, W> {
    provider: P,
    settings: ProbeSettings,
    postures: Vec<Option<String>>,
    failures: FailureLog,
    out: W,
}

impl<P, W> Orchestrator<P, W>
where
    P: FactoryProvider,
    W: Write,
{
    /// Orchestrator over the default postures: unspecified, `REQUIRED`, `REJECTED`
    pub fn new(provider: P, settings: ProbeSettings, out: W) -> Self {
        Self {
            provider,
            settings,
            postures: DEFAULT_POSTURES
                .iter()
                .map(|p| p.map(str::to_string))
                .collect(),
            failures: FailureLog::new(),
            out,
        }
    }

    /// Replace the posture list
    pub fn with_postures<I, S>(mut self, postures: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.postures = postures.into_iter().map(|p| p.map(Into::into)).collect();
        self
    }

    /// Failure log shared by all variants
    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Report sink
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Run every posture in order.
    ///
    /// A variant that aborts or whose factory cannot be built does not stop the next one.
    /// Only report write failures are returned as errors.
    pub async fn run_all(&mut self) -> Result<Vec<VariantReport>> {
        let postures = self.postures.clone();
        let mut reports = Vec::with_capacity(postures.len());

        for (index, posture) in postures.into_iter().enumerate() {
            let options = SecurityOptions::for_posture(posture.as_deref());
            let label = options.label();

            writeln!(
                self.out,
                "\n=== Variant {}: posture={} iterations={} {}",
                index + 1,
                posture.as_deref().unwrap_or("(unspecified)"),
                self.settings.iterations,
                self.provider.describe(&options)
            )?;
            tracing::info!(variant = index + 1, posture = label, "starting variant");

            let outcome = match self.provider.factory(&options) {
                Ok(factory) => {
                    let mut runner =
                        VariantRunner::new(&factory, &self.settings, &mut self.failures, &mut self.out)
                            .posture(label);
                    Ok(runner.run().await?)
                }
                Err(err) => {
                    tracing::error!(posture = label, error = %err, "could not configure connections");
                    writeln!(self.out, "Variant skipped: {}", err)?;
                    Err(err)
                }
            };

            if let Ok(RunOutcome::Aborted) = &outcome {
                writeln!(self.out, "Variant aborted: warm-up connection failed")?;
            }
            tracing::info!(variant = index + 1, posture = label, "variant finished");

            reports.push(VariantReport {
                posture,
                options,
                outcome,
            });
        }

        self.out.flush()?;
        Ok(reports)
    }
}

//! Connection probe
//!
//! An [`Orchestrator`] runs one variant per security posture. Each variant is driven by a
//! [`VariantRunner`]: two warm-up connections, then a fixed number of
//! connect / inspect / close cycles folded into [`RunStatistics`].
//!
//! The database driver is reached only through [`ConnectionFactory`] and [`ProbeConnection`].

mod attempt;
mod failures;
mod inspect;
mod orchestrator;
mod posture;
#[allow(clippy::module_inception)]
mod probe;
mod runner;
mod state;
mod stats;

pub use attempt::{ConnectionAttempt, OutcomeSignature};
pub use failures::{FailureLog, Phase};
pub use inspect::{inspect, DEFAULT_INSPECTION_QUERY};
pub use orchestrator::{Orchestrator, VariantReport};
pub use posture::{Negotiation, SecurityOptions, DEFAULT_POSTURES};
pub use probe::probe;
pub use runner::{ProbeSettings, RunOutcome, VariantRunner, DEFAULT_ITERATIONS, DEFAULT_PAUSE};
pub use state::VariantState;
pub use stats::RunStatistics;

use crate::connection::Row;
use crate::Result;

/// An open connection as seen by the probe
#[allow(async_fn_in_trait)]
pub trait ProbeConnection {
    /// Run `sql` and return its first row
    async fn query_row(&mut self, sql: &str) -> Result<Row>;

    /// Release the connection
    async fn close(self) -> Result<()>;

    /// Short description of the server side of the session, e.g. `server=16.2 tls=true`
    fn server_description(&self) -> String;
}

/// Opens connections with one fixed configuration
#[allow(async_fn_in_trait)]
pub trait ConnectionFactory {
    /// Connection type produced
    type Connection: ProbeConnection;

    /// Open one connection
    async fn connect(&self) -> Result<Self::Connection>;
}

/// Builds a fresh factory for each posture
pub trait FactoryProvider {
    /// Factory type produced
    type Factory: ConnectionFactory;

    /// Factory configured for `options`
    fn factory(&self, options: &SecurityOptions) -> Result<Self::Factory>;

    /// Extra detail for the variant header (target, timeouts, negotiated settings)
    fn describe(&self, _options: &SecurityOptions) -> String {
        String::new()
    }
}

impl<F, T> FactoryProvider for F
where
    F: Fn(&SecurityOptions) -> Result<T>,
    T: ConnectionFactory,
{
    type Factory = T;

    fn factory(&self, options: &SecurityOptions) -> Result<T> {
        self(options)
    }
}

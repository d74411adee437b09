//! Single timed acquisition

use super::attempt::ConnectionAttempt;
use super::failures::{FailureLog, Phase};
use super::ConnectionFactory;
use tokio::time::Instant;

/// Ask `factory` for one connection, timing the call.
///
/// Failures are recorded in the attempt and reported to `failures`; they never propagate.
pub async fn probe<F: ConnectionFactory>(
    factory: &F,
    failures: &mut FailureLog,
) -> ConnectionAttempt<F::Connection> {
    let started = Instant::now();
    let result = factory.connect().await;
    let elapsed = started.elapsed();

    match result {
        Ok(connection) => ConnectionAttempt::succeeded(started, elapsed, connection),
        Err(err) => {
            failures.record(Phase::Connect, &err);
            ConnectionAttempt::failed(started, elapsed, &err)
        }
    }
}

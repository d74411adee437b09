//! Server identity lookup on a live connection

use super::attempt::ConnectionAttempt;
use super::failures::{FailureLog, Phase};
use super::ProbeConnection;
use crate::connection::Row;
use crate::Result;

/// Learns schema, node, database and server address in one round trip
pub const DEFAULT_INSPECTION_QUERY: &str = "SELECT current_schema() AS currschema, \
     current_setting('cluster_name') AS instance, \
     current_database() AS service_name, \
     host(inet_server_addr()) AS server_host";

const SCHEMA: &str = "currschema";
const INSTANCE: &str = "instance";
const SERVICE: &str = "service_name";
const SERVER: &str = "server_host";

/// Fill in the attempt's server identity using `query`.
///
/// Does nothing without a connection. A failure increments the attempt's error count and
/// leaves the fields read before it in place.
pub async fn inspect<C: ProbeConnection>(
    attempt: &mut ConnectionAttempt<C>,
    query: &str,
    failures: &mut FailureLog,
) {
    let Some(connection) = attempt.connection.as_mut() else {
        return;
    };

    let result = match connection.query_row(query).await {
        Ok(row) => apply(attempt, &row),
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        failures.record(Phase::Inspect, &err);
        attempt.record_error(&err);
    }
}

fn apply<C>(attempt: &mut ConnectionAttempt<C>, row: &Row) -> Result<()> {
    attempt.schema = row.get(SCHEMA)?.map(str::to_string);
    attempt.instance = row.get(INSTANCE)?.map(str::to_string);
    attempt.service = row.get(SERVICE)?.map(str::to_string);
    attempt.server = row.get(SERVER)?.map(str::to_string);
    Ok(())
}

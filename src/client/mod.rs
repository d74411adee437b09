//! Postgres client glue: connection strings and the probe's connection factory

mod connection_string;
mod factory;

pub use connection_string::ConnectionInfo;
pub use factory::{PgConnectionFactory, PgFactoryProvider};

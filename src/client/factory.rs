//! Postgres-backed connection factory

use super::connection_string::ConnectionInfo;
use crate::connection::{Connection, ConnectionConfig, Endpoint, Row, SslMode, TlsConfig};
use crate::probe::{ConnectionFactory, FactoryProvider, ProbeConnection, SecurityOptions};
use crate::Result;

impl ProbeConnection for Connection {
    async fn query_row(&mut self, sql: &str) -> Result<Row> {
        Connection::query_row(self, sql).await
    }

    async fn close(self) -> Result<()> {
        Connection::close(self).await
    }

    fn server_description(&self) -> String {
        format!(
            "server={} tls={}",
            self.server_version().unwrap_or("unknown"),
            self.is_tls()
        )
    }
}

/// Opens Postgres sessions with one fixed configuration
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    endpoint: Endpoint,
    config: ConnectionConfig,
    tls: Option<TlsConfig>,
}

impl PgConnectionFactory {
    /// Factory for `endpoint`; `tls` is required when `config.sslmode` may negotiate TLS
    pub fn new(endpoint: Endpoint, config: ConnectionConfig, tls: Option<TlsConfig>) -> Self {
        Self {
            endpoint,
            config,
            tls,
        }
    }

    /// sslmode sessions are opened with
    pub fn sslmode(&self) -> SslMode {
        self.config.sslmode
    }
}

impl ConnectionFactory for PgConnectionFactory {
    type Connection = Connection;

    async fn connect(&self) -> Result<Connection> {
        Connection::connect(&self.endpoint, &self.config, self.tls.as_ref()).await
    }
}

/// Builds a [`PgConnectionFactory`] per posture from a parsed connection string
#[derive(Debug, Clone)]
pub struct PgFactoryProvider {
    info: ConnectionInfo,
    base: ConnectionConfig,
}

impl PgFactoryProvider {
    /// `base` carries everything except the posture-dependent sslmode
    pub fn new(info: ConnectionInfo, base: ConnectionConfig) -> Self {
        Self { info, base }
    }
}

impl FactoryProvider for PgFactoryProvider {
    type Factory = PgConnectionFactory;

    fn factory(&self, options: &SecurityOptions) -> Result<PgConnectionFactory> {
        let sslmode = options.sslmode(self.base.sslmode);
        let tls = self.info.to_tls_config(sslmode)?;
        let config = ConnectionConfig {
            sslmode,
            ..self.base.clone()
        };
        Ok(PgConnectionFactory::new(self.info.endpoint.clone(), config, tls))
    }

    fn describe(&self, options: &SecurityOptions) -> String {
        let limit = |d: Option<std::time::Duration>| {
            d.map_or_else(|| "none".to_string(), |d| format!("{}ms", d.as_millis()))
        };
        format!(
            "user={} url={} sslmode={} connect_timeout={} statement_timeout={}",
            self.base.user,
            self.info,
            options.sslmode(self.base.sslmode),
            limit(self.base.connect_timeout),
            limit(self.base.statement_timeout)
        )
    }
}

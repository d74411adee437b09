//! Core connection type

use super::row::Row;
use super::state::ConnectionState;
use super::tls::{SslMode, TlsConfig};
use super::transport::Transport;
use crate::auth::{md5_password, ScramClient, SCRAM_SHA_256};
use crate::protocol::constants::{ssl_reply, PROTOCOL_VERSION};
use crate::protocol::{
    decode_message, encode_message, AuthenticationMessage, BackendMessage, FrontendMessage,
};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Instrument;

/// Connection configuration
///
/// Use `ConnectionConfig::builder()` to set timeouts, application name and sslmode.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password (optional)
    pub password: Option<String>,
    /// Limit on transport setup, TLS negotiation and authentication together
    pub connect_timeout: Option<Duration>,
    /// Server-side `statement_timeout`, sent as a startup parameter
    pub statement_timeout: Option<Duration>,
    /// Application name for Postgres logs
    pub application_name: Option<String>,
    /// SSL/TLS mode
    pub sslmode: SslMode,
}

impl ConnectionConfig {
    /// Create new configuration with defaults
    pub fn new(database: impl Into<String>, user: impl Into<String>) -> Self {
        Self::builder(database, user).build()
    }

    /// Create a builder for advanced configuration
    ///
    /// ```ignore
    /// let config = ConnectionConfig::builder("postgres", "probe")
    ///     .connect_timeout(Duration::from_secs(10))
    ///     .sslmode(SslMode::Require)
    ///     .build();
    /// ```
    pub fn builder(
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            database: database.into(),
            user: user.into(),
            password: None,
            connect_timeout: None,
            statement_timeout: None,
            application_name: None,
            sslmode: SslMode::default(),
        }
    }

    /// Set password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn startup_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("user".to_string(), self.user.clone()),
            ("database".to_string(), self.database.clone()),
        ];
        if let Some(app_name) = &self.application_name {
            params.push(("application_name".to_string(), app_name.clone()));
        }
        if let Some(timeout) = self.statement_timeout {
            params.push((
                "statement_timeout".to_string(),
                timeout.as_millis().to_string(),
            ));
        }
        params
    }
}

/// Builder for creating `ConnectionConfig`
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    database: String,
    user: String,
    password: Option<String>,
    connect_timeout: Option<Duration>,
    statement_timeout: Option<Duration>,
    application_name: Option<String>,
    sslmode: SslMode,
}

impl ConnectionConfigBuilder {
    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set connection timeout
    ///
    /// Default: None (no timeout)
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set statement (query) timeout
    ///
    /// Default: None (server default)
    pub fn statement_timeout(mut self, duration: Duration) -> Self {
        self.statement_timeout = Some(duration);
        self
    }

    /// Set application name for Postgres logs
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Set SSL/TLS mode
    pub fn sslmode(mut self, mode: SslMode) -> Self {
        self.sslmode = mode;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            database: self.database,
            user: self.user,
            password: self.password,
            connect_timeout: self.connect_timeout,
            statement_timeout: self.statement_timeout,
            application_name: self.application_name,
            sslmode: self.sslmode,
        }
    }
}

/// Where the server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port
    Tcp {
        /// Host name or address
        host: String,
        /// Port
        port: u16,
    },
    /// Unix socket directory; the socket file is `.s.PGSQL.<port>` inside it
    Unix {
        /// Socket directory
        dir: PathBuf,
        /// Port used to name the socket file
        port: u16,
    },
}

impl Endpoint {
    /// Host name used for SNI, if this is a TCP endpoint
    pub fn host(&self) -> Option<&str> {
        match self {
            Endpoint::Tcp { host, .. } => Some(host),
            Endpoint::Unix { .. } => None,
        }
    }

    /// Full socket path of a Unix endpoint
    pub fn socket_path(&self) -> Option<PathBuf> {
        match self {
            Endpoint::Tcp { .. } => None,
            Endpoint::Unix { dir, port } => Some(dir.join(format!(".s.PGSQL.{}", port))),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix { dir, port } => {
                write!(f, "{}", dir.join(format!(".s.PGSQL.{}", port)).display())
            }
        }
    }
}

/// Postgres connection
pub struct Connection {
    transport: Option<Transport>,
    state: ConnectionState,
    read_buf: BytesMut,
    process_id: Option<i32>,
    server_version: Option<String>,
}

impl Connection {
    /// Create connection from transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Some(transport),
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            process_id: None,
            server_version: None,
        }
    }

    /// Open a session: transport, sslmode negotiation, startup and authentication.
    ///
    /// `tls` must be provided whenever `config.sslmode` may negotiate TLS on a TCP endpoint.
    /// The whole sequence is bounded by `config.connect_timeout`.
    pub async fn connect(
        endpoint: &Endpoint,
        config: &ConnectionConfig,
        tls: Option<&TlsConfig>,
    ) -> Result<Self> {
        let establish = Self::establish(endpoint, config, tls);
        match config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, establish)
                .await
                .map_err(|_| Error::Timeout {
                    operation: "connect",
                    after: limit,
                })?,
            None => establish.await,
        }
    }

    async fn establish(
        endpoint: &Endpoint,
        config: &ConnectionConfig,
        tls: Option<&TlsConfig>,
    ) -> Result<Self> {
        match endpoint {
            Endpoint::Unix { .. } => {
                let path = endpoint
                    .socket_path()
                    .ok_or_else(|| Error::Config("missing socket path".into()))?;
                let transport = Transport::connect_unix(&path).await?;
                // sslmode does not apply to local sockets
                Self::handshake(transport, None, SslMode::Disable, config, tls).await
            }
            Endpoint::Tcp { host, port } => {
                let transport = Transport::connect_tcp(host, *port).await?;
                let attempt =
                    Self::handshake(transport, Some(host), config.sslmode, config, tls).await;
                match attempt {
                    Err(err) => match fallback_mode(config.sslmode, &err) {
                        Some(retry) => {
                            tracing::debug!(error = %err, %retry, "first session failed, reconnecting");
                            let transport = Transport::connect_tcp(host, *port).await?;
                            Self::handshake(transport, Some(host), retry, config, tls).await
                        }
                        None => Err(err),
                    },
                    ok => ok,
                }
            }
        }
    }

    /// Negotiate TLS per `sslmode` on an open transport, then run startup.
    pub(crate) async fn handshake(
        transport: Transport,
        host: Option<&str>,
        sslmode: SslMode,
        config: &ConnectionConfig,
        tls: Option<&TlsConfig>,
    ) -> Result<Self> {
        let mut conn = Self::new(transport);

        // allow starts in plaintext; the caller retries with TLS on refusal
        let negotiate = sslmode.attempts_tls() && sslmode != SslMode::Allow;
        if let (true, Some(host)) = (negotiate, host) {
            let tls = tls.ok_or_else(|| {
                Error::Config(format!(
                    "sslmode={} requires a TLS configuration but none was provided",
                    sslmode
                ))
            })?;
            conn.negotiate_tls(tls, host, sslmode).await?;
        }

        conn.startup(config).await?;
        Ok(conn)
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `server_version` reported by the server during startup
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Backend process id
    pub fn process_id(&self) -> Option<i32> {
        self.process_id
    }

    /// Whether the session is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_tls)
    }

    /// Send SSLRequest and act on the single-byte reply.
    ///
    /// `S` upgrades the transport. `N` continues in plaintext when `sslmode` allows it and
    /// fails otherwise.
    async fn negotiate_tls(
        &mut self,
        tls_config: &TlsConfig,
        hostname: &str,
        sslmode: SslMode,
    ) -> Result<()> {
        self.state.transition(ConnectionState::NegotiatingTls)?;
        self.send_message(&FrontendMessage::SslRequest).await?;

        while self.read_buf.is_empty() {
            self.fill_read_buf().await?;
        }
        let response = self.read_buf[0];
        self.read_buf.advance(1);

        match response {
            ssl_reply::ACCEPT => {
                if !self.read_buf.is_empty() {
                    return Err(Error::Protocol(
                        "server sent unencrypted data after accepting TLS".into(),
                    ));
                }
                tracing::debug!("server accepted TLS, upgrading connection");
                let transport = self.transport.take().ok_or(Error::ConnectionClosed)?;
                self.transport = Some(transport.upgrade_to_tls(tls_config, hostname).await?);
                tracing::debug!(verification = ?tls_config.verification(), "TLS established");
                Ok(())
            }
            ssl_reply::REJECT if sslmode.allows_plaintext() => {
                tracing::debug!(%sslmode, "server declined TLS, continuing in plaintext");
                Ok(())
            }
            ssl_reply::REJECT => Err(Error::Tls(format!(
                "server does not support TLS (sslmode={})",
                sslmode
            ))),
            other => Err(Error::Protocol(format!(
                "unexpected SSLRequest response byte: 0x{:02X}",
                other
            ))),
        }
    }

    /// Perform startup and authentication
    async fn startup(&mut self, config: &ConnectionConfig) -> Result<()> {
        async {
            self.state.transition(ConnectionState::AwaitingAuth)?;

            let startup = FrontendMessage::Startup {
                version: PROTOCOL_VERSION,
                params: config.startup_params(),
            };
            self.send_message(&startup).await?;

            self.state.transition(ConnectionState::Authenticating)?;
            self.authenticate(config).await?;

            self.state.transition(ConnectionState::Idle)?;
            tracing::debug!(
                server_version = self.server_version.as_deref().unwrap_or("unknown"),
                tls = self.is_tls(),
                "startup complete"
            );
            Ok(())
        }
        .instrument(tracing::debug_span!(
            "startup",
            user = %config.user,
            database = %config.database
        ))
        .await
    }

    /// Handle authentication, then read until ReadyForQuery
    async fn authenticate(&mut self, config: &ConnectionConfig) -> Result<()> {
        loop {
            let msg = self.receive_message().await?;

            match msg {
                BackendMessage::Authentication(auth) => match auth {
                    AuthenticationMessage::Ok => {
                        tracing::debug!("authentication successful");
                    }
                    AuthenticationMessage::CleartextPassword => {
                        let password = require_password(config)?;
                        self.send_message(&FrontendMessage::Password(password.to_string()))
                            .await?;
                    }
                    AuthenticationMessage::Md5Password { salt } => {
                        let password = require_password(config)?;
                        let hashed = md5_password(&config.user, password, salt);
                        self.send_message(&FrontendMessage::Password(hashed)).await?;
                    }
                    AuthenticationMessage::Sasl { mechanisms } => {
                        self.handle_sasl(&mechanisms, config).await?;
                    }
                    AuthenticationMessage::SaslContinue { .. }
                    | AuthenticationMessage::SaslFinal { .. } => {
                        return Err(Error::Protocol(
                            "unexpected SASL message outside of SASL flow".into(),
                        ));
                    }
                },
                BackendMessage::BackendKeyData { process_id, .. } => {
                    self.process_id = Some(process_id);
                }
                BackendMessage::ParameterStatus { name, value } => {
                    tracing::trace!("parameter status: {} = {}", name, value);
                    if name == "server_version" {
                        self.server_version = Some(value);
                    }
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!("notice during startup: {}", notice);
                }
                BackendMessage::ReadyForQuery { .. } => break,
                BackendMessage::ErrorResponse(err) => return Err(Error::Server(err)),
                _ => {
                    return Err(Error::Protocol(format!(
                        "unexpected message during auth: {:?}",
                        msg
                    )));
                }
            }
        }
        Ok(())
    }

    /// Handle SASL authentication (SCRAM-SHA-256)
    async fn handle_sasl(&mut self, mechanisms: &[String], config: &ConnectionConfig) -> Result<()> {
        if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
            return Err(Error::Authentication(format!(
                "server does not support SCRAM-SHA-256. Available: {}",
                mechanisms.join(", ")
            )));
        }

        let password = require_password(config)?;
        let scram = ScramClient::new(password);
        tracing::debug!("initiating SCRAM-SHA-256 authentication");

        self.send_message(&FrontendMessage::SaslInitialResponse {
            mechanism: SCRAM_SHA_256.to_string(),
            data: scram.client_first().into_bytes(),
        })
        .await?;

        let server_first = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => data,
            BackendMessage::ErrorResponse(err) => return Err(Error::Server(err)),
            _ => {
                return Err(Error::Protocol(
                    "expected SaslContinue message during SASL authentication".into(),
                ))
            }
        };
        let server_first = String::from_utf8(server_first).map_err(|e| {
            Error::Authentication(format!("invalid UTF-8 in server first message: {}", e))
        })?;

        let (client_final, scram_state) = scram
            .client_final(&server_first)
            .map_err(|e| Error::Authentication(format!("SCRAM error: {}", e)))?;
        self.send_message(&FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        })
        .await?;

        let server_final = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => data,
            BackendMessage::ErrorResponse(err) => return Err(Error::Server(err)),
            _ => {
                return Err(Error::Protocol(
                    "expected SaslFinal message during SASL authentication".into(),
                ))
            }
        };
        let server_final = String::from_utf8(server_final).map_err(|e| {
            Error::Authentication(format!("invalid UTF-8 in server final message: {}", e))
        })?;

        scram
            .verify_server_final(&server_final, &scram_state)
            .map_err(|e| Error::Authentication(format!("SCRAM verification failed: {}", e)))?;
        tracing::debug!("SCRAM-SHA-256 server signature verified");
        Ok(())
    }

    /// Run a simple query and return its first row.
    ///
    /// The response is always read through ReadyForQuery, so the session is idle again
    /// whether the query succeeded or the server reported an error.
    pub async fn query_row(&mut self, query: &str) -> Result<Row> {
        if self.state != ConnectionState::Idle {
            return Err(Error::InvalidState {
                expected: ConnectionState::Idle.to_string(),
                actual: self.state.to_string(),
            });
        }

        self.state.transition(ConnectionState::Querying)?;
        self.send_message(&FrontendMessage::Query(query.to_string()))
            .await?;

        let mut columns = Vec::new();
        let mut first_row = None;
        let mut failure = None;

        loop {
            match self.receive_message().await? {
                BackendMessage::RowDescription(fields) if first_row.is_none() => {
                    columns = fields.into_iter().map(|f| f.name).collect();
                }
                BackendMessage::DataRow(values) if first_row.is_none() => {
                    first_row = Some(
                        values
                            .into_iter()
                            .map(|v| v.map(|b| String::from_utf8_lossy(&b).into_owned()))
                            .collect::<Vec<_>>(),
                    );
                }
                BackendMessage::ErrorResponse(err) => {
                    tracing::debug!("query failed: {}", err);
                    failure.get_or_insert(Error::Server(err));
                }
                BackendMessage::ReadyForQuery { .. } => break,
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!("notice: {}", notice);
                }
                // further result sets, completion tags and parameter changes
                _ => {}
            }
        }

        self.state.transition(ConnectionState::Idle)?;

        if let Some(err) = failure {
            return Err(err);
        }
        first_row
            .map(|values| Row::new(columns, values))
            .ok_or(Error::NoRows)
    }

    /// Send a frontend message
    async fn send_message(&mut self, msg: &FrontendMessage) -> Result<()> {
        let buf = encode_message(msg)?;
        let transport = self.transport()?;
        transport.write_all(&buf).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Receive a backend message
    async fn receive_message(&mut self) -> Result<BackendMessage> {
        loop {
            match decode_message(&mut self.read_buf) {
                Ok((msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(msg);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }

            self.fill_read_buf().await?;
        }
    }

    /// Read whatever the transport has into `read_buf`
    async fn fill_read_buf(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        let n = transport.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut Transport> {
        self.transport.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Send Terminate and shut the transport down
    pub async fn close(mut self) -> Result<()> {
        self.state.transition(ConnectionState::Closed)?;
        let _ = self.send_message(&FrontendMessage::Terminate).await;
        self.transport()?.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("process_id", &self.process_id)
            .field("server_version", &self.server_version)
            .field("tls", &self.is_tls())
            .finish()
    }
}

fn require_password(config: &ConnectionConfig) -> Result<&str> {
    config
        .password
        .as_deref()
        .ok_or_else(|| Error::Authentication("password required".into()))
}

/// Errors after which `allow` retries the session over TLS
fn is_server_refusal(err: &Error) -> bool {
    matches!(err, Error::Server(_) | Error::Authentication(_))
}

/// Mode for the one reconnect libpq makes after a failed first session.
///
/// `allow` retries over TLS when the plaintext session is refused; `prefer` retries in
/// plaintext when the TLS handshake itself fails.
fn fallback_mode(sslmode: SslMode, err: &Error) -> Option<SslMode> {
    match (sslmode, err) {
        (SslMode::Allow, err) if is_server_refusal(err) => Some(SslMode::Require),
        (SslMode::Prefer, Error::Tls(_)) => Some(SslMode::Disable),
        _ => None,
    }
}

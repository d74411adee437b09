//! Connection string parsing
//!
//! Supports formats:
//! * postgres://[user[:password]@]host[:port][/database][?params]
//! * postgres:///database (Unix socket, default directory)
//! * postgres:///database?host=/path/to/socket (Unix socket, custom directory)
//!
//! Recognised parameters: `host`, `port`, `dbname`, `user`, `password`, `sslmode`,
//! `sslrootcert`, `connect_timeout` (seconds, 0 = none) and `application_name`.

use crate::connection::{ConnectionConfig, ConnectionConfigBuilder, Endpoint, SslMode, TlsConfig};
use crate::{Error, Result};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::{Host, Url};

const DEFAULT_PORT: u16 = 5432;

/// Parsed connection info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Where to connect
    pub endpoint: Endpoint,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password
    pub password: Option<String>,
    /// SSL/TLS mode (default `prefer`)
    pub sslmode: SslMode,
    /// Path to custom CA certificate (from sslrootcert param)
    pub sslrootcert: Option<String>,
    /// Connect timeout (from connect_timeout param)
    pub connect_timeout: Option<Duration>,
    /// Application name (from application_name param)
    pub application_name: Option<String>,
    /// Database named in the URL rather than defaulted from the user
    explicit_database: bool,
}

/// Resolve the default Unix socket directory
fn resolve_default_socket_dir() -> Option<PathBuf> {
    ["/run/postgresql", "/var/run/postgresql", "/tmp"]
        .iter()
        .map(Path::new)
        .find(|dir| dir.is_dir())
        .map(Path::to_path_buf)
}

fn decode(component: &str, what: &str) -> Result<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Error::Config(format!("{} is not valid UTF-8 after percent-decoding", what)))
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| Error::Config(format!("invalid connection URL: {}", e)))?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(Error::Config(
                "connection string must start with postgres:// or postgresql://".into(),
            ));
        }

        let mut host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => Some(decode(d, "host")?),
            Some(Host::Ipv4(addr)) => Some(addr.to_string()),
            Some(Host::Ipv6(addr)) => Some(addr.to_string()),
            _ => None,
        };
        let mut port = url.port();
        let mut user = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(|u| decode(u, "user"))
            .transpose()?;
        let mut password = url.password().map(|p| decode(p, "password")).transpose()?;
        let path = url.path().trim_start_matches('/');
        let mut database = Some(path)
            .filter(|p| !p.is_empty())
            .map(|p| decode(p, "database"))
            .transpose()?;

        let mut sslmode = SslMode::default();
        let mut sslrootcert = None;
        let mut connect_timeout = None;
        let mut application_name = None;

        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "host" => host = Some(value),
                "port" => {
                    port = Some(value.parse().map_err(|_| {
                        Error::Config(format!("invalid port '{}'", value))
                    })?)
                }
                "dbname" => database = Some(value),
                "user" => user = Some(value),
                "password" => password = Some(value),
                "sslmode" => sslmode = value.parse()?,
                "sslrootcert" => sslrootcert = Some(value),
                "connect_timeout" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        Error::Config(format!("invalid connect_timeout '{}'", value))
                    })?;
                    connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
                }
                "application_name" => application_name = Some(value),
                other => tracing::warn!(parameter = other, "ignoring unsupported connection parameter"),
            }
        }

        let port = port.unwrap_or(DEFAULT_PORT);
        let endpoint = match host {
            Some(dir) if dir.starts_with('/') => Endpoint::Unix {
                dir: PathBuf::from(dir),
                port,
            },
            Some(host) => Endpoint::Tcp { host, port },
            None => Endpoint::Unix {
                dir: resolve_default_socket_dir().ok_or_else(|| {
                    Error::Config(
                        "could not locate Unix socket directory. Set host query parameter explicitly."
                            .into(),
                    )
                })?,
                port,
            },
        };

        let user = user.unwrap_or_else(whoami::username);
        let explicit_database = database.is_some();
        let database = database.unwrap_or_else(|| user.clone());

        Ok(Self {
            endpoint,
            database,
            user,
            password,
            sslmode,
            sslrootcert,
            connect_timeout,
            application_name,
            explicit_database,
        })
    }

    /// Replace the user and, when given, the password.
    ///
    /// A database not named in the URL follows the new user.
    pub fn with_credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = user.into();
        if !self.explicit_database {
            self.database = self.user.clone();
        }
        if password.is_some() {
            self.password = password;
        }
        self
    }

    /// Start a `ConnectionConfig` from the parsed parameters.
    pub fn to_config(&self) -> ConnectionConfigBuilder {
        let mut builder = ConnectionConfig::builder(&self.database, &self.user).sslmode(self.sslmode);
        if let Some(password) = &self.password {
            builder = builder.password(password);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(name) = &self.application_name {
            builder = builder.application_name(name);
        }
        builder
    }

    /// Build a `TlsConfig` for `sslmode`.
    ///
    /// Returns `None` when TLS can never be negotiated: `disable`, or a Unix socket endpoint.
    pub fn to_tls_config(&self, sslmode: SslMode) -> Result<Option<TlsConfig>> {
        if !sslmode.attempts_tls() || matches!(self.endpoint, Endpoint::Unix { .. }) {
            return Ok(None);
        }

        let mut builder = TlsConfig::builder().verification(sslmode.verification());
        if let Some(ca_path) = &self.sslrootcert {
            builder = builder.ca_cert_path(ca_path);
        }
        builder.build().map(Some)
    }
}

/// Password-free rendering for logs and reports
impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "postgres://{}", self.user)?;
        if self.password.is_some() {
            f.write_str(":***")?;
        }
        match &self.endpoint {
            Endpoint::Tcp { .. } => write!(f, "@{}/{}", self.endpoint, self.database)?,
            Endpoint::Unix { dir, port } => write!(
                f,
                "@/{}?host={}&port={}",
                self.database,
                dir.display(),
                port
            )?,
        }
        let sep = if matches!(self.endpoint, Endpoint::Unix { .. }) { '&' } else { '?' };
        write!(f, "{}sslmode={}", sep, self.sslmode)
    }
}

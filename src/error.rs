//! Error types

use std::fmt::Write;
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by the wire client and the probe
#[derive(Debug, Error)]
pub enum Error {
    /// Socket level failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Server closed the connection mid-conversation
    #[error("connection closed by server")]
    ConnectionClosed,

    /// An operation exceeded its configured limit
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// What was being attempted
        operation: &'static str,
        /// Configured limit
        after: Duration,
    },

    /// Invalid configuration (bad URL, unusable TLS settings, wrong arguments)
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or unexpected protocol traffic
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Client side authentication failure
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// TLS negotiation or handshake failure
    #[error("tls error: {0}")]
    Tls(String),

    /// ErrorResponse sent by the server
    #[error("{0}")]
    Server(ServerError),

    /// State machine violation
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state description
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Result set lacks a required column
    #[error("result has no column named {0}")]
    MissingColumn(String),

    /// Query produced no data row
    #[error("query returned no rows")]
    NoRows,
}

/// Fields of a server ErrorResponse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Severity (FATAL, ERROR, ...)
    pub severity: Option<String>,
    /// SQLSTATE
    pub code: Option<String>,
    /// Primary message
    pub message: String,
    /// Optional detail
    pub detail: Option<String>,
    /// Optional hint
    pub hint: Option<String>,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " ({})", code)?;
        }
        Ok(())
    }
}

impl Error {
    /// SQLSTATE of a server error, if any
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(err) => err.code.as_deref(),
            _ => None,
        }
    }

    /// Short, stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::ConnectionClosed => "closed",
            Error::Timeout { .. } => "timeout",
            Error::Config(_) => "config",
            Error::Protocol(_) => "protocol",
            Error::Authentication(_) => "authentication",
            Error::Tls(_) => "tls",
            Error::Server(_) => "server",
            Error::InvalidState { .. } => "state",
            Error::MissingColumn(_) | Error::NoRows => "result",
        }
    }

    /// Multi-line rendering with every detail available: server fields and the source chain
    pub fn diagnostic(&self) -> String {
        let mut s = format!("{} [kind={}]", self, self.kind());
        if let Error::Server(err) = self {
            if let Some(code) = &err.code {
                let _ = write!(s, "\n  sqlstate: {}", code);
            }
            if let Some(severity) = &err.severity {
                let _ = write!(s, "\n  severity: {}", severity);
            }
            if let Some(detail) = &err.detail {
                let _ = write!(s, "\n  detail: {}", detail);
            }
            if let Some(hint) = &err.hint {
                let _ = write!(s, "\n  hint: {}", hint);
            }
        }
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let _ = write!(s, "\n  caused by: {}", cause);
            source = cause.source();
        }
        let _ = write!(s, "\n  debug: {:?}", self);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_failure() -> Error {
        Error::Server(ServerError {
            severity: Some("FATAL".into()),
            code: Some("28P01".into()),
            message: "password authentication failed for user \"app\"".into(),
            detail: None,
            hint: Some("check pg_hba.conf".into()),
        })
    }

    #[test]
    fn test_server_error_display() {
        assert_eq!(
            auth_failure().to_string(),
            "FATAL: password authentication failed for user \"app\" (28P01)"
        );
    }

    #[test]
    fn test_sqlstate() {
        assert_eq!(auth_failure().sqlstate(), Some("28P01"));
        assert_eq!(Error::NoRows.sqlstate(), None);
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            operation: "connect",
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "connect timed out after 1500ms");
    }

    #[test]
    fn test_diagnostic_includes_server_fields() {
        let diag = auth_failure().diagnostic();
        assert!(diag.contains("sqlstate: 28P01"));
        assert!(diag.contains("severity: FATAL"));
        assert!(diag.contains("hint: check pg_hba.conf"));
        assert!(diag.contains("kind=server"));
    }

    #[test]
    fn test_diagnostic_walks_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let diag = Error::from(io).diagnostic();
        assert!(diag.starts_with("io error: refused"));
        assert!(diag.contains("caused by: refused"));
    }
}

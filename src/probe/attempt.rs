//! One connection attempt and its outcome signature

use crate::Error;
use std::time::Duration;
use tokio::time::Instant;

/// Record of one acquisition plus whatever inspection learned about the server
#[derive(Debug)]
pub struct ConnectionAttempt<C> {
    /// Taken just before the factory was asked for a connection
    pub started: Instant,
    /// Time spent acquiring, failures included
    pub elapsed: Duration,
    /// Open connection, owned until the runner closes it
    pub connection: Option<C>,
    /// Current schema
    pub schema: Option<String>,
    /// Node / instance identifier
    pub instance: Option<String>,
    /// Service (database) name
    pub service: Option<String>,
    /// Server host as seen by the server
    pub server: Option<String>,
    /// Failures recorded against this attempt
    pub error_count: u32,
    /// Rendering of the most recent failure
    pub last_error: Option<String>,
}

impl<C> ConnectionAttempt<C> {
    /// Attempt that produced a connection
    pub fn succeeded(started: Instant, elapsed: Duration, connection: C) -> Self {
        Self {
            connection: Some(connection),
            ..Self::empty(started, elapsed)
        }
    }

    /// Attempt whose acquisition failed
    pub fn failed(started: Instant, elapsed: Duration, err: &Error) -> Self {
        let mut attempt = Self::empty(started, elapsed);
        attempt.record_error(err);
        attempt
    }

    fn empty(started: Instant, elapsed: Duration) -> Self {
        Self {
            started,
            elapsed,
            connection: None,
            schema: None,
            instance: None,
            service: None,
            server: None,
            error_count: 0,
            last_error: None,
        }
    }

    /// Count a failure and remember its rendering
    pub fn record_error(&mut self, err: &Error) {
        self.error_count += 1;
        self.last_error = Some(err.to_string());
    }

    /// No failure recorded
    pub fn is_ok(&self) -> bool {
        self.error_count == 0
    }

    /// Histogram key for this attempt
    pub fn signature(&self) -> OutcomeSignature {
        OutcomeSignature::new(
            self.is_ok(),
            self.schema.as_deref(),
            self.instance.as_deref(),
            self.service.as_deref(),
            self.server.as_deref(),
            self.last_error.as_deref(),
        )
    }
}

/// `"<OK|ERROR> schema=<s> inst=<i> serv=<v> on=<h>[ <last_error>]"`, absent fields as `null`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutcomeSignature(String);

impl OutcomeSignature {
    /// Build the canonical signature
    pub fn new(
        ok: bool,
        schema: Option<&str>,
        instance: Option<&str>,
        service: Option<&str>,
        server: Option<&str>,
        last_error: Option<&str>,
    ) -> Self {
        let field = |v: Option<&str>| v.unwrap_or("null").to_string();
        let mut s = format!(
            "{} schema={} inst={} serv={} on={}",
            if ok { "OK" } else { "ERROR" },
            field(schema),
            field(instance),
            field(service),
            field(server),
        );
        if let Some(err) = last_error {
            s.push(' ');
            s.push_str(err);
        }
        Self(s)
    }

    /// Whether the attempt was error-free
    pub fn is_ok(&self) -> bool {
        self.0.starts_with("OK ")
    }

    /// Signature text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OutcomeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//! Command line configuration

use crate::client::ConnectionInfo;
use crate::connection::ConnectionConfig;
use crate::probe::{ProbeSettings, DEFAULT_INSPECTION_QUERY};
use crate::{Error, Result};
use clap::Parser;
use std::time::Duration;

/// Repeated connect/disconnect probe for Postgres
#[derive(Parser, Debug, Clone)]
#[command(name = "connprobe", version)]
#[command(about = "Measure connection latency, TLS posture and node distribution")]
pub struct Cli {
    /// Database user
    pub user: String,

    /// Connection URL, e.g. postgres://db.example.com:5432/app?sslmode=prefer
    pub url: String,

    /// Password; prompted for without echo when omitted
    pub password: Option<String>,

    /// Measured connections per variant
    #[arg(
        short = 'n',
        long,
        default_value_t = crate::probe::DEFAULT_ITERATIONS,
        value_parser = clap::value_parser!(u32).range(1..),
        env = "CONNPROBE_ITERATIONS"
    )]
    pub iterations: u32,

    /// Pause between connections, in milliseconds
    #[arg(long, default_value_t = 15, env = "CONNPROBE_PAUSE_MS")]
    pub pause_ms: u64,

    /// Limit on opening one connection, in milliseconds (overrides the URL's connect_timeout)
    #[arg(long, env = "CONNPROBE_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Server-side statement_timeout for the inspection query, in milliseconds
    #[arg(long, env = "CONNPROBE_STATEMENT_TIMEOUT_MS")]
    pub statement_timeout_ms: Option<u64>,

    /// Inspection query; must return currschema, instance, service_name and server_host
    #[arg(long, default_value = DEFAULT_INSPECTION_QUERY)]
    pub query: String,

    /// application_name reported to the server (overrides the URL's)
    #[arg(long, default_value = "connprobe")]
    pub application_name: String,
}

/// Everything a run needs, resolved from the command line
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Parsed target
    pub info: ConnectionInfo,
    /// Session settings before a posture is applied
    pub connection: ConnectionConfig,
    /// Loop settings
    pub settings: ProbeSettings,
}

impl Cli {
    /// Resolve into a [`ProbeConfig`], calling `prompt` for the password if none was given.
    ///
    /// A password embedded in the URL does not suppress the prompt; the positional argument
    /// or the prompt always wins.
    pub fn resolve<P>(self, prompt: P) -> Result<ProbeConfig>
    where
        P: FnOnce(&str) -> std::io::Result<String>,
    {
        let password = match self.password {
            Some(password) => password,
            None => prompt(&format!("Enter password for user {}: ", self.user))?,
        };

        let info = ConnectionInfo::parse(&self.url)?.with_credentials(&self.user, Some(password));

        let mut builder = info.to_config().application_name(&self.application_name);
        if let Some(ms) = self.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.statement_timeout_ms {
            builder = builder.statement_timeout(Duration::from_millis(ms));
        }

        if self.query.trim().is_empty() {
            return Err(Error::Config("inspection query must not be empty".into()));
        }

        Ok(ProbeConfig {
            info,
            connection: builder.build(),
            settings: ProbeSettings {
                iterations: self.iterations,
                pause: Duration::from_millis(self.pause_ms),
                query: self.query,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SslMode;

    fn no_prompt(_: &str) -> std::io::Result<String> {
        panic!("prompt not expected")
    }

    #[test]
    fn test_positional_arguments() {
        let cli = Cli::try_parse_from(["connprobe", "probe", "postgres://db/app", "pw"]).unwrap();
        assert_eq!(cli.user, "probe");
        assert_eq!(cli.password.as_deref(), Some("pw"));
        assert_eq!(cli.pause_ms, 15);
        assert_eq!(cli.application_name, "connprobe");
    }

    #[test]
    fn test_missing_url_is_usage_error() {
        assert!(Cli::try_parse_from(["connprobe", "probe"]).is_err());
    }

    #[test]
    fn test_too_many_arguments_is_usage_error() {
        assert!(Cli::try_parse_from(["connprobe", "u", "postgres://db/app", "pw", "extra"]).is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(
            Cli::try_parse_from(["connprobe", "-n", "0", "u", "postgres://db/app", "pw"]).is_err()
        );
    }

    #[test]
    fn test_resolve_with_password_argument() {
        let cli = Cli::try_parse_from([
            "connprobe",
            "--iterations",
            "7",
            "--pause-ms",
            "5",
            "--connect-timeout-ms",
            "2500",
            "--statement-timeout-ms",
            "1000",
            "probe",
            "postgres://other:old@db:6432/app?sslmode=verify-full",
            "pw",
        ])
        .unwrap();

        let config = cli.resolve(no_prompt).unwrap();
        assert_eq!(config.settings.iterations, 7);
        assert_eq!(config.settings.pause, Duration::from_millis(5));
        assert_eq!(config.settings.query, DEFAULT_INSPECTION_QUERY);
        assert_eq!(config.connection.user, "probe");
        assert_eq!(config.connection.password.as_deref(), Some("pw"));
        assert_eq!(config.connection.sslmode, SslMode::VerifyFull);
        assert_eq!(config.connection.connect_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.connection.statement_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.connection.application_name.as_deref(), Some("connprobe"));
    }

    #[test]
    fn test_resolve_prompts_for_password() {
        let cli = Cli::try_parse_from(["connprobe", "probe", "postgres://db/app"]).unwrap();
        let config = cli
            .resolve(|prompt| {
                assert_eq!(prompt, "Enter password for user probe: ");
                Ok("typed".to_string())
            })
            .unwrap();
        assert_eq!(config.connection.password.as_deref(), Some("typed"));
    }

    #[test]
    fn test_cli_user_names_default_database() {
        let cli = Cli::try_parse_from(["connprobe", "probe", "postgres://db:5432", "pw"]).unwrap();
        let config = cli.resolve(no_prompt).unwrap();
        assert_eq!(config.connection.user, "probe");
        assert_eq!(config.connection.database, "probe");
    }

    #[test]
    fn test_resolve_bad_url() {
        let cli = Cli::try_parse_from(["connprobe", "probe", "http://db/app", "pw"]).unwrap();
        assert!(matches!(cli.resolve(no_prompt), Err(Error::Config(_))));
    }
}

//! connprobe: repeated connect/disconnect probing of a Postgres endpoint.
//!
//! Each run measures three variants (no posture, `REQUIRED`, `REJECTED` encryption) and
//! reports connection latency together with a histogram of which schema, node, database
//! and server answered.
//!
//! ```ignore
//! let info = ConnectionInfo::parse("postgres://probe@db.example.com/app")?;
//! let provider = PgFactoryProvider::new(info.clone(), info.to_config().password("secret").build());
//! let mut orchestrator = Orchestrator::new(provider, ProbeSettings::default(), std::io::stdout());
//! orchestrator.run_all().await?;
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod protocol;

pub use error::{Error, Result};

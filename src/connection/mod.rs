//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP, TLS, Unix socket)
//! * sslmode negotiation and TLS configuration
//! * Session lifecycle (startup, auth, simple query, terminate)
//! * State machine enforcement

mod conn;
mod row;
mod state;
mod tls;
mod transport;

pub use conn::{Connection, ConnectionConfig, ConnectionConfigBuilder, Endpoint};
pub use row::Row;
pub use state::ConnectionState;
pub use tls::{server_name, SslMode, TlsConfig, TlsConfigBuilder, Verification};
pub use transport::Transport;

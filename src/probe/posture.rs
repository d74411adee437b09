//! Security postures and their sslmode realisation.
//!
//! A posture is a label such as `REQUIRED` or `REJECTED` describing how much encryption
//! and integrity protection a connection must negotiate. Labels are matched
//! case-insensitively; anything unrecognised behaves like no posture at all.

use crate::connection::SslMode;

/// The postures measured by a default run, in order
pub const DEFAULT_POSTURES: [Option<&str>; 3] = [None, Some("REQUIRED"), Some("REJECTED")];

/// Negotiation level for one protection service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Negotiation {
    /// Not configured; the connection string decides
    #[default]
    Unset,
    /// Never negotiate
    Rejected,
    /// Negotiate if the server asks
    Requested,
    /// Negotiate if the server supports it
    Accepted,
    /// Fail unless negotiated
    Required,
}

impl Negotiation {
    fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "REJECTED" => Self::Rejected,
            "REQUESTED" => Self::Requested,
            "ACCEPTED" => Self::Accepted,
            "REQUIRED" => Self::Required,
            _ => Self::Unset,
        }
    }

    fn sslmode(self) -> Option<SslMode> {
        match self {
            Self::Unset => None,
            Self::Rejected => Some(SslMode::Disable),
            Self::Requested => Some(SslMode::Allow),
            Self::Accepted => Some(SslMode::Prefer),
            Self::Required => Some(SslMode::Require),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Unset => "default",
            Self::Rejected => "rejected",
            Self::Requested => "requested",
            Self::Accepted => "accepted",
            Self::Required => "required",
        }
    }
}

/// Encryption and checksum settings handed to a connection factory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SecurityOptions {
    /// Transport encryption
    pub encryption: Negotiation,
    /// Integrity checksumming
    pub checksum: Negotiation,
}

impl SecurityOptions {
    /// Options for a posture label; `None` and unknown labels give the default options
    pub fn for_posture(posture: Option<&str>) -> Self {
        let level = posture.map(Negotiation::parse).unwrap_or_default();
        Self {
            encryption: level,
            checksum: level,
        }
    }

    /// sslmode to connect with, given the one from the connection string.
    ///
    /// TLS provides integrity as well as confidentiality, so the stronger of the two levels
    /// wins. A `require` posture keeps a stricter `verify-*` mode from the connection string.
    pub fn sslmode(&self, configured: SslMode) -> SslMode {
        match self.encryption.sslmode().max(self.checksum.sslmode()) {
            None => configured,
            Some(SslMode::Require) if configured > SslMode::Require => configured,
            Some(mode) => mode,
        }
    }

    /// Stable label for logs and metrics
    pub fn label(&self) -> &'static str {
        let strongest = if self.checksum.sslmode() > self.encryption.sslmode() {
            self.checksum
        } else {
            self.encryption
        };
        strongest.label()
    }
}

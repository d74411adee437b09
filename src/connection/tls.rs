//! TLS configuration for encrypted Postgres sessions.
//!
//! `SslMode` follows libpq's `sslmode` parameter. The verification level of a
//! [`TlsConfig`] is derived from it: `require` and weaker modes encrypt without
//! checking the certificate, `verify-ca` checks the chain, `verify-full` also
//! checks the host name.

use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::fs;
use std::sync::Arc;

/// SSL/TLS negotiation mode matching PostgreSQL's `sslmode` parameter.
///
/// Variants are ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SslMode {
    /// Plaintext only
    Disable,
    /// Plaintext first, TLS if the server insists
    Allow,
    /// TLS first, plaintext if the server declines
    #[default]
    Prefer,
    /// TLS required, certificate not verified
    Require,
    /// TLS required, certificate chain verified
    VerifyCa,
    /// TLS required, certificate chain and host name verified
    VerifyFull,
}

impl SslMode {
    /// Whether the session may end up unencrypted
    pub fn allows_plaintext(&self) -> bool {
        matches!(self, Self::Disable | Self::Allow | Self::Prefer)
    }

    /// Whether TLS is attempted at all
    pub fn attempts_tls(&self) -> bool {
        !matches!(self, Self::Disable)
    }

    /// Certificate verification level used when TLS is negotiated
    pub fn verification(&self) -> Verification {
        match self {
            Self::VerifyFull => Verification::Full,
            Self::VerifyCa => Verification::Chain,
            _ => Verification::None,
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(Error::Config(format!(
                "invalid sslmode '{}': expected disable, allow, prefer, require, verify-ca, or verify-full",
                s
            ))),
        }
    }
}

/// How much of the server certificate is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verification {
    /// Encrypt only
    #[default]
    None,
    /// Chain must lead to a trusted root; host name ignored
    Chain,
    /// Chain and host name
    Full,
}

/// TLS configuration for Postgres sessions.
///
/// ```ignore
/// let tls = TlsConfig::builder()
///     .verification(Verification::Full)
///     .ca_cert_path("/etc/ssl/certs/db-ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    ca_cert_path: Option<String>,
    verification: Verification,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Verification level this configuration enforces.
    pub fn verification(&self) -> Verification {
        self.verification
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("verification", &self.verification)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
    verification: Verification,
}

impl TlsConfigBuilder {
    /// Trust only the certificates in this PEM file instead of the system roots.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Set the verification level (default: none).
    pub fn verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the CA file cannot be read or holds no certificate,
    /// and `Error::Tls` if rustls rejects the configuration.
    pub fn build(self) -> Result<TlsConfig> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?;

        let client_config = match self.verification {
            Verification::Full => builder
                .with_root_certificates(self.root_store()?)
                .with_no_client_auth(),
            Verification::Chain => {
                let inner = WebPkiServerVerifier::builder_with_provider(
                    Arc::new(self.root_store()?),
                    provider.clone(),
                )
                .build()
                .map_err(|e| Error::Tls(e.to_string()))?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(ChainOnlyVerifier { inner }))
                    .with_no_client_auth()
            }
            Verification::None => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier::new(&provider)))
                .with_no_client_auth(),
        };

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            verification: self.verification,
            client_config: Arc::new(client_config),
        })
    }

    fn root_store(&self) -> Result<RootCertStore> {
        if let Some(path) = &self.ca_cert_path {
            return load_custom_ca(path);
        }

        let mut store = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        let (added, _ignored) = store.add_parsable_certificates(native.certs);
        if added == 0 {
            tracing::debug!(
                errors = native.errors.len(),
                "no usable system root certificates, using bundled webpki roots"
            );
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        Ok(store)
    }
}

/// Load CA certificates from a PEM file.
fn load_custom_ca(path: &str) -> Result<RootCertStore> {
    let data = fs::read(path).map_err(|e| {
        Error::Config(format!("failed to read CA certificate file '{}': {}", path, e))
    })?;

    let mut store = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut std::io::Cursor::new(&data)) {
        let cert = cert.map_err(|e| {
            Error::Config(format!("failed to parse CA certificate from '{}': {}", path, e))
        })?;
        store
            .add(cert)
            .map_err(|e| Error::Config(format!("invalid CA certificate in '{}': {}", path, e)))?;
    }

    if store.is_empty() {
        return Err(Error::Config(format!(
            "no valid certificates found in '{}'",
            path
        )));
    }
    Ok(store)
}

/// Server name for SNI and host-name verification.
pub fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    let hostname = hostname.trim_end_matches('.');
    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }
    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Config(format!("invalid hostname for TLS: '{}'", hostname)))
}

/// Accepts any certificate; handshake signatures are still checked.
#[derive(Debug)]
struct NoVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl NoVerifier {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Full webpki verification with the host-name mismatch forgiven (`verify-ca`).
#[derive(Debug)]
struct ChainOnlyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            // webpki checks the name only after the chain has validated
            Err(rustls::Error::InvalidCertificate(err)) if is_name_mismatch(&err) => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Newer rustls releases report the mismatch as `NotValidForNameContext`.
fn is_name_mismatch(err: &rustls::CertificateError) -> bool {
    matches!(err, rustls::CertificateError::NotValidForName)
        || format!("{:?}", err).starts_with("NotValidForName")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_from_str() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("allow".parse::<SslMode>().unwrap(), SslMode::Allow);
        assert_eq!("prefer".parse::<SslMode>().unwrap(), SslMode::Prefer);
        assert_eq!("require".parse::<SslMode>().unwrap(), SslMode::Require);
        assert_eq!("verify-ca".parse::<SslMode>().unwrap(), SslMode::VerifyCa);
        assert_eq!(
            "verify-full".parse::<SslMode>().unwrap(),
            SslMode::VerifyFull
        );
    }

    #[test]
    fn test_ssl_mode_from_str_invalid() {
        assert!("invalid".parse::<SslMode>().is_err());
        assert!("REQUIRE".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_ssl_mode_display_round_trips() {
        for mode in [
            SslMode::Disable,
            SslMode::Allow,
            SslMode::Prefer,
            SslMode::Require,
            SslMode::VerifyCa,
            SslMode::VerifyFull,
        ] {
            assert_eq!(mode.to_string().parse::<SslMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_ssl_mode_default_is_prefer() {
        assert_eq!(SslMode::default(), SslMode::Prefer);
    }

    #[test]
    fn test_ssl_mode_ordering() {
        assert!(SslMode::Disable < SslMode::Allow);
        assert!(SslMode::Prefer < SslMode::Require);
        assert!(SslMode::Require < SslMode::VerifyCa);
        assert_eq!(SslMode::Require.max(SslMode::VerifyFull), SslMode::VerifyFull);
    }

    #[test]
    fn test_ssl_mode_plaintext_and_verification() {
        assert!(SslMode::Prefer.allows_plaintext());
        assert!(!SslMode::Require.allows_plaintext());
        assert!(!SslMode::Disable.attempts_tls());
        assert_eq!(SslMode::Require.verification(), Verification::None);
        assert_eq!(SslMode::VerifyCa.verification(), Verification::Chain);
        assert_eq!(SslMode::VerifyFull.verification(), Verification::Full);
    }

    #[test]
    fn test_build_without_verification() {
        let tls = TlsConfig::builder().build().expect("tls config");
        assert_eq!(tls.verification(), Verification::None);
    }

    #[test]
    fn test_build_full_verification_with_system_roots() {
        let tls = TlsConfig::builder()
            .verification(Verification::Full)
            .build()
            .expect("tls config");
        assert_eq!(tls.verification(), Verification::Full);
    }

    #[test]
    fn test_missing_ca_file_is_config_error() {
        let err = TlsConfig::builder()
            .verification(Verification::Chain)
            .ca_cert_path("/nonexistent/ca.pem")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("db.internal.example.com.").is_ok());
        assert!(server_name("10.0.0.5").is_ok());
        assert!(server_name("").is_err());
        assert!(server_name("bad host").is_err());
    }

    #[test]
    fn test_tls_config_debug() {
        let tls = TlsConfig::builder().build().expect("tls config");
        let debug_str = format!("{:?}", tls);
        assert!(debug_str.contains("TlsConfig"));
        assert!(debug_str.contains("verification"));
    }
}

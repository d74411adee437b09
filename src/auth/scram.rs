//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677) as used by PostgreSQL 10+.
//!
//! Channel binding is not offered (`n,,` GS2 header); the server identity is
//! already covered by the TLS verification level selected through `sslmode`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Mechanism name advertised by the server
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

const GS2_HEADER: &str = "n,,";
const NONCE_LEN: usize = 24;
/// Highest iteration count accepted from a server (PostgreSQL's default is 4096)
const MAX_ITERATIONS: u32 = 1_000_000;

/// SCRAM exchange failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScramError {
    /// Server message could not be parsed
    #[error("invalid server message: {0}")]
    InvalidServerMessage(String),
    /// Server sent `e=<error>` in its final message
    #[error("server rejected authentication: {0}")]
    ServerRejected(String),
    /// Server signature did not match
    #[error("server signature verification failed")]
    InvalidServerSignature,
}

/// Client side of one SCRAM-SHA-256 exchange
pub struct ScramClient {
    password: String,
    client_nonce: String,
}

/// Values computed for client-final that are needed to check server-final
#[derive(Debug, Clone)]
pub struct ScramState {
    auth_message: String,
    server_key: [u8; 32],
}

impl ScramClient {
    /// New exchange with a random client nonce
    pub fn new(password: impl Into<String>) -> Self {
        let nonce: [u8; NONCE_LEN] = rand::thread_rng().gen();
        Self::with_nonce(password, BASE64.encode(nonce))
    }

    fn with_nonce(password: impl Into<String>, client_nonce: String) -> Self {
        Self {
            password: password.into(),
            client_nonce,
        }
    }

    /// client-first-message-bare. PostgreSQL takes the user from the startup packet, so `n=` is empty.
    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.client_nonce)
    }

    /// client-first-message
    pub fn client_first(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    /// Consume server-first-message and build client-final-message
    pub fn client_final(&self, server_first: &str) -> Result<(String, ScramState), ScramError> {
        let first = ServerFirst::parse(server_first)?;
        if !first.nonce.starts_with(&self.client_nonce) || first.nonce == self.client_nonce {
            return Err(ScramError::InvalidServerMessage(
                "server nonce does not extend client nonce".into(),
            ));
        }

        let salted = salted_password(&self.password, &first.salt, first.iterations)?;
        let client_key = hmac(&salted, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let server_key = hmac(&salted, b"Server Key");

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), first.nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            without_proof
        );

        let signature = hmac(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let client_final = format!("{},p={}", without_proof, BASE64.encode(proof));
        Ok((
            client_final,
            ScramState {
                auth_message,
                server_key,
            },
        ))
    }

    /// Check the server signature in server-final-message
    pub fn verify_server_final(
        &self,
        server_final: &str,
        state: &ScramState,
    ) -> Result<(), ScramError> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(ScramError::ServerRejected(err.to_string()));
        }
        let encoded = server_final
            .split(',')
            .find_map(|attr| attr.strip_prefix("v="))
            .ok_or_else(|| ScramError::InvalidServerMessage("missing v= attribute".into()))?;
        let received = BASE64
            .decode(encoded)
            .map_err(|_| ScramError::InvalidServerMessage("invalid base64 in v=".into()))?;

        let mut mac = new_mac(&state.server_key);
        mac.update(state.auth_message.as_bytes());
        mac.verify_slice(&received)
            .map_err(|_| ScramError::InvalidServerSignature)
    }
}

/// Parsed server-first-message: `r=<nonce>,s=<salt>,i=<iterations>`
#[derive(Debug, PartialEq, Eq)]
struct ServerFirst {
    nonce: String,
    salt: Vec<u8>,
    iterations: u32,
}

impl ServerFirst {
    fn parse(msg: &str) -> Result<Self, ScramError> {
        let missing = |attr: &str| ScramError::InvalidServerMessage(format!("missing {}", attr));
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for attr in msg.split(',') {
            match attr.split_once('=') {
                Some(("r", v)) => nonce = Some(v.to_string()),
                Some(("s", v)) => salt = Some(v),
                Some(("i", v)) => iterations = Some(v),
                Some(("m", _)) => {
                    return Err(ScramError::InvalidServerMessage(
                        "mandatory extension not supported".into(),
                    ))
                }
                _ => {}
            }
        }

        let salt = BASE64
            .decode(salt.ok_or_else(|| missing("salt"))?)
            .map_err(|_| ScramError::InvalidServerMessage("invalid salt encoding".into()))?;
        let iterations = iterations
            .ok_or_else(|| missing("iteration count"))?
            .parse::<u32>()
            .ok()
            .filter(|i| (1..=MAX_ITERATIONS).contains(i))
            .ok_or_else(|| ScramError::InvalidServerMessage("invalid iteration count".into()))?;

        Ok(Self {
            nonce: nonce.ok_or_else(|| missing("nonce"))?,
            salt,
            iterations,
        })
    }
}

fn salted_password(password: &str, salt: &[u8], iterations: u32) -> Result<[u8; 32], ScramError> {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut out)
        .map_err(|_| ScramError::InvalidServerMessage("key derivation failed".into()))?;
    Ok(out)
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(key).expect("hmac key of any length")
}

fn hmac(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = new_mac(key);
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 section 3 test vector (user "user", password "pencil")
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    fn rfc_client() -> ScramClient {
        ScramClient::with_nonce("pencil", CLIENT_NONCE.to_string())
    }

    #[test]
    fn test_client_first_message_format() {
        let client = ScramClient::new("secret");
        let first = client.client_first();
        assert!(first.starts_with("n,,n=,r="));
        assert!(first.len() > "n,,n=,r=".len() + 20);
    }

    #[test]
    fn test_nonces_differ_between_clients() {
        assert_ne!(
            ScramClient::new("a").client_first(),
            ScramClient::new("a").client_first()
        );
    }

    #[test]
    fn test_parse_server_first() {
        let parsed = ServerFirst::parse(SERVER_FIRST).unwrap();
        assert_eq!(parsed.iterations, 4096);
        assert!(parsed.nonce.starts_with(CLIENT_NONCE));
        assert_eq!(parsed.salt.len(), 16);
    }

    #[test]
    fn test_parse_server_first_missing_iterations() {
        let err = ServerFirst::parse("r=abc,s=c2FsdA==").unwrap_err();
        assert!(matches!(err, ScramError::InvalidServerMessage(_)));
    }

    #[test]
    fn test_parse_server_first_excessive_iterations() {
        let err = ServerFirst::parse("r=abc,s=c2FsdA==,i=4294967295").unwrap_err();
        assert!(matches!(err, ScramError::InvalidServerMessage(_)));
        assert!(ServerFirst::parse("r=abc,s=c2FsdA==,i=1000000").is_ok());
    }

    #[test]
    fn test_parse_server_first_zero_iterations() {
        assert!(ServerFirst::parse("r=abc,s=c2FsdA==,i=0").is_err());
    }

    #[test]
    fn test_rejects_foreign_nonce() {
        let client = ScramClient::with_nonce("pencil", "mine".into());
        let err = client
            .client_final("r=theirs,s=c2FsdA==,i=4096")
            .unwrap_err();
        assert!(matches!(err, ScramError::InvalidServerMessage(_)));
    }

    #[test]
    fn test_server_signature_round_trip() {
        // The RFC vector uses n=user; compute the expected server signature for our bare message
        // and check verification accepts it and rejects a flipped byte.
        let client = rfc_client();
        let (client_final, state) = client.client_final(SERVER_FIRST).unwrap();
        assert!(client_final.starts_with("c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p="));

        let good = hmac(&state.server_key, state.auth_message.as_bytes());
        let good_final = format!("v={}", BASE64.encode(good));
        assert!(client.verify_server_final(&good_final, &state).is_ok());

        let mut bad = good;
        bad[0] ^= 0xFF;
        let bad_final = format!("v={}", BASE64.encode(bad));
        assert_eq!(
            client.verify_server_final(&bad_final, &state),
            Err(ScramError::InvalidServerSignature)
        );
    }

    #[test]
    fn test_rfc_vector_server_key() {
        // With n=user the RFC server signature is SERVER_FINAL; the key itself does not depend on
        // the user name, so recompute it and check against the RFC's auth message.
        let client = rfc_client();
        let (_, state) = client.client_final(SERVER_FIRST).unwrap();
        let rfc_auth_message = format!(
            "n=user,r={},{},c=biws,r={}",
            CLIENT_NONCE,
            SERVER_FIRST,
            "rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0"
        );
        let signature = hmac(&state.server_key, rfc_auth_message.as_bytes());
        assert_eq!(format!("v={}", BASE64.encode(signature)), SERVER_FINAL);
    }

    #[test]
    fn test_server_error_attribute() {
        let client = rfc_client();
        let (_, state) = client.client_final(SERVER_FIRST).unwrap();
        assert_eq!(
            client.verify_server_final("e=invalid-proof", &state),
            Err(ScramError::ServerRejected("invalid-proof".into()))
        );
    }
}

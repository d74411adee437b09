//! Protocol message types

use crate::error::ServerError;
use bytes::Bytes;

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Startup message
    Startup {
        /// Protocol version
        version: i32,
        /// Connection parameters, sent in order
        params: Vec<(String, String)>,
    },

    /// SSLRequest (TLS negotiation)
    SslRequest,

    /// Password message: cleartext, or the `md5`-prefixed digest
    Password(String),

    /// SASL initial response
    SaslInitialResponse {
        /// Mechanism name (e.g. "SCRAM-SHA-256")
        mechanism: String,
        /// client-first-message
        data: Vec<u8>,
    },

    /// SASL response
    SaslResponse {
        /// client-final-message
        data: Vec<u8>,
    },

    /// Simple query
    Query(String),

    /// Terminate
    Terminate,
}

/// Backend message (server → client)
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Authentication request
    Authentication(AuthenticationMessage),

    /// Backend key data (for cancellation)
    BackendKeyData {
        /// Process ID
        process_id: i32,
        /// Secret key
        secret_key: i32,
    },

    /// Command complete with its tag
    CommandComplete(String),

    /// Data row (None = SQL NULL)
    DataRow(Vec<Option<Bytes>>),

    /// Response to an empty query string
    EmptyQueryResponse,

    /// Error response
    ErrorResponse(ServerError),

    /// Notice response
    NoticeResponse(ServerError),

    /// Parameter status
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Ready for query
    ReadyForQuery {
        /// Transaction status
        status: u8,
    },

    /// Row description
    RowDescription(Vec<FieldDescription>),
}

/// Authentication request variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationMessage {
    /// Authentication OK
    Ok,

    /// Cleartext password required
    CleartextPassword,

    /// MD5 password required
    Md5Password {
        /// Salt mixed into the digest
        salt: [u8; 4],
    },

    /// SASL mechanisms offered by the server
    Sasl {
        /// e.g. ["SCRAM-SHA-256"]
        mechanisms: Vec<String>,
    },

    /// SASL server-first-message
    SaslContinue {
        /// Raw payload
        data: Vec<u8>,
    },

    /// SASL server-final-message
    SaslFinal {
        /// Raw payload
        data: Vec<u8>,
    },
}

/// Column metadata from RowDescription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: i32,
    /// Column attribute number
    pub column_attr: i16,
    /// Data type OID
    pub type_oid: u32,
    /// Data type size
    pub type_size: i16,
    /// Type modifier
    pub type_modifier: i32,
    /// Format code (0 = text, 1 = binary)
    pub format_code: i16,
}

//! Postgres frontend/backend protocol (v3), restricted to what a connect probe needs:
//! startup, authentication, simple query and terminate.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{AuthenticationMessage, BackendMessage, FieldDescription, FrontendMessage};

//! Password authentication mechanisms

mod md5;
pub mod scram;

pub use self::md5::md5_password;
pub use scram::{ScramClient, ScramError, ScramState, SCRAM_SHA_256};

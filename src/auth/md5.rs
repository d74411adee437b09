//! Legacy `md5` password authentication.
//!
//! The server expects `"md5" + hex(md5(hex(md5(password + user)) + salt))`.

use md5::{Digest, Md5};
use std::fmt::Write;

/// Build the password message payload for an AuthenticationMD5Password request
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = hex(&Md5::new()
        .chain_update(password.as_bytes())
        .chain_update(user.as_bytes())
        .finalize());
    let outer = Md5::new()
        .chain_update(inner.as_bytes())
        .chain_update(salt)
        .finalize();
    format!("md5{}", hex(&outer))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_password_shape() {
        let hashed = md5_password("postgres", "secret", [1, 2, 3, 4]);
        assert!(hashed.starts_with("md5"));
        assert_eq!(hashed.len(), 35);
        assert!(hashed[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_md5_password_known_value() {
        // md5("pu") = 534b9a3588bdd87bf7c3b9d650e43e46
        assert_eq!(md5_password("u", "p", *b"abcd"), "md5fa55bd30a96b8d5bd8215eee7c50a918");
    }

    #[test]
    fn test_salt_changes_digest() {
        assert_ne!(
            md5_password("u", "p", [0, 0, 0, 0]),
            md5_password("u", "p", [0, 0, 0, 1])
        );
    }
}

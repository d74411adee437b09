//! Protocol message encoding

use super::constants::{frontend, SSL_REQUEST_CODE};
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a frontend message into bytes
pub fn encode_message(msg: &FrontendMessage) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();

    match msg {
        FrontendMessage::Startup { version, params } => framed(&mut buf, None, |b| {
            b.put_i32(*version);
            for (key, value) in params {
                put_cstr(b, key)?;
                put_cstr(b, value)?;
            }
            b.put_u8(0);
            Ok(())
        })?,
        FrontendMessage::SslRequest => {
            buf.put_i32(8);
            buf.put_i32(SSL_REQUEST_CODE);
        }
        FrontendMessage::Password(password) => {
            framed(&mut buf, Some(frontend::PASSWORD), |b| put_cstr(b, password))?
        }
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            framed(&mut buf, Some(frontend::PASSWORD), |b| {
                put_cstr(b, mechanism)?;
                b.put_i32(len_i32(data.len())?);
                b.put_slice(data);
                Ok(())
            })?
        }
        FrontendMessage::SaslResponse { data } => {
            framed(&mut buf, Some(frontend::PASSWORD), |b| {
                b.put_slice(data);
                Ok(())
            })?
        }
        FrontendMessage::Query(query) => {
            framed(&mut buf, Some(frontend::QUERY), |b| put_cstr(b, query))?
        }
        FrontendMessage::Terminate => {
            buf.put_u8(frontend::TERMINATE);
            buf.put_i32(4);
        }
    }

    Ok(buf)
}

/// Write an optional tag, a length placeholder and the body, then back-fill the length.
/// The length counts itself but not the tag.
fn framed(
    buf: &mut BytesMut,
    tag: Option<u8>,
    body: impl FnOnce(&mut BytesMut) -> io::Result<()>,
) -> io::Result<()> {
    if let Some(tag) = tag {
        buf.put_u8(tag);
    }
    let len_pos = buf.len();
    buf.put_i32(0);
    body(buf)?;
    let len = len_i32(buf.len() - len_pos)?;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

fn put_cstr(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "string contains an interior NUL byte",
        ));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn len_i32(len: usize) -> io::Result<i32> {
    i32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "message too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_field(buf: &[u8], at: usize) -> i32 {
        i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_encode_query() {
        let msg = FrontendMessage::Query("SELECT 1".to_string());
        let buf = encode_message(&msg).unwrap();

        assert_eq!(buf[0], b'Q');
        assert_eq!(length_field(&buf, 1), (buf.len() - 1) as i32);
        assert_eq!(&buf[5..], b"SELECT 1\0");
    }

    #[test]
    fn test_encode_startup() {
        let msg = FrontendMessage::Startup {
            version: crate::protocol::constants::PROTOCOL_VERSION,
            params: vec![("user".into(), "app".into())],
        };
        let buf = encode_message(&msg).unwrap();

        assert_eq!(length_field(&buf, 0), buf.len() as i32);
        assert_eq!(&buf[4..8], &[0x00, 0x03, 0x00, 0x00]);
        assert_eq!(&buf[8..], b"user\0app\0\0");
    }

    #[test]
    fn test_encode_terminate() {
        let buf = encode_message(&FrontendMessage::Terminate).unwrap();
        assert_eq!(&buf[..], &[b'X', 0, 0, 0, 4]);
    }

    #[test]
    fn test_encode_ssl_request() {
        let buf = encode_message(&FrontendMessage::SslRequest).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0x08, 0x04, 0xD2, 0x16, 0x2F]);
    }

    #[test]
    fn test_encode_sasl_initial_response() {
        let msg = FrontendMessage::SaslInitialResponse {
            mechanism: "SCRAM-SHA-256".into(),
            data: b"n,,n=,r=abc".to_vec(),
        };
        let buf = encode_message(&msg).unwrap();

        assert_eq!(buf[0], b'p');
        assert_eq!(length_field(&buf, 1), (buf.len() - 1) as i32);
        let mech_end = 5 + "SCRAM-SHA-256".len();
        assert_eq!(&buf[5..mech_end], b"SCRAM-SHA-256");
        assert_eq!(buf[mech_end], 0);
        assert_eq!(length_field(&buf, mech_end + 1), 11);
    }

    #[test]
    fn test_encode_rejects_interior_nul() {
        let msg = FrontendMessage::Password("bad\0password".into());
        let err = encode_message(&msg).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

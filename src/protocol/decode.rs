//! Protocol message decoding

use super::constants::{auth, tags, MAX_MESSAGE_LENGTH};
use super::message::{AuthenticationMessage, BackendMessage, FieldDescription};
use crate::error::ServerError;
use bytes::{Bytes, BytesMut};
use std::io;

/// Decode one backend message from the front of `data`.
///
/// Returns the message and the number of bytes it occupied; the caller advances the buffer.
/// An `UnexpectedEof` error means the buffer does not yet hold a complete message.
pub fn decode_message(data: &mut BytesMut) -> io::Result<(BackendMessage, usize)> {
    if data.len() < 5 {
        return Err(eof("incomplete message header"));
    }

    let tag = data[0];
    let len = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len >= 4)
        .ok_or_else(|| invalid(format!("invalid message length {}", len)))?;

    if len > MAX_MESSAGE_LENGTH {
        return Err(invalid(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }

    if data.len() < len + 1 {
        return Err(eof("incomplete message body"));
    }

    let mut body = Reader::new(&data[5..len + 1]);

    let msg = match tag {
        tags::AUTHENTICATION => BackendMessage::Authentication(decode_authentication(&mut body)?),
        tags::BACKEND_KEY_DATA => BackendMessage::BackendKeyData {
            process_id: body.i32()?,
            secret_key: body.i32()?,
        },
        tags::COMMAND_COMPLETE => BackendMessage::CommandComplete(body.cstr()?),
        tags::DATA_ROW => decode_data_row(&mut body)?,
        tags::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(&mut body)?),
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(&mut body)?),
        tags::PARAMETER_STATUS => BackendMessage::ParameterStatus {
            name: body.cstr()?,
            value: body.cstr()?,
        },
        tags::READY_FOR_QUERY => BackendMessage::ReadyForQuery { status: body.u8()? },
        tags::ROW_DESCRIPTION => decode_row_description(&mut body)?,
        other => {
            return Err(invalid(format!(
                "unknown message tag: 0x{:02X} ({:?})",
                other, other as char
            )))
        }
    };

    Ok((msg, len + 1))
}

fn decode_authentication(body: &mut Reader<'_>) -> io::Result<AuthenticationMessage> {
    let auth_type = body.i32()?;
    let msg = match auth_type {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => {
            let salt = body.take(4)?;
            AuthenticationMessage::Md5Password {
                salt: [salt[0], salt[1], salt[2], salt[3]],
            }
        }
        auth::SASL => {
            let mut mechanisms = Vec::new();
            while !body.is_empty() {
                let mechanism = body.cstr()?;
                if mechanism.is_empty() {
                    break;
                }
                mechanisms.push(mechanism);
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: body.rest().to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: body.rest().to_vec(),
        },
        other => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported authentication request: {}", other),
            ))
        }
    };
    Ok(msg)
}

fn decode_data_row(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let count = body.count()?;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let len = body.i32()?;
        let field = if len < 0 {
            None
        } else {
            Some(Bytes::copy_from_slice(body.take(len as usize)?))
        };
        fields.push(field);
    }
    Ok(BackendMessage::DataRow(fields))
}

fn decode_row_description(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let count = body.count()?;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        fields.push(FieldDescription {
            name: body.cstr()?,
            table_oid: body.i32()?,
            column_attr: body.i16()?,
            type_oid: body.i32()? as u32,
            type_size: body.i16()?,
            type_modifier: body.i32()?,
            format_code: body.i16()?,
        });
    }
    Ok(BackendMessage::RowDescription(fields))
}

fn decode_error_fields(body: &mut Reader<'_>) -> io::Result<ServerError> {
    let mut err = ServerError::default();
    while !body.is_empty() {
        let field_type = body.u8()?;
        if field_type == 0 {
            break;
        }
        let value = body.cstr()?;
        match field_type {
            b'S' => err.severity = Some(value),
            b'C' => err.code = Some(value),
            b'M' => err.message = value,
            b'D' => err.detail = Some(value),
            b'H' => err.hint = Some(value),
            _ => {}
        }
    }
    Ok(err)
}

/// Bounds-checked big-endian reader over a message body
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(invalid("truncated message body"));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn i16(&mut self) -> io::Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> io::Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Field/column count (non-negative i16)
    fn count(&mut self) -> io::Result<usize> {
        let n = self.i16()?;
        usize::try_from(n).map_err(|_| invalid(format!("negative field count {}", n)))
    }

    fn cstr(&mut self) -> io::Result<String> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid("missing null terminator in string"))?;
        let s = String::from_utf8_lossy(&self.data[..end]).into_owned();
        self.data = &self.data[end + 1..];
        Ok(s)
    }
}

fn eof(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, msg)
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#![no_main]

use bytes::{Buf, BytesMut};
use connprobe::protocol::decode_message;
use libfuzzer_sys::fuzz_target;

// First byte picks the read size, the rest is fed to the decoder in chunks of that size,
// the way a socket delivers startup and query replies.
fuzz_target!(|data: &[u8]| {
    let Some((&chunk, data)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);

    let mut buf = BytesMut::new();
    for piece in data.chunks(chunk) {
        buf.extend_from_slice(piece);
        loop {
            match decode_message(&mut buf) {
                Ok((_, consumed)) => {
                    assert!(consumed > 0 && consumed <= buf.len());
                    buf.advance(consumed);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(_) => return,
            }
        }
    }
});

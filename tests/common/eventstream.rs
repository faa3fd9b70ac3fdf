//! Event-stream frames for Bedrock upstream fixtures.

use bytes::{BufMut, Bytes, BytesMut};

const STRING_HEADER: u8 = 7;

/// Frame `payload` with string headers, prelude and message checksums.
pub fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Bytes {
    let mut header_block = BytesMut::new();
    for (name, value) in headers {
        header_block.put_u8(name.len() as u8);
        header_block.put_slice(name.as_bytes());
        header_block.put_u8(STRING_HEADER);
        header_block.put_u16(value.len() as u16);
        header_block.put_slice(value.as_bytes());
    }

    let total_len = 16 + header_block.len() + payload.len();
    let mut out = BytesMut::with_capacity(total_len);
    out.put_u32(total_len as u32);
    out.put_u32(header_block.len() as u32);
    out.put_u32(crc32fast::hash(&out[..8]));
    out.put_slice(&header_block);
    out.put_slice(payload);
    out.put_u32(crc32fast::hash(&out));
    out.freeze()
}

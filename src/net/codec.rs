use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame payload size.
pub const MAX_FRAME_SIZE: usize = 3 * 1024 * 1024;

/// Codec error: framing violation or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame exceeds maximum length ({MAX_FRAME_SIZE} bytes)")]
    FrameTooLarge,
    #[error("malformed length prefix")]
    BadLengthPrefix,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Frames a byte stream into messages with a LEB128 varint length prefix.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut length: u32 = 0;
        let mut shift = 0u32;
        let mut prefix_len = 0usize;
        loop {
            let Some(&byte) = src.get(prefix_len) else {
                // Prefix incomplete; wait for more bytes.
                return Ok(None);
            };
            prefix_len += 1;
            length |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 32 {
                return Err(CodecError::BadLengthPrefix);
            }
        }

        let length = length as usize;
        if length > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge);
        }
        if src.len() < prefix_len + length {
            src.reserve(prefix_len + length - src.len());
            return Ok(None);
        }

        src.advance(prefix_len);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge);
        }
        let mut length = item.len() as u32;
        let mut prefix = [0u8; 5];
        let mut prefix_len = 0;
        loop {
            let byte = (length & 0x7f) as u8;
            length >>= 7;
            if length == 0 {
                prefix[prefix_len] = byte;
                prefix_len += 1;
                break;
            }
            prefix[prefix_len] = byte | 0x80;
            prefix_len += 1;
        }
        dst.reserve(prefix_len + item.len());
        dst.extend_from_slice(&prefix[..prefix_len]);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

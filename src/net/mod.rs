/// Varint length-prefixed frame codec.
pub mod codec;

/// Encrypted message channel over a framed transport.
pub mod channel;

pub use channel::{Channel, ChannelError, TcpChannel};
pub use codec::{CodecError, FrameCodec, MAX_FRAME_SIZE};

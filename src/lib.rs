#![forbid(unsafe_code)]

/// Server-side authentication handshake.
pub mod auth;
/// Cryptographic primitives: hashing, AEAD message ciphers, key agreement, SRP-6a.
pub mod crypto;
/// Local filesystem executor and file packetization.
pub mod fs;
/// Framed encrypted channel over a stream transport.
pub mod net;
/// Wire message definitions and encoding.
pub mod proto;
/// File transfer: request routing, queue building, and the transfer engine.
pub mod transfer;
/// Credential records and the shared user store.
pub mod users;

/// Largest payload carried by a single file packet.
pub const MAX_FILE_PACKET_SIZE: usize = 16 * 1024;

/// Build version advertised during the session challenge.
pub const fn current_version() -> proto::Version {
    proto::Version {
        major: 0,
        minor: 1,
        patch: 0,
    }
}

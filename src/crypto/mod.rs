/// AEAD message ciphers with counter-derived nonces.
pub mod aead;
/// BLAKE2 digest helpers.
pub mod hash;
/// X25519 key agreement.
pub mod keypair;
/// SRP-6a group parameters and arithmetic.
pub mod srp;

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Failures in cryptographic setup or verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("authentication failed")]
    Auth,
    #[error("frame too short for counter and tag")]
    Truncated,
    #[error("nonce counter went backwards")]
    Replay,
    #[error("nonce counter exhausted")]
    CounterExhausted,
    #[error("invalid key material")]
    InvalidKey,
    #[error("weak shared secret")]
    WeakKey,
    #[error("unknown SRP group")]
    UnknownGroup,
}

/// Fills a fresh buffer with cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    OsRng.fill_bytes(&mut out);
    out
}

/// Fixed-size variant of [`random_bytes`].
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Whether this CPU exposes hardware AES acceleration.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn has_hardware_aes() -> bool {
    std::arch::is_x86_feature_detected!("aes")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn has_hardware_aes() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_have_requested_length() {
        assert_eq!(random_bytes(12).len(), 12);
        assert_eq!(random_bytes(0).len(), 0);
    }

    #[test]
    fn random_outputs_differ() {
        let a: [u8; 32] = random_array();
        let b: [u8; 32] = random_array();
        assert_ne!(a, b);
    }
}

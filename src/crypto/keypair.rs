use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};

use super::CryptoError;

/// X25519 key length in bytes.
pub const KEY_SIZE: usize = 32;

/// Long-lived X25519 key pair used for the handshake's key agreement leg.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Loads a key pair from raw private key bytes.
    pub fn from_private_key(private_key: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] = private_key.try_into().map_err(|_| CryptoError::InvalidKey)?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        self.public.to_bytes()
    }

    pub fn private_key(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Derives the raw shared secret with a peer's ephemeral public key.
    ///
    /// The all-zero output of a small-order peer point is rejected.
    pub fn session_key(&self, peer_public: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
        let bytes: [u8; KEY_SIZE] = peer_public.try_into().map_err(|_| CryptoError::InvalidKey)?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(bytes));
        if shared.as_bytes().ct_eq(&[0u8; KEY_SIZE]).into() {
            return Err(CryptoError::WeakKey);
        }
        Ok(*shared.as_bytes())
    }
}

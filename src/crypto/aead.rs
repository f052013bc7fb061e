use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;

use super::CryptoError;

/// AEAD key length in bytes.
pub const KEY_SIZE: usize = 32;
/// AEAD base IV length in bytes.
pub const IV_SIZE: usize = 12;
/// Authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;
/// Per-frame counter prefix length in bytes.
pub const COUNTER_SIZE: usize = 8;

/// Negotiable AEAD algorithms.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CipherKind {
    Aes256Gcm,
    ChaCha20Poly1305,
}

enum CipherInner {
    Aes(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

/// One direction of an AEAD-protected message stream.
///
/// Frames are `counter_be(8) ‖ ciphertext ‖ tag(16)`; the effective nonce is
/// the base IV with the big-endian counter XORed into its low eight bytes.
/// The counter is strictly increasing for the lifetime of the cipher.
pub struct MessageCipher {
    inner: CipherInner,
    iv: [u8; IV_SIZE],
    counter: u64,
}

impl MessageCipher {
    pub fn new(kind: CipherKind, key: &[u8; KEY_SIZE], iv: [u8; IV_SIZE]) -> Self {
        let inner = match kind {
            CipherKind::Aes256Gcm => CipherInner::Aes(Box::new(Aes256Gcm::new(key.into()))),
            CipherKind::ChaCha20Poly1305 => {
                CipherInner::ChaCha(Box::new(ChaCha20Poly1305::new(key.into())))
            }
        };
        Self {
            inner,
            iv,
            counter: 0,
        }
    }

    pub fn kind(&self) -> CipherKind {
        match self.inner {
            CipherInner::Aes(_) => CipherKind::Aes256Gcm,
            CipherInner::ChaCha(_) => CipherKind::ChaCha20Poly1305,
        }
    }

    fn nonce_for(&self, counter: u64) -> [u8; IV_SIZE] {
        let mut nonce = self.iv;
        for (byte, counter_byte) in nonce[IV_SIZE - COUNTER_SIZE..]
            .iter_mut()
            .zip(counter.to_be_bytes())
        {
            *byte ^= counter_byte;
        }
        nonce
    }

    fn encrypt_raw(&self, nonce: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.inner {
            CipherInner::Aes(cipher) => cipher
                .encrypt(aes_gcm::Nonce::from_slice(nonce), plaintext)
                .map_err(|_| CryptoError::Auth),
            CipherInner::ChaCha(cipher) => cipher
                .encrypt(chacha20poly1305::Nonce::from_slice(nonce), plaintext)
                .map_err(|_| CryptoError::Auth),
        }
    }

    fn decrypt_raw(
        &self,
        nonce: &[u8; IV_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match &self.inner {
            CipherInner::Aes(cipher) => cipher
                .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| CryptoError::Auth),
            CipherInner::ChaCha(cipher) => cipher
                .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| CryptoError::Auth),
        }
    }

    /// Seals one message, consuming the next counter value.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let counter = self.counter;
        self.counter = counter.checked_add(1).ok_or(CryptoError::CounterExhausted)?;
        let nonce = self.nonce_for(counter);
        let ciphertext = self.encrypt_raw(&nonce, plaintext)?;
        let mut frame = Vec::with_capacity(COUNTER_SIZE + ciphertext.len());
        frame.extend_from_slice(&counter.to_be_bytes());
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Opens one sealed frame, requiring its counter to move forward.
    pub fn open(&mut self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if frame.len() < COUNTER_SIZE + TAG_SIZE {
            return Err(CryptoError::Truncated);
        }
        let mut counter_bytes = [0u8; COUNTER_SIZE];
        counter_bytes.copy_from_slice(&frame[..COUNTER_SIZE]);
        let counter = u64::from_be_bytes(counter_bytes);
        if counter < self.counter {
            return Err(CryptoError::Replay);
        }
        let nonce = self.nonce_for(counter);
        let plaintext = self.decrypt_raw(&nonce, &frame[COUNTER_SIZE..])?;
        self.counter = counter.checked_add(1).ok_or(CryptoError::CounterExhausted)?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(kind: CipherKind) -> (MessageCipher, MessageCipher) {
        let key = [7u8; KEY_SIZE];
        let iv = [3u8; IV_SIZE];
        (
            MessageCipher::new(kind, &key, iv),
            MessageCipher::new(kind, &key, iv),
        )
    }

    #[test]
    fn seal_open_round_trip_both_kinds() {
        for kind in [CipherKind::Aes256Gcm, CipherKind::ChaCha20Poly1305] {
            let (mut tx, mut rx) = pair(kind);
            for message in [&b"hello"[..], b"", b"another message"] {
                let frame = tx.seal(message).expect("seal");
                assert_eq!(frame.len(), COUNTER_SIZE + message.len() + TAG_SIZE);
                assert_eq!(rx.open(&frame).expect("open"), message);
            }
        }
    }

    #[test]
    fn tampered_byte_fails_authentication() {
        let (mut tx, mut rx) = pair(CipherKind::ChaCha20Poly1305);
        let mut frame = tx.seal(b"sensitive").expect("seal");
        let index = frame.len() - 1;
        frame[index] ^= 0x01;
        assert!(matches!(rx.open(&frame), Err(CryptoError::Auth)));
    }

    #[test]
    fn replayed_frame_is_rejected() {
        let (mut tx, mut rx) = pair(CipherKind::Aes256Gcm);
        let frame = tx.seal(b"once").expect("seal");
        assert!(rx.open(&frame).is_ok());
        assert!(matches!(rx.open(&frame), Err(CryptoError::Replay)));
    }

    #[test]
    fn counters_increase_per_message() {
        let (mut tx, _) = pair(CipherKind::Aes256Gcm);
        let first = tx.seal(b"a").expect("seal");
        let second = tx.seal(b"a").expect("seal");
        assert_eq!(&first[..COUNTER_SIZE], &0u64.to_be_bytes());
        assert_eq!(&second[..COUNTER_SIZE], &1u64.to_be_bytes());
        assert_ne!(first[COUNTER_SIZE..], second[COUNTER_SIZE..]);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let (mut tx, mut rx) = pair(CipherKind::ChaCha20Poly1305);
        let frame = tx.seal(b"payload").expect("seal");
        assert!(matches!(
            rx.open(&frame[..COUNTER_SIZE + TAG_SIZE - 1]),
            Err(CryptoError::Truncated)
        ));
    }

    #[test]
    fn mismatched_keys_fail() {
        let mut tx = MessageCipher::new(CipherKind::Aes256Gcm, &[1u8; KEY_SIZE], [0u8; IV_SIZE]);
        let mut rx = MessageCipher::new(CipherKind::Aes256Gcm, &[2u8; KEY_SIZE], [0u8; IV_SIZE]);
        let frame = tx.seal(b"data").expect("seal");
        assert!(matches!(rx.open(&frame), Err(CryptoError::Auth)));
    }
}

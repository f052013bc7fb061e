#![no_main]
use libfuzzer_sys::fuzz_target;
use setu::crypto::aead::{CipherKind, MessageCipher};

fuzz_target!(|data: &[u8]| {
    let mut cipher = MessageCipher::new(CipherKind::ChaCha20Poly1305, &[7u8; 32], [3u8; 12]);
    let _ = cipher.open(data);
});

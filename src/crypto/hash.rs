use blake2::{Blake2b512, Blake2s256, Digest};

/// BLAKE2s-256 over the concatenation of `parts`.
pub fn blake2s256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2s256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// BLAKE2b-512 over the concatenation of `parts`.
pub fn blake2b512(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_concatenated() {
        let joined = blake2s256(&[b"abcdef"]);
        let parts = blake2s256(&[b"abc", b"def"]);
        assert_eq!(joined, parts);

        let joined = blake2b512(&[b"setu"]);
        let parts = blake2b512(&[b"se", b"tu"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn digests_are_deterministic_and_distinct() {
        assert_eq!(blake2s256(&[b"x"]), blake2s256(&[b"x"]));
        assert_ne!(blake2s256(&[b"x"]), blake2s256(&[b"y"]));
        assert_ne!(blake2b512(&[b"x"]), blake2b512(&[b"y"]));
    }

    #[test]
    fn empty_input_hashes() {
        assert_eq!(blake2s256(&[]), blake2s256(&[b""]));
        assert_eq!(blake2b512(&[]), blake2b512(&[b""]));
    }
}

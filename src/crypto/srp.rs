//! SRP-6a arithmetic over the RFC 5054 groups.
//!
//! Group identifiers are the modulus size in bits. The 3072-, 4096-, 6144-
//! and 8192-bit groups are offered; hashing for `x`, `u` and `k` is
//! BLAKE2b-512, and `PAD()` left-pads to the modulus width.

use num_bigint::BigUint;
use num_traits::Zero;

use super::hash::blake2b512;

const MODP_3072_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33",
    "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864",
    "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2",
    "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
);

const MODP_4096_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33",
    "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864",
    "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2",
    "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A92108011A723C12A787E6D7",
    "88719A10BDBA5B2699C327186AF4E23C1A946834B6150BDA2583E9CA2AD44CE8",
    "DBBBC2DB04DE8EF92E8EFC141FBECAA6287C59474E6BC05D99B2964FA090C3A2",
    "233BA186515BE7ED1F612970CEE2D7AFB81BDD762170481CD0069127D5B05AA9",
    "93B4EA988D8FDDC186FFB7DC90A6C08F4DF435C934063199FFFFFFFFFFFFFFFF",
);

const MODP_6144_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33",
    "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864",
    "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2",
    "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A92108011A723C12A787E6D7",
    "88719A10BDBA5B2699C327186AF4E23C1A946834B6150BDA2583E9CA2AD44CE8",
    "DBBBC2DB04DE8EF92E8EFC141FBECAA6287C59474E6BC05D99B2964FA090C3A2",
    "233BA186515BE7ED1F612970CEE2D7AFB81BDD762170481CD0069127D5B05AA9",
    "93B4EA988D8FDDC186FFB7DC90A6C08F4DF435C93402849236C3FAB4D27C7026",
    "C1D4DCB2602646DEC9751E763DBA37BDF8FF9406AD9E530EE5DB382F413001AE",
    "B06A53ED9027D831179727B0865A8918DA3EDBEBCF9B14ED44CE6CBACED4BB1B",
    "DB7F1447E6CC254B332051512BD7AF426FB8F401378CD2BF5983CA01C64B92EC",
    "F032EA15D1721D03F482D7CE6E74FEF6D55E702F46980C82B5A84031900B1C9E",
    "59E7C97FBEC7E8F323A97A7E36CC88BE0F1D45B7FF585AC54BD407B22B4154AA",
    "CC8F6D7EBF48E1D814CC5ED20F8037E0A79715EEF29BE32806A1D58BB7C5DA76",
    "F550AA3D8A1FBFF0EB19CCB1A313D55CDA56C9EC2EF29632387FE8D76E3C0468",
    "043E8F663F4860EE12BF2D5B0B7474D6E694F91E6DCC4024FFFFFFFFFFFFFFFF",
);

const MODP_8192_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33",
    "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864",
    "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2",
    "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A92108011A723C12A787E6D7",
    "88719A10BDBA5B2699C327186AF4E23C1A946834B6150BDA2583E9CA2AD44CE8",
    "DBBBC2DB04DE8EF92E8EFC141FBECAA6287C59474E6BC05D99B2964FA090C3A2",
    "233BA186515BE7ED1F612970CEE2D7AFB81BDD762170481CD0069127D5B05AA9",
    "93B4EA988D8FDDC186FFB7DC90A6C08F4DF435C93402849236C3FAB4D27C7026",
    "C1D4DCB2602646DEC9751E763DBA37BDF8FF9406AD9E530EE5DB382F413001AE",
    "B06A53ED9027D831179727B0865A8918DA3EDBEBCF9B14ED44CE6CBACED4BB1B",
    "DB7F1447E6CC254B332051512BD7AF426FB8F401378CD2BF5983CA01C64B92EC",
    "F032EA15D1721D03F482D7CE6E74FEF6D55E702F46980C82B5A84031900B1C9E",
    "59E7C97FBEC7E8F323A97A7E36CC88BE0F1D45B7FF585AC54BD407B22B4154AA",
    "CC8F6D7EBF48E1D814CC5ED20F8037E0A79715EEF29BE32806A1D58BB7C5DA76",
    "F550AA3D8A1FBFF0EB19CCB1A313D55CDA56C9EC2EF29632387FE8D76E3C0468",
    "043E8F663F4860EE12BF2D5B0B7474D6E694F91E6DBE115974A3926F12FEE5E4",
    "38777CB6A932DF8CD8BEC4D073B931BA3BC832B68D9DD300741FA7BF8AFC47ED",
    "2576F6936BA424663AAB639C5AE4F5683423B4742BF1C978238F16CBE39D652D",
    "E3FDB8BEFC848AD922222E04A4037C0713EB57A81A23F0C73473FC646CEA306B",
    "4BCBC8862F8385DDFA9D4B7FA2C087E879683303ED5BDD3A062B3CF5B3A278A6",
    "6D2A13F83F44F82DDF310EE074AB6A364597E899A0255DC164F31CC50846851D",
    "F9AB48195DED7EA1B1D510BD7EE74D73FAF36BC31ECFA268359046F4EB879F92",
    "4009438B481C6CD7889A002ED5EE382BC9190DA6FC026E479558E4475677E9AA",
    "9E3050E2765694DFC81F56E880B96E7160C980DD98EDD3DFFFFFFFFFFFFFFFFF",
);

/// 3072-bit group, generator 5.
pub const GROUP_3072: u16 = 3072;
/// 4096-bit group, generator 5.
pub const GROUP_4096: u16 = 4096;
/// 6144-bit group, generator 5.
pub const GROUP_6144: u16 = 6144;
/// 8192-bit group, generator 19. The default.
pub const GROUP_8192: u16 = 8192;

/// One SRP group: a safe prime modulus and its generator.
#[derive(Clone, Debug)]
pub struct SrpGroup {
    pub id: u16,
    pub modulus: BigUint,
    pub generator: BigUint,
}

fn group_from_hex(id: u16, modulus_hex: &str, generator: u32) -> SrpGroup {
    let modulus =
        BigUint::parse_bytes(modulus_hex.as_bytes(), 16).expect("group modulus constant");
    debug_assert_eq!(modulus.bits(), u64::from(id));
    SrpGroup {
        id,
        modulus,
        generator: BigUint::from(generator),
    }
}

/// Looks up a group by identifier.
pub fn lookup_group(id: u16) -> Option<SrpGroup> {
    match id {
        GROUP_3072 => Some(group_from_hex(GROUP_3072, MODP_3072_HEX, 5)),
        GROUP_4096 => Some(group_from_hex(GROUP_4096, MODP_4096_HEX, 5)),
        GROUP_6144 => Some(group_from_hex(GROUP_6144, MODP_6144_HEX, 5)),
        GROUP_8192 => Some(group_from_hex(GROUP_8192, MODP_8192_HEX, 19)),
        _ => None,
    }
}

/// The group used when a credential names no usable one.
pub fn default_group() -> SrpGroup {
    group_from_hex(GROUP_8192, MODP_8192_HEX, 19)
}

/// Left-pads the big-endian encoding of `value` to the modulus width.
pub fn pad(value: &BigUint, modulus: &BigUint) -> Vec<u8> {
    let width = ((modulus.bits() + 7) / 8) as usize;
    let bytes = value.to_bytes_be();
    if bytes.len() >= width {
        return bytes;
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

/// Private key derivation: `x = H(salt ‖ H(username ‖ ":" ‖ password))`.
pub fn calc_x(salt: &[u8], username: &str, password: &[u8]) -> BigUint {
    let inner = blake2b512(&[username.as_bytes(), b":", password]);
    BigUint::from_bytes_be(&blake2b512(&[salt, &inner]))
}

/// Password verifier: `v = g^x mod N`.
pub fn calc_v(username: &str, password: &[u8], salt: &[u8], group: &SrpGroup) -> BigUint {
    let x = calc_x(salt, username, password);
    group.generator.modpow(&x, &group.modulus)
}

/// Multiplier parameter: `k = H(N ‖ PAD(g))`.
fn calc_k(group: &SrpGroup) -> BigUint {
    let n_bytes = group.modulus.to_bytes_be();
    let g_padded = pad(&group.generator, &group.modulus);
    BigUint::from_bytes_be(&blake2b512(&[&n_bytes, &g_padded]))
}

/// Server ephemeral: `B = (k·v + g^b) mod N`.
pub fn calc_b_public(b: &BigUint, v: &BigUint, group: &SrpGroup) -> BigUint {
    let n = &group.modulus;
    let kv = (calc_k(group) * v) % n;
    (kv + group.generator.modpow(b, n)) % n
}

/// Client ephemeral: `A = g^a mod N`.
pub fn calc_a_public(a: &BigUint, group: &SrpGroup) -> BigUint {
    group.generator.modpow(a, &group.modulus)
}

/// Scrambler: `u = H(PAD(A) ‖ PAD(B))`.
pub fn calc_u(a_public: &BigUint, b_public: &BigUint, modulus: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&blake2b512(&[
        &pad(a_public, modulus),
        &pad(b_public, modulus),
    ]))
}

/// Server session key: `S = (A · v^u)^b mod N`.
pub fn calc_server_key(
    a_public: &BigUint,
    v: &BigUint,
    u: &BigUint,
    b: &BigUint,
    modulus: &BigUint,
) -> BigUint {
    let base = (a_public * v.modpow(u, modulus)) % modulus;
    base.modpow(b, modulus)
}

/// Client session key: `S = (B − k·g^x)^(a + u·x) mod N`.
pub fn calc_client_key(
    b_public: &BigUint,
    x: &BigUint,
    u: &BigUint,
    a: &BigUint,
    group: &SrpGroup,
) -> BigUint {
    let n = &group.modulus;
    let kgx = (calc_k(group) * group.generator.modpow(x, n)) % n;
    let base = ((b_public % n) + n - kgx) % n;
    let exponent = a + u * x;
    base.modpow(&exponent, n)
}

/// Rejects a client ephemeral that is congruent to zero.
pub fn verify_a_mod_n(a_public: &BigUint, modulus: &BigUint) -> bool {
    !(a_public % modulus).is_zero()
}

//! Per-chunk nonce derivation.
//!
//! A nonce is treated as a 192-bit little-endian unsigned integer. The nonce
//! of chunk `i` is `base + i (mod 2^192)`. The writer reaches it by repeated
//! [`increment`]; the random-access reader jumps straight to it with
//! [`advance`]. Both must agree for every reachable index.

/// Nonce length for XChaCha20-Poly1305 and `ChaChaBox`.
pub const NONCE_LEN: usize = 24;

/// A 24-byte nonce.
pub type Nonce = [u8; NONCE_LEN];

/// Generate a random nonce.
pub fn random() -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    rand::Rng::fill(&mut rand::rngs::OsRng, &mut nonce);
    nonce
}

/// Add one with carry. Wraps to all zeros on overflow.
pub fn increment(nonce: &mut Nonce) {
    for byte in nonce.iter_mut() {
        let (next, carry) = byte.overflowing_add(1);
        *byte = next;
        if !carry {
            return;
        }
    }
}

/// `base + index` with carry across all bytes, wrapping on overflow.
pub fn advance(base: &Nonce, index: u64) -> Nonce {
    let mut out = *base;
    let mut addend = index;
    let mut carry = 0u16;
    for byte in out.iter_mut() {
        if addend == 0 && carry == 0 {
            break;
        }
        let sum = *byte as u16 + (addend & 0xff) as u16 + carry;
        *byte = sum as u8;
        carry = sum >> 8;
        addend >>= 8;
    }
    out
}

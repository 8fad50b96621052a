//! Small fixed-size byte helpers shared across the ring, sampling, and protocol layers.
//!
//! The teacher crate leans on `hybrid_array::Array<u8, N>` for these; since this crate
//! drops compile-time array sizing in favor of runtime parameter sets (see `param.rs`),
//! plain `[u8; N]` and `Vec<u8>` stand in for the handful of fixed widths the spec names.

use zeroize::Zeroize;

/// A 32-byte seed or digest (rho, party keys, session ids).
pub type B32 = [u8; 32];

/// A 64-byte digest (rho-prime, mu, tr, CRH outputs).
pub type B64 = [u8; 64];

/// Little-endian encode a `u16` nonce, as used for Box-Muller domain separation.
pub fn nonce_le16(nonce: u16) -> [u8; 2] {
    nonce.to_le_bytes()
}

/// Little-endian encode a `u8` nonce, as used for `PolyDeriveUniformLeqEta`.
pub fn nonce_le8(nonce: u8) -> [u8; 1] {
    [nonce]
}

/// Zero a byte buffer in place without relying on the caller remembering to import `Zeroize`.
pub fn wipe(buf: &mut [u8]) {
    buf.zeroize();
}

/// Zero a `Vec<f64>` in place.
pub fn wipe_f64(buf: &mut [f64]) {
    for x in buf.iter_mut() {
        *x = 0.0;
    }
}

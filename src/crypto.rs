//! SHAKE128/SHAKE256 transcript helpers.
//!
//! FIPS 204 names two XOFs: `G = SHAKE128` (matrix expansion) and `H = SHAKE256`
//! (everything else: key/message digests, rejection sampling of `s1`/`s2`/`y`,
//! the challenge polynomial, and every commitment hash in the threshold layer).
//! This mirrors the teacher's `H::default().absorb(..).absorb(..).squeeze_new::<..>()`
//! chain, generalized to a runtime output length since this crate has no
//! `hybrid_array`/`typenum` const-sized outputs to squeeze into.

use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake128, Shake256,
};

use crate::util::{B32, B64};

/// A SHAKE256 absorb/squeeze transcript builder.
#[derive(Default)]
pub struct H256 {
    inner: Shake256,
}

impl H256 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb more input. Consumes and returns `self` to support chaining, as in
    /// `H256::new().absorb(a).absorb(b).squeeze(n)`.
    pub fn absorb(mut self, data: &[u8]) -> Self {
        self.inner.update(data);
        self
    }

    /// Squeeze `n` bytes and consume the transcript.
    pub fn squeeze(self, n: usize) -> Vec<u8> {
        let mut reader = self.inner.finalize_xof();
        let mut out = vec![0u8; n];
        reader.read(&mut out);
        out
    }

    pub fn squeeze32(self) -> B32 {
        let out = self.squeeze(32);
        out.try_into().expect("32 bytes")
    }

    pub fn squeeze64(self) -> B64 {
        let out = self.squeeze(64);
        out.try_into().expect("64 bytes")
    }

    /// Hand back a streaming reader for rejection sampling, which consumes an
    /// unbounded number of output blocks until enough values have been accepted.
    pub fn xof(self) -> impl XofReader {
        self.inner.finalize_xof()
    }
}

/// A SHAKE128 absorb/squeeze transcript builder, used only for `ExpandA`.
#[derive(Default)]
pub struct H128 {
    inner: Shake128,
}

impl H128 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(mut self, data: &[u8]) -> Self {
        self.inner.update(data);
        self
    }

    pub fn xof(self) -> impl XofReader {
        self.inner.finalize_xof()
    }
}

/// Convenience one-shot SHAKE256 digest, equivalent to `H256::new().absorb(data).squeeze(n)`.
pub fn shake256(data: &[u8], n: usize) -> Vec<u8> {
    H256::new().absorb(data).squeeze(n)
}

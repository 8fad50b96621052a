//! Crate-wide error taxonomy (spec §7).
//!
//! The teacher's baseline signer is fallible only by `panic!` (see the
//! `// TODO(RLB) Make this method fallible` marker ahead of its rejection loop) and its
//! decoders return `Option`. This crate's threshold/DKG layer has many more named failure
//! surfaces, so errors get a real `thiserror` enum instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid (T,N,level) or other construction-time configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input: wrong length, duplicate ids, out-of-range coefficient, etc.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A peer's commitment did not match its later reveal.
    #[error("commitment mismatch for party {party}: {detail}")]
    CommitmentMismatch { party: u8, detail: &'static str },

    /// The baseline sign loop exhausted its rejection-sampling attempt budget.
    #[error("rejection sampling did not converge within the attempt budget")]
    RejectionSamplingExhausted,

    /// A Round/Phase state was accessed after `destroy()`.
    #[error("state was already destroyed")]
    StateDestroyed,
}

pub type Result<T> = std::result::Result<T, Error>;

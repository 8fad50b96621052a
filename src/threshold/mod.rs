//! The `(T, N)` threshold layer (spec §4.6-§4.10): trusted-dealer keygen, the three-round
//! signing protocol, distributed key generation, and the destroyable round/phase state they
//! share. Layered entirely on top of the baseline ring primitives in `crate::algebra`,
//! `crate::sampling`, and `crate::encode` — no threshold-specific field or NTT code lives
//! here.

mod dkg;
mod keygen;
mod params;
mod sign;
mod state;

pub use dkg::{
    assign_generators, finalize as dkg_finalize, phase1_commit, phase2_finalize, phase2_reveal,
    phase4_aggregate, FinalizeResult, Phase1Broadcast,
};
pub use keygen::{poly_derive_uniform_leq_eta, trusted_dealer_keygen, SecretShare, ThresholdKeyShare};
pub use params::{gosper_bitmasks, holders_of, recovery_pattern, IterParams, ThresholdConfig, NU};
pub use sign::{combine, round1, round2, round3};
pub use state::{Phase1State, Phase2State, Round1State, Round2State};

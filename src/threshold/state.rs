//! Destroyable round/phase state (spec §4.10, C10).
//!
//! Each state type owns its sensitive buffers exclusively and exposes a one-shot `destroy`
//! that zeroes them and poisons the state; every accessor thereafter returns
//! `Error::StateDestroyed` rather than stale data. Grounded in the `zeroize::Zeroize`
//! idiom used by the pack's other threshold-signature examples (`gnosisguild-enclave`'s
//! `e3-crypto::sensitive`, `frost-ristretto255`'s key types), adapted here to an explicit
//! `destroy()` transition instead of `Drop`, since the spec requires destruction at a
//! specific protocol point regardless of when the value is eventually dropped.

use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::util::{wipe, wipe_f64, B64};

/// Per-signing-attempt state produced by `round1`: the `K_iter` hyperball float vectors and
/// the packed commitment bytes sent to peers.
#[derive(Debug, Default)]
pub struct Round1State {
    stw: Vec<Vec<f64>>,
    packed_commitment: Vec<u8>,
    destroyed: bool,
}

impl Round1State {
    pub fn new(stw: Vec<Vec<f64>>, packed_commitment: Vec<u8>) -> Self {
        Round1State {
            stw,
            packed_commitment,
            destroyed: false,
        }
    }

    pub fn stw(&self) -> Result<&[Vec<f64>]> {
        self.check()?;
        Ok(&self.stw)
    }

    pub fn packed_commitment(&self) -> Result<&[u8]> {
        self.check()?;
        Ok(&self.packed_commitment)
    }

    fn check(&self) -> Result<()> {
        if self.destroyed {
            Err(Error::StateDestroyed)
        } else {
            Ok(())
        }
    }

    /// Zero the hyperball floats and the packed commitment, then poison the state.
    pub fn destroy(&mut self) {
        for v in self.stw.iter_mut() {
            wipe_f64(v);
        }
        self.stw.clear();
        wipe(&mut self.packed_commitment);
        self.packed_commitment.clear();
        self.destroyed = true;
    }
}

/// Per-signing-attempt state produced by `round2`: the persisted round-1 hashes (for
/// round-3 binding), μ, and the active-party bookkeeping.
#[derive(Debug, Default)]
pub struct Round2State {
    round1_hashes: Vec<[u8; 32]>,
    mu: B64,
    active_bitmask: u32,
    active_ids: Vec<usize>,
    destroyed: bool,
}

impl Round2State {
    pub fn new(round1_hashes: Vec<[u8; 32]>, mu: B64, active_bitmask: u32, active_ids: Vec<usize>) -> Self {
        Round2State {
            round1_hashes,
            mu,
            active_bitmask,
            active_ids,
            destroyed: false,
        }
    }

    pub fn round1_hashes(&self) -> Result<&[[u8; 32]]> {
        self.check()?;
        Ok(&self.round1_hashes)
    }

    pub fn mu(&self) -> Result<&B64> {
        self.check()?;
        Ok(&self.mu)
    }

    pub fn active_bitmask(&self) -> Result<u32> {
        self.check()?;
        Ok(self.active_bitmask)
    }

    pub fn active_ids(&self) -> Result<&[usize]> {
        self.check()?;
        Ok(&self.active_ids)
    }

    fn check(&self) -> Result<()> {
        if self.destroyed {
            Err(Error::StateDestroyed)
        } else {
            Ok(())
        }
    }

    /// Zero μ, then poison the state.
    pub fn destroy(&mut self) {
        self.mu.zeroize();
        self.destroyed = true;
    }
}

/// DKG Phase-1 state: each party's own `rho_i` and per-bitmask seeds, retained privately
/// until Phase-2 reveal.
#[derive(Debug, Default)]
pub struct Phase1State {
    rho_i: [u8; 32],
    bitmask_seeds: Vec<(u32, [u8; 32])>,
    destroyed: bool,
}

impl Phase1State {
    pub fn new(rho_i: [u8; 32], bitmask_seeds: Vec<(u32, [u8; 32])>) -> Self {
        Phase1State {
            rho_i,
            bitmask_seeds,
            destroyed: false,
        }
    }

    pub fn rho_i(&self) -> Result<[u8; 32]> {
        self.check()?;
        Ok(self.rho_i)
    }

    pub fn bitmask_seed(&self, bitmask: u32) -> Result<Option<[u8; 32]>> {
        self.check()?;
        Ok(self.bitmask_seeds.iter().find(|(b, _)| *b == bitmask).map(|(_, s)| *s))
    }

    fn check(&self) -> Result<()> {
        if self.destroyed {
            Err(Error::StateDestroyed)
        } else {
            Ok(())
        }
    }

    pub fn destroy(&mut self) {
        self.rho_i.zeroize();
        for (_, s) in self.bitmask_seeds.iter_mut() {
            s.zeroize();
        }
        self.bitmask_seeds.clear();
        self.destroyed = true;
    }
}

/// DKG Phase-2 state: seeds received from fellow holders, pending Finalize's verify/derive
/// step.
#[derive(Debug, Default)]
pub struct Phase2State {
    received_seeds: Vec<(u32, usize, [u8; 32])>,
    destroyed: bool,
}

impl Phase2State {
    pub fn new(received_seeds: Vec<(u32, usize, [u8; 32])>) -> Self {
        Phase2State {
            received_seeds,
            destroyed: false,
        }
    }

    pub fn seeds_for(&self, bitmask: u32) -> Result<Vec<(usize, [u8; 32])>> {
        self.check()?;
        Ok(self
            .received_seeds
            .iter()
            .filter(|(b, _, _)| *b == bitmask)
            .map(|(_, party, seed)| (*party, *seed))
            .collect())
    }

    fn check(&self) -> Result<()> {
        if self.destroyed {
            Err(Error::StateDestroyed)
        } else {
            Ok(())
        }
    }

    pub fn destroy(&mut self) {
        for (_, _, s) in self.received_seeds.iter_mut() {
            s.zeroize();
        }
        self.received_seeds.clear();
        self.destroyed = true;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn destroy_poisons_round1_state() {
        let mut state = Round1State::new(vec![vec![1.0, 2.0]], vec![9u8; 4]);
        assert!(state.stw().is_ok());
        state.destroy();
        assert!(matches!(state.stw(), Err(Error::StateDestroyed)));
        assert!(matches!(state.packed_commitment(), Err(Error::StateDestroyed)));
    }

    #[test]
    fn destroy_zeroes_round2_mu() {
        let mut state = Round2State::new(vec![], [7u8; 64], 0b101, vec![0, 2]);
        state.destroy();
        // After destroy the accessor is poisoned; reach the field directly to confirm wipe.
        assert!(state.mu.iter().all(|&b| b == 0));
    }
}

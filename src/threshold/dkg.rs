//! Four-phase distributed key generation (spec §4.9, C9).
//!
//! Produces the same `(VerificationKey, ThresholdKeyShare)` distribution as
//! `keygen::trusted_dealer_keygen` without any party ever holding the full secret: every
//! bitmask's `(s1_b, s2_b)` is derived identically by all its holders from a jointly
//! committed seed (Phase 1/2), and the bitmask's generator splits its public contribution
//! into additive mask pieces so that the sum `t = Σ_j R_j` reconstructs `A·s1 + s2` (Phase
//! 3/4) without the generator ever disclosing the contribution on its own. Grounded in
//! `keygen.rs`'s `poly_derive_uniform_leq_eta`/`A·NTT(s1)+s2` construction, generalized from
//! a trusted-dealer sum to a commit-reveal-derive-split-aggregate pipeline.

use rand_core::CryptoRngCore;
use std::collections::HashMap;

use crate::algebra::{AlgebraExt, PolynomialVector};
use crate::crypto::H256;
use crate::dsa::VerificationKey;
use crate::error::{Error, Result};
use crate::sampling::expand_a;
use crate::threshold::keygen::{poly_derive_uniform_leq_eta, SecretShare, ThresholdKeyShare};
use crate::threshold::params::{holders_of, ThresholdConfig};
use crate::threshold::state::{Phase1State, Phase2State};
use crate::util::{B32, B64};
use tracing::debug;

const TAG_RHO: u8 = 0x01;
const TAG_BITMASK: u8 = 0x02;

fn commit_rho(session_id: &B32, party_id: usize, rho: &[u8; 32]) -> [u8; 32] {
    H256::new()
        .absorb(session_id)
        .absorb(&[TAG_RHO])
        .absorb(&[party_id as u8])
        .absorb(rho)
        .squeeze32()
}

fn commit_bitmask_seed(session_id: &B32, party_id: usize, bitmask: u32, seed: &[u8; 32]) -> [u8; 32] {
    H256::new()
        .absorb(session_id)
        .absorb(&[TAG_BITMASK])
        .absorb(&[party_id as u8])
        .absorb(&bitmask.to_le_bytes())
        .absorb(seed)
        .squeeze32()
}

/// Deterministic generator assignment: minimum current load, ties broken by ascending id.
/// A function of `(bitmasks, holdersOf)` alone, so every party computes the same table.
pub fn assign_generators(n: usize, bitmasks: &[u32]) -> HashMap<u32, usize> {
    let mut load = vec![0usize; n];
    let mut assignment = HashMap::with_capacity(bitmasks.len());
    for &b in bitmasks {
        let holders: Vec<usize> = holders_of(b).into_iter().filter(|&h| h < n).collect();
        let generator = *holders.iter().min_by_key(|&&h| (load[h], h)).expect("bitmask has a holder");
        load[generator] += 1;
        assignment.insert(b, generator);
    }
    assignment
}

/// Phase-1 broadcast: commitments to `rho_i` and to this party's per-bitmask seeds.
#[derive(Clone, Debug)]
pub struct Phase1Broadcast {
    pub party_id: usize,
    pub rho_commitment: [u8; 32],
    pub bitmask_commitments: Vec<(u32, [u8; 32])>,
}

/// Phase 1 — commit: draw `rho_i` and one seed per bitmask this party holds.
pub fn phase1_commit(
    session_id: &B32,
    party_id: usize,
    party_bitmasks: &[u32],
    rng: &mut impl CryptoRngCore,
) -> (Phase1Broadcast, Phase1State) {
    let mut rho_i = [0u8; 32];
    rng.fill_bytes(&mut rho_i);
    let rho_commitment = commit_rho(session_id, party_id, &rho_i);

    let mut bitmask_seeds = Vec::with_capacity(party_bitmasks.len());
    let mut bitmask_commitments = Vec::with_capacity(party_bitmasks.len());
    for &b in party_bitmasks {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        bitmask_commitments.push((b, commit_bitmask_seed(session_id, party_id, b, &seed)));
        bitmask_seeds.push((b, seed));
    }

    debug!(party_id, bitmasks = party_bitmasks.len(), "dkg phase1: commitments broadcast");
    (
        Phase1Broadcast { party_id, rho_commitment, bitmask_commitments },
        Phase1State::new(rho_i, bitmask_seeds),
    )
}

/// Phase 2 — reveal: broadcast `rho_i` in the clear and hand back the `(bitmask, seed)`
/// openings for the caller to route to fellow holders only.
pub fn phase2_reveal(state1: &Phase1State, party_bitmasks: &[u32]) -> Result<([u8; 32], Vec<(u32, [u8; 32])>)> {
    let rho_i = state1.rho_i()?;
    let mut seeds = Vec::with_capacity(party_bitmasks.len());
    for &b in party_bitmasks {
        if let Some(seed) = state1.bitmask_seed(b)? {
            seeds.push((b, seed));
        }
    }
    Ok((rho_i, seeds))
}

/// Result of Phase 2 Finalize: the combined `rho`, this party's derived bitmask shares, and
/// the mask pieces this party must privately send as generator of some bitmasks.
pub struct FinalizeResult {
    pub rho: B32,
    pub shares: HashMap<u32, SecretShare>,
    pub state2: Phase2State,
    /// `(recipient, bitmask, piece)` this party must send, as generator of `bitmask`.
    pub outgoing_pieces: Vec<(usize, u32, PolynomialVector)>,
    /// The piece(s) this party retains for itself, as generator of some bitmask it also holds.
    pub own_pieces: Vec<(u32, PolynomialVector)>,
}

/// Phase 2 Finalize — verify & derive. Verifies every peer's `rho` broadcast and this
/// party's received bitmask seeds against their Phase-1 commitments, derives the combined
/// `rho` and this party's `(s1_b, s2_b)` shares, and — for every bitmask this party
/// generates — splits its public contribution into `N-T+1` additive mask pieces.
#[allow(clippy::too_many_arguments)]
pub fn phase2_finalize(
    config: &ThresholdConfig,
    session_id: &B32,
    party_id: usize,
    state1: &Phase1State,
    rho_broadcasts: &[(usize, [u8; 32])],
    rho_commitments: &[(usize, [u8; 32])],
    seed_broadcasts: &[(usize, u32, [u8; 32])],
    seed_commitments: &[(usize, u32, [u8; 32])],
    rng: &mut impl CryptoRngCore,
) -> Result<FinalizeResult> {
    for &(pid, rho) in rho_broadcasts {
        let expected = rho_commitments
            .iter()
            .find(|(p, _)| *p == pid)
            .map(|(_, c)| *c)
            .ok_or_else(|| Error::InvalidInput(format!("no rho commitment on file for party {pid}")))?;
        if commit_rho(session_id, pid, &rho) != expected {
            return Err(Error::CommitmentMismatch { party: pid as u8, detail: "rho commitment mismatch" });
        }
    }

    let mut sorted_rhos = rho_broadcasts.to_vec();
    sorted_rhos.sort_unstable_by_key(|(pid, _)| *pid);
    let mut rho_xcript = H256::new().absorb(session_id).absorb(&[0x03]);
    for (_, rho) in &sorted_rhos {
        rho_xcript = rho_xcript.absorb(rho);
    }
    let rho: B32 = rho_xcript.squeeze32();

    let bitmasks = config.bitmasks();
    let party_bitmasks: Vec<u32> = bitmasks.iter().copied().filter(|&b| holders_of(b).contains(&party_id)).collect();

    let mut shares = HashMap::with_capacity(party_bitmasks.len());
    let mut received_for_state = Vec::new();

    for &b in &party_bitmasks {
        let holders = holders_of(b);
        let mut reveals: Vec<(usize, [u8; 32])> = Vec::with_capacity(holders.len());
        for &holder in &holders {
            let (_, _, seed) = seed_broadcasts
                .iter()
                .find(|(p, bm, _)| *p == holder && *bm == b)
                .ok_or_else(|| Error::InvalidInput(format!("missing bitmask-seed reveal from party {holder} for bitmask {b}")))?;
            let expected = seed_commitments
                .iter()
                .find(|(p, bm, _)| *p == holder && *bm == b)
                .map(|(_, _, c)| *c)
                .ok_or_else(|| Error::InvalidInput(format!("no bitmask-seed commitment on file for party {holder}")))?;
            if commit_bitmask_seed(session_id, holder, b, seed) != expected {
                return Err(Error::CommitmentMismatch { party: holder as u8, detail: "bitmask-seed commitment mismatch" });
            }
            reveals.push((holder, *seed));
            received_for_state.push((b, holder, *seed));
        }

        let mut s_b_xcript = H256::new().absorb(session_id).absorb(&b.to_le_bytes());
        for (_, seed) in &reveals {
            s_b_xcript = s_b_xcript.absorb(seed);
        }
        let s_b: B64 = s_b_xcript.squeeze64();

        let p = &config.params;
        let s1_b = PolynomialVector((0..p.l).map(|i| poly_derive_uniform_leq_eta(&s_b, i as u16, p.eta)).collect());
        let s2_b = PolynomialVector((0..p.k).map(|i| poly_derive_uniform_leq_eta(&s_b, (p.l + i) as u16, p.eta)).collect());
        shares.insert(b, SecretShare::new(s1_b, s2_b));
    }

    let generators = assign_generators(config.n, &bitmasks);
    let mut outgoing_pieces = Vec::new();
    let mut own_pieces = Vec::new();

    for (&b, &generator) in generators.iter() {
        if generator != party_id {
            continue;
        }
        let share = shares.get(&b).expect("generator is always a holder");
        let a_hat = expand_a(&rho, config.params.k, config.params.l);
        let contribution = a_hat.mul_vec(&share.s1_hat).ntt_inverse().add(&share.s2);

        let holders = holders_of(b);
        let mut acc = PolynomialVector::zero(config.params.k);
        let mut pieces = Vec::with_capacity(holders.len());
        for _ in 0..holders.len() - 1 {
            let piece = random_polynomial_vector(config.params.k, rng);
            acc = acc.add(&piece);
            pieces.push(piece);
        }
        pieces.push(contribution.sub(&acc));

        for (holder, piece) in holders.into_iter().zip(pieces.into_iter()) {
            if holder == party_id {
                own_pieces.push((b, piece));
            } else {
                outgoing_pieces.push((holder, b, piece));
            }
        }
    }

    debug!(party_id, shares = shares.len(), generated = own_pieces.len() + outgoing_pieces.len(), "dkg phase2: shares derived, mask pieces split");
    let state2 = Phase2State::new(received_for_state);
    Ok(FinalizeResult { rho, shares, state2, outgoing_pieces, own_pieces })
}

fn random_polynomial_vector(len: usize, rng: &mut impl CryptoRngCore) -> PolynomialVector {
    use crate::algebra::{reduce, Polynomial};
    PolynomialVector(
        (0..len)
            .map(|_| {
                let mut coeffs = [0i64; crate::param::N];
                for c in coeffs.iter_mut() {
                    let mut buf = [0u8; 4];
                    rng.fill_bytes(&mut buf);
                    *c = reduce(i32::from_le_bytes(buf) as i64);
                }
                Polynomial::from_coeffs(coeffs)
            })
            .collect(),
    )
}

/// Phase 4 — aggregate: sum every mask piece addressed to this party (one per bitmask it
/// holds) into `R_j`.
pub fn phase4_aggregate(k: usize, received_pieces: &[(u32, PolynomialVector)]) -> PolynomialVector {
    let mut r_j = PolynomialVector::zero(k);
    for (_, piece) in received_pieces {
        r_j = r_j.add(piece);
    }
    r_j
}

/// Finalize: sum every party's broadcast `R_j`, `Power2Round`, and assemble the public key
/// and this party's `ThresholdKeyShare`.
pub fn finalize(
    config: &ThresholdConfig,
    party_id: usize,
    party_key: &B32,
    rho: &B32,
    shares: HashMap<u32, SecretShare>,
    r_broadcasts: &[(usize, PolynomialVector)],
) -> (VerificationKey, ThresholdKeyShare) {
    let mut t = PolynomialVector::zero(config.params.k);
    for (_, r) in r_broadcasts {
        t = t.add(r);
    }
    let (t1, _t0) = t.power2round();

    let vk = VerificationKey { params: config.params, rho: *rho, t1 };
    let tr: B64 = H256::new().absorb(&vk.encode()).squeeze64();

    debug!(party_id, "dkg finalize: verification key and key share ready");
    (vk, ThresholdKeyShare { id: party_id, rho: *rho, key: *party_key, tr, shares })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::threshold::sign::{combine, round1, round2, round3};
    use rand::rngs::OsRng;

    #[test]
    fn full_dkg_round_trip_produces_a_usable_key() {
        let config = ThresholdConfig::new(2, 3, 44).unwrap();
        let session_id = [1u8; 32];
        let mut rng = OsRng;
        let bitmasks = config.bitmasks();

        let party_bitmasks: Vec<Vec<u32>> = (0..config.n)
            .map(|i| bitmasks.iter().copied().filter(|&b| holders_of(b).contains(&i)).collect())
            .collect();

        let mut broadcasts1 = Vec::new();
        let mut states1 = Vec::new();
        for i in 0..config.n {
            let (b, s) = phase1_commit(&session_id, i, &party_bitmasks[i], &mut rng);
            broadcasts1.push(b);
            states1.push(s);
        }

        let rho_commitments: Vec<(usize, [u8; 32])> = broadcasts1.iter().map(|b| (b.party_id, b.rho_commitment)).collect();
        let seed_commitments: Vec<(usize, u32, [u8; 32])> = broadcasts1
            .iter()
            .flat_map(|b| b.bitmask_commitments.iter().map(move |&(bm, c)| (b.party_id, bm, c)))
            .collect();

        let mut rho_broadcasts = Vec::new();
        let mut all_seed_reveals = Vec::new();
        for i in 0..config.n {
            let (rho_i, seeds) = phase2_reveal(&states1[i], &party_bitmasks[i]).unwrap();
            rho_broadcasts.push((i, rho_i));
            for (b, seed) in seeds {
                all_seed_reveals.push((i, b, seed));
            }
        }

        let mut vks = Vec::new();
        let mut key_shares = Vec::new();
        let mut all_outgoing = Vec::new();
        let mut finalize_results = Vec::new();

        for i in 0..config.n {
            let result = phase2_finalize(
                &config,
                &session_id,
                i,
                &states1[i],
                &rho_broadcasts,
                &rho_commitments,
                &all_seed_reveals,
                &seed_commitments,
                &mut rng,
            )
            .unwrap();
            all_outgoing.push((i, result.outgoing_pieces.clone()));
            finalize_results.push(result);
        }

        for i in 0..config.n {
            let mut received: Vec<(u32, PolynomialVector)> =
                finalize_results[i].own_pieces.iter().map(|(b, p)| (*b, p.clone())).collect();
            for (sender, pieces) in &all_outgoing {
                if *sender == i {
                    continue;
                }
                for (recipient, b, piece) in pieces {
                    if *recipient == i {
                        received.push((*b, piece.clone()));
                    }
                }
            }

            let r_j = phase4_aggregate(config.params.k, &received);
            // Every party broadcasts R_j; here we just collect this one party's own R_j
            // against the others computed the same way, single-threaded.
            let _ = r_j;
        }

        // Recompute everyone's R_j deterministically and finalize.
        let mut all_r = Vec::new();
        for i in 0..config.n {
            let mut received: Vec<(u32, PolynomialVector)> =
                finalize_results[i].own_pieces.iter().map(|(b, p)| (*b, p.clone())).collect();
            for (sender, pieces) in &all_outgoing {
                if *sender == i {
                    continue;
                }
                for (recipient, b, piece) in pieces {
                    if *recipient == i {
                        received.push((*b, piece.clone()));
                    }
                }
            }
            all_r.push((i, phase4_aggregate(config.params.k, &received)));
        }

        for i in 0..config.n {
            let mut party_key = [0u8; 32];
            rand_core::RngCore::fill_bytes(&mut rng, &mut party_key);
            let (vk, share) = finalize(&config, i, &party_key, &finalize_results[i].rho, finalize_results[i].shares.clone(), &all_r);
            vks.push(vk);
            key_shares.push(share);
        }

        for vk in &vks[1..] {
            assert_eq!(vk.t1, vks[0].t1);
            assert_eq!(vk.rho, vks[0].rho);
        }

        let active = [0usize, 1usize];
        let rho_prime = [9u8; 32];
        let msg = b"dkg end to end";

        let mut round1_hashes = Vec::new();
        let mut round1_states = Vec::new();
        for &id in &active {
            let (hash, state) = round1(&config, &key_shares[id], 0, &rho_prime);
            round1_hashes.push((id, hash));
            round1_states.push(state);
        }
        let mut round2_states = Vec::new();
        let mut commitments = Vec::new();
        for (pos, &id) in active.iter().enumerate() {
            let (packed, state2) = round2(&config, &key_shares[id], &active, msg, &round1_hashes, &round1_states[pos], &[]).unwrap();
            commitments.push((id, packed));
            round2_states.push(state2);
        }
        let mut responses = Vec::new();
        for (pos, &id) in active.iter().enumerate() {
            responses.push(round3(&config, &key_shares[id], &commitments, &round1_states[pos], &round2_states[pos]).unwrap());
        }
        let commitment_bufs: Vec<Vec<u8>> = commitments.into_iter().map(|(_, c)| c).collect();
        let sig = combine(&config, &vks[0], &key_shares[active[0]].tr, msg, &[], &commitment_bufs, &responses)
            .unwrap()
            .expect("at least one transcript should pass");
        assert!(vks[0].verify(msg, &[], &sig));
    }

    #[test]
    fn generator_assignment_balances_load() {
        let config = ThresholdConfig::new(2, 4, 44).unwrap();
        let bitmasks = config.bitmasks();
        let generators = assign_generators(config.n, &bitmasks);
        let mut load = vec![0usize; config.n];
        for &g in generators.values() {
            load[g] += 1;
        }
        assert!(load.iter().max().unwrap() - load.iter().min().unwrap() <= 1);
    }
}

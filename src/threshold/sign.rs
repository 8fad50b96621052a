//! Three-round threshold signing protocol and combine (spec §4.8, C8).
//!
//! Every attempt runs `K_iter` parallel Fiat-Shamir transcripts so that a single accepted
//! iteration is enough to yield a signature; the per-party norm check in round 3 is a local
//! early-out (zero the response rather than leak a rejected `z`), while `combine` is the
//! authoritative check the verifier-facing signature must pass. Grounded in `dsa.rs`'s
//! `sign_internal`/`verify_internal` rejection loop, generalized from one party's secret to
//! an additive sum of per-active-party contributions recovered via `recovery_pattern`.

use crate::algebra::{AlgebraExt, NttVector, Polynomial, PolynomialVector};
use crate::crypto::H256;
use crate::dsa::{get_message, Signature, VerificationKey};
use crate::encode::{pack_w1, simple_bit_pack_poly, simple_bit_unpack_poly};
use crate::error::{Error, Result};
use crate::hint::Hint;
use crate::param::{N, Q};
use crate::sampling::{expand_a, sample_hyperball, sample_in_ball};
use crate::threshold::keygen::ThresholdKeyShare;
use crate::threshold::params::{recovery_pattern, ThresholdConfig};
use crate::threshold::state::{Round1State, Round2State};
use crate::util::B64;
use tracing::{debug, trace};
use zeroize::Zeroize;

const COMMITMENT_BITS: u32 = 23;

fn pack_u23_vec(v: &PolynomialVector) -> Vec<u8> {
    v.0.iter().flat_map(|p| simple_bit_pack_poly(p, COMMITMENT_BITS)).collect()
}

fn unpack_u23_vec(bytes: &[u8], len: usize) -> Result<PolynomialVector> {
    let bytes_per = (COMMITMENT_BITS as usize) * N / 8;
    if bytes.len() != bytes_per * len {
        return Err(Error::InvalidInput(format!(
            "threshold wire polynomial vector must be {} bytes, got {}",
            bytes_per * len,
            bytes.len()
        )));
    }
    let mut polys = Vec::with_capacity(len);
    for i in 0..len {
        let p = simple_bit_unpack_poly(&bytes[i * bytes_per..(i + 1) * bytes_per], COMMITMENT_BITS);
        if p.0.iter().any(|&c| c >= Q) {
            return Err(Error::InvalidInput("threshold wire coefficient out of range".into()));
        }
        polys.push(p);
    }
    Ok(PolynomialVector(polys))
}

fn round_to_ring(x: f64) -> i64 {
    let r = x.round() as i64;
    r.rem_euclid(Q)
}

/// `round1`: draw the `K_iter` hyperball samples, round to `(y, e)`, compute each
/// iteration's commitment `w_i`, and pack. Returns the commitment hash to broadcast plus
/// the local state round 3 needs.
pub fn round1(
    config: &ThresholdConfig,
    key: &ThresholdKeyShare,
    nonce: u16,
    rho_prime: &[u8; 32],
) -> ([u8; 32], Round1State) {
    let p = &config.params;
    let iter_params = config.iter_params();
    let a_hat = expand_a(&key.rho, p.k, p.l);

    let mut stw_all = Vec::with_capacity(iter_params.k_iter);
    let mut packed_all = Vec::with_capacity(iter_params.k_iter * p.k * (COMMITMENT_BITS as usize) * N / 8);

    for iter in 0..iter_params.k_iter {
        let sample_nonce = (nonce as u32)
            .wrapping_mul(iter_params.k_iter as u32)
            .wrapping_add(iter as u32) as u16;
        let stw = sample_hyperball(iter_params.r_prime, crate::threshold::params::NU, p.k, p.l, rho_prime, sample_nonce);

        let l_block = N * p.l;
        let y = PolynomialVector(
            (0..p.l)
                .map(|poly| Polynomial::from_coeffs(std::array::from_fn(|c| round_to_ring(stw[poly * N + c]))))
                .collect(),
        );
        let e = PolynomialVector(
            (0..p.k)
                .map(|poly| Polynomial::from_coeffs(std::array::from_fn(|c| round_to_ring(stw[l_block + poly * N + c]))))
                .collect(),
        );

        let w_i = a_hat.mul_vec(&y.ntt()).ntt_inverse().add(&e);
        packed_all.extend(pack_u23_vec(&w_i));
        stw_all.push(stw);
    }

    let commitment_hash: [u8; 32] = H256::new()
        .absorb(&key.tr)
        .absorb(&[key.id as u8])
        .absorb(&packed_all)
        .squeeze32();

    debug!(party = key.id, k_iter = iter_params.k_iter, "round1: commitment ready");
    (commitment_hash, Round1State::new(stw_all, packed_all))
}

/// `round2`: validate the active set, bind μ, and hand back the packed commitment to
/// broadcast plus the state round 3 needs.
pub fn round2(
    config: &ThresholdConfig,
    key: &ThresholdKeyShare,
    active_ids: &[usize],
    msg: &[u8],
    round1_hashes: &[(usize, [u8; 32])],
    state1: &Round1State,
    ctx: &[u8],
) -> Result<(Vec<u8>, Round2State)> {
    if active_ids.len() < config.t {
        return Err(Error::InvalidInput(format!(
            "active set has {} parties, need at least {}",
            active_ids.len(),
            config.t
        )));
    }
    let mut sorted = active_ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != active_ids.len() {
        return Err(Error::InvalidInput("active party ids must be unique".into()));
    }

    let hashes_in_order: Vec<[u8; 32]> = active_ids
        .iter()
        .map(|id| {
            round1_hashes
                .iter()
                .find(|(p, _)| p == id)
                .map(|(_, h)| *h)
                .ok_or_else(|| Error::InvalidInput("missing round-1 hash for active party".into()))
        })
        .collect::<Result<_>>()?;

    let mp = get_message(msg, ctx)?;
    let mu: B64 = H256::new().absorb(&key.tr).absorb(&mp).squeeze64();
    let active_bitmask = active_ids.iter().fold(0u32, |acc, &i| acc | (1 << i));
    let packed = state1.packed_commitment()?.to_vec();

    debug!(party = key.id, active = active_ids.len(), "round2: active set bound to mu");
    let state2 = Round2State::new(hashes_in_order, mu, active_bitmask, active_ids.to_vec());
    Ok((packed, state2))
}

/// `round3`: verify every peer's round-1 commitment, recover this party's combined active
/// share, fold in the aggregated commitments, and emit the packed per-iteration responses.
pub fn round3(
    config: &ThresholdConfig,
    key: &ThresholdKeyShare,
    commitments: &[(usize, Vec<u8>)],
    state1: &Round1State,
    state2: &Round2State,
) -> Result<Vec<u8>> {
    let p = &config.params;
    let iter_params = config.iter_params();
    let active_ids = state2.active_ids()?.to_vec();
    let hashes = state2.round1_hashes()?;

    for (pos, &pid) in active_ids.iter().enumerate() {
        let (_, packed) = commitments
            .iter()
            .find(|(party, _)| *party == pid)
            .ok_or_else(|| Error::InvalidInput(format!("missing round-1 commitment from party {pid}")))?;
        let recomputed: [u8; 32] = H256::new()
            .absorb(&key.tr)
            .absorb(&[pid as u8])
            .absorb(packed)
            .squeeze32();
        if recomputed != hashes[pos] {
            return Err(Error::CommitmentMismatch {
                party: pid as u8,
                detail: "round-1 commitment hash mismatch",
            });
        }
    }

    let mut sorted_active = active_ids.clone();
    sorted_active.sort_unstable();
    let own_pos = sorted_active
        .iter()
        .position(|&id| id == key.id)
        .ok_or_else(|| Error::InvalidInput("signing party is not in the active set".into()))?;

    let pattern = recovery_pattern(config.n, config.t, &sorted_active);
    let mut s1_hat = NttVector::zero(p.l);
    let mut s2_hat = NttVector::zero(p.k);
    for &bitmask in &pattern[own_pos] {
        let share = key
            .shares
            .get(&bitmask)
            .ok_or_else(|| Error::InvalidInput(format!("missing share for bitmask {bitmask}")))?;
        s1_hat = s1_hat.add(&share.s1_hat);
        s2_hat = s2_hat.add(&share.s2_hat);
    }

    let commitment_bytes_per_party = iter_params.k_iter * p.k * (COMMITMENT_BITS as usize) * N / 8;
    let mut commitments_by_party = Vec::with_capacity(active_ids.len());
    for &pid in &active_ids {
        let (_, packed) = commitments.iter().find(|(party, _)| *party == pid).unwrap();
        if packed.len() != commitment_bytes_per_party {
            return Err(Error::InvalidInput("malformed round-1 commitment length".into()));
        }
        commitments_by_party.push(packed);
    }

    let bytes_per_iter = p.k * (COMMITMENT_BITS as usize) * N / 8;
    let mut packed_responses = Vec::with_capacity(iter_params.k_iter * p.l * (COMMITMENT_BITS as usize) * N / 8);

    for iter in 0..iter_params.k_iter {
        let mut wfinal = PolynomialVector::zero(p.k);
        for packed in &commitments_by_party {
            let w_i = unpack_u23_vec(&packed[iter * bytes_per_iter..(iter + 1) * bytes_per_iter], p.k)?;
            wfinal = wfinal.add(&w_i);
        }

        let w1 = wfinal.high_bits(p.gamma2);
        let c_tilde = H256::new()
            .absorb(state2.mu()?)
            .absorb(&pack_w1(&w1, p.w1_bits))
            .squeeze(p.c_tilde_bytes);
        let c_hat = sample_in_ball(&c_tilde, p.tau).ntt();

        let mut cs1 = s1_hat.scale_by(&c_hat).ntt_inverse();
        let mut cs2 = s2_hat.scale_by(&c_hat).ntt_inverse();

        let stw = &state1.stw()?[iter];
        let l_block = N * p.l;
        let mut combined_l = vec![0.0f64; l_block];
        let mut combined_k = vec![0.0f64; N * p.k];
        for poly in 0..p.l {
            for c in 0..N {
                let centered = crate::algebra::smod(cs1.0[poly].0[c]) as f64;
                combined_l[poly * N + c] = stw[poly * N + c] + centered;
            }
        }
        for poly in 0..p.k {
            for c in 0..N {
                let centered = crate::algebra::smod(cs2.0[poly].0[c]) as f64;
                combined_k[poly * N + c] = stw[l_block + poly * N + c] + centered;
            }
        }

        let nu = crate::threshold::params::NU;
        let norm_sq: f64 = combined_l.iter().map(|&x| (x / nu) * (x / nu)).sum::<f64>()
            + combined_k.iter().map(|&x| x * x).sum::<f64>();

        // fvecRound always executes, rejected or not, so the acceptance pattern never
        // correlates with how close the rounded value was to being accepted.
        let rounded = PolynomialVector(
            (0..p.l)
                .map(|poly| Polynomial::from_coeffs(std::array::from_fn(|c| round_to_ring(combined_l[poly * N + c]))))
                .collect(),
        );
        let z = if norm_sq > iter_params.r * iter_params.r {
            trace!(party = key.id, iter, "round3: local norm check rejected this iteration");
            PolynomialVector::zero(p.l)
        } else {
            rounded
        };
        packed_responses.extend(pack_u23_vec(&z));

        crate::util::wipe_f64(&mut combined_l);
        crate::util::wipe_f64(&mut combined_k);
        cs1.zeroize();
        cs2.zeroize();
    }

    s1_hat.zeroize();
    s2_hat.zeroize();

    debug!(party = key.id, "round3: responses ready");
    Ok(packed_responses)
}

/// `combine`: the verifier-facing aggregation. Returns `Ok(None)` ("retry from round 1")
/// if every iteration is rejected, rather than an error — per spec, this is a
/// probabilistic-rejection outcome, not a protocol fault.
pub fn combine(
    config: &ThresholdConfig,
    pk: &VerificationKey,
    tr: &B64,
    msg: &[u8],
    ctx: &[u8],
    commitments: &[Vec<u8>],
    responses: &[Vec<u8>],
) -> Result<Option<Signature>> {
    let p = &config.params;
    let iter_params = config.iter_params();
    let a_hat = expand_a(&pk.rho, p.k, p.l);
    let mp = get_message(msg, ctx)?;
    let mu: B64 = H256::new().absorb(tr).absorb(&mp).squeeze64();

    let commitment_bytes_per_iter = p.k * (COMMITMENT_BITS as usize) * N / 8;
    let response_bytes_per_iter = p.l * (COMMITMENT_BITS as usize) * N / 8;

    for iter in 0..iter_params.k_iter {
        let mut zfinal = PolynomialVector::zero(p.l);
        for resp in responses {
            let z_i = unpack_u23_vec(&resp[iter * response_bytes_per_iter..(iter + 1) * response_bytes_per_iter], p.l)?;
            zfinal = zfinal.add(&z_i);
        }
        if zfinal.check_norm(p.gamma1() - p.beta()) {
            trace!(iter, "combine: z norm check rejected this iteration");
            continue;
        }

        let mut wfinal = PolynomialVector::zero(p.k);
        for comm in commitments {
            let w_i = unpack_u23_vec(&comm[iter * commitment_bytes_per_iter..(iter + 1) * commitment_bytes_per_iter], p.k)?;
            wfinal = wfinal.add(&w_i);
        }

        let w0 = wfinal.low_bits(p.gamma2);
        let w1 = wfinal.high_bits(p.gamma2);
        let c_tilde = H256::new().absorb(&mu).absorb(&pack_w1(&w1, p.w1_bits)).squeeze(p.c_tilde_bytes);
        let c_hat = sample_in_ball(&c_tilde, p.tau).ntt();

        let az = a_hat.mul_vec(&zfinal.ntt());
        let t1_shifted = PolynomialVector(pk.t1.0.iter().map(Polynomial::shift_left_d).collect()).ntt();
        let ct12d = t1_shifted.scale_by(&c_hat);
        let result = az.sub(&ct12d).ntt_inverse();

        let f = result.sub(&wfinal);
        if f.check_norm(p.gamma2) {
            trace!(iter, "combine: r0 norm check rejected this iteration");
            continue;
        }

        let r_for_hint = w0.add(&f);
        let h = Hint::new(&f, &r_for_hint, p.gamma2);
        if h.hamming_weight() > p.omega {
            trace!(iter, weight = h.hamming_weight(), "combine: hint weight exceeded omega");
            continue;
        }

        debug!(iter, "combine: accepted iteration, signature ready");
        return Ok(Some(Signature { c_tilde, z: zfinal, h }));
    }

    debug!(k_iter = iter_params.k_iter, "combine: every iteration rejected, caller should retry round1");
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::threshold::keygen::trusted_dealer_keygen;
    use rand::rngs::OsRng;

    #[test]
    fn full_two_of_three_signing_round_trip() {
        let config = ThresholdConfig::new(2, 3, 44).unwrap();
        let mut rng = OsRng;
        let (vk, shares) = trusted_dealer_keygen(&config, &[9u8; 32], &mut rng);

        let active = [0usize, 2usize];
        let rho_prime = [5u8; 32];
        let msg = b"threshold message";
        let ctx: &[u8] = &[];

        let mut round1_hashes = Vec::new();
        let mut round1_states = Vec::new();
        for &id in &active {
            let (hash, state) = round1(&config, &shares[id], 0, &rho_prime);
            round1_hashes.push((id, hash));
            round1_states.push(state);
        }

        let mut round2_states = Vec::new();
        let mut commitments = Vec::new();
        for (pos, &id) in active.iter().enumerate() {
            let (packed, state2) = round2(&config, &shares[id], &active, msg, &round1_hashes, &round1_states[pos], ctx).unwrap();
            commitments.push((id, packed));
            round2_states.push(state2);
        }

        let mut responses = Vec::new();
        for (pos, &id) in active.iter().enumerate() {
            let packed = round3(&config, &shares[id], &commitments, &round1_states[pos], &round2_states[pos]).unwrap();
            responses.push(packed);
        }

        let commitment_bufs: Vec<Vec<u8>> = commitments.into_iter().map(|(_, c)| c).collect();
        let sig = combine(&config, &vk, &shares[active[0]].tr, msg, ctx, &commitment_bufs, &responses)
            .unwrap()
            .expect("at least one of K_iter transcripts should pass with correct parameters");

        assert!(vk.verify(msg, ctx, &sig));
    }

    #[test]
    fn tampered_round1_commitment_is_caught_in_round3() {
        let config = ThresholdConfig::new(2, 3, 44).unwrap();
        let mut rng = OsRng;
        let (_, shares) = trusted_dealer_keygen(&config, &[9u8; 32], &mut rng);

        let active = [0usize, 2usize];
        let rho_prime = [5u8; 32];
        let msg = b"tamper test";

        let mut round1_hashes = Vec::new();
        let mut round1_states = Vec::new();
        for &id in &active {
            let (hash, state) = round1(&config, &shares[id], 1, &rho_prime);
            round1_hashes.push((id, hash));
            round1_states.push(state);
        }

        let (mut packed0, state2_0) = round2(&config, &shares[0], &active, msg, &round1_hashes, &round1_states[0], &[]).unwrap();
        let (packed2, _) = round2(&config, &shares[2], &active, msg, &round1_hashes, &round1_states[1], &[]).unwrap();
        packed0[0] ^= 0xff;

        let commitments = vec![(0usize, packed0), (2usize, packed2)];
        let err = round3(&config, &shares[2], &commitments, &round1_states[1], &state2_0);
        assert!(err.is_err());
    }
}

//! Trusted-dealer threshold keygen (spec §4.7, C7).
//!
//! Builds the same `(K_iter` independent`)` bitmask share tree the DKG (`dkg.rs`)
//! reconstructs without a dealer: one `SecretShare` per `(N-T+1)`-bitmask, handed to every
//! holder of that bitmask, with the combined public key computed over the sum of all
//! shares. Grounded in `dsa.rs`'s `key_gen_internal` for the `A`/`Power2Round`/`tr` steps,
//! generalized from a single secret to a sum over bitmask shares.

use std::collections::HashMap;

use rand_core::CryptoRngCore;

use crate::algebra::{AlgebraExt, NttVector, PolynomialVector};
use crate::crypto::H256;
use crate::dsa::VerificationKey;
use crate::sampling::{expand_a, rej_bounded_poly};
use crate::threshold::params::{holders_of, ThresholdConfig};
use crate::util::{B32, B64};
use tracing::debug;

/// One bitmask's secret share: the polynomial values plus their NTT-domain copies, kept
/// alongside for the signing core's repeated `c * s1Hat` products.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretShare {
    pub s1: PolynomialVector,
    pub s2: PolynomialVector,
    pub s1_hat: NttVector,
    pub s2_hat: NttVector,
}

impl SecretShare {
    pub(crate) fn new(s1: PolynomialVector, s2: PolynomialVector) -> Self {
        let s1_hat = s1.ntt();
        let s2_hat = s2.ntt();
        SecretShare { s1, s2, s1_hat, s2_hat }
    }
}

/// One party's persistent threshold key material: populated only for the bitmasks that
/// contain this party's id.
#[derive(Clone, Debug)]
pub struct ThresholdKeyShare {
    pub id: usize,
    pub rho: B32,
    pub key: B32,
    pub tr: B64,
    pub shares: HashMap<u32, SecretShare>,
}

/// Algorithm 31-adjacent `PolyDeriveUniformLeqEta`: derive an `[-eta, eta]`-bounded
/// polynomial from a 64-byte share-seed and a 16-bit nonce, reusing `RejBoundedPoly`'s
/// nibble-rejection rule over a freshly keyed SHAKE256 transcript.
pub fn poly_derive_uniform_leq_eta(seed: &B64, nonce: u16, eta: i64) -> crate::algebra::Polynomial {
    let xof = H256::new().absorb(seed).absorb(&nonce.to_le_bytes()).xof();
    rej_bounded_poly(xof, eta)
}

/// Trusted-dealer keygen: returns the combined public key and one `ThresholdKeyShare` per
/// party in `0..config.n`.
pub fn trusted_dealer_keygen(
    config: &ThresholdConfig,
    seed: &B32,
    rng: &mut impl CryptoRngCore,
) -> (VerificationKey, Vec<ThresholdKeyShare>) {
    let p = &config.params;

    let rho: B32 = H256::new()
        .absorb(seed)
        .absorb(&[p.k as u8])
        .absorb(&[p.l as u8])
        .squeeze32();

    let mut keys = Vec::with_capacity(config.n);
    for _ in 0..config.n {
        let mut k = [0u8; 32];
        rng.fill_bytes(&mut k);
        keys.push(k);
    }

    let a = expand_a(&rho, p.k, p.l);

    let mut total_s1 = PolynomialVector::zero(p.l);
    let mut total_s2 = PolynomialVector::zero(p.k);
    let mut per_party_shares: Vec<HashMap<u32, SecretShare>> =
        (0..config.n).map(|_| HashMap::new()).collect();

    for bitmask in config.bitmasks() {
        let mut share_seed = [0u8; 64];
        rng.fill_bytes(&mut share_seed);

        let s1 = PolynomialVector((0..p.l).map(|i| poly_derive_uniform_leq_eta(&share_seed, i as u16, p.eta)).collect());
        let s2 = PolynomialVector(
            (0..p.k)
                .map(|i| poly_derive_uniform_leq_eta(&share_seed, (p.l + i) as u16, p.eta))
                .collect(),
        );

        total_s1 = total_s1.add(&s1);
        total_s2 = total_s2.add(&s2);

        let share = SecretShare::new(s1, s2);
        for holder in holders_of(bitmask) {
            if holder < config.n {
                per_party_shares[holder].insert(bitmask, share.clone());
            }
        }
    }

    let as1 = a.mul_vec(&total_s1.ntt());
    let t = as1.ntt_inverse().add(&total_s2);
    let (t1, t0) = t.power2round();
    let _ = t0; // the trusted dealer never publishes t0; only the combined pk carries t1.

    let vk = VerificationKey { params: *p, rho, t1 };
    let tr: B64 = H256::new().absorb(&vk.encode()).squeeze64();

    let shares = per_party_shares
        .into_iter()
        .enumerate()
        .map(|(id, shares)| ThresholdKeyShare {
            id,
            rho,
            key: keys[id],
            tr,
            shares,
        })
        .collect();

    debug!(n = config.n, t = config.t, bitmasks = config.bitmasks().len(), "trusted dealer keygen complete");
    (vk, shares)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn every_party_is_missing_at_least_one_bitmask() {
        let config = ThresholdConfig::new(2, 3, 44).unwrap();
        let mut rng = OsRng;
        let (_, shares) = trusted_dealer_keygen(&config, &[1u8; 32], &mut rng);
        for share in &shares {
            assert!(share.shares.len() < config.bitmasks().len());
        }
    }

    #[test]
    fn deterministic_rho_for_fixed_seed() {
        let config = ThresholdConfig::new(2, 3, 44).unwrap();
        let mut rng1 = OsRng;
        let mut rng2 = OsRng;
        let (vk1, _) = trusted_dealer_keygen(&config, &[42u8; 32], &mut rng1);
        let (vk2, _) = trusted_dealer_keygen(&config, &[42u8; 32], &mut rng2);
        assert_eq!(vk1.rho, vk2.rho);
    }
}

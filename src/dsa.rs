//! Baseline ML-DSA keygen/sign/verify (spec §4.5, component C5).
//!
//! Grounded directly in the teacher's `lib.rs` (`key_gen_internal`, `sign_internal`,
//! `VerificationKey::verify`), generalized from `typenum`-generic parameters to a runtime
//! `ParameterSet`, made fallible per the teacher's own
//! `// TODO(RLB) Make this method fallible` marker ahead of the rejection loop, and extended
//! with the "external μ" entry point the threshold layer needs (spec's `sign_internal`
//! accepting a caller-supplied μ instead of re-deriving it from `tr`/message).

use rand_core::CryptoRngCore;

use crate::algebra::{AlgebraExt, NttMatrix, PolynomialVector};
use crate::crypto::H256;
use crate::encode::{
    pack_eta, pack_hint, pack_t0, pack_t1, pack_w1, pack_z, unpack_eta, unpack_hint, unpack_t0,
    unpack_t1, unpack_z,
};
use crate::error::{Error, Result};
use crate::hint::Hint;
use crate::param::ParameterSet;
use crate::sampling::{expand_a, expand_mask, expand_s, sample_in_ball};
use crate::util::{B32, B64};
use tracing::{debug, trace};

/// Algorithm 2 (informal) message framing: prehash-free indicator, context length, context,
/// message.
pub fn get_message(msg: &[u8], ctx: &[u8]) -> Result<Vec<u8>> {
    if ctx.len() > 255 {
        return Err(Error::InvalidInput("context must be at most 255 bytes".into()));
    }
    let mut out = Vec::with_capacity(2 + ctx.len() + msg.len());
    out.push(0x00);
    out.push(ctx.len() as u8);
    out.extend_from_slice(ctx);
    out.extend_from_slice(msg);
    Ok(out)
}

/// An ML-DSA verification key `(rho, t1)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationKey {
    pub params: ParameterSet,
    pub rho: B32,
    pub t1: PolynomialVector,
}

/// An ML-DSA signature `(c_tilde, z, h)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub c_tilde: Vec<u8>,
    pub z: PolynomialVector,
    pub h: Hint,
}

/// An ML-DSA signing key `(rho, K', tr, s1, s2, t0)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningKey {
    pub params: ParameterSet,
    pub rho: B32,
    pub k_prime: B32,
    pub tr: B64,
    pub s1: PolynomialVector,
    pub s2: PolynomialVector,
    pub t0: PolynomialVector,
}

impl SigningKey {
    /// Algorithm 6 `ML-DSA.KeyGen_internal`.
    pub fn key_gen_internal(params: ParameterSet, xi: &B32) -> (VerificationKey, SigningKey) {
        // rho/rhop/K' are one continuous SHAKE256 squeeze over (xi, K, L) per FIPS 204
        // Algorithm 6, so this reads all three off a single XOF stream rather than the
        // teacher's three separate `squeeze_new` calls (which relies on `hybrid_array`
        // const-sized outputs this crate's runtime parameter set can't express).
        let mut xof = H256::new()
            .absorb(xi)
            .absorb(&[params.k as u8])
            .absorb(&[params.l as u8])
            .xof();
        let mut rho = [0u8; 32];
        let mut rhop = [0u8; 64];
        let mut k_prime = [0u8; 32];
        sha3::digest::XofReader::read(&mut xof, &mut rho);
        sha3::digest::XofReader::read(&mut xof, &mut rhop);
        sha3::digest::XofReader::read(&mut xof, &mut k_prime);

        let a = expand_a(&rho, params.k, params.l);
        let s1 = expand_s(&rhop, params.eta, params.l, 0);
        let s2 = expand_s(&rhop, params.eta, params.k, params.l);

        let as1 = a.mul_vec(&s1.ntt());
        let t = as1.ntt_inverse().add(&s2);
        let (t1, t0) = t.power2round();

        let vk = VerificationKey { params, rho, t1 };
        let tr: B64 = H256::new().absorb(&vk.encode()).squeeze64();

        let sk = SigningKey {
            params,
            rho,
            k_prime,
            tr,
            s1,
            s2,
            t0,
        };

        (vk, sk)
    }

    /// Algorithm 7 `ML-DSA.Sign_internal`, generalized to accept a precomputed μ so the
    /// threshold protocol can drive this exact rejection loop without re-deriving μ from a
    /// message it never sees directly (spec's "external μ" entry point).
    pub fn sign_internal(&self, mu: &B64, rnd: &B32) -> Result<Signature> {
        let p = &self.params;
        let s1_hat = self.s1.ntt();
        let s2_hat = self.s2.ntt();
        let t0_hat = self.t0.ntt();
        let a_hat = expand_a(&self.rho, p.k, p.l);

        let rhopp: B64 = H256::new()
            .absorb(&self.k_prime)
            .absorb(rnd)
            .absorb(mu)
            .squeeze64();

        let gamma1 = p.gamma1();
        let beta = p.beta();
        const MAX_ATTEMPTS: u32 = 500;

        for attempt in 0..MAX_ATTEMPTS {
            let kappa = (attempt as usize * p.l) as u16;
            let y = expand_mask(&rhopp, kappa, p.l, gamma1, p.gamma1_bits);
            let w = a_hat.mul_vec(&y.ntt()).ntt_inverse();
            let w1 = w.high_bits(p.gamma2);

            let c_tilde = H256::new()
                .absorb(mu)
                .absorb(&pack_w1(&w1, p.w1_bits))
                .squeeze(p.c_tilde_bytes);
            let c = sample_in_ball(&c_tilde, p.tau);
            let c_hat = c.ntt();

            let cs1 = s1_hat.scale_by(&c_hat).ntt_inverse();
            let cs2 = s2_hat.scale_by(&c_hat).ntt_inverse();

            let z = y.add(&cs1);
            let r0 = w.sub(&cs2).low_bits(p.gamma2);

            if z.infinity_norm() >= gamma1 - beta || r0.infinity_norm() >= p.gamma2 - beta {
                trace!(attempt, "sign_internal: z/r0 norm check rejected this attempt");
                continue;
            }

            let ct0 = t0_hat.scale_by(&c_hat).ntt_inverse();
            if ct0.infinity_norm() >= p.gamma2 {
                trace!(attempt, "sign_internal: ct0 norm check rejected this attempt");
                continue;
            }

            let neg_ct0 = PolynomialVector(ct0.0.iter().map(|poly| poly.scale(-1)).collect());
            let r_for_hint = w.sub(&cs2).add(&ct0);
            let h = Hint::new(&neg_ct0, &r_for_hint, p.gamma2);

            if h.hamming_weight() > p.omega {
                trace!(attempt, weight = h.hamming_weight(), "sign_internal: hint weight exceeded omega");
                continue;
            }

            debug!(attempt, "sign_internal: signature ready");
            return Ok(Signature { c_tilde, z, h });
        }

        Err(Error::RejectionSamplingExhausted)
    }

    /// Sign `msg` under `ctx` using caller-supplied randomness (non-deterministic signing).
    pub fn sign(
        &self,
        rng: &mut impl CryptoRngCore,
        msg: &[u8],
        ctx: &[u8],
    ) -> Result<Signature> {
        let mp = get_message(msg, ctx)?;
        let mu: B64 = H256::new().absorb(&self.tr).absorb(&mp).squeeze64();
        let mut rnd = [0u8; 32];
        rng.fill_bytes(&mut rnd);
        self.sign_internal(&mu, &rnd)
    }

    /// Sign deterministically (`rnd = 0`); used by the concrete end-to-end test scenarios in
    /// spec §8, where byte-identical output is required across repeated calls.
    pub fn sign_deterministic(&self, msg: &[u8], ctx: &[u8]) -> Result<Signature> {
        let mp = get_message(msg, ctx)?;
        let mu: B64 = H256::new().absorb(&self.tr).absorb(&mp).squeeze64();
        self.sign_internal(&mu, &[0u8; 32])
    }

    /// Algorithm 24 `skEncode`.
    pub fn encode(&self) -> Vec<u8> {
        let p = &self.params;
        let mut out = Vec::with_capacity(p.sk_bytes());
        out.extend_from_slice(&self.rho);
        out.extend_from_slice(&self.k_prime);
        out.extend_from_slice(&self.tr);
        out.extend(pack_eta(&self.s1, p.eta, p.eta_bits));
        out.extend(pack_eta(&self.s2, p.eta, p.eta_bits));
        out.extend(pack_t0(&self.t0));
        out
    }

    /// Algorithm 25 `skDecode`.
    pub fn decode(params: ParameterSet, bytes: &[u8]) -> Result<Self> {
        let p = &params;
        if bytes.len() != p.sk_bytes() {
            return Err(Error::InvalidInput(format!(
                "signing key must be {} bytes, got {}",
                p.sk_bytes(),
                bytes.len()
            )));
        }
        let mut pos = 0usize;
        let mut take = |n: usize| {
            let s = &bytes[pos..pos + n];
            pos += n;
            s
        };
        let rho: B32 = take(32).try_into().unwrap();
        let k_prime: B32 = take(32).try_into().unwrap();
        let tr: B64 = take(64).try_into().unwrap();
        let eta_bytes = p.eta_bits as usize * crate::param::N / 8;
        let s1 = unpack_eta(take(eta_bytes * p.l), p.l, p.eta, p.eta_bits);
        let s2 = unpack_eta(take(eta_bytes * p.k), p.k, p.eta, p.eta_bits);
        let t0 = unpack_t0(take(13 * crate::param::N / 8 * p.k), p.k);

        Ok(SigningKey {
            params,
            rho,
            k_prime,
            tr,
            s1,
            s2,
            t0,
        })
    }
}

impl VerificationKey {
    /// Algorithm 22 `pkEncode`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.params.pk_bytes());
        out.extend_from_slice(&self.rho);
        out.extend(pack_t1(&self.t1));
        out
    }

    /// Algorithm 23 `pkDecode`.
    pub fn decode(params: ParameterSet, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != params.pk_bytes() {
            return Err(Error::InvalidInput(format!(
                "public key must be {} bytes, got {}",
                params.pk_bytes(),
                bytes.len()
            )));
        }
        let rho: B32 = bytes[..32].try_into().unwrap();
        let t1 = unpack_t1(&bytes[32..], params.k);
        Ok(VerificationKey { params, rho, t1 })
    }

    /// Algorithm 8 `ML-DSA.Verify_internal`, generalized to accept a precomputed μ.
    pub fn verify_internal(&self, mu: &B64, sig: &Signature) -> bool {
        let p = &self.params;
        let gamma1 = p.gamma1();
        let beta = p.beta();

        if sig.z.infinity_norm() >= gamma1 - beta {
            return false;
        }
        if sig.h.hamming_weight() > p.omega {
            return false;
        }

        let a_hat = expand_a(&self.rho, p.k, p.l);
        let t1_shifted: Vec<_> = self.t1.0.iter().map(|poly| poly.shift_left_d()).collect();
        let t1_hat = PolynomialVector(t1_shifted).ntt();

        let c = sample_in_ball(&sig.c_tilde, p.tau);
        let c_hat = c.ntt();

        let z_hat = sig.z.ntt();
        let az_hat = a_hat.mul_vec(&z_hat);
        let ct1_hat = t1_hat.scale_by(&c_hat);

        let wp_approx = az_hat.sub(&ct1_hat).ntt_inverse();
        let w1p = sig.h.use_hint(&wp_approx, p.gamma2);

        let cp_tilde = H256::new()
            .absorb(mu)
            .absorb(&pack_w1(&w1p, p.w1_bits))
            .squeeze(p.c_tilde_bytes);

        sig.c_tilde == cp_tilde
    }

    /// Verify `sig` over `msg`/`ctx` under the standard (non-threshold) entry point.
    pub fn verify(&self, msg: &[u8], ctx: &[u8], sig: &Signature) -> bool {
        let Ok(mp) = get_message(msg, ctx) else {
            return false;
        };
        let tr: B64 = H256::new().absorb(&self.encode()).squeeze64();
        let mu: B64 = H256::new().absorb(&tr).absorb(&mp).squeeze64();
        self.verify_internal(&mu, sig)
    }
}

impl Signature {
    /// The signature coder: `c_tilde || packZ(z) || hint`.
    pub fn encode(&self, params: &ParameterSet) -> Vec<u8> {
        let mut out = Vec::with_capacity(params.sig_bytes());
        out.extend_from_slice(&self.c_tilde);
        out.extend(pack_z(&self.z, params.gamma1(), params.z_bits()));
        out.extend(pack_hint(&self.h, params.omega));
        out
    }

    pub fn decode(params: &ParameterSet, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != params.sig_bytes() {
            return Err(Error::InvalidInput(format!(
                "signature must be {} bytes, got {}",
                params.sig_bytes(),
                bytes.len()
            )));
        }
        let mut pos = 0usize;
        let c_tilde = bytes[pos..pos + params.c_tilde_bytes].to_vec();
        pos += params.c_tilde_bytes;
        let z_bytes_per = params.z_bits() as usize * crate::param::N / 8;
        let z = unpack_z(
            &bytes[pos..pos + z_bytes_per * params.l],
            params.l,
            params.gamma1(),
            params.z_bits(),
        );
        pos += z_bytes_per * params.l;
        let h = unpack_hint(&bytes[pos..], params.k, params.omega)?;
        Ok(Signature { c_tilde, z, h })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::param::SecurityLevel;

    #[test]
    fn verify_roundtrip_all_levels() {
        for level in [SecurityLevel::MlDsa44, SecurityLevel::MlDsa65, SecurityLevel::MlDsa87] {
            let params = ParameterSet::new(level);
            let xi = [7u8; 32];
            let (vk, sk) = SigningKey::key_gen_internal(params, &xi);
            let sig = sk.sign_deterministic(b"hello threshold world", &[]).unwrap();
            assert!(vk.verify(b"hello threshold world", &[], &sig));
            assert_eq!(sig.encode(&params).len(), params.sig_bytes());
        }
    }

    #[test]
    fn verify_fails_on_wrong_message() {
        let params = ParameterSet::new(SecurityLevel::MlDsa44);
        let xi = [1u8; 32];
        let (vk, sk) = SigningKey::key_gen_internal(params, &xi);
        let sig = sk.sign_deterministic(b"message a", &[]).unwrap();
        assert!(!vk.verify(b"message b", &[], &sig));
    }

    #[test]
    fn context_binds_signature() {
        let params = ParameterSet::new(SecurityLevel::MlDsa44);
        let xi = [9u8; 32];
        let (vk, sk) = SigningKey::key_gen_internal(params, &xi);
        let sig = sk.sign_deterministic(b"ctxmsg", &[0xDE, 0xAD]).unwrap();
        assert!(vk.verify(b"ctxmsg", &[0xDE, 0xAD], &sig));
        assert!(!vk.verify(b"ctxmsg", &[], &sig));
        assert!(!vk.verify(b"ctxmsg", &[0x00, 0x00], &sig));
    }

    #[test]
    fn key_gen_is_deterministic_in_seed() {
        let params = ParameterSet::new(SecurityLevel::MlDsa44);
        let xi = [1u8; 32];
        let (vk1, sk1) = SigningKey::key_gen_internal(params, &xi);
        let (vk2, sk2) = SigningKey::key_gen_internal(params, &xi);
        assert_eq!(vk1.encode(), vk2.encode());
        assert_eq!(sk1.encode(), sk2.encode());
        assert_eq!(vk1.encode().len(), 1312);
        assert_eq!(sk1.encode().len(), 2560);
    }

    #[test]
    fn signing_does_not_mutate_the_signing_key() {
        let params = ParameterSet::new(SecurityLevel::MlDsa44);
        let xi = [5u8; 32];
        let (_, sk) = SigningKey::key_gen_internal(params, &xi);
        let before = sk.encode();
        let _ = sk.sign_deterministic(b"first", &[]).unwrap();
        let _ = sk.sign_deterministic(b"second", &[]).unwrap();
        assert_eq!(sk.encode(), before);
    }
}

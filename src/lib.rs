#![doc = include_str!("../README.md")]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo.svg",
    html_favicon_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo.svg"
)]
#![warn(clippy::pedantic)]
#![allow(non_snake_case)] // Allow notation matching FIPS 204
#![allow(clippy::clone_on_copy)]

//! Threshold post-quantum digital signatures, bit-identical on the verifier side to FIPS 204
//! ML-DSA (CRYSTALS-Dilithium). A set of N parties jointly hold a signing key such that any
//! T of them (2 ≤ T ≤ N ≤ 6) can cooperatively produce a signature that an unmodified ML-DSA
//! verifier accepts without any knowledge of the threshold structure.
//!
//! [`SigningKey`]/[`VerificationKey`] are the baseline, non-threshold FIPS 204 scheme.
//! [`threshold`] builds the (T,N) protocol — trusted-dealer keygen, three-round signing, and
//! distributed key generation — on top of the same ring primitives.

mod algebra;
mod crypto;
mod dsa;
mod encode;
mod error;
mod hint;
mod param;
mod sampling;
pub mod threshold;
mod util;

pub use crate::dsa::{get_message, Signature, SigningKey, VerificationKey};
pub use crate::error::{Error, Result};
pub use crate::param::{ParameterSet, SecurityLevel};

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn key_generation_and_sign_verify_for_every_level() {
        for level in [SecurityLevel::MlDsa44, SecurityLevel::MlDsa65, SecurityLevel::MlDsa87] {
            let params = ParameterSet::new(level);
            let mut rng = OsRng;
            let mut xi = [0u8; 32];
            rand_core::RngCore::fill_bytes(&mut rng, &mut xi);

            let (vk, sk) = SigningKey::key_gen_internal(params, &xi);
            let sig = sk.sign(&mut rng, b"integration", &[]).unwrap();
            assert!(vk.verify(b"integration", &[], &sig));

            let pk_bytes = vk.encode();
            let sk_bytes = sk.encode();
            let sig_bytes = sig.encode(&params);
            assert_eq!(pk_bytes.len(), params.pk_bytes());
            assert_eq!(sk_bytes.len(), params.sk_bytes());
            assert_eq!(sig_bytes.len(), params.sig_bytes());

            let vk2 = VerificationKey::decode(params, &pk_bytes).unwrap();
            let sig2 = Signature::decode(&params, &sig_bytes).unwrap();
            assert!(vk2.verify(b"integration", &[], &sig2));
        }
    }
}

//! Ring arithmetic over `R_q = Z_q[x]/(x^256+1)`: the NTT, modular reduction, norm checks,
//! and the `Decompose`/`Power2Round` family (spec §4.1, §4.3).
//!
//! The teacher expresses all of this generically over a `BaseField` type and a
//! `hybrid_array`-sized `K`; here the modulus is the single fixed ML-DSA prime, so the
//! field operations are plain `i64` arithmetic, and vectors are runtime-length `Vec`s (see
//! `param.rs` for why). The trait names (`AlgebraExt`, `Decompose`) and method names
//! (`mod_plus_minus`, `infinity_norm`, `power2round`, `high_bits`, `low_bits`) are kept
//! unchanged from the teacher.

use std::sync::OnceLock;

use zeroize::Zeroize;

use crate::param::{D, N, NTT_INV_256, Q, ROOT_OF_UNITY};

/// Reduce `a` to the normal-form representative in `[0, Q)`.
pub fn reduce(a: i64) -> i64 {
    a.rem_euclid(Q)
}

/// Reduce `a` to the centered representative in `(-Q/2, Q/2]`.
pub fn smod(a: i64) -> i64 {
    let r = reduce(a);
    if r > Q / 2 {
        r - Q
    } else {
        r
    }
}

fn pow_mod(base: i64, mut exp: u32, modulus: i64) -> i64 {
    let mut acc = 1i64;
    let mut base = reduce(base);
    while exp > 0 {
        if exp & 1 == 1 {
            acc = (acc * base).rem_euclid(modulus);
        }
        base = (base * base).rem_euclid(modulus);
        exp >>= 1;
    }
    acc
}

fn brv8(mut x: u8) -> u8 {
    let mut r = 0u8;
    for _ in 0..8 {
        r = (r << 1) | (x & 1);
        x >>= 1;
    }
    r
}

/// `zetas[k] = ROOT_OF_UNITY^{brv8(k)} mod Q` for `k` in `1..256`; `zetas[0]` is unused.
fn zetas() -> &'static [i64; 256] {
    static ZETAS: OnceLock<[i64; 256]> = OnceLock::new();
    ZETAS.get_or_init(|| {
        let mut z = [0i64; 256];
        for (k, slot) in z.iter_mut().enumerate() {
            *slot = pow_mod(ROOT_OF_UNITY, brv8(k as u8) as u32, Q);
        }
        z
    })
}

/// A polynomial in the normal (non-NTT) representation: 256 coefficients mod `Q`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Zeroize)]
pub struct Polynomial(pub [i64; N]);

impl Default for Polynomial {
    fn default() -> Self {
        Polynomial([0; N])
    }
}

impl Polynomial {
    pub fn from_coeffs(coeffs: [i64; N]) -> Self {
        Polynomial(coeffs.map(reduce))
    }

    pub fn add(&self, other: &Self) -> Self {
        let mut out = Polynomial::default();
        for i in 0..N {
            out.0[i] = reduce(self.0[i] + other.0[i]);
        }
        out
    }

    pub fn sub(&self, other: &Self) -> Self {
        let mut out = Polynomial::default();
        for i in 0..N {
            out.0[i] = reduce(self.0[i] - other.0[i]);
        }
        out
    }

    pub fn scale(&self, c: i64) -> Self {
        let mut out = Polynomial::default();
        for i in 0..N {
            out.0[i] = reduce(self.0[i] * c);
        }
        out
    }

    /// Left-shift every coefficient by `D` bits (`polyShiftl`). Operates on a fresh copy so
    /// the caller's `t1` is never mutated in place (Design Notes: never alias a caller's
    /// polynomial).
    pub fn shift_left_d(&self) -> Self {
        self.scale(1i64 << D)
    }

    pub fn ntt(&self) -> NttPolynomial {
        let mut w = self.0;
        let z = zetas();
        let mut k = 0usize;
        let mut len = 128usize;
        while len >= 1 {
            let mut start = 0usize;
            while start < N {
                k += 1;
                let zeta = z[k];
                for j in start..start + len {
                    let t = reduce(zeta * w[j + len]);
                    w[j + len] = reduce(w[j] - t);
                    w[j] = reduce(w[j] + t);
                }
                start += 2 * len;
            }
            len /= 2;
        }
        NttPolynomial(w)
    }

    /// `True` iff any centered coefficient has magnitude `>= bound`.
    pub fn check_norm(&self, bound: i64) -> bool {
        self.0.iter().any(|&c| smod(c).abs() >= bound)
    }
}

/// A polynomial in the NTT domain. Kept as a distinct type so that ring multiplication
/// (only valid between two NTT-domain operands) cannot be applied to normal-form data by
/// accident.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Zeroize)]
pub struct NttPolynomial(pub [i64; N]);

impl Default for NttPolynomial {
    fn default() -> Self {
        NttPolynomial([0; N])
    }
}

impl NttPolynomial {
    pub fn add(&self, other: &Self) -> Self {
        let mut out = NttPolynomial::default();
        for i in 0..N {
            out.0[i] = reduce(self.0[i] + other.0[i]);
        }
        out
    }

    pub fn sub(&self, other: &Self) -> Self {
        let mut out = NttPolynomial::default();
        for i in 0..N {
            out.0[i] = reduce(self.0[i] - other.0[i]);
        }
        out
    }

    /// `MultiplyNTTs`: elementwise product, valid only between two NTT-domain operands.
    pub fn mul(&self, other: &Self) -> Self {
        let mut out = NttPolynomial::default();
        for i in 0..N {
            out.0[i] = reduce(self.0[i] * other.0[i]);
        }
        out
    }

    pub fn ntt_inverse(&self) -> Polynomial {
        let mut w = self.0;
        let z = zetas();
        let mut k = 256usize;
        let mut len = 1usize;
        while len < N {
            let mut start = 0usize;
            while start < N {
                k -= 1;
                let zeta = reduce(-z[k]);
                for j in start..start + len {
                    let t = w[j];
                    w[j] = reduce(t + w[j + len]);
                    w[j + len] = reduce(t - w[j + len]);
                    w[j + len] = reduce(zeta * w[j + len]);
                }
                start += 2 * len;
            }
            len *= 2;
        }
        for c in w.iter_mut() {
            *c = reduce(*c * NTT_INV_256);
        }
        Polynomial(w)
    }
}

/// A length-`K` (or `L`) vector of normal-form polynomials.
#[derive(Clone, Debug, Default, PartialEq, Eq, Zeroize)]
pub struct PolynomialVector(pub Vec<Polynomial>);

impl PolynomialVector {
    pub fn zero(len: usize) -> Self {
        PolynomialVector(vec![Polynomial::default(); len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn add(&self, other: &Self) -> Self {
        PolynomialVector(self.0.iter().zip(&other.0).map(|(a, b)| a.add(b)).collect())
    }

    pub fn sub(&self, other: &Self) -> Self {
        PolynomialVector(self.0.iter().zip(&other.0).map(|(a, b)| a.sub(b)).collect())
    }

    pub fn ntt(&self) -> NttVector {
        NttVector(self.0.iter().map(Polynomial::ntt).collect())
    }

    pub fn check_norm(&self, bound: i64) -> bool {
        self.0.iter().any(|p| p.check_norm(bound))
    }
}

/// A length-`K` (or `L`) vector of NTT-domain polynomials.
#[derive(Clone, Debug, Default, PartialEq, Eq, Zeroize)]
pub struct NttVector(pub Vec<NttPolynomial>);

impl NttVector {
    pub fn zero(len: usize) -> Self {
        NttVector(vec![NttPolynomial::default(); len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn add(&self, other: &Self) -> Self {
        NttVector(self.0.iter().zip(&other.0).map(|(a, b)| a.add(b)).collect())
    }

    pub fn sub(&self, other: &Self) -> Self {
        NttVector(self.0.iter().zip(&other.0).map(|(a, b)| a.sub(b)).collect())
    }

    pub fn ntt_inverse(&self) -> PolynomialVector {
        PolynomialVector(self.0.iter().map(NttPolynomial::ntt_inverse).collect())
    }

    /// Scale every polynomial by a single NTT-domain challenge `c`.
    pub fn scale_by(&self, c: &NttPolynomial) -> Self {
        NttVector(self.0.iter().map(|p| p.mul(c)).collect())
    }
}

/// A `K x L` matrix of NTT-domain polynomials.
#[derive(Clone, Debug, Default)]
pub struct NttMatrix {
    pub rows: Vec<Vec<NttPolynomial>>,
}

impl NttMatrix {
    pub fn k(&self) -> usize {
        self.rows.len()
    }

    pub fn l(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    /// `A * v`, where `v` is a length-`L` NTT vector and the result is a length-`K` NTT
    /// vector.
    pub fn mul_vec(&self, v: &NttVector) -> NttVector {
        let mut out = Vec::with_capacity(self.k());
        for row in &self.rows {
            let mut acc = NttPolynomial::default();
            for (a, vl) in row.iter().zip(&v.0) {
                acc = acc.add(&a.mul(vl));
            }
            out.push(acc);
        }
        NttVector(out)
    }
}

/// `mod+-` / `Decompose` / `Power2Round`, implemented for a single field element. The
/// modulus (`2*gamma2` or `2^D`) is a runtime argument rather than a `typenum` generic.
pub trait AlgebraExt {
    fn mod_plus_minus(&self, m: i64) -> Self;
    fn infinity_norm(&self) -> i64;
    fn power2round(&self) -> (Self, Self)
    where
        Self: Sized;
    fn high_bits(&self, gamma2: i64) -> Self
    where
        Self: Sized;
    fn low_bits(&self, gamma2: i64) -> Self
    where
        Self: Sized;
}

/// Algorithm 36 `Decompose`.
pub fn decompose(r: i64, gamma2: i64) -> (i64, i64) {
    let r_plus = reduce(r);
    let two_gamma2 = 2 * gamma2;
    let r0 = mod_plus_minus_scalar(r_plus, two_gamma2);
    if reduce(r_plus - r0) == Q - 1 {
        (0, reduce(r0 - 1))
    } else {
        let r1 = reduce(r_plus - r0) / two_gamma2;
        (r1, r0)
    }
}

fn mod_plus_minus_scalar(a: i64, m: i64) -> i64 {
    let r = a.rem_euclid(m);
    if r <= m / 2 {
        r
    } else {
        r - m
    }
}

impl AlgebraExt for i64 {
    fn mod_plus_minus(&self, m: i64) -> Self {
        mod_plus_minus_scalar(*self, m)
    }

    fn infinity_norm(&self) -> i64 {
        let r = reduce(*self);
        if r <= Q / 2 {
            r
        } else {
            Q - r
        }
    }

    fn power2round(&self) -> (Self, Self) {
        let pow2d = 1i64 << D;
        let r_plus = reduce(*self);
        let r0 = mod_plus_minus_scalar(r_plus, pow2d);
        let r1 = (r_plus - r0) >> D;
        (r1, r0)
    }

    fn high_bits(&self, gamma2: i64) -> Self {
        decompose(*self, gamma2).0
    }

    fn low_bits(&self, gamma2: i64) -> Self {
        decompose(*self, gamma2).1
    }
}

impl AlgebraExt for Polynomial {
    fn mod_plus_minus(&self, m: i64) -> Self {
        let mut out = Polynomial::default();
        for i in 0..N {
            out.0[i] = self.0[i].mod_plus_minus(m);
        }
        out
    }

    fn infinity_norm(&self) -> i64 {
        self.0.iter().map(|c| c.infinity_norm()).max().unwrap_or(0)
    }

    fn power2round(&self) -> (Self, Self) {
        let mut r1 = Polynomial::default();
        let mut r0 = Polynomial::default();
        for i in 0..N {
            let (hi, lo) = self.0[i].power2round();
            r1.0[i] = hi;
            r0.0[i] = lo;
        }
        (r1, r0)
    }

    fn high_bits(&self, gamma2: i64) -> Self {
        let mut out = Polynomial::default();
        for i in 0..N {
            out.0[i] = self.0[i].high_bits(gamma2);
        }
        out
    }

    fn low_bits(&self, gamma2: i64) -> Self {
        let mut out = Polynomial::default();
        for i in 0..N {
            out.0[i] = self.0[i].low_bits(gamma2);
        }
        out
    }
}

impl AlgebraExt for PolynomialVector {
    fn mod_plus_minus(&self, m: i64) -> Self {
        PolynomialVector(self.0.iter().map(|p| p.mod_plus_minus(m)).collect())
    }

    fn infinity_norm(&self) -> i64 {
        self.0.iter().map(|p| p.infinity_norm()).max().unwrap_or(0)
    }

    fn power2round(&self) -> (Self, Self) {
        let split: Vec<(Polynomial, Polynomial)> =
            self.0.iter().map(|p| p.power2round()).collect();
        (
            PolynomialVector(split.iter().map(|(hi, _)| *hi).collect()),
            PolynomialVector(split.iter().map(|(_, lo)| *lo).collect()),
        )
    }

    fn high_bits(&self, gamma2: i64) -> Self {
        PolynomialVector(self.0.iter().map(|p| p.high_bits(gamma2)).collect())
    }

    fn low_bits(&self, gamma2: i64) -> Self {
        PolynomialVector(self.0.iter().map(|p| p.low_bits(gamma2)).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ntt_round_trip() {
        let mut coeffs = [0i64; N];
        for (i, c) in coeffs.iter_mut().enumerate() {
            *c = (i as i64 * 37 + 5) % Q;
        }
        let p = Polynomial::from_coeffs(coeffs);
        let back = p.ntt().ntt_inverse();
        assert_eq!(p, back);
    }

    #[test]
    fn ntt_multiplication_matches_schoolbook_for_monomials() {
        // x * x == x^2: exercises the NTT pointwise product path end to end.
        let mut a = Polynomial::default();
        a.0[1] = 1;
        let mut b = Polynomial::default();
        b.0[1] = 1;
        let prod = a.ntt().mul(&b.ntt()).ntt_inverse();
        let mut expected = Polynomial::default();
        expected.0[2] = 1;
        assert_eq!(prod, expected);
    }

    #[test]
    fn decompose_reconstructs_r() {
        let gamma2 = (Q - 1) / 88;
        for r in [0i64, 1, gamma2, gamma2 + 1, Q - 1, Q / 2] {
            let (r1, r0) = decompose(r, gamma2);
            let reconstructed = reduce(r1 * 2 * gamma2 + r0);
            assert_eq!(reconstructed, reduce(r));
        }
    }

    #[test]
    fn power2round_reconstructs_r() {
        for r in [0i64, 1, 4096, Q - 1, 12345] {
            let (r1, r0) = r.power2round();
            let reconstructed = reduce(r1 * (1 << D) + r0);
            assert_eq!(reconstructed, reduce(r));
        }
    }
}

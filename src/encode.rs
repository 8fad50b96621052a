//! Bit-packed coders (spec §4.4): `SimpleBitPack`/`BitPack` at the runtime widths this
//! crate actually uses (d ∈ {3,4,6,10,13,18,20}), plus the hint coder and the
//! public/secret/signature wire layouts.
//!
//! The teacher encodes every width as a `typenum`-indexed `EncodingSize` associated type so
//! that e.g. `EncodedPolynomial<U10>` is a compile-time-sized array. Since `d` here is a
//! runtime field of `ParameterSet` (the same parameter struct has to serve three security
//! levels without three separate monomorphizations — see `param.rs`), the packers take `d`
//! as a plain argument and return `Vec<u8>`. Every width this crate uses divides evenly into
//! bytes per 256-coefficient polynomial (`256*d/8`), so, unlike the teacher's generic
//! `VectorEncodingSize::flatten`, concatenating each polynomial's bytes is sufficient — there
//! is never a fractional-byte carry across polynomial boundaries.

use crate::algebra::{reduce, Polynomial, PolynomialVector};
use crate::error::Error;
use crate::hint::Hint;
use crate::param::N;

fn bytes_per_poly(d: u32) -> usize {
    (d as usize) * N / 8
}

/// Algorithm 16 `SimpleBitPack`: pack 256 unsigned values, each `< 2^d`, at `d` bits/coeff.
pub fn simple_bit_pack_poly(vals: &Polynomial, d: u32) -> Vec<u8> {
    let mut bytes = vec![0u8; bytes_per_poly(d)];
    let mut acc: u128 = 0;
    let mut acc_bits = 0u32;
    let mut out_pos = 0usize;
    for &v in vals.0.iter() {
        acc |= (v as u128) << acc_bits;
        acc_bits += d;
        while acc_bits >= 8 {
            bytes[out_pos] = (acc & 0xff) as u8;
            out_pos += 1;
            acc >>= 8;
            acc_bits -= 8;
        }
    }
    if acc_bits > 0 {
        bytes[out_pos] = (acc & 0xff) as u8;
    }
    bytes
}

/// Algorithm 18 `SimpleBitUnpack`.
pub fn simple_bit_unpack_poly(bytes: &[u8], d: u32) -> Polynomial {
    let mask: u128 = (1u128 << d) - 1;
    let mut out = Polynomial::default();
    let mut acc: u128 = 0;
    let mut acc_bits = 0u32;
    let mut in_pos = 0usize;
    for slot in out.0.iter_mut() {
        while acc_bits < d {
            acc |= (bytes[in_pos] as u128) << acc_bits;
            in_pos += 1;
            acc_bits += 8;
        }
        *slot = reduce((acc & mask) as i64);
        acc >>= d;
        acc_bits -= d;
    }
    out
}

/// Algorithm 17 `BitPack`: pack a centered value `w` with `-a <= w <= b` as `b - w`, at
/// `bitlen(a+b)` bits/coeff.
pub fn bit_pack_poly(vals: &Polynomial, a: i64, b: i64) -> Vec<u8> {
    let d = 64 - (a + b).leading_zeros();
    let shifted = Polynomial::from_coeffs(vals.0.map(|w| reduce(b - w)));
    simple_bit_pack_poly(&shifted, d)
}

/// Algorithm 19 `BitUnpack`.
pub fn bit_unpack_poly(bytes: &[u8], a: i64, b: i64) -> Polynomial {
    let d = 64 - (a + b).leading_zeros();
    let decoded = simple_bit_unpack_poly(bytes, d);
    Polynomial::from_coeffs(decoded.0.map(|z| reduce(b - z)))
}

fn pack_vec(v: &PolynomialVector, pack_one: impl Fn(&Polynomial) -> Vec<u8>) -> Vec<u8> {
    v.0.iter().flat_map(|p| pack_one(p)).collect()
}

fn unpack_vec(
    bytes: &[u8],
    len: usize,
    bytes_per: usize,
    unpack_one: impl Fn(&[u8]) -> Polynomial,
) -> PolynomialVector {
    PolynomialVector((0..len).map(|i| unpack_one(&bytes[i * bytes_per..(i + 1) * bytes_per])).collect())
}

/// `T1`: unsigned, 10 bits/coeff, `t1` coefficients in `[0, 2^10)`.
pub fn pack_t1(v: &PolynomialVector) -> Vec<u8> {
    pack_vec(v, |p| simple_bit_pack_poly(p, 10))
}

pub fn unpack_t1(bytes: &[u8], k: usize) -> PolynomialVector {
    unpack_vec(bytes, k, bytes_per_poly(10), |b| simple_bit_unpack_poly(b, 10))
}

/// `T0`: centered around `2^(D-1)`, 13 bits/coeff.
pub fn pack_t0(v: &PolynomialVector) -> Vec<u8> {
    let pow2d_min1 = 1i64 << 12;
    pack_vec(v, |p| bit_pack_poly(p, pow2d_min1 - 1, pow2d_min1))
}

pub fn unpack_t0(bytes: &[u8], k: usize) -> PolynomialVector {
    let pow2d_min1 = 1i64 << 12;
    unpack_vec(bytes, k, bytes_per_poly(13), |b| bit_unpack_poly(b, pow2d_min1 - 1, pow2d_min1))
}

/// `ETA`: coefficients in `[-eta, eta]`, 3 or 4 bits/coeff.
pub fn pack_eta(v: &PolynomialVector, eta: i64, _eta_bits: u32) -> Vec<u8> {
    pack_vec(v, |p| bit_pack_poly(p, eta, eta))
}

pub fn unpack_eta(bytes: &[u8], len: usize, eta: i64, eta_bits: u32) -> PolynomialVector {
    unpack_vec(bytes, len, bytes_per_poly(eta_bits), |b| bit_unpack_poly(b, eta, eta))
}

/// `Z`: coefficients in `[-(gamma1-1), gamma1]`, 18 or 20 bits/coeff.
pub fn pack_z(v: &PolynomialVector, gamma1: i64, _z_bits: u32) -> Vec<u8> {
    pack_vec(v, |p| bit_pack_poly(p, gamma1 - 1, gamma1))
}

pub fn unpack_z(bytes: &[u8], len: usize, gamma1: i64, z_bits: u32) -> PolynomialVector {
    unpack_vec(bytes, len, bytes_per_poly(z_bits), |b| bit_unpack_poly(b, gamma1 - 1, gamma1))
}

/// `W1`: unsigned HighBits output, 6 or 4 bits/coeff.
pub fn pack_w1(v: &PolynomialVector, w1_bits: u32) -> Vec<u8> {
    pack_vec(v, |p| simple_bit_pack_poly(p, w1_bits))
}

/// Hint coder: `K` rows of 0/1 coefficients packed into `omega + K` bytes (spec §4.4/§6).
pub fn pack_hint(hint: &Hint, omega: usize) -> Vec<u8> {
    let k = hint.k();
    let mut out = vec![0u8; omega + k];
    let mut cursor = 0usize;
    for (row_idx, row) in hint.0.iter().enumerate() {
        for (i, &bit) in row.iter().enumerate() {
            if bit {
                out[cursor] = i as u8;
                cursor += 1;
            }
        }
        out[omega + row_idx] = cursor as u8;
    }
    out
}

/// Decode a hint, rejecting any malformed encoding per spec §4.4.
pub fn unpack_hint(bytes: &[u8], k: usize, omega: usize) -> Result<Hint, Error> {
    if bytes.len() != omega + k {
        return Err(Error::InvalidInput(format!(
            "hint must be {} bytes, got {}",
            omega + k,
            bytes.len()
        )));
    }
    let mut rows = Vec::with_capacity(k);
    let mut prev_cursor = 0usize;
    for row_idx in 0..k {
        let cursor = bytes[omega + row_idx] as usize;
        if cursor < prev_cursor || cursor > omega {
            return Err(Error::InvalidInput(
                "hint cursor decreased or exceeded omega".into(),
            ));
        }
        let mut row = vec![false; N];
        let mut prev_index: i32 = -1;
        for &idx in &bytes[prev_cursor..cursor] {
            if (idx as i32) <= prev_index {
                return Err(Error::InvalidInput(
                    "hint indices within a row must strictly increase".into(),
                ));
            }
            prev_index = idx as i32;
            row[idx as usize] = true;
        }
        rows.push(row);
        prev_cursor = cursor;
    }
    if bytes[prev_cursor..omega].iter().any(|&b| b != 0) {
        return Err(Error::InvalidInput(
            "hint padding after last cursor must be zero".into(),
        ));
    }
    Ok(Hint(rows))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::param::{ParameterSet, SecurityLevel};

    #[test]
    fn simple_bit_pack_round_trip() {
        for d in [3u32, 4, 6, 10, 13, 18, 20] {
            let mut p = Polynomial::default();
            for (i, c) in p.0.iter_mut().enumerate() {
                *c = (i as i64 * 7 + 1) % (1i64 << d);
            }
            let bytes = simple_bit_pack_poly(&p, d);
            assert_eq!(bytes.len(), bytes_per_poly(d));
            let back = simple_bit_unpack_poly(&bytes, d);
            assert_eq!(p, back);
        }
    }

    #[test]
    fn t1_round_trip() {
        let params = ParameterSet::new(SecurityLevel::MlDsa44);
        let v = PolynomialVector::zero(params.k);
        let packed = pack_t1(&v);
        assert_eq!(packed.len(), 320 * params.k);
        let back = unpack_t1(&packed, params.k);
        assert_eq!(v, back);
    }

    #[test]
    fn eta_round_trip_centered_values() {
        let eta = 2i64;
        let mut p = Polynomial::default();
        for (i, c) in p.0.iter_mut().enumerate() {
            *c = reduce((i as i64 % 5) - 2);
        }
        let packed = pack_eta(&PolynomialVector(vec![p]), eta, 3);
        let back = unpack_eta(&packed, 1, eta, 3);
        assert_eq!(back.0[0], p);
    }

    #[test]
    fn hint_coder_round_trip() {
        let mut rows = vec![vec![false; N]; 4];
        rows[0][3] = true;
        rows[0][200] = true;
        rows[2][0] = true;
        let hint = Hint(rows);
        let packed = pack_hint(&hint, 80);
        let back = unpack_hint(&packed, 4, 80).unwrap();
        assert_eq!(hint, back);
    }

    #[test]
    fn hint_coder_rejects_decreasing_cursor() {
        let mut bytes = vec![0u8; 84];
        bytes[80] = 5;
        bytes[81] = 2;
        assert!(unpack_hint(&bytes, 4, 80).is_err());
    }
}

//! Evaluation domains and radix-2 transforms
//!
//! A [`Domain`] is the multiplicative subgroup `H = {1, ω, …, ω^{N-1}}` of an
//! FFT-friendly field together with its vanishing polynomial
//! `Z_H(X) = X^N − zh_c` (`zh_c = 1` for a plain subgroup). This module offers:
//!
//! - validation (`ω^N = 1`, `ω^{N/p} ≠ 1` for every prime `p | N`, `zh_c ≠ 0`),
//! - barycentric evaluation of a Lagrange-basis vector at a point outside `H`,
//! - in-place NTT / inverse NTT on power-of-two blocks dividing `N`.
//!
//! Checked `_r` variants return [`DomainError`]; the unsuffixed wrappers panic.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::{FftField, Field, One, Zero};

/// Evaluation domain with vanishing polynomial `Z_H(X) = X^N - zh_c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain<F: FftField = crate::F> {
    /// Domain size `N` (power of two).
    pub n: usize,
    /// Generator `ω` of `H`.
    pub omega: F,
    /// The constant `c` in `Z_H(X) = X^N − c`.
    pub zh_c: F,
}

/// Errors produced by domain checks / transforms.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("domain size must be a positive power of two (got {0})")]
    BadSize(usize),
    #[error("field has no root of unity of order {0}")]
    NoRootOfUnity(usize),
    #[error("zh_c must be non-zero")]
    ZhZero,
    #[error("omega^N != 1")]
    OmegaNPowNotOne,
    #[error("omega is not primitive: omega^(N/{0}) == 1")]
    OmegaNotPrimitive(usize),
    #[error("length must be positive power-of-two and divide N (len={len}, N={n})")]
    BadLen { len: usize, n: usize },
    #[error("evaluation vector length must be exactly N (got {got}, N={n})")]
    BadEvalLen { got: usize, n: usize },
}

impl<F: FftField> Domain<F> {
    /// Subgroup of size `n` generated by the field's canonical root of unity.
    pub fn new_r(n: usize) -> Result<Self, DomainError> {
        if n == 0 || !n.is_power_of_two() {
            return Err(DomainError::BadSize(n));
        }
        let omega = F::get_root_of_unity(n as u64).ok_or(DomainError::NoRootOfUnity(n))?;
        Self::new_with_c_r(n, omega, F::one())
    }

    /// Panicking wrapper around [`Domain::new_r`].
    pub fn new(n: usize) -> Self {
        Self::new_r(n).expect("invalid domain")
    }

    /// Domain with explicit `ω` and `zh_c`, validated.
    pub fn new_with_c_r(n: usize, omega: F, zh_c: F) -> Result<Self, DomainError> {
        let d = Self { n, omega, zh_c };
        validate_domain_r(&d)?;
        Ok(d)
    }

    /// `Z_H(z) = z^N − zh_c`.
    #[inline]
    pub fn vanishing_at(&self, z: F) -> F {
        pow_u64(z, self.n as u64) - self.zh_c
    }

    #[inline]
    pub fn is_in_domain(&self, z: F) -> bool {
        self.vanishing_at(z).is_zero()
    }

    /// The `i`-th domain element `ω^i`.
    #[inline]
    pub fn element(&self, i: usize) -> F {
        pow_u64(self.omega, i as u64)
    }

    /// Evaluate the polynomial whose values on `H` are `evals` at `zeta`.
    ///
    /// `f(ζ) = (ζ^N − 1)/N · Σ_i f_i·ω^i/(ζ − ω^i)`, computed as a ratio of
    /// weighted sums so the prefactor cancels. If `ζ ∈ H`, the matching value
    /// is returned directly.
    pub fn eval_barycentric_r(&self, evals: &[F], zeta: F) -> Result<F, DomainError> {
        if evals.len() != self.n {
            return Err(DomainError::BadEvalLen { got: evals.len(), n: self.n });
        }
        let w = bary_weights(self);
        let mut omega_i = F::one();
        let mut w_i = w.inv_n;
        let mut num = F::zero();
        let mut den = F::zero();
        for &f_i in evals {
            let diff = zeta - omega_i;
            let Some(denom_term) = diff.inverse() else {
                return Ok(f_i);
            };
            num += w_i * f_i * denom_term;
            den += w_i * denom_term;
            omega_i *= self.omega;
            w_i *= w.step;
        }
        Ok(num * den.inverse().unwrap_or_else(F::zero))
    }

    pub fn eval_barycentric(&self, evals: &[F], zeta: F) -> F {
        self.eval_barycentric_r(evals, zeta).expect("barycentric failed")
    }

    /// Coefficients (low→high) of the polynomial with values `evals` on `H`.
    pub fn intt_r(&self, evals: &[F]) -> Result<Vec<F>, DomainError> {
        let root = primitive_len_root_r(self, evals.len())?;
        let mut a = evals.to_vec();
        intt_in_place(&mut a, root);
        Ok(a)
    }

    pub fn intt(&self, evals: &[F]) -> Vec<F> {
        self.intt_r(evals).expect("bad INTT length")
    }

    /// Values on the size-`coeffs.len()` subgroup of the polynomial with coefficients `coeffs`.
    pub fn ntt_r(&self, coeffs: &[F]) -> Result<Vec<F>, DomainError> {
        let root = primitive_len_root_r(self, coeffs.len())?;
        let mut a = coeffs.to_vec();
        ntt_in_place(&mut a, root);
        Ok(a)
    }

    pub fn ntt(&self, coeffs: &[F]) -> Vec<F> {
        self.ntt_r(coeffs).expect("bad NTT length")
    }
}

/// Barycentric weights over a multiplicative subgroup.
#[derive(Debug, Clone)]
struct BarycentricWeights<F> {
    inv_n: F,
    step: F, // step = ω^{-(N-1)}
}

fn bary_weights<F: FftField>(d: &Domain<F>) -> BarycentricWeights<F> {
    let inv_n = F::from(d.n as u64).inverse().unwrap_or_else(F::zero);
    // ω^{N-1} then invert -> step = ω^{-(N-1)} = ω
    let omega_pow_n_minus_1 = pow_u64(d.omega, (d.n as u64).saturating_sub(1));
    let step = omega_pow_n_minus_1.inverse().unwrap_or_else(F::one);
    BarycentricWeights { inv_n, step }
}

#[inline]
pub fn pow_u64<F: Field>(mut base: F, mut exp: u64) -> F {
    let mut acc = F::one();
    while exp > 0 {
        if (exp & 1) == 1 {
            acc *= base;
        }
        base.square_in_place();
        exp >>= 1;
    }
    acc
}

// ------------------------- Hygiene / Validation -------------------------

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut p = 2usize;
    while p * p <= n {
        if n % p == 0 {
            out.push(p);
            while n % p == 0 {
                n /= p;
            }
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        out.push(n);
    }
    out
}

fn validate_domain_r<F: FftField>(d: &Domain<F>) -> Result<(), DomainError> {
    if d.n == 0 || !d.n.is_power_of_two() {
        return Err(DomainError::BadSize(d.n));
    }
    if d.zh_c.is_zero() {
        return Err(DomainError::ZhZero);
    }
    if !pow_u64(d.omega, d.n as u64).is_one() {
        return Err(DomainError::OmegaNPowNotOne);
    }
    for p in prime_factors(d.n) {
        if pow_u64(d.omega, (d.n / p) as u64).is_one() {
            return Err(DomainError::OmegaNotPrimitive(p));
        }
    }
    Ok(())
}

// ------------------------- NTT / INTT -------------------------

#[inline]
fn primitive_len_root_r<F: FftField>(d: &Domain<F>, len: usize) -> Result<F, DomainError> {
    if !(len > 0 && len.is_power_of_two() && d.n % len == 0) {
        return Err(DomainError::BadLen { len, n: d.n });
    }
    Ok(pow_u64(d.omega, (d.n / len) as u64))
}

fn ntt_in_place<F: Field>(a: &mut [F], root: F) {
    let n = a.len();
    debug_assert!(n.is_power_of_two());

    // bit-reversal
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            a.swap(i, j);
        }
    }

    // Cooley–Tukey
    let mut len = 2;
    while len <= n {
        let w_len = pow_u64(root, (n / len) as u64);
        let half = len / 2;
        for block in a.chunks_mut(len) {
            let mut w = F::one();
            for i in 0..half {
                let u = block[i];
                let v = block[i + half] * w;
                block[i] = u + v;
                block[i + half] = u - v;
                w *= w_len;
            }
        }
        len <<= 1;
    }
}

fn intt_in_place<F: Field>(a: &mut [F], root: F) {
    let Some(inv_root) = root.inverse() else {
        return;
    };
    ntt_in_place(a, inv_root);
    let inv_n = F::from(a.len() as u64).inverse().unwrap_or_else(F::zero);
    for x in a.iter_mut() {
        *x *= inv_n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::F;
    use ark_ff::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};

    fn horner(coeffs: &[F], z: F) -> F {
        coeffs.iter().rev().fold(F::zero(), |acc, c| acc * z + c)
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(Domain::<F>::new_r(12), Err(DomainError::BadSize(12))));
        assert!(Domain::<F>::new_r(16).is_ok());
    }

    #[test]
    fn rejects_non_primitive_omega() {
        let d8 = Domain::<F>::new(8);
        let sq = d8.omega * d8.omega;
        assert!(matches!(
            Domain::new_with_c_r(8, sq, F::one()),
            Err(DomainError::OmegaNPowNotOne) | Err(DomainError::OmegaNotPrimitive(_))
        ));
    }

    #[test]
    fn ntt_intt_agree_with_horner() {
        let mut rng = StdRng::from_seed([7u8; 32]);
        let d = Domain::<F>::new(16);
        let coeffs: Vec<F> = (0..16).map(|_| F::rand(&mut rng)).collect();
        let evals = d.ntt(&coeffs);
        for (i, e) in evals.iter().enumerate() {
            assert_eq!(*e, horner(&coeffs, d.element(i)));
        }
        assert_eq!(d.intt(&evals), coeffs);
    }

    #[test]
    fn sub_block_transform_uses_matching_root() {
        let d = Domain::<F>::new(16);
        let coeffs = vec![F::from(3u64), F::from(5u64), F::zero(), F::one()];
        let evals = d.ntt(&coeffs);
        let d4 = Domain::<F>::new(4);
        for (i, e) in evals.iter().enumerate() {
            assert_eq!(*e, horner(&coeffs, d4.element(i)));
        }
    }

    #[test]
    fn barycentric_matches_coefficient_evaluation() {
        let mut rng = StdRng::from_seed([9u8; 32]);
        let d = Domain::<F>::new(8);
        let coeffs: Vec<F> = (0..8).map(|_| F::rand(&mut rng)).collect();
        let evals = d.ntt(&coeffs);
        let zeta = F::rand(&mut rng);
        assert_eq!(d.eval_barycentric(&evals, zeta), horner(&coeffs, zeta));
        // On-domain points short-circuit.
        assert_eq!(d.eval_barycentric(&evals, d.element(3)), evals[3]);
    }

    #[test]
    fn vanishing_is_zero_on_domain() {
        let d = Domain::<F>::new(32);
        assert!(d.is_in_domain(d.element(5)));
        assert!(!d.is_in_domain(F::from(2u64)));
    }
}

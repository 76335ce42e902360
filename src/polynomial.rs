//! Dense polynomials over a virtually zero-padded coefficient range
//!
//! A [`Polynomial`] wraps a [`VirtualArray`]: only the island
//! `[start_index, end_index)` is backed by memory, and every other index in
//! `[0, virtual_size)` reads as zero. The same type serves both monomial
//! coefficients and Lagrange-basis row values; the interpretation belongs to
//! the caller.
//!
//! ## Ownership
//! - [`Clone`] is a deep copy (through [`VirtualArray::expanded_clone`]).
//! - [`Polynomial::share`] and [`Polynomial::shifted`] return aliasing views
//!   over the same backing memory. Writes through one alias are visible in the
//!   others; callers keep a single-writer discipline.
//!
//! ## Preconditions
//! Island containment for `+=`, `-=` and `add_scaled`, power-of-two sizes for
//! the multilinear routines, and a non-zero `start_index` for `shifted` are
//! asserted; violating them is a programming error.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::ops::{AddAssign, MulAssign, SubAssign};

use ark_ff::{FftField, Field, Zero};

use crate::domain::{pow_u64, Domain};
use crate::thread::parallel_for_chunks;
use crate::virtual_array::VirtualArray;

/// Fields with radix-2 FFT support; gates the Kate and barycentric helpers.
pub trait SupportsFft: FftField {}

impl<T: FftField> SupportsFft for T {}

/// Polynomial backed by a zero-padded [`VirtualArray`].
#[derive(Debug)]
pub struct Polynomial<F: Field> {
    coefficients: VirtualArray<F>,
}

impl<F: Field> Default for Polynomial<F> {
    fn default() -> Self {
        Self { coefficients: VirtualArray::empty() }
    }
}

impl<F: Field> Polynomial<F> {
    /// Zeroed island of `size` values starting at `start_index`.
    pub fn new(size: usize, virtual_size: usize, start_index: usize) -> Self {
        Self { coefficients: VirtualArray::zeroed(size, virtual_size, start_index) }
    }

    /// Island `[0, coefficients.len())` holding `coefficients`.
    pub fn from_coefficients(coefficients: Vec<F>, virtual_size: usize) -> Self {
        Self::from_island(coefficients, virtual_size, 0)
    }

    /// Island `[start_index, start_index + values.len())` holding `values`.
    pub fn from_island(values: Vec<F>, virtual_size: usize, start_index: usize) -> Self {
        Self { coefficients: VirtualArray::from_island(values, virtual_size, start_index) }
    }

    /// The unique polynomial of degree `< points.len()` through `(points[i], evaluations[i])`.
    ///
    /// Points must be pairwise distinct.
    pub fn from_interpolation(points: &[F], evaluations: &[F], virtual_size: usize) -> Self {
        let n = points.len();
        assert!(n > 0, "interpolation needs at least one point");
        assert_eq!(n, evaluations.len(), "points/evaluations length mismatch");

        // N(X) = Π_j (X − x_j)
        let mut numerator = vec![F::zero(); n + 1];
        numerator[0] = F::one();
        for (k, &x) in points.iter().enumerate() {
            for i in (1..=k + 1).rev() {
                numerator[i] = numerator[i - 1] - x * numerator[i];
            }
            numerator[0] = -x * numerator[0];
        }

        let mut coeffs = vec![F::zero(); n];
        let mut quotient = vec![F::zero(); n];
        for (&x_i, &y_i) in points.iter().zip(evaluations) {
            // N(X) / (X − x_i), high→low
            quotient[n - 1] = numerator[n];
            for j in (1..n).rev() {
                quotient[j - 1] = numerator[j] + x_i * quotient[j];
            }
            let denom = quotient.iter().rev().fold(F::zero(), |acc, c| acc * x_i + c);
            let Some(inv) = denom.inverse() else {
                panic!("interpolation points must be pairwise distinct");
            };
            let weight = y_i * inv;
            for (c, q) in coeffs.iter_mut().zip(&quotient) {
                *c += weight * q;
            }
        }
        Self::from_coefficients(coeffs, virtual_size)
    }

    /// Deep copy whose island is extended on the right to `target_size` values.
    pub fn copy_with_size(&self, target_size: usize) -> Self {
        assert!(
            self.size() <= target_size,
            "target size {target_size} smaller than source size {}",
            self.size()
        );
        Self { coefficients: self.coefficients.expanded_clone(target_size - self.size(), 0) }
    }

    /// Aliasing view with identical bounds (no copy).
    pub fn share(&self) -> Self {
        Self { coefficients: self.coefficients.share() }
    }

    /// Aliasing view representing `p(X)/X`: index `i` reads index `i + 1`.
    ///
    /// Requires `start_index() >= 1`.
    pub fn shifted(&self) -> Self {
        Self { coefficients: self.coefficients.shifted_view() }
    }

    /// Deep copy whose island covers the whole `[0, virtual_size)` range.
    pub fn full(&self) -> Self {
        let right = self.virtual_size() - self.end_index();
        let left = self.start_index();
        Self { coefficients: self.coefficients.expanded_clone(right, left) }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.coefficients.size()
    }

    #[inline]
    pub fn virtual_size(&self) -> usize {
        self.coefficients.virtual_size()
    }

    #[inline]
    pub fn start_index(&self) -> usize {
        self.coefficients.start()
    }

    #[inline]
    pub fn end_index(&self) -> usize {
        self.coefficients.end()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Value at `index` (zero outside the island).
    #[inline]
    pub fn get(&self, index: usize) -> F {
        self.coefficients.get(index)
    }

    /// Overwrite the value at `index` (must be inside the island).
    #[inline]
    pub fn set(&self, index: usize, value: F) {
        self.coefficients.set(index, value)
    }

    /// Copy of the island values.
    pub fn island_to_vec(&self) -> Vec<F> {
        self.coefficients.island_to_vec()
    }

    /// Copy of all `virtual_size` values.
    pub fn to_dense_vec(&self) -> Vec<F> {
        self.coefficients.to_dense_vec()
    }

    /// `Σ_i c_i·z^i` over the island.
    pub fn evaluate(&self, z: F) -> F {
        self.evaluate_truncated(z, self.size())
    }

    /// `Σ_i c_i·z^i` over the first `target_size` island coefficients.
    pub fn evaluate_truncated(&self, z: F, target_size: usize) -> F {
        assert!(target_size <= self.size(), "target size exceeds island");
        let guard = self.coefficients.read();
        let horner = guard[..target_size]
            .iter()
            .rev()
            .fold(F::zero(), |acc, c| acc * z + c);
        horner * pow_u64(z, self.start_index() as u64)
    }

    /// Multilinear extension at `points`, binding `X_0` first.
    ///
    /// With `shift`, evaluates the extension of `p(X)/X`; requires `p[0] = 0`.
    /// `virtual_size` must equal `2^points.len()`.
    pub fn evaluate_mle(&self, points: &[F], shift: bool) -> F {
        let m = points.len();
        assert_eq!(
            self.virtual_size(),
            1usize << m,
            "MLE evaluation needs virtual size 2^{m}"
        );
        let offset = if shift {
            assert!(self.get(0).is_zero(), "shifted MLE needs a zero constant term");
            1
        } else {
            0
        };
        if m == 0 {
            return self.coefficients.get_with_allowance(offset, offset);
        }

        let start = self.start_index();
        let end = self.end_index();
        let guard = self.coefficients.read();
        // One past the end is allowed: with a shift, 2i + 1 + offset can reach virtual_size.
        let read = |i: usize| -> F {
            debug_assert!(i <= self.virtual_size());
            if i >= start && i < end {
                guard[i - start]
            } else {
                F::zero()
            }
        };

        let mut n_l = 1usize << (m - 1);
        let mut tmp = vec![F::zero(); n_l];
        let u_0 = points[0];
        for (i, slot) in tmp.iter_mut().enumerate() {
            let lo = read(2 * i + offset);
            let hi = read(2 * i + 1 + offset);
            *slot = lo + u_0 * (hi - lo);
        }
        drop(guard);

        for &u_l in &points[1..] {
            n_l >>= 1;
            for i in 0..n_l {
                tmp[i] = tmp[2 * i] + u_l * (tmp[2 * i + 1] - tmp[2 * i]);
            }
        }
        tmp[0]
    }

    /// Bind the last `points.len()` variables, highest first, returning the
    /// polynomial in the remaining free variables.
    ///
    /// `size()` must be a power of two no smaller than `2^points.len()`.
    pub fn partial_evaluate_mle(&self, points: &[F]) -> Self {
        let m = points.len();
        let size = self.size();
        assert!(size.is_power_of_two(), "partial MLE needs a power-of-two size");
        assert!(size >= 1usize << m, "too many evaluation points for size {size}");
        if m == 0 {
            return self.copy_with_size(size);
        }

        let mut n_l = size >> 1;
        let intermediate = Self::new(n_l, n_l, 0);
        {
            let mut buf = intermediate.coefficients.write();
            let u_l = points[m - 1];
            for (i, slot) in buf.iter_mut().enumerate() {
                let lo = self.get(i);
                *slot = lo + u_l * (self.get(i + n_l) - lo);
            }
            for l in 1..m {
                n_l >>= 1;
                let u_l = points[m - l - 1];
                for i in 0..n_l {
                    buf[i] = buf[i] + u_l * (buf[i + n_l] - buf[i]);
                }
            }
        }

        let result = Self::new(n_l, n_l, 0);
        {
            let src = intermediate.coefficients.read();
            result.coefficients.write().copy_from_slice(&src[..n_l]);
        }
        result
    }

    /// `self[i] += scalar · other[i]` over `other`'s island.
    pub fn add_scaled(&mut self, other: &Self, scalar: F) {
        self.apply_over(other, move |dst, src| *dst += scalar * src);
    }

    // Element-wise update over `other`'s island, split across workers.
    fn apply_over(&mut self, other: &Self, op: impl Fn(&mut F, F) + Sync + Send) {
        assert!(
            self.start_index() <= other.start_index(),
            "operand island starts at {} before destination start {}",
            other.start_index(),
            self.start_index()
        );
        assert!(
            self.end_index() >= other.end_index(),
            "operand island ends at {} after destination end {}",
            other.end_index(),
            self.end_index()
        );
        if other.is_empty() {
            return;
        }

        let snapshot;
        let guard;
        let src: &[F] = if self.coefficients.aliases(&other.coefficients) {
            snapshot = other.coefficients.island_to_vec();
            &snapshot[..]
        } else {
            guard = other.coefficients.read();
            &guard[..]
        };

        let offset = other.start_index() - self.start_index();
        let mut dst = self.coefficients.write();
        let window = &mut dst[offset..offset + other.size()];
        parallel_for_chunks(window, |chunk_start, chunk| {
            for (k, x) in chunk.iter_mut().enumerate() {
                op(x, src[chunk_start + k]);
            }
        });
    }
}

impl<F: Field> Clone for Polynomial<F> {
    fn clone(&self) -> Self {
        Self { coefficients: self.coefficients.expanded_clone(0, 0) }
    }
}

impl<F: Field> PartialEq for Polynomial<F> {
    fn eq(&self, rhs: &Self) -> bool {
        if self.is_empty() || rhs.is_empty() {
            return self.is_empty() && rhs.is_empty();
        }
        if self.virtual_size() != rhs.virtual_size() {
            return false;
        }
        let lo = self.start_index().min(rhs.start_index());
        let hi = self.end_index().max(rhs.end_index());
        (lo..hi).all(|i| self.get(i) == rhs.get(i))
    }
}

impl<F: Field> AddAssign<&Polynomial<F>> for Polynomial<F> {
    fn add_assign(&mut self, other: &Polynomial<F>) {
        self.apply_over(other, |dst, src| *dst += src);
    }
}

impl<F: Field> SubAssign<&Polynomial<F>> for Polynomial<F> {
    fn sub_assign(&mut self, other: &Polynomial<F>) {
        self.apply_over(other, |dst, src| *dst -= src);
    }
}

impl<F: Field> MulAssign<F> for Polynomial<F> {
    fn mul_assign(&mut self, scalar: F) {
        let mut dst = self.coefficients.write();
        parallel_for_chunks(&mut dst[..], |_, chunk| {
            for x in chunk.iter_mut() {
                *x *= scalar;
            }
        });
    }
}

impl<F: SupportsFft> Polynomial<F> {
    /// Replace the coefficients with those of `(p(X) − p(z)) / (X − z)` and return `p(z)`.
    ///
    /// The island must start at index 0; its last slot becomes zero.
    pub fn compute_kate_opening_coefficients(&mut self, z: F) -> F {
        assert_eq!(self.start_index(), 0, "Kate opening needs coefficients from index 0");
        let mut coeffs = self.coefficients.write();
        // synthetic division high→low: q_{i-1} = a_i + z·q_i
        let mut acc = F::zero();
        for c in coeffs.iter_mut().rev() {
            let next = *c + z * acc;
            *c = acc;
            acc = next;
        }
        acc
    }

    /// Evaluate at `z` treating indices `0..domain.n` as values on the domain.
    pub fn compute_barycentric_evaluation(&self, z: F, domain: &Domain<F>) -> F {
        assert!(domain.n <= self.virtual_size(), "domain larger than polynomial");
        let evals: Vec<F> = (0..domain.n).map(|i| self.get(i)).collect();
        domain.eval_barycentric(&evals, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};

    type Fr = ark_bn254::Fr;

    fn random_poly(rng: &mut StdRng, size: usize, virtual_size: usize, start: usize) -> Polynomial<Fr> {
        let values = (0..size).map(|_| Fr::rand(rng)).collect();
        Polynomial::from_island(values, virtual_size, start)
    }

    #[test]
    fn equality_is_reflexive_and_survives_sharing() {
        let mut rng = StdRng::from_seed([1u8; 32]);
        let p = random_poly(&mut rng, 10, 32, 3);
        assert_eq!(p, p);
        assert_eq!(p.share(), p);
        assert_eq!(p.clone(), p);
        assert_eq!(Polynomial::<Fr>::default(), Polynomial::default());
    }

    #[test]
    fn equality_compares_union_of_islands() {
        let a = Polynomial::from_island(vec![Fr::from(5u64), Fr::zero()], 8, 2);
        let b = Polynomial::from_island(vec![Fr::zero(), Fr::from(5u64)], 8, 1);
        assert_eq!(a, b);
        let c = Polynomial::from_island(vec![Fr::zero(), Fr::from(5u64)], 16, 1);
        assert_ne!(a, c);
    }

    #[test]
    fn scaling_round_trips() {
        let mut rng = StdRng::from_seed([2u8; 32]);
        let original = random_poly(&mut rng, 100, 128, 5);
        let mut p = original.clone();
        let s = Fr::rand(&mut rng);
        p *= s;
        assert_ne!(p, original);
        p *= s.inverse().unwrap();
        assert_eq!(p, original);
    }

    #[test]
    fn add_then_sub_restores_contained_window() {
        let mut rng = StdRng::from_seed([3u8; 32]);
        let original = random_poly(&mut rng, 200, 256, 10);
        let q = random_poly(&mut rng, 50, 256, 60);
        let mut p = original.clone();
        p += &q;
        for i in 60..110 {
            assert_eq!(p.get(i), original.get(i) + q.get(i));
        }
        assert_eq!(p.get(59), original.get(59));
        p -= &q;
        assert_eq!(p, original);
    }

    #[test]
    fn add_scaled_matches_manual_sum() {
        let mut rng = StdRng::from_seed([4u8; 32]);
        let mut p = random_poly(&mut rng, 64, 64, 0);
        let before = p.clone();
        let q = random_poly(&mut rng, 30, 64, 7);
        let s = Fr::from(9u64);
        p.add_scaled(&q, s);
        for i in 0..64 {
            assert_eq!(p.get(i), before.get(i) + s * q.get(i));
        }
    }

    #[test]
    fn adding_an_alias_doubles() {
        let mut rng = StdRng::from_seed([5u8; 32]);
        let mut p = random_poly(&mut rng, 20, 32, 0);
        let before = p.clone();
        let alias = p.share();
        p += &alias;
        for i in 0..20 {
            assert_eq!(p.get(i), before.get(i).double());
        }
    }

    #[test]
    #[should_panic]
    fn add_rejects_uncontained_operand() {
        let mut p = Polynomial::<Fr>::new(4, 16, 4);
        let q = Polynomial::<Fr>::new(4, 16, 2);
        p += &q;
    }

    #[test]
    fn evaluate_respects_island_offset() {
        // p(X) = 2X^2 + 3X^3
        let p = Polynomial::from_island(vec![Fr::from(2u64), Fr::from(3u64)], 8, 2);
        let z = Fr::from(5u64);
        assert_eq!(p.evaluate(z), Fr::from(2u64 * 25 + 3 * 125));
        assert_eq!(p.evaluate_truncated(z, 1), Fr::from(50u64));
    }

    #[test]
    fn interpolation_reproduces_evaluations() {
        let mut rng = StdRng::from_seed([6u8; 32]);
        let points: Vec<Fr> = (0..7).map(|_| Fr::rand(&mut rng)).collect();
        let evals: Vec<Fr> = (0..7).map(|_| Fr::rand(&mut rng)).collect();
        let p = Polynomial::from_interpolation(&points, &evals, 16);
        for (x, y) in points.iter().zip(&evals) {
            assert_eq!(p.evaluate(*x), *y);
        }
    }

    #[test]
    fn mle_on_boolean_points_reads_coefficients() {
        let mut rng = StdRng::from_seed([7u8; 32]);
        let p = random_poly(&mut rng, 8, 8, 0);
        // index 6 = 0b110 → (X_0, X_1, X_2) = (0, 1, 1)
        let pts = [Fr::zero(), Fr::from(1u64), Fr::from(1u64)];
        assert_eq!(p.evaluate_mle(&pts, false), p.get(6));
    }

    #[test]
    fn partial_then_full_mle_composes() {
        let mut rng = StdRng::from_seed([8u8; 32]);
        let m = 5;
        let p = random_poly(&mut rng, 1 << m, 1 << m, 0);
        let points: Vec<Fr> = (0..m).map(|_| Fr::rand(&mut rng)).collect();
        let full = p.evaluate_mle(&points, false);
        for k in 0..=m {
            // bind the top k variables, then the remaining low ones
            let g = p.partial_evaluate_mle(&points[m - k..]);
            assert_eq!(g.size(), 1 << (m - k));
            assert_eq!(g.evaluate_mle(&points[..m - k], false), full);
        }
    }

    #[test]
    fn binding_no_variables_copies_the_polynomial() {
        let mut rng = StdRng::from_seed([10u8; 32]);
        let p = random_poly(&mut rng, 8, 8, 0);
        let g = p.partial_evaluate_mle(&[]);
        assert_eq!(g, p);
        assert!(!g.coefficients.aliases(&p.coefficients));
    }

    #[test]
    fn shifted_mle_matches_explicit_shift() {
        let mut rng = StdRng::from_seed([9u8; 32]);
        let m = 4;
        // island [1, 16): last index makes the shifted read one past the end
        let p = random_poly(&mut rng, 15, 1 << m, 1);
        let explicit: Vec<Fr> = (0..16).map(|i| if i + 1 < 16 { p.get(i + 1) } else { Fr::zero() }).collect();
        let q = Polynomial::from_coefficients(explicit, 16);
        let points: Vec<Fr> = (0..m).map(|_| Fr::rand(&mut rng)).collect();
        assert_eq!(p.evaluate_mle(&points, true), q.evaluate_mle(&points, false));
        assert_eq!(p.shifted().evaluate_mle(&points, false), q.evaluate_mle(&points, false));
    }

    #[test]
    #[should_panic]
    fn mle_rejects_wrong_virtual_size() {
        Polynomial::<Fr>::new(4, 12, 0).evaluate_mle(&[Fr::zero(), Fr::zero()], false);
    }

    #[test]
    fn shifted_view_aliases_original() {
        let p = Polynomial::from_island(vec![Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)], 8, 1);
        let s = p.shifted();
        assert_eq!((s.start_index(), s.end_index()), (0, 3));
        for i in 0..3 {
            p.set(i + 1, Fr::from(100 + i as u64));
            assert_eq!(s.get(i), Fr::from(100 + i as u64));
        }
    }

    #[test]
    #[should_panic]
    fn shifting_without_left_margin_panics() {
        Polynomial::<Fr>::new(4, 8, 0).shifted();
    }

    #[test]
    fn full_materializes_padding() {
        let p = Polynomial::from_island(vec![Fr::from(7u64); 3], 16, 4);
        let f = p.full();
        assert_eq!((f.start_index(), f.end_index()), (0, 16));
        assert_eq!(f, p);
        assert_eq!(f.island_to_vec()[0], Fr::zero());
    }

    #[test]
    fn copy_with_size_pads_right() {
        let p = Polynomial::from_coefficients(vec![Fr::from(1u64), Fr::from(2u64)], 8);
        let q = p.copy_with_size(5);
        assert_eq!(q.size(), 5);
        assert_eq!(q, p);
    }

    #[test]
    #[should_panic]
    fn copy_with_size_rejects_shrinking() {
        Polynomial::<Fr>::new(4, 8, 0).copy_with_size(3);
    }

    #[test]
    fn kate_quotient_satisfies_division_identity() {
        let mut rng = StdRng::from_seed([10u8; 32]);
        let p = random_poly(&mut rng, 12, 16, 0);
        let z = Fr::rand(&mut rng);
        let mut q = p.clone();
        let value = q.compute_kate_opening_coefficients(z);
        assert_eq!(value, p.evaluate(z));
        assert_eq!(q.get(11), Fr::zero());
        let x = Fr::rand(&mut rng);
        assert_eq!(p.evaluate(x) - value, q.evaluate(x) * (x - z));
    }

    #[test]
    fn barycentric_matches_interpolated_evaluation() {
        let mut rng = StdRng::from_seed([11u8; 32]);
        let domain = Domain::<Fr>::new(8);
        // row values with the zero row at index 0
        let lagrange = random_poly(&mut rng, 7, 8, 1);
        let coeffs = Polynomial::from_coefficients(domain.intt(&lagrange.to_dense_vec()), 8);
        let z = Fr::rand(&mut rng);
        assert_eq!(lagrange.compute_barycentric_evaluation(z, &domain), coeffs.evaluate(z));
    }

    #[test]
    fn engine_is_generic_over_the_field() {
        type Fq = ark_bn254::Fq;
        let mut p = Polynomial::from_coefficients(vec![Fq::from(3u64), Fq::from(4u64)], 4);
        let q = Polynomial::from_island(vec![Fq::from(1u64)], 4, 1);
        p.add_scaled(&q, Fq::from(2u64));
        assert_eq!(p.evaluate(Fq::from(10u64)), Fq::from(3u64 + 60));
        // Fq has two-adicity 1, so only the size-2 domain exists.
        let domain = Domain::<Fq>::new(2);
        let lagrange = Polynomial::from_coefficients(vec![Fq::from(1u64), Fq::from(2u64)], 2);
        let z = Fq::from(7u64);
        let coeffs = Polynomial::from_coefficients(domain.intt(&lagrange.to_dense_vec()), 2);
        assert_eq!(lagrange.compute_barycentric_evaluation(z, &domain), coeffs.evaluate(z));
    }
}

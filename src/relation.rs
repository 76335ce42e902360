//! Relaxed arithmetic relation
//!
//! For folded values `z = (q_m, q_l, q_r, q_o, q_c, a, b, c)` and relaxation
//! scalar `u`, the row relation is the homogeneous cubic
//!
//! ```text
//! G(z, u) = q_m·a·b + u·(q_l·a + q_r·b + q_o·c) + u²·q_c
//! ```
//!
//! A fresh instance has `u = 1` and `G = 0` on every row. A relaxed instance
//! `(z, u, e)` is satisfied when `G(z, u)[row] = e[row]` for every row.
//!
//! Folding `(z₁, u₁, e₁)` with `(z₂, u₂, e₂)` at challenge `r` uses
//!
//! ```text
//! G(z₁ + r·z₂, u₁ + r·u₂) = e₁ + r·T₁ + r²·T₂ + r³·e₂
//! ```
//!
//! where the cross terms `T₁, T₂` are computed row by row from three
//! evaluations of the cubic `p(X) = G(z₁ + X·z₂, u₁ + X·u₂)`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::Field;

use crate::keys::NUM_FOLDED_POLYS;
use crate::polynomial::Polynomial;
use crate::thread::parallel_map_indices;
use crate::F;

/// `G(z, u)` for one row; `z` is ordered selectors then wires.
#[inline]
pub fn relation_value(z: &[F], u: F) -> F {
    debug_assert!(z.len() >= NUM_FOLDED_POLYS);
    let (q_m, q_l, q_r, q_o, q_c) = (z[0], z[1], z[2], z[3], z[4]);
    let (a, b, c) = (z[5], z[6], z[7]);
    q_m * a * b + u * (q_l * a + q_r * b + q_o * c) + u.square() * q_c
}

/// `G(z, u)` on every row of the domain.
pub fn evaluate_rows(polys: &[&Polynomial<F>], u: F, n: usize) -> Vec<F> {
    parallel_map_indices(n, |row| {
        let z: Vec<F> = polys.iter().map(|p| p.get(row)).collect();
        relation_value(&z, u)
    })
}

/// Row values of the cross terms `(T₁, T₂)`, each of virtual size `n`.
pub fn cross_terms(
    acc: &[&Polynomial<F>],
    acc_u: F,
    inc: &[&Polynomial<F>],
    inc_u: F,
    n: usize,
) -> (Polynomial<F>, Polynomial<F>) {
    let two_inv = F::from(2u64).inverse().unwrap_or_default();
    let eight = F::from(8u64);
    let pairs: Vec<(F, F)> = parallel_map_indices(n, |row| {
        let z1: Vec<F> = acc.iter().map(|p| p.get(row)).collect();
        let z2: Vec<F> = inc.iter().map(|p| p.get(row)).collect();
        let at = |x: F| -> F {
            let z: Vec<F> = z1.iter().zip(&z2).map(|(a, b)| *a + x * b).collect();
            relation_value(&z, acc_u + x * inc_u)
        };
        let c0 = relation_value(&z1, acc_u);
        let c3 = relation_value(&z2, inc_u);
        // p(1) = c0 + c1 + c2 + c3,  p(2) = c0 + 2c1 + 4c2 + 8c3
        let sum12 = at(F::from(1u64)) - c0 - c3;
        let weighted = (at(F::from(2u64)) - c0 - eight * c3) * two_inv;
        let c2 = weighted - sum12;
        let c1 = sum12 - c2;
        (c1, c2)
    });
    let (t1, t2): (Vec<F>, Vec<F>) = pairs.into_iter().unzip();
    (Polynomial::from_coefficients(t1, n), Polynomial::from_coefficients(t2, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::{UniformRand, Zero};
    use rand::{rngs::StdRng, SeedableRng};

    fn random_polys(rng: &mut StdRng, n: usize) -> Vec<Polynomial<F>> {
        (0..NUM_FOLDED_POLYS)
            .map(|_| Polynomial::from_coefficients((0..n).map(|_| F::rand(rng)).collect(), n))
            .collect()
    }

    #[test]
    fn relation_is_homogeneous_cubic() {
        let mut rng = StdRng::from_seed([1u8; 32]);
        let z: Vec<F> = (0..8).map(|_| F::rand(&mut rng)).collect();
        let u = F::rand(&mut rng);
        let s = F::rand(&mut rng);
        let scaled: Vec<F> = z.iter().map(|x| *x * s).collect();
        assert_eq!(relation_value(&scaled, u * s), relation_value(&z, u) * s * s * s);
    }

    #[test]
    fn cross_terms_interpolate_the_folded_relation() {
        let mut rng = StdRng::from_seed([2u8; 32]);
        let n = 8;
        let p1 = random_polys(&mut rng, n);
        let p2 = random_polys(&mut rng, n);
        let (u1, u2) = (F::rand(&mut rng), F::rand(&mut rng));
        let r1: Vec<&Polynomial<F>> = p1.iter().collect();
        let r2: Vec<&Polynomial<F>> = p2.iter().collect();
        let (t1, t2) = cross_terms(&r1, u1, &r2, u2, n);

        let e1 = evaluate_rows(&r1, u1, n);
        let e2 = evaluate_rows(&r2, u2, n);
        let r = F::rand(&mut rng);
        let folded: Vec<Polynomial<F>> = p1
            .iter()
            .zip(&p2)
            .map(|(a, b)| {
                let mut f = a.clone();
                f.add_scaled(b, r);
                f
            })
            .collect();
        let rf: Vec<&Polynomial<F>> = folded.iter().collect();
        let g = evaluate_rows(&rf, u1 + r * u2, n);
        for row in 0..n {
            let expected = e1[row] + r * t1.get(row) + r * r * t2.get(row) + r * r * r * e2[row];
            assert_eq!(g[row], expected);
        }
    }

    #[test]
    fn satisfied_gate_rows_vanish() {
        // 3·4 = 12 as a multiplication gate
        let z = [F::from(1u64), F::zero(), F::zero(), -F::from(1u64), F::zero(), F::from(3u64), F::from(4u64), F::from(12u64)];
        assert!(relation_value(&z, F::from(1u64)).is_zero());
    }
}

//! Quotient by the vanishing polynomial
//!
//! Given Lagrange-basis columns on a domain `H` of size `N` and a row-wise
//! constraint `R(row) = combine(columns[row])`, we build `Q` such that
//!
//! ```text
//! R(X) = (X^N − c)·Q(X) + Rem(X),   deg(Rem) < N
//! ```
//!
//! and require `Rem = 0`, i.e. the constraint holds on every row of `H`.
//! Columns are interpolated, re-evaluated on an extension subgroup large
//! enough for the constraint degree, combined pointwise, interpolated back and
//! long-divided.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::Zero;

use crate::domain::{Domain, DomainError};
use crate::polynomial::Polynomial;
use crate::thread::parallel_map_indices;
use crate::F;

/// Errors surfaced by the quotient builder.
#[derive(Debug, thiserror::Error)]
pub enum QuotientError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("constraint does not vanish on the domain (first non-zero remainder coefficient at {0})")]
    NonZeroRemainder(usize),
    #[error("column {index} has virtual size {got}, expected {expected}")]
    ColumnSize { index: usize, got: usize, expected: usize },
}

/// Long-division by `X^N − c` on low→high coefficients.
///
/// Returns `(q, rem)` with `rem.len() == min(r.len(), n)`:
/// ```text
/// for i = deg .. N:
///    q_{i-N} += r_i
///    r_{i-N} += c * r_i
///    r_i      = 0
/// ```
pub fn long_divide_xn_minus_c(r_lo_to_hi: &[F], n: usize, c: F) -> (Vec<F>, Vec<F>) {
    let mut r = r_lo_to_hi.to_vec();
    if r.len() <= n {
        return (Vec::new(), r);
    }
    let mut q = vec![F::zero(); r.len() - n];
    for i in (n..r.len()).rev() {
        let coeff = r[i];
        if coeff.is_zero() {
            continue;
        }
        q[i - n] += coeff;
        r[i - n] += c * coeff;
        r[i] = F::zero();
    }
    r.truncate(n);
    while q.last().map_or(false, |x| x.is_zero()) {
        q.pop();
    }
    (q, r)
}

/// Build `Q = R / Z_H` for a row constraint of total degree `degree`.
///
/// `columns` hold row values on `domain` (virtual size `N`). `combine` receives
/// the column values at one point of the extension subgroup and returns `R` at
/// that point. The returned polynomial holds monomial coefficients.
pub fn build_vanishing_quotient_r(
    domain: &Domain<F>,
    columns: &[&Polynomial<F>],
    degree: usize,
    combine: impl Fn(&[F]) -> F + Sync + Send,
) -> Result<Polynomial<F>, QuotientError> {
    let n = domain.n;
    for (index, col) in columns.iter().enumerate() {
        if col.virtual_size() != n {
            return Err(QuotientError::ColumnSize { index, got: col.virtual_size(), expected: n });
        }
    }

    let ext_n = n * (degree + 1).next_power_of_two();
    let ext = Domain::<F>::new_r(ext_n)?;

    let mut ext_columns: Vec<Vec<F>> = Vec::with_capacity(columns.len());
    for col in columns {
        let mut coeffs = domain.intt_r(&col.to_dense_vec())?;
        coeffs.resize(ext_n, F::zero());
        ext_columns.push(ext.ntt_r(&coeffs)?);
    }

    let r_evals = parallel_map_indices(ext_n, |j| {
        let row: Vec<F> = ext_columns.iter().map(|c| c[j]).collect();
        combine(&row)
    });
    let r_coeffs = ext.intt_r(&r_evals)?;

    let (q, rem) = long_divide_xn_minus_c(&r_coeffs, n, domain.zh_c);
    if let Some(pos) = rem.iter().position(|x| !x.is_zero()) {
        return Err(QuotientError::NonZeroRemainder(pos));
    }
    tracing::trace!(target: "tinyivc::quotient", n, ext_n, q_len = q.len(), "vanishing quotient built");
    Ok(Polynomial::from_coefficients(q, ext_n))
}

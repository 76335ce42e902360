//! Polynomial Commitment Scheme (PCS) — KZG on BN254
//!
//! Commitments are taken over **monomial coefficients**: coefficient `i` of a
//! [`Polynomial`] pairs with `[τ^i]G1`. Because a polynomial only stores its
//! island, the MSM runs over `powers[start..end]` and never touches the
//! zero padding.
//!
//! Openings use the quotient `W(X) = (f(X) − f(ζ))/(X − ζ)` computed in place
//! by [`Polynomial::compute_kate_opening_coefficients`]. Verification weights
//! claim `i` by `γ^i` for a challenge `γ` drawn after every claim is fixed, and
//! checks all of them in one multi-Miller loop:
//!
//! ```text
//! e(Σ γ^i·(C_i − v_i·G1), G2) · Π_ζ e(−Σ_{i at ζ} γ^i·W_i, [τ]G2 − ζ·G2) = 1
//! ```
//!
//! Lagrange-basis polynomials (row values on a domain) are committed by
//! interpolating to coefficients first; see [`CommitmentKey::commit_lagrange`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_bn254::{Bn254, G1Affine, G1Projective, G2Affine};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup, VariableBaseMSM};
use ark_ff::{One, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::domain::Domain;
use crate::polynomial::Polynomial;
use crate::F;

/// PCS commitment newtype (wraps **G1Affine** directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Commitment(pub G1Affine);

impl Default for Commitment {
    fn default() -> Self {
        Self::identity()
    }
}

impl Commitment {
    /// Commitment to the zero polynomial.
    pub fn identity() -> Self {
        Commitment(G1Affine::zero())
    }

    /// `a + r·b`.
    pub fn combine(a: &Commitment, b: &Commitment, r: F) -> Commitment {
        Commitment((a.0.into_group() + b.0.into_group() * r).into_affine())
    }

    /// `Σ_i α^i · C_i`.
    pub fn batch(comms: &[Commitment], alpha: F) -> Commitment {
        let mut acc = G1Projective::zero();
        let mut pow = F::one();
        for c in comms {
            acc += c.0.into_group() * pow;
            pow *= alpha;
        }
        Commitment(acc.into_affine())
    }
}

/// KZG opening proof at a single point.
#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct OpeningProof {
    /// Evaluation point ζ.
    pub zeta: F,
    /// Claimed value f(ζ).
    pub value: F,
    /// Commitment to the witness polynomial W(X) = (f(X) − f(ζ)) / (X − ζ).
    pub witness_comm: Commitment,
}

#[derive(Debug, thiserror::Error)]
pub enum PcsError {
    #[error("polynomial needs {needed} SRS powers, commitment key has {available}")]
    Degree { needed: usize, available: usize },
    #[error("shape mismatch: expected {expected} items, got {got}")]
    Shape { expected: usize, got: usize },
    #[error("opening proof does not match claimed point/value")]
    ClaimMismatch,
    #[error("final pairing check failed")]
    Pairing,
}

// ===========================================================================
// Prover side
// ===========================================================================

/// G1 powers `[τ^0]G1, …, [τ^{n-1}]G1` used to commit and open.
#[derive(Debug, Clone)]
pub struct CommitmentKey {
    powers: Vec<G1Affine>,
}

impl CommitmentKey {
    pub fn new(powers: Vec<G1Affine>) -> Self {
        Self { powers }
    }

    /// Number of SRS points (maximum coefficient count).
    pub fn len(&self) -> usize {
        self.powers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }

    /// Commit to monomial coefficients, reading only the island.
    pub fn commit(&self, poly: &Polynomial<F>) -> Result<Commitment, PcsError> {
        let (start, end) = (poly.start_index(), poly.end_index());
        if end > self.powers.len() {
            return Err(PcsError::Degree { needed: end, available: self.powers.len() });
        }
        if start == end {
            return Ok(Commitment::identity());
        }
        let scalars = poly.island_to_vec();
        let acc = G1Projective::msm_unchecked(&self.powers[start..end], &scalars);
        Ok(Commitment(acc.into_affine()))
    }

    /// Commit to a polynomial given by its values on `domain`.
    ///
    /// Returns the commitment and the interpolated coefficient form.
    pub fn commit_lagrange(
        &self,
        evals: &Polynomial<F>,
        domain: &Domain<F>,
    ) -> Result<(Commitment, Polynomial<F>), PcsError> {
        let coeffs = lagrange_to_monomial(evals, domain);
        let c = self.commit(&coeffs)?;
        Ok((c, coeffs))
    }

    /// Open `poly` (monomial coefficients) at `zeta`.
    pub fn open(&self, poly: &Polynomial<F>, zeta: F) -> Result<OpeningProof, PcsError> {
        let mut witness = if poly.start_index() == 0 { poly.clone() } else { poly.full() };
        let value = witness.compute_kate_opening_coefficients(zeta);
        let witness_comm = self.commit(&witness)?;
        Ok(OpeningProof { zeta, value, witness_comm })
    }
}

/// Interpolate row values on `domain` into monomial coefficients (`virtual_size = N`).
pub fn lagrange_to_monomial(evals: &Polynomial<F>, domain: &Domain<F>) -> Polynomial<F> {
    let mut dense = vec![F::zero(); domain.n];
    for (i, slot) in dense.iter_mut().enumerate().take(evals.virtual_size()) {
        *slot = evals.get(i);
    }
    Polynomial::from_coefficients(domain.intt(&dense), domain.n)
}

// ===========================================================================
// Verifier side
// ===========================================================================

/// Group elements needed to check openings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct VerifierCommitmentKey {
    pub g1: G1Affine,
    pub g2: G2Affine,
    pub tau_g2: G2Affine,
}

/// Check `proofs` against `commitments × points` in poly-major, point-minor order.
///
/// `gamma` must come from a transcript that has absorbed every claimed value
/// and witness commitment; with a single claim any value works.
pub fn verify_openings(
    vk: &VerifierCommitmentKey,
    commitments: &[Commitment],
    points: &[F],
    claimed_evals: &[F],
    proofs: &[OpeningProof],
    gamma: F,
) -> Result<(), PcsError> {
    let expected = commitments.len().saturating_mul(points.len());
    if proofs.len() != expected || claimed_evals.len() != expected {
        return Err(PcsError::Shape { expected, got: proofs.len().max(claimed_evals.len()) });
    }
    if expected == 0 {
        return Ok(());
    }

    // Σ γ^i·(C_i − v_i·G1), and Σ γ^i·W_i per point.
    let mut lhs = G1Projective::zero();
    let mut witness_sums = vec![G1Projective::zero(); points.len()];
    let mut weight = F::one();
    let mut idx = 0usize;
    for cmt in commitments {
        for (k, &pt) in points.iter().enumerate() {
            let pr = &proofs[idx];
            let val = claimed_evals[idx];
            if pr.value != val || pr.zeta != pt {
                return Err(PcsError::ClaimMismatch);
            }
            lhs += (cmt.0.into_group() - vk.g1.mul_bigint(val.into_bigint())) * weight;
            witness_sums[k] += pr.witness_comm.0.into_group() * weight;
            weight *= gamma;
            idx += 1;
        }
    }

    let mut a_all: Vec<<Bn254 as Pairing>::G1Prepared> = Vec::with_capacity(points.len() + 1);
    let mut b_all: Vec<<Bn254 as Pairing>::G2Prepared> = Vec::with_capacity(points.len() + 1);
    a_all.push(lhs.into_affine().into());
    b_all.push(vk.g2.into());
    for (&pt, w) in points.iter().zip(witness_sums) {
        // e(−Σ γ^i·W_i, [τ]G2 − ζ·G2)
        let right_g2 = (vk.tau_g2.into_group() - vk.g2.mul_bigint(pt.into_bigint())).into_affine();
        a_all.push((-w).into_affine().into());
        b_all.push(right_g2.into());
    }

    let mlo = Bn254::multi_miller_loop(a_all, b_all);
    match Bn254::final_exponentiation(mlo) {
        Some(fe) if fe.0.is_one() => Ok(()),
        _ => Err(PcsError::Pairing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srs_setup;
    use ark_ff::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};

    fn keys(n: usize) -> (std::sync::Arc<CommitmentKey>, VerifierCommitmentKey) {
        srs_setup::init_dev_srs(n);
        (srs_setup::commitment_key(n).unwrap(), srs_setup::verifier_key().unwrap())
    }

    #[test]
    fn commitment_is_island_aware_and_linear() {
        let (ck, _) = keys(32);
        let mut rng = StdRng::from_seed([1u8; 32]);
        let island: Vec<F> = (0..5).map(|_| F::rand(&mut rng)).collect();
        let sparse = Polynomial::from_island(island.clone(), 32, 10);
        let dense = sparse.full();
        assert_eq!(ck.commit(&sparse).unwrap(), ck.commit(&dense).unwrap());

        let other = Polynomial::from_island(island, 32, 12);
        let r = F::from(7u64);
        let mut folded = dense.clone();
        folded.add_scaled(&other, r);
        let expected = Commitment::combine(&ck.commit(&sparse).unwrap(), &ck.commit(&other).unwrap(), r);
        assert_eq!(ck.commit(&folded).unwrap(), expected);
    }

    #[test]
    fn commit_rejects_oversized_polynomial() {
        let (ck, _) = keys(16);
        let p = Polynomial::<F>::new(4, 1 << 20, (1 << 20) - 4);
        assert!(matches!(ck.commit(&p), Err(PcsError::Degree { .. })));
    }

    #[test]
    fn open_and_verify_round() {
        let (ck, vk) = keys(16);
        let mut rng = StdRng::from_seed([2u8; 32]);
        let p = Polynomial::from_coefficients((0..16).map(|_| F::rand(&mut rng)).collect(), 16);
        let c = ck.commit(&p).unwrap();
        let zeta = F::rand(&mut rng);
        let pr = ck.open(&p, zeta).unwrap();
        assert_eq!(pr.value, p.evaluate(zeta));
        verify_openings(&vk, &[c], &[zeta], &[pr.value], &[pr.clone()], F::one()).unwrap();

        let mut bad = pr.clone();
        bad.value += F::one();
        assert!(verify_openings(&vk, &[c], &[zeta], &[bad.value], &[bad], F::one()).is_err());
    }

    #[test]
    fn compensating_claim_errors_are_rejected() {
        let (ck, vk) = keys(16);
        let mut rng = StdRng::from_seed([3u8; 32]);
        let polys: Vec<Polynomial<F>> = (0..3)
            .map(|_| Polynomial::from_coefficients((0..16).map(|_| F::rand(&mut rng)).collect(), 16))
            .collect();
        let comms: Vec<Commitment> = polys.iter().map(|p| ck.commit(p).unwrap()).collect();
        let zeta = F::rand(&mut rng);
        let mut proofs: Vec<OpeningProof> = polys.iter().map(|p| ck.open(p, zeta).unwrap()).collect();
        let gamma = F::rand(&mut rng);
        let evals: Vec<F> = proofs.iter().map(|p| p.value).collect();
        verify_openings(&vk, &comms, &[zeta], &evals, &proofs, gamma).unwrap();

        // Shifts summing to zero leave the unweighted sum of claims unchanged.
        let delta = F::from(5u64);
        proofs[0].value += delta;
        proofs[2].value -= delta;
        let forged: Vec<F> = proofs.iter().map(|p| p.value).collect();
        verify_openings(&vk, &comms, &[zeta], &forged, &proofs, F::one()).unwrap();
        assert!(matches!(
            verify_openings(&vk, &comms, &[zeta], &forged, &proofs, gamma),
            Err(PcsError::Pairing)
        ));
    }

    #[test]
    fn default_opening_proof_is_identity() {
        let pr = OpeningProof::default();
        assert_eq!(pr.witness_comm, Commitment::identity());
        assert_eq!((pr.zeta, pr.value), (F::zero(), F::zero()));
    }

    #[test]
    fn lagrange_commitment_matches_coefficient_commitment() {
        let (ck, _) = keys(8);
        let domain = Domain::<F>::new(8);
        let rows = Polynomial::from_island(vec![F::from(3u64); 5], 8, 1);
        let (c, coeffs) = ck.commit_lagrange(&rows, &domain).unwrap();
        assert_eq!(c, ck.commit(&coeffs).unwrap());
        let zeta = F::from(11u64);
        assert_eq!(coeffs.evaluate(zeta), rows.compute_barycentric_evaluation(zeta, &domain));
    }

    #[test]
    fn batch_equals_manual_combination() {
        let (ck, _) = keys(4);
        let a = ck.commit(&Polynomial::from_coefficients(vec![F::from(1u64)], 4)).unwrap();
        let b = ck.commit(&Polynomial::from_coefficients(vec![F::from(2u64), F::one()], 4)).unwrap();
        let alpha = F::from(5u64);
        assert_eq!(Commitment::batch(&[a, b], alpha), Commitment::combine(&a, &b, alpha));
    }
}

//! Decider prover and verifier
//!
//! Proves that the final relaxed accumulator `(z, u, e)` satisfies
//! `G(z, u) = e` on every row of `H`:
//!
//! 1. Build `Q = (G(z, u) − e) / (X^N − 1)`; a non-zero remainder means the
//!    accumulator is not satisfied and no proof is produced.
//! 2. Commit `Q`, derive `ζ`, evaluate all ten polynomials at `ζ`.
//! 3. Open every polynomial at `ζ` with KZG.
//!
//! The verifier replays the transcript, checks
//! `G(z(ζ), u) − e(ζ) = Z_H(ζ)·Q(ζ)` and verifies the openings, weighted by a
//! challenge drawn after all evaluations are absorbed.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use tracing::instrument;

use crate::keys::{DeciderProvingKey, DeciderVerificationKey, NUM_FOLDED_POLYS};
use crate::pcs::{self, Commitment, OpeningProof, PcsError, VerifierCommitmentKey};
use crate::polynomial::Polynomial;
use crate::quotient::{self, QuotientError};
use crate::relation;
use crate::transcript::{FsLabel, Transcript};
use crate::F;

const DECIDER_TRANSCRIPT: &str = "tinyivc.decider";

/// Folded polynomials, the error polynomial and the quotient.
const NUM_OPENED: usize = NUM_FOLDED_POLYS + 2;

#[derive(Debug, thiserror::Error)]
pub enum DeciderError {
    #[error(transparent)]
    Pcs(#[from] PcsError),
    #[error(transparent)]
    Quotient(#[from] QuotientError),
    #[error("accumulator does not satisfy the relaxed relation")]
    Unsatisfied,
    #[error("opening value disagrees with barycentric evaluation of polynomial {0}")]
    EvaluationMismatch(usize),
    #[error("relation check at zeta failed")]
    RelationCheck,
    #[error("malformed decider proof: {0}")]
    MalformedProof(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct DeciderProof {
    pub quotient_comm: Commitment,
    /// `q_m … c, e, Q` at ζ.
    pub evaluations: Vec<F>,
    pub opening_proofs: Vec<OpeningProof>,
}

/// Transcript up to and including ζ.
fn decider_transcript(
    comms: &[Commitment],
    u: &F,
    error_comm: &Commitment,
    quotient_comm: &Commitment,
) -> (Transcript, F) {
    let mut t = Transcript::new(DECIDER_TRANSCRIPT);
    t.absorb_vec_commitments_l(FsLabel::DeciderInstance, comms);
    t.absorb_scalar_l(FsLabel::DeciderInstance, u);
    t.absorb_commitment_l(FsLabel::DeciderInstance, error_comm);
    t.absorb_commitment_l(FsLabel::QuotientCommit, quotient_comm);
    let zeta = t.challenge_f_l(FsLabel::DeciderZeta);
    (t, zeta)
}

// ============================================================================
// Prover
// ============================================================================

pub struct DeciderProver<'a> {
    accumulator: &'a DeciderProvingKey,
}

impl<'a> DeciderProver<'a> {
    pub fn new(accumulator: &'a DeciderProvingKey) -> Self {
        Self { accumulator }
    }

    #[instrument(level = "debug", skip_all, fields(n = self.accumulator.circuit_size()))]
    pub fn construct_proof(&self) -> Result<DeciderProof, DeciderError> {
        let acc = self.accumulator;
        let pk = &acc.proving_key;
        let domain = pk.domain;
        let ck = acc.commitment_key();
        let u = acc.relaxation;

        let mut comms = acc.selector_comms.clone();
        if comms.is_empty() {
            comms = pk.commit_selectors()?;
        }
        if acc.witness_comms.is_empty() {
            comms.extend(pk.commit_wires()?);
        } else {
            comms.extend_from_slice(&acc.witness_comms);
        }

        let mut columns = pk.folded_polys();
        columns.push(&acc.error);
        let q = quotient::build_vanishing_quotient_r(&domain, &columns, 3, |v| {
            relation::relation_value(&v[..NUM_FOLDED_POLYS], u) - v[NUM_FOLDED_POLYS]
        })
        .map_err(|e| match e {
            QuotientError::NonZeroRemainder(_) => DeciderError::Unsatisfied,
            other => DeciderError::Quotient(other),
        })?;

        let quotient_comm = ck.commit(&q)?;
        let (mut transcript, zeta) = decider_transcript(&comms, &u, &acc.error_comm, &quotient_comm);

        let mut evaluations: Vec<F> = columns
            .iter()
            .map(|p| p.compute_barycentric_evaluation(zeta, &domain))
            .collect();
        evaluations.push(q.evaluate(zeta));
        transcript.absorb_scalars_l(FsLabel::DeciderEvals, &evaluations);

        let mut monomials: Vec<Polynomial<F>> =
            columns.iter().map(|p| pcs::lagrange_to_monomial(p, &domain)).collect();
        monomials.push(q);
        let mut opening_proofs = Vec::with_capacity(NUM_OPENED);
        for (i, p) in monomials.iter().enumerate() {
            let proof = ck.open(p, zeta)?;
            if proof.value != evaluations[i] {
                return Err(DeciderError::EvaluationMismatch(i));
            }
            opening_proofs.push(proof);
        }

        tracing::debug!(target: "tinyivc::decider", "decider proof constructed");
        Ok(DeciderProof { quotient_comm, evaluations, opening_proofs })
    }
}

// ============================================================================
// Verifier
// ============================================================================

pub struct DeciderVerifier {
    accumulator: DeciderVerificationKey,
    pcs_vk: VerifierCommitmentKey,
}

impl DeciderVerifier {
    pub fn new(accumulator: DeciderVerificationKey, pcs_vk: VerifierCommitmentKey) -> Self {
        Self { accumulator, pcs_vk }
    }

    /// `true` iff the proof verifies; failures are logged.
    pub fn verify_proof(&self, proof: &DeciderProof) -> bool {
        match self.verify_proof_r(proof) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(target: "tinyivc::decider", error = %e, "decider verification failed");
                false
            }
        }
    }

    #[instrument(level = "debug", skip_all)]
    pub fn verify_proof_r(&self, proof: &DeciderProof) -> Result<(), DeciderError> {
        let acc = &self.accumulator;
        let comms = acc.instance_comms();
        if comms.len() != NUM_FOLDED_POLYS {
            return Err(DeciderError::MalformedProof("accumulator lacks instance commitments"));
        }
        if proof.evaluations.len() != NUM_OPENED || proof.opening_proofs.len() != NUM_OPENED {
            return Err(DeciderError::MalformedProof("wrong number of evaluations"));
        }

        let (mut transcript, zeta) =
            decider_transcript(&comms, &acc.relaxation, &acc.error_comm, &proof.quotient_comm);
        transcript.absorb_scalars_l(FsLabel::DeciderEvals, &proof.evaluations);

        let evals = &proof.evaluations;
        let n = acc.circuit_size() as u64;
        let z_h = crate::domain::pow_u64(zeta, n) - F::from(1u64);
        let lhs = relation::relation_value(&evals[..NUM_FOLDED_POLYS], acc.relaxation) - evals[NUM_FOLDED_POLYS];
        if lhs != z_h * evals[NUM_FOLDED_POLYS + 1] {
            return Err(DeciderError::RelationCheck);
        }

        let mut all_comms = comms;
        all_comms.push(acc.error_comm);
        all_comms.push(proof.quotient_comm);
        let gamma = transcript.opening_batch_challenge(&proof.opening_proofs);
        pcs::verify_openings(&self.pcs_vk, &all_comms, &[zeta], evals, &proof.opening_proofs, gamma)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Circuit, TraceStructure};
    use crate::folding::{FoldingProver, FoldingVerifier};
    use crate::keys::VerificationKey;
    use crate::srs_setup;
    use ark_ff::{Field, One};
    use rand::{rngs::StdRng, SeedableRng};

    fn fresh(seed: u8, gates: usize) -> (DeciderProvingKey, VerificationKey) {
        srs_setup::init_dev_srs(2);
        let mut rng = StdRng::from_seed([seed; 32]);
        let c = Circuit::mock_function_circuit(gates, &mut rng);
        let dpk = DeciderProvingKey::new(&c, TraceStructure::SmallTest, None).unwrap();
        let vk = VerificationKey::new(&dpk.proving_key).unwrap();
        (dpk, vk)
    }

    #[test]
    fn decides_a_folded_accumulator() {
        let (mut a, vk_a) = fresh(11, 30);
        a.bind_verification_key(&vk_a);
        let (b, vk_b) = fresh(12, 50);
        let folded = FoldingProver::new(a, b, &vk_b).prove().unwrap();
        let verifier_acc = FoldingVerifier::new(vk_a.into(), vk_b)
            .verify_folding_proof(&folded.proof)
            .unwrap();

        let proof = DeciderProver::new(&folded.accumulator).construct_proof().unwrap();
        let pcs_vk = srs_setup::verifier_key().unwrap();
        let verifier = DeciderVerifier::new(verifier_acc.clone(), pcs_vk);
        verifier.verify_proof_r(&proof).unwrap();

        let mut tampered = proof.clone();
        tampered.evaluations[0] += F::from(1u64);
        assert!(!verifier.verify_proof(&tampered));

        let mut wrong_acc = verifier_acc;
        wrong_acc.relaxation += F::from(1u64);
        assert!(!DeciderVerifier::new(wrong_acc, pcs_vk).verify_proof(&proof));
    }

    #[test]
    fn compensated_evaluations_are_rejected() {
        let (mut a, vk_a) = fresh(15, 30);
        a.bind_verification_key(&vk_a);
        let (b, vk_b) = fresh(16, 40);
        let folded = FoldingProver::new(a, b, &vk_b).prove().unwrap();
        let acc = FoldingVerifier::new(vk_a.into(), vk_b)
            .verify_folding_proof(&folded.proof)
            .unwrap();
        let proof = DeciderProver::new(&folded.accumulator).construct_proof().unwrap();
        let (_, zeta) =
            decider_transcript(&acc.instance_comms(), &acc.relaxation, &acc.error_comm, &proof.quotient_comm);

        // Shift q_c, e and Q so the relation at ζ still holds and the shifts sum to zero.
        let u = acc.relaxation;
        let z_h = crate::domain::pow_u64(zeta, acc.circuit_size() as u64) - F::one();
        let d_c = (z_h - F::one()) * (u * u + F::one()).inverse().unwrap();
        let shifts = [(4, d_c), (NUM_FOLDED_POLYS, -F::one() - d_c), (NUM_FOLDED_POLYS + 1, F::one())];
        let mut forged = proof.clone();
        for (i, d) in shifts {
            forged.evaluations[i] += d;
            forged.opening_proofs[i].value += d;
        }
        let evals = &forged.evaluations;
        assert_eq!(
            relation::relation_value(&evals[..NUM_FOLDED_POLYS], u) - evals[NUM_FOLDED_POLYS],
            z_h * evals[NUM_FOLDED_POLYS + 1]
        );

        let verifier = DeciderVerifier::new(acc, srs_setup::verifier_key().unwrap());
        verifier.verify_proof_r(&proof).unwrap();
        assert!(matches!(
            verifier.verify_proof_r(&forged),
            Err(DeciderError::Pcs(PcsError::Pairing))
        ));
    }

    #[test]
    fn unsatisfied_accumulator_has_no_proof() {
        let (mut a, vk_a) = fresh(13, 20);
        a.bind_verification_key(&vk_a);
        let (b, vk_b) = fresh(14, 20);
        let mut folded = FoldingProver::new(a, b, &vk_b).prove().unwrap().accumulator;
        // gate 5 of the arithmetic block
        let row = 1 + 128 + 32 + 5;
        let v = folded.proving_key.wires[0].get(row);
        folded.proving_key.wires[0].set(row, v + F::from(1u64));
        assert!(matches!(
            DeciderProver::new(&folded).construct_proof(),
            Err(DeciderError::Unsatisfied)
        ));
    }
}

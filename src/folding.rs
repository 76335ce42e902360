//! Folding prover and verifier
//!
//! Folds a fresh instance into a running relaxed accumulator:
//!
//! 1. Commit the wires of every key that is not yet an accumulator (on the
//!    first fold that is both keys, afterwards only the incoming one).
//! 2. Compute the cross terms `T₁, T₂` (see [`crate::relation`]) and commit.
//! 3. Derive `r` from a transcript over the accumulator, the incoming instance
//!    and the cross-term commitments.
//! 4. Fold: `z' = z₁ + r·z₂`, `u' = u₁ + r`, `e' = e₁ + r·T₁ + r²·T₂`, and
//!    commitments linearly (`C' = C₁ + r·C₂`, `E' = E + r·[T₁] + r²·[T₂]`).
//!
//! The verifier replays steps 1–4 on commitments only.

#![forbid(unsafe_code)]

use ark_ff::One;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use tracing::instrument;

use crate::keys::{DeciderProvingKey, DeciderVerificationKey, VerificationKey, NUM_FOLDED_POLYS, NUM_WIRES};
use crate::pcs::{Commitment, PcsError};
use crate::relation;
use crate::transcript::{FsLabel, Transcript};
use crate::F;

const FOLDING_TRANSCRIPT: &str = "tinyivc.folding";

/// Errors from folding or replaying a fold.
#[derive(Debug, thiserror::Error)]
pub enum FoldingError {
    /// Committing wires or cross terms failed.
    #[error(transparent)]
    Pcs(#[from] PcsError),
    /// Accumulator and incoming circuit differ in size.
    #[error("cannot fold circuits of different sizes (accumulator {accumulator}, incoming {incoming})")]
    CircuitSizeMismatch {
        /// Accumulator circuit size.
        accumulator: usize,
        /// Incoming circuit size.
        incoming: usize,
    },
    /// Proof has the wrong number of commitments for this fold.
    #[error("malformed folding proof: {0}")]
    MalformedProof(&'static str),
}

/// Commitments the verifier needs to replay a fold.
#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct FoldingProof {
    /// Wire commitments of each key that was not yet an accumulator.
    pub instance_comms: Vec<Vec<Commitment>>,
    /// `[T₁], [T₂]`.
    pub cross_term_comms: Vec<Commitment>,
}

impl FoldingProof {
    /// `true` for the placeholder proof of a session that never folded.
    pub fn is_empty(&self) -> bool {
        self.instance_comms.is_empty() && self.cross_term_comms.is_empty()
    }
}

/// New accumulator and the proof of the fold that produced it.
#[derive(Debug)]
pub struct FoldingResult {
    /// Folded accumulator, flagged as such.
    pub accumulator: DeciderProvingKey,
    /// Commitments the verifier replays the fold from.
    pub proof: FoldingProof,
}

// ---- Shared transcript schedule ----

fn absorb_accumulator(t: &mut Transcript, comms: &[Commitment], u: &F, error_comm: &Commitment) {
    t.absorb_vec_commitments_l(FsLabel::FoldAccumulator, comms);
    t.absorb_scalar_l(FsLabel::FoldAccumulator, u);
    t.absorb_commitment_l(FsLabel::FoldAccumulator, error_comm);
}

fn fold_commitments(acc: &[Commitment], inc: &[Commitment], r: F) -> Vec<Commitment> {
    acc.iter().zip(inc).map(|(a, b)| Commitment::combine(a, b, r)).collect()
}

// `E + r·[T₁] + r²·[T₂]`; the incoming error is zero.
fn fold_error_comm(error_comm: &Commitment, cross: &[Commitment], r: F) -> Commitment {
    Commitment::batch(&[*error_comm, cross[0], cross[1]], r)
}

// ============================================================================
// Prover
// ============================================================================

/// Folds one fresh key into an accumulator.
pub struct FoldingProver {
    accumulator: DeciderProvingKey,
    incoming: DeciderProvingKey,
}

impl FoldingProver {
    /// `incoming` must be a fresh key; `incoming_vk` supplies its selector commitments.
    pub fn new(
        accumulator: DeciderProvingKey,
        mut incoming: DeciderProvingKey,
        incoming_vk: &VerificationKey,
    ) -> Self {
        incoming.bind_verification_key(incoming_vk);
        Self { accumulator, incoming }
    }

    /// Commit, derive `r` and fold polynomials, relaxation and commitments.
    #[instrument(level = "debug", skip_all, fields(n = self.accumulator.circuit_size()))]
    pub fn prove(self) -> Result<FoldingResult, FoldingError> {
        let Self { mut accumulator, mut incoming } = self;
        let n = accumulator.circuit_size();
        if incoming.circuit_size() != n {
            return Err(FoldingError::CircuitSizeMismatch {
                accumulator: n,
                incoming: incoming.circuit_size(),
            });
        }

        let mut transcript = Transcript::new(FOLDING_TRANSCRIPT);
        let mut instance_comms = Vec::with_capacity(2);

        if !accumulator.is_accumulator {
            instance_comms.push(accumulator.commit_witnesses()?.to_vec());
        }
        absorb_accumulator(
            &mut transcript,
            &accumulator.instance_comms(),
            &accumulator.relaxation,
            &accumulator.error_comm,
        );

        instance_comms.push(incoming.commit_witnesses()?.to_vec());
        transcript.absorb_vec_commitments_l(FsLabel::FoldInstance, &incoming.instance_comms());

        let (t1, t2) = relation::cross_terms(
            &accumulator.proving_key.folded_polys(),
            accumulator.relaxation,
            &incoming.proving_key.folded_polys(),
            incoming.relaxation,
            n,
        );
        let ck = accumulator.commitment_key().clone();
        let domain = accumulator.proving_key.domain;
        let (t1_comm, _) = ck.commit_lagrange(&t1, &domain)?;
        let (t2_comm, _) = ck.commit_lagrange(&t2, &domain)?;
        let cross_term_comms = vec![t1_comm, t2_comm];
        transcript.absorb_vec_commitments_l(FsLabel::CrossTermCommit, &cross_term_comms);

        let r = transcript.challenge_f_l(FsLabel::FoldChallenge);

        // Fold polynomials; the accumulator island must cover the incoming one.
        for (acc_poly, inc_poly) in accumulator
            .proving_key
            .folded_polys_mut()
            .into_iter()
            .zip(incoming.proving_key.folded_polys())
        {
            if acc_poly.start_index() > inc_poly.start_index() || acc_poly.end_index() < inc_poly.end_index() {
                *acc_poly = acc_poly.full();
            }
            acc_poly.add_scaled(inc_poly, r);
        }
        if accumulator.error.size() != n {
            accumulator.error = accumulator.error.full();
        }
        accumulator.error.add_scaled(&t1, r);
        accumulator.error.add_scaled(&t2, r * r);

        accumulator.selector_comms = fold_commitments(&accumulator.selector_comms, &incoming.selector_comms, r);
        accumulator.witness_comms = fold_commitments(&accumulator.witness_comms, &incoming.witness_comms, r);
        accumulator.error_comm = fold_error_comm(&accumulator.error_comm, &cross_term_comms, r);
        accumulator.relaxation += r * incoming.relaxation;
        accumulator.is_accumulator = true;

        tracing::debug!(target: "tinyivc::folding", n, "folded instance into accumulator");
        Ok(FoldingResult { accumulator, proof: FoldingProof { instance_comms, cross_term_comms } })
    }
}

// ============================================================================
// Verifier
// ============================================================================

/// Replays a fold on commitments only.
pub struct FoldingVerifier {
    accumulator: DeciderVerificationKey,
    incoming_vk: VerificationKey,
}

/// Challenge and folded instance produced by a successful verification.
#[derive(Debug, Clone)]
pub struct FoldingVerification {
    /// Folding challenge `r`.
    pub challenge: F,
    /// Wire commitments of the accumulator before the fold.
    pub accumulator_witness_comms: Vec<Commitment>,
    /// Wire commitments of the incoming instance.
    pub incoming_witness_comms: Vec<Commitment>,
    /// Folded verifier accumulator.
    pub accumulator: DeciderVerificationKey,
}

impl FoldingVerifier {
    /// `incoming_vk` is the verification key of the circuit being folded in.
    pub fn new(accumulator: DeciderVerificationKey, incoming_vk: VerificationKey) -> Self {
        Self { accumulator, incoming_vk }
    }

    /// Replay the fold and return the new verifier accumulator.
    pub fn verify_folding_proof(self, proof: &FoldingProof) -> Result<DeciderVerificationKey, FoldingError> {
        Ok(self.verify_folding_proof_detailed(proof)?.accumulator)
    }

    /// [`Self::verify_folding_proof`], also returning `r` and both wire commitment sets.
    #[instrument(level = "debug", skip_all)]
    pub fn verify_folding_proof_detailed(self, proof: &FoldingProof) -> Result<FoldingVerification, FoldingError> {
        let Self { accumulator: acc, incoming_vk } = self;
        let n = acc.circuit_size();
        if incoming_vk.circuit_size as usize != n {
            return Err(FoldingError::CircuitSizeMismatch {
                accumulator: n,
                incoming: incoming_vk.circuit_size as usize,
            });
        }
        let expected_instances = if acc.is_accumulator { 1 } else { 2 };
        if proof.instance_comms.len() != expected_instances {
            return Err(FoldingError::MalformedProof("unexpected number of instance commitment sets"));
        }
        if proof.instance_comms.iter().any(|c| c.len() != NUM_WIRES) {
            return Err(FoldingError::MalformedProof("wrong number of wire commitments"));
        }
        if proof.cross_term_comms.len() != 2 {
            return Err(FoldingError::MalformedProof("expected two cross-term commitments"));
        }
        if acc.selector_comms.len() + NUM_WIRES != NUM_FOLDED_POLYS
            || incoming_vk.selector_comms.len() + NUM_WIRES != NUM_FOLDED_POLYS
        {
            return Err(FoldingError::MalformedProof("wrong number of selector commitments"));
        }

        let acc_witness = if acc.is_accumulator {
            if acc.witness_comms.len() != NUM_WIRES {
                return Err(FoldingError::MalformedProof("accumulator lacks wire commitments"));
            }
            acc.witness_comms.clone()
        } else {
            proof.instance_comms[0].clone()
        };
        let inc_witness = proof.instance_comms[expected_instances - 1].clone();

        let mut transcript = Transcript::new(FOLDING_TRANSCRIPT);
        let acc_comms: Vec<Commitment> = acc.selector_comms.iter().chain(&acc_witness).copied().collect();
        absorb_accumulator(&mut transcript, &acc_comms, &acc.relaxation, &acc.error_comm);
        let inc_comms: Vec<Commitment> =
            incoming_vk.selector_comms.iter().chain(&inc_witness).copied().collect();
        transcript.absorb_vec_commitments_l(FsLabel::FoldInstance, &inc_comms);
        transcript.absorb_vec_commitments_l(FsLabel::CrossTermCommit, &proof.cross_term_comms);
        let r = transcript.challenge_f_l(FsLabel::FoldChallenge);

        let folded = DeciderVerificationKey {
            selector_comms: fold_commitments(&acc.selector_comms, &incoming_vk.selector_comms, r),
            witness_comms: fold_commitments(&acc_witness, &inc_witness, r),
            relaxation: acc.relaxation + r * F::one(),
            error_comm: fold_error_comm(&acc.error_comm, &proof.cross_term_comms, r),
            is_accumulator: true,
            verification_key: incoming_vk,
        };
        Ok(FoldingVerification {
            challenge: r,
            accumulator_witness_comms: acc_witness,
            incoming_witness_comms: inc_witness,
            accumulator: folded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Circuit, TraceStructure};
    use crate::keys::DeciderProvingKey;
    use crate::srs_setup;
    use ark_ff::Zero;
    use rand::{rngs::StdRng, SeedableRng};

    fn fresh(seed: u8, gates: usize) -> (DeciderProvingKey, VerificationKey) {
        srs_setup::init_dev_srs(2);
        let mut rng = StdRng::from_seed([seed; 32]);
        let c = Circuit::mock_function_circuit(gates, &mut rng);
        let dpk = DeciderProvingKey::new(&c, TraceStructure::SmallTest, None).unwrap();
        let vk = VerificationKey::new(&dpk.proving_key).unwrap();
        (dpk, vk)
    }

    fn assert_relaxed_satisfied(acc: &DeciderProvingKey) {
        let n = acc.circuit_size();
        let rows = relation::evaluate_rows(&acc.proving_key.folded_polys(), acc.relaxation, n);
        for (row, g) in rows.iter().enumerate() {
            assert_eq!(*g, acc.error.get(row), "row {row}");
        }
    }

    #[test]
    fn prover_and_verifier_agree_over_two_folds() {
        let (mut a, vk_a) = fresh(1, 40);
        a.bind_verification_key(&vk_a);
        let (b, vk_b) = fresh(2, 60);
        let (c, vk_c) = fresh(3, 10);

        let first = FoldingProver::new(a, b, &vk_b).prove().unwrap();
        assert_eq!(first.proof.instance_comms.len(), 2);
        let v1 = FoldingVerifier::new(DeciderVerificationKey::from(vk_a), vk_b.clone())
            .verify_folding_proof(&first.proof)
            .unwrap();
        assert_eq!(v1.instance_comms(), first.accumulator.instance_comms());
        assert_eq!(v1.error_comm, first.accumulator.error_comm);
        assert_relaxed_satisfied(&first.accumulator);

        let second = FoldingProver::new(first.accumulator, c, &vk_c).prove().unwrap();
        assert_eq!(second.proof.instance_comms.len(), 1);
        let v2 = FoldingVerifier::new(v1, vk_c).verify_folding_proof(&second.proof).unwrap();
        assert_eq!(v2.instance_comms(), second.accumulator.instance_comms());
        assert_eq!(v2.relaxation, second.accumulator.relaxation);
        assert!(!v2.relaxation.is_zero());
        assert_relaxed_satisfied(&second.accumulator);

        // Folded commitments are commitments to the folded polynomials.
        let ck = second.accumulator.commitment_key().clone();
        let domain = second.accumulator.proving_key.domain;
        let (e_comm, _) = ck.commit_lagrange(&second.accumulator.error, &domain).unwrap();
        assert_eq!(e_comm, v2.error_comm);
    }

    #[test]
    fn size_mismatch_is_a_typed_error() {
        let (mut a, vk_a) = fresh(4, 10);
        a.bind_verification_key(&vk_a);
        let mut rng = StdRng::from_seed([5u8; 32]);
        let big = Circuit::mock_function_circuit(1000, &mut rng);
        let b = DeciderProvingKey::new(&big, TraceStructure::None, None).unwrap();
        let vk_b = VerificationKey::new(&b.proving_key).unwrap();
        assert!(matches!(
            FoldingProver::new(a, b, &vk_b).prove(),
            Err(FoldingError::CircuitSizeMismatch { .. })
        ));
    }

    #[test]
    fn malformed_proof_is_rejected() {
        let (_, vk_a) = fresh(6, 10);
        let (_, vk_b) = fresh(7, 10);
        let err = FoldingVerifier::new(DeciderVerificationKey::from(vk_a), vk_b)
            .verify_folding_proof(&FoldingProof::default())
            .unwrap_err();
        assert!(matches!(err, FoldingError::MalformedProof(_)));
    }
}

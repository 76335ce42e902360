//! Goblin: ECC op queue, merge protocol and ECCVM / Translator stand-ins
//!
//! Every client circuit defers its elliptic-curve work to an op queue. The
//! queue keeps one subtable per circuit, newest first, and its aggregate is a
//! four-column table (see [`UltraOp::table_rows`]) read as monomial
//! coefficients.
//!
//! ## Merge
//! After each circuit, the prover shows that the new aggregate `T` is the old
//! one `T_prev` with the circuit's subtable `t` prepended:
//!
//! ```text
//! T_j(X) = t_j(X) + X^m · T_prev,j(X)      (m = rows of t)
//! ```
//!
//! checked at a transcript point κ, with all twelve openings batched by α.
//!
//! ## ECCVM / Translator
//! Executing the queued operations is not proven here. The ECCVM stand-in
//! commits the final aggregate table and opens it; the Translator stand-in
//! opens a β-batched column of the same table. The verifier ties both to the
//! last merge proof, so the op table is bound end to end.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::sync::Arc;

use ark_ff::{One, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use tracing::instrument;

use crate::circuit::{Circuit, UltraOp};
use crate::domain::pow_u64;
use crate::pcs::{self, Commitment, CommitmentKey, OpeningProof, PcsError, VerifierCommitmentKey};
use crate::polynomial::Polynomial;
use crate::recursion;
use crate::srs_setup::{self, SrsSetupError};
use crate::transcript::{FsLabel, Transcript};
use crate::F;

/// Columns of the op table.
pub const NUM_TABLE_COLUMNS: usize = 4;

const MERGE_TRANSCRIPT: &str = "tinyivc.merge";
const ECCVM_TRANSCRIPT: &str = "tinyivc.eccvm";
const TRANSLATOR_TRANSCRIPT: &str = "tinyivc.translator";

#[derive(Debug, thiserror::Error)]
pub enum GoblinError {
    #[error(transparent)]
    Pcs(#[from] PcsError),
    #[error(transparent)]
    Srs(#[from] SrsSetupError),
    #[error("no merge proof; merge at least one circuit before proving")]
    NoMergeProof,
    #[error("{0} proving key is not available before Goblin::prove")]
    MissingProvingKey(&'static str),
    #[error("malformed goblin proof: {0}")]
    MalformedProof(&'static str),
    #[error("{0} check failed")]
    Check(&'static str),
}

// ============================================================================
// Op queue
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct EccOpQueue {
    /// One subtable per merged circuit, newest first.
    subtables: Vec<Vec<UltraOp>>,
}

fn table_columns<'a>(subtables: impl Iterator<Item = &'a Vec<UltraOp>>) -> Vec<Vec<F>> {
    let mut columns = vec![Vec::new(); NUM_TABLE_COLUMNS];
    for op in subtables.flatten() {
        for row in op.table_rows() {
            for (col, v) in columns.iter_mut().zip(row) {
                col.push(v);
            }
        }
    }
    columns
}

impl EccOpQueue {
    pub fn prepend_subtable(&mut self, ops: Vec<UltraOp>) {
        self.subtables.insert(0, ops);
    }

    pub fn num_subtables(&self) -> usize {
        self.subtables.len()
    }

    /// Rows of the aggregate table.
    pub fn num_rows(&self) -> usize {
        2 * self.subtables.iter().map(Vec::len).sum::<usize>()
    }

    /// Rows of the newest subtable.
    pub fn current_subtable_rows(&self) -> usize {
        self.subtables.first().map_or(0, |s| 2 * s.len())
    }

    pub fn aggregate_columns(&self) -> Vec<Vec<F>> {
        table_columns(self.subtables.iter())
    }

    pub fn current_subtable_columns(&self) -> Vec<Vec<F>> {
        table_columns(self.subtables.iter().take(1))
    }

    pub fn previous_columns(&self) -> Vec<Vec<F>> {
        table_columns(self.subtables.iter().skip(1))
    }
}

/// Power-of-two capacity holding `rows` coefficients.
fn table_capacity(rows: usize) -> usize {
    rows.next_power_of_two().max(2)
}

fn column_polys(columns: Vec<Vec<F>>, virtual_size: usize) -> Vec<Polynomial<F>> {
    columns.into_iter().map(|c| Polynomial::from_coefficients(c, virtual_size)).collect()
}

fn commit_all(ck: &CommitmentKey, polys: &[Polynomial<F>]) -> Result<Vec<Commitment>, PcsError> {
    polys.iter().map(|p| ck.commit(p)).collect()
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct MergeProof {
    /// Rows `m` of the prepended subtable.
    pub subtable_rows: u64,
    pub subtable_comms: Vec<Commitment>,
    pub previous_table_comms: Vec<Commitment>,
    pub table_comms: Vec<Commitment>,
    /// Per column: `t_j(κ), T_prev,j(κ), T_j(κ)`.
    pub evaluations: Vec<F>,
    /// Opening of the α-batched polynomial at κ.
    pub opening: OpeningProof,
}

impl MergeProof {
    /// Commitments in evaluation order.
    fn ordered_comms(&self) -> Vec<Commitment> {
        (0..NUM_TABLE_COLUMNS)
            .flat_map(|j| [self.subtable_comms[j], self.previous_table_comms[j], self.table_comms[j]])
            .collect()
    }

    fn check_shape(&self) -> Result<(), GoblinError> {
        let ok = self.subtable_comms.len() == NUM_TABLE_COLUMNS
            && self.previous_table_comms.len() == NUM_TABLE_COLUMNS
            && self.table_comms.len() == NUM_TABLE_COLUMNS
            && self.evaluations.len() == 3 * NUM_TABLE_COLUMNS;
        if ok {
            Ok(())
        } else {
            Err(GoblinError::MalformedProof("merge proof has wrong shape"))
        }
    }
}

/// Challenges `(κ, α)` of a merge proof, replayed from its commitments and evaluations.
pub fn merge_challenges(proof: &MergeProof) -> (F, F) {
    let mut t = Transcript::new(MERGE_TRANSCRIPT);
    t.absorb_counter_l(FsLabel::MergeTableCommit, proof.subtable_rows);
    t.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &proof.subtable_comms);
    t.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &proof.previous_table_comms);
    t.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &proof.table_comms);
    let kappa = t.challenge_f_l(FsLabel::MergeKappa);
    t.absorb_scalars_l(FsLabel::MergeEvals, &proof.evaluations);
    let alpha = t.challenge_f_l(FsLabel::MergeBatching);
    (kappa, alpha)
}

pub struct MergeProver<'a> {
    op_queue: &'a EccOpQueue,
    commitment_key: Arc<CommitmentKey>,
}

impl<'a> MergeProver<'a> {
    pub fn new(op_queue: &'a EccOpQueue, commitment_key: Arc<CommitmentKey>) -> Self {
        Self { op_queue, commitment_key }
    }

    #[instrument(level = "debug", skip_all, fields(rows = self.op_queue.num_rows()))]
    pub fn construct_proof(&self) -> Result<MergeProof, GoblinError> {
        let ck = &self.commitment_key;
        let size = table_capacity(self.op_queue.num_rows());
        let m = self.op_queue.current_subtable_rows();

        let subtable = column_polys(self.op_queue.current_subtable_columns(), size);
        let previous = column_polys(self.op_queue.previous_columns(), size);
        let table = column_polys(self.op_queue.aggregate_columns(), size);

        let mut proof = MergeProof {
            subtable_rows: m as u64,
            subtable_comms: commit_all(ck, &subtable)?,
            previous_table_comms: commit_all(ck, &previous)?,
            table_comms: commit_all(ck, &table)?,
            ..MergeProof::default()
        };

        let mut t = Transcript::new(MERGE_TRANSCRIPT);
        t.absorb_counter_l(FsLabel::MergeTableCommit, proof.subtable_rows);
        t.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &proof.subtable_comms);
        t.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &proof.previous_table_comms);
        t.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &proof.table_comms);
        let kappa = t.challenge_f_l(FsLabel::MergeKappa);

        let ordered: Vec<&Polynomial<F>> = (0..NUM_TABLE_COLUMNS)
            .flat_map(|j| [&subtable[j], &previous[j], &table[j]])
            .collect();
        proof.evaluations = ordered.iter().map(|p| p.evaluate(kappa)).collect();
        t.absorb_scalars_l(FsLabel::MergeEvals, &proof.evaluations);
        let alpha = t.challenge_f_l(FsLabel::MergeBatching);

        let mut batched = Polynomial::new(size, size, 0);
        let mut pow = F::one();
        for p in &ordered {
            batched.add_scaled(p, pow);
            pow *= alpha;
        }
        proof.opening = ck.open(&batched, kappa)?;
        Ok(proof)
    }
}

pub struct MergeVerifier {
    pcs_vk: VerifierCommitmentKey,
}

impl MergeVerifier {
    pub fn new(pcs_vk: VerifierCommitmentKey) -> Self {
        Self { pcs_vk }
    }

    pub fn verify_proof(&self, proof: &MergeProof) -> Result<(), GoblinError> {
        proof.check_shape()?;
        let (kappa, alpha) = merge_challenges(proof);
        let shift = pow_u64(kappa, proof.subtable_rows);
        for j in 0..NUM_TABLE_COLUMNS {
            let e = &proof.evaluations[3 * j..3 * j + 3];
            if e[2] != e[0] + shift * e[1] {
                return Err(GoblinError::Check("merge identity"));
            }
        }
        let batched_comm = Commitment::batch(&proof.ordered_comms(), alpha);
        let mut claimed = F::zero();
        let mut pow = F::one();
        for e in &proof.evaluations {
            claimed += pow * e;
            pow *= alpha;
        }
        pcs::verify_openings(&self.pcs_vk, &[batched_comm], &[kappa], &[claimed], &[proof.opening.clone()], F::one())?;
        Ok(())
    }
}

// ============================================================================
// ECCVM stand-in
// ============================================================================

#[derive(Debug, Clone)]
pub struct EccvmProvingKey {
    pub table_size: usize,
    pub columns: Vec<Polynomial<F>>,
}

impl EccvmProvingKey {
    pub fn new(op_queue: &EccOpQueue) -> Self {
        let table_size = table_capacity(op_queue.num_rows());
        Self { table_size, columns: column_polys(op_queue.aggregate_columns(), table_size) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct EccvmVerificationKey {
    pub table_size: u64,
}

impl From<&EccvmProvingKey> for EccvmVerificationKey {
    fn from(pk: &EccvmProvingKey) -> Self {
        Self { table_size: pk.table_size as u64 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct EccvmProof {
    pub table_comms: Vec<Commitment>,
    pub evaluations: Vec<F>,
    pub opening_proofs: Vec<OpeningProof>,
}

/// Transcript up to and including ζ.
fn eccvm_transcript(table_size: u64, table_comms: &[Commitment]) -> (Transcript, F) {
    let mut t = Transcript::new(ECCVM_TRANSCRIPT);
    t.absorb_counter_l(FsLabel::EccvmTableCommit, table_size);
    t.absorb_vec_commitments_l(FsLabel::EccvmTableCommit, table_comms);
    let zeta = t.challenge_f_l(FsLabel::EccvmZeta);
    (t, zeta)
}

fn prove_eccvm(pk: &EccvmProvingKey, ck: &CommitmentKey) -> Result<EccvmProof, GoblinError> {
    let table_comms = commit_all(ck, &pk.columns)?;
    let (_, zeta) = eccvm_transcript(pk.table_size as u64, &table_comms);
    let opening_proofs = pk
        .columns
        .iter()
        .map(|c| ck.open(c, zeta))
        .collect::<Result<Vec<_>, _>>()?;
    let evaluations = opening_proofs.iter().map(|p| p.value).collect();
    Ok(EccvmProof { table_comms, evaluations, opening_proofs })
}

// ============================================================================
// Translator stand-in
// ============================================================================

#[derive(Debug, Clone)]
pub struct TranslatorProvingKey {
    pub table_size: usize,
    pub columns: Vec<Polynomial<F>>,
}

impl TranslatorProvingKey {
    pub fn new(op_queue: &EccOpQueue) -> Self {
        let table_size = table_capacity(op_queue.num_rows());
        Self { table_size, columns: column_polys(op_queue.aggregate_columns(), table_size) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct TranslatorVerificationKey {
    pub table_size: u64,
}

impl From<&TranslatorProvingKey> for TranslatorVerificationKey {
    fn from(pk: &TranslatorProvingKey) -> Self {
        Self { table_size: pk.table_size as u64 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct TranslatorProof {
    pub batched_comm: Commitment,
    pub evaluation: F,
    pub opening: OpeningProof,
}

fn translator_challenges(table_size: u64, table_comms: &[Commitment], batched_comm: &Commitment) -> (F, F) {
    let mut t = Transcript::new(TRANSLATOR_TRANSCRIPT);
    t.absorb_counter_l(FsLabel::TranslatorBatching, table_size);
    t.absorb_vec_commitments_l(FsLabel::TranslatorBatching, table_comms);
    let beta = t.challenge_f_l(FsLabel::TranslatorBatching);
    t.absorb_commitment_l(FsLabel::TranslatorZeta, batched_comm);
    let zeta = t.challenge_f_l(FsLabel::TranslatorZeta);
    (beta, zeta)
}

fn prove_translator(
    pk: &TranslatorProvingKey,
    ck: &CommitmentKey,
    table_comms: &[Commitment],
) -> Result<TranslatorProof, GoblinError> {
    // β does not depend on the batched commitment, so derive it first.
    let (beta, _) = translator_challenges(pk.table_size as u64, table_comms, &Commitment::identity());
    let mut batched = Polynomial::new(pk.table_size, pk.table_size, 0);
    let mut pow = F::one();
    for c in &pk.columns {
        batched.add_scaled(c, pow);
        pow *= beta;
    }
    let batched_comm = ck.commit(&batched)?;
    let (_, zeta) = translator_challenges(pk.table_size as u64, table_comms, &batched_comm);
    let opening = ck.open(&batched, zeta)?;
    Ok(TranslatorProof { batched_comm, evaluation: opening.value, opening })
}

// ============================================================================
// Goblin
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct GoblinProof {
    pub merge_proof: MergeProof,
    pub eccvm_proof: EccvmProof,
    pub translator_proof: TranslatorProof,
}

#[derive(Debug, Default)]
pub struct Goblin {
    op_queue: EccOpQueue,
    merge_proof: Option<MergeProof>,
    eccvm_key: Option<EccvmProvingKey>,
    translator_key: Option<TranslatorProvingKey>,
}

impl Goblin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op_queue(&self) -> &EccOpQueue {
        &self.op_queue
    }

    pub fn merge_proof(&self) -> Option<&MergeProof> {
        self.merge_proof.as_ref()
    }

    /// Verify the previous merge inside `circuit` (if any), then merge its ops.
    #[instrument(level = "debug", skip_all, fields(subtables = self.op_queue.num_subtables()))]
    pub fn merge(&mut self, circuit: &mut Circuit) -> Result<&MergeProof, GoblinError> {
        if let Some(previous) = &self.merge_proof {
            recursion::verify_merge_in_circuit(circuit, previous);
        }
        self.op_queue.prepend_subtable(circuit.ecc_ops().to_vec());
        let ck = srs_setup::commitment_key(table_capacity(self.op_queue.num_rows()))?;
        let proof = MergeProver::new(&self.op_queue, ck).construct_proof()?;
        Ok(self.merge_proof.insert(proof))
    }

    /// Prove the last merge and the ECCVM / Translator stand-ins.
    #[instrument(level = "debug", skip_all)]
    pub fn prove(&mut self) -> Result<GoblinProof, GoblinError> {
        let merge_proof = self.merge_proof.clone().ok_or(GoblinError::NoMergeProof)?;
        let eccvm_key = EccvmProvingKey::new(&self.op_queue);
        let translator_key = TranslatorProvingKey::new(&self.op_queue);
        let ck = srs_setup::commitment_key(eccvm_key.table_size)?;

        let eccvm_proof = prove_eccvm(&eccvm_key, &ck)?;
        let translator_proof = prove_translator(&translator_key, &ck, &eccvm_proof.table_comms)?;

        self.eccvm_key = Some(eccvm_key);
        self.translator_key = Some(translator_key);
        Ok(GoblinProof { merge_proof, eccvm_proof, translator_proof })
    }

    pub fn eccvm_proving_key(&self) -> Result<&EccvmProvingKey, GoblinError> {
        self.eccvm_key.as_ref().ok_or(GoblinError::MissingProvingKey("ECCVM"))
    }

    pub fn translator_proving_key(&self) -> Result<&TranslatorProvingKey, GoblinError> {
        self.translator_key.as_ref().ok_or(GoblinError::MissingProvingKey("Translator"))
    }
}

pub struct GoblinVerifier {
    eccvm_vk: EccvmVerificationKey,
    translator_vk: TranslatorVerificationKey,
}

impl GoblinVerifier {
    pub fn new(eccvm_vk: EccvmVerificationKey, translator_vk: TranslatorVerificationKey) -> Self {
        Self { eccvm_vk, translator_vk }
    }

    /// `true` iff merge, ECCVM and Translator proofs all verify; failures are logged.
    pub fn verify(&self, proof: &GoblinProof) -> bool {
        match self.verify_r(proof) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(target: "tinyivc::goblin", error = %e, "goblin verification failed");
                false
            }
        }
    }

    pub fn verify_r(&self, proof: &GoblinProof) -> Result<(), GoblinError> {
        let pcs_vk = srs_setup::verifier_key()?;
        MergeVerifier::new(pcs_vk).verify_proof(&proof.merge_proof)?;

        let eccvm = &proof.eccvm_proof;
        if eccvm.table_comms != proof.merge_proof.table_comms {
            return Err(GoblinError::Check("ECCVM table binding"));
        }
        if eccvm.evaluations.len() != NUM_TABLE_COLUMNS || eccvm.opening_proofs.len() != NUM_TABLE_COLUMNS {
            return Err(GoblinError::MalformedProof("ECCVM proof has wrong shape"));
        }
        let (mut t, zeta) = eccvm_transcript(self.eccvm_vk.table_size, &eccvm.table_comms);
        t.absorb_scalars_l(FsLabel::EccvmEvals, &eccvm.evaluations);
        let gamma = t.opening_batch_challenge(&eccvm.opening_proofs);
        pcs::verify_openings(&pcs_vk, &eccvm.table_comms, &[zeta], &eccvm.evaluations, &eccvm.opening_proofs, gamma)?;

        let tr = &proof.translator_proof;
        let (beta, zeta) = translator_challenges(self.translator_vk.table_size, &eccvm.table_comms, &tr.batched_comm);
        if tr.batched_comm != Commitment::batch(&eccvm.table_comms, beta) {
            return Err(GoblinError::Check("Translator batching"));
        }
        pcs::verify_openings(&pcs_vk, &[tr.batched_comm], &[zeta], &[tr.evaluation], &[tr.opening.clone()], F::one())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn merged(goblin: &mut Goblin, seed: u8) -> Circuit {
        srs_setup::init_dev_srs(2);
        let mut rng = StdRng::from_seed([seed; 32]);
        let mut c = Circuit::mock_function_circuit(10, &mut rng);
        goblin.merge(&mut c).unwrap();
        c
    }

    fn verifier_for(goblin: &Goblin) -> GoblinVerifier {
        GoblinVerifier::new(
            goblin.eccvm_proving_key().unwrap().into(),
            goblin.translator_proving_key().unwrap().into(),
        )
    }

    #[test]
    fn queue_prepends_newest_subtable() {
        let mut goblin = Goblin::new();
        let first = merged(&mut goblin, 1);
        let second = merged(&mut goblin, 2);
        let q = goblin.op_queue();
        assert_eq!(q.num_subtables(), 2);
        assert_eq!(q.current_subtable_rows(), 2 * second.ecc_ops().len());
        assert_eq!(q.aggregate_columns()[1][0], second.ecc_ops()[0].x_lo);
        assert_eq!(q.previous_columns()[1][0], first.ecc_ops()[0].x_lo);
    }

    #[test]
    fn merge_proofs_verify_and_chain() {
        let mut goblin = Goblin::new();
        merged(&mut goblin, 3);
        let first = goblin.merge_proof().unwrap().clone();
        assert!(first.previous_table_comms.iter().all(|c| *c == Commitment::identity()));

        let second_circuit = merged(&mut goblin, 4);
        let second = goblin.merge_proof().unwrap().clone();
        assert_eq!(second.previous_table_comms, first.table_comms);
        // The recursive merge verifier was appended before the ops were taken.
        second_circuit.check_circuit().unwrap();

        let vk = srs_setup::verifier_key().unwrap();
        MergeVerifier::new(vk).verify_proof(&second).unwrap();
        let mut bad = second.clone();
        bad.evaluations[2] += F::one();
        assert!(MergeVerifier::new(vk).verify_proof(&bad).is_err());
    }

    #[test]
    fn goblin_proof_verifies_and_binds_table() {
        let mut goblin = Goblin::new();
        assert!(matches!(goblin.prove(), Err(GoblinError::NoMergeProof)));
        assert!(goblin.eccvm_proving_key().is_err());
        merged(&mut goblin, 5);
        merged(&mut goblin, 6);
        let proof = goblin.prove().unwrap();
        let verifier = verifier_for(&goblin);
        assert!(verifier.verify(&proof));

        let mut swapped = proof.clone();
        swapped.eccvm_proof.table_comms.swap(0, 1);
        assert!(!verifier.verify(&swapped));

        let mut wrong_size = GoblinVerifier::new(
            EccvmVerificationKey { table_size: 2 * goblin.eccvm_proving_key().unwrap().table_size as u64 },
            goblin.translator_proving_key().unwrap().into(),
        );
        assert!(!wrong_size.verify(&proof));
        wrong_size = verifier_for(&goblin);
        let mut bad_translator = proof;
        bad_translator.translator_proof.evaluation += F::one();
        assert!(!wrong_size.verify(&bad_translator));
    }

    #[test]
    fn compensated_eccvm_evaluations_are_rejected() {
        let mut goblin = Goblin::new();
        merged(&mut goblin, 7);
        merged(&mut goblin, 8);
        let proof = goblin.prove().unwrap();
        let verifier = verifier_for(&goblin);
        verifier.verify_r(&proof).unwrap();

        let delta = F::from(3u64);
        let mut forged = proof;
        let eccvm = &mut forged.eccvm_proof;
        for (i, d) in [(0, delta), (3, -delta)] {
            eccvm.evaluations[i] += d;
            eccvm.opening_proofs[i].value += d;
        }
        assert!(matches!(verifier.verify_r(&forged), Err(GoblinError::Pcs(PcsError::Pairing))));
    }
}

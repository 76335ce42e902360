//! Fiat–Shamir transcript with domain separation
//!
//! A **deterministic, label-stable** Fiat–Shamir (FS) transform built on BLAKE3
//! with explicit domain-separation tags and length-delimited absorbs. Folding,
//! decider, merge, ECCVM and translator protocols each open their own
//! transcript (distinct instance labels) and replay the same absorb schedule on
//! the prover and verifier side.
//!
//! - **Stable DSTs.** Every absorb is prefixed by a fixed tag and a
//!   human-readable [`FsLabel`].
//! - **Length-delimited items.** Every absorb carries an explicit byte length.
//! - **Clone-before-challenge.** Challenge derivation clones the running hash
//!   state and reads the BLAKE3 XOF, so deriving a challenge never consumes the
//!   absorb state (only the local counter advances).
//!
//! ```
//! use tinyivc::transcript::{Transcript, FsLabel};
//!
//! let mut t1 = Transcript::new("example");
//! t1.absorb_bytes_l(FsLabel::FoldInstance, b"data");
//! let a = t1.challenge_f_l(FsLabel::FoldChallenge);
//!
//! let mut t2 = Transcript::new("example");
//! // Same data but a different label gives a different challenge.
//! t2.absorb_bytes_l(FsLabel::FoldAccumulator, b"data");
//! let b = t2.challenge_f_l(FsLabel::FoldChallenge);
//!
//! assert_ne!(a, b);
//! ```

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use blake3::Hasher;
use std::io::Read;

use crate::{pcs, F};

/// Canonical labels shared by prover and verifier.
///
/// The strings are part of the transcript's stable domain separation. Adding
/// variants is backward-compatible; renaming existing ones is **not**.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsLabel {
    // folding
    FoldAccumulator,
    FoldInstance,
    CrossTermCommit,
    FoldChallenge,
    // decider
    DeciderInstance,
    QuotientCommit,
    DeciderZeta,
    DeciderEvals,
    // goblin merge
    MergeTableCommit,
    MergeKappa,
    MergeEvals,
    MergeBatching,
    // goblin ECCVM / translator
    EccvmTableCommit,
    EccvmZeta,
    EccvmEvals,
    TranslatorBatching,
    TranslatorZeta,
    // KZG opening batches
    OpeningWitness,
    OpeningBatching,
}

impl FsLabel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            FsLabel::FoldAccumulator => "fold_accumulator",
            FsLabel::FoldInstance => "fold_instance",
            FsLabel::CrossTermCommit => "cross_term_commit",
            FsLabel::FoldChallenge => "fold_challenge",
            FsLabel::DeciderInstance => "decider_instance",
            FsLabel::QuotientCommit => "quotient_commit",
            FsLabel::DeciderZeta => "decider_zeta",
            FsLabel::DeciderEvals => "decider_evals",
            FsLabel::MergeTableCommit => "merge_table_commit",
            FsLabel::MergeKappa => "merge_kappa",
            FsLabel::MergeEvals => "merge_evals",
            FsLabel::MergeBatching => "merge_batching",
            FsLabel::EccvmTableCommit => "eccvm_table_commit",
            FsLabel::EccvmZeta => "eccvm_zeta",
            FsLabel::EccvmEvals => "eccvm_evals",
            FsLabel::TranslatorBatching => "translator_batching",
            FsLabel::TranslatorZeta => "translator_zeta",
            FsLabel::OpeningWitness => "opening_witness",
            FsLabel::OpeningBatching => "opening_batching",
        }
    }
}

/// Fiat–Shamir transcript with domain separation (BLAKE3-based).
#[derive(Clone)]
pub struct Transcript {
    /// Domain-separation label for this transcript instance.
    label: &'static str,
    /// Running hash state (BLAKE3).
    hasher: Hasher,
    /// Monotone counter for challenge derivations.
    ctr: u64,
}

impl Transcript {
    /// Create a new transcript with a domain-separation `label`.
    pub fn new(label: &'static str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"TINYIVC.transcript.v1");
        hasher.update(label.as_bytes());
        Self { label, hasher, ctr: 0 }
    }

    // ---------------------------- Absorb (public) -----------------------------

    /// Absorb a PCS commitment using compressed G1 encoding.
    #[inline]
    pub fn absorb_commitment_l(&mut self, label: FsLabel, c: &pcs::Commitment) {
        self.absorb_commitment(label.as_str(), c)
    }

    pub fn absorb_commitment(&mut self, label: &'static str, c: &pcs::Commitment) {
        let bytes = serialize(&c.0);
        self.absorb_bytes(label, &bytes);
    }

    /// Absorb a sequence of commitments as one length-delimited item.
    ///
    /// Encoding: `u64(len) || Σ_i [ u64(commit_i_len) || commit_i_bytes ]`.
    #[inline]
    pub fn absorb_vec_commitments_l(&mut self, label: FsLabel, v: &[pcs::Commitment]) {
        self.absorb_vec_commitments(label.as_str(), v)
    }

    pub fn absorb_vec_commitments(&mut self, label: &'static str, v: &[pcs::Commitment]) {
        let mut buf = Vec::with_capacity(8 + v.len() * 40);
        buf.extend_from_slice(&(v.len() as u64).to_be_bytes());
        for c in v {
            let bytes = serialize(&c.0);
            buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
            buf.extend_from_slice(&bytes);
        }
        self.absorb_bytes(label, &buf);
    }

    #[inline]
    pub fn absorb_bytes_l(&mut self, label: FsLabel, bytes: &[u8]) {
        self.absorb_bytes(label.as_str(), bytes)
    }

    /// Absorb an arbitrary byte slice with a label (length-delimited).
    pub fn absorb_bytes(&mut self, label: &'static str, bytes: &[u8]) {
        self.hasher.update(b"item:");
        self.hasher.update(label.as_bytes());
        self.hasher.update(b":len:");
        self.hasher.update(&(bytes.len() as u64).to_be_bytes());
        self.hasher.update(b":data:");
        self.hasher.update(bytes);
    }

    /// Absorb a field element using compressed canonical serialization.
    #[inline]
    pub fn absorb_scalar_l(&mut self, label: FsLabel, f: &F) {
        let bytes = serialize(f);
        self.absorb_bytes_l(label, &bytes);
    }

    /// Absorb several field elements as one item.
    pub fn absorb_scalars_l(&mut self, label: FsLabel, v: &[F]) {
        let mut buf = Vec::with_capacity(8 + v.len() * 32);
        buf.extend_from_slice(&(v.len() as u64).to_be_bytes());
        for f in v {
            buf.extend_from_slice(&serialize(f));
        }
        self.absorb_bytes_l(label, &buf);
    }

    /// Absorb a big-endian counter (sizes, indices).
    #[inline]
    pub fn absorb_counter_l(&mut self, label: FsLabel, ctr: u64) {
        self.absorb_bytes(label.as_str(), &ctr.to_be_bytes());
    }

    // -------------------------- Challenge (public) ----------------------------

    /// Derive a single field challenge.
    ///
    /// Clones the running state and reads an XOF; only the local derivation
    /// counter advances.
    #[inline]
    pub fn challenge_f_l(&mut self, label: FsLabel) -> F {
        self.challenge_f(label.as_str())
    }

    pub fn challenge_f(&mut self, label: &'static str) -> F {
        let out = hash_to_field(&self.hasher, self.label, label, self.ctr, 1);
        self.ctr = self.ctr.wrapping_add(1);
        out[0]
    }

    /// Absorb the witness commitments of `proofs` and derive the batching
    /// challenge for [`pcs::verify_openings`].
    ///
    /// The claimed values must already be absorbed.
    pub fn opening_batch_challenge(&mut self, proofs: &[pcs::OpeningProof]) -> F {
        let witnesses: Vec<pcs::Commitment> = proofs.iter().map(|p| p.witness_comm).collect();
        self.absorb_vec_commitments_l(FsLabel::OpeningWitness, &witnesses);
        self.challenge_f_l(FsLabel::OpeningBatching)
    }
}

// ------------------------ Internals ------------------------

fn serialize<T: CanonicalSerialize>(value: &T) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(value.compressed_size());
    // Writing into a Vec cannot fail.
    let _ = value.serialize_compressed(&mut bytes);
    bytes
}

/// Derive `k` field elements from a clone of `base` using a fixed DST.
fn hash_to_field(
    base: &Hasher,
    tlabel: &'static str,
    label: &'static str,
    ctr: u64,
    k: usize,
) -> Vec<F> {
    let mut h = base.clone();
    h.update(b"challenge:");
    h.update(b"TINYIVC.v1");
    h.update(b":tlabel:");
    h.update(tlabel.as_bytes());
    h.update(b":label:");
    h.update(label.as_bytes());
    h.update(b":ctr:");
    h.update(&ctr.to_be_bytes());

    // XOF → k * 64 bytes, reduced little-endian.
    let mut xof = h.finalize_xof();
    let mut out = Vec::with_capacity(k);
    let mut buf = [0u8; 64];
    for _ in 0..k {
        let _ = xof.read(&mut buf);
        out.push(F::from_le_bytes_mod_order(&buf));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcs::Commitment;
    use ark_ec::{AffineRepr, CurveGroup};

    #[test]
    fn same_schedule_same_challenges() {
        let mut t1 = Transcript::new("t");
        let mut t2 = Transcript::new("t");
        for t in [&mut t1, &mut t2] {
            t.absorb_counter_l(FsLabel::FoldInstance, 42);
            t.absorb_scalar_l(FsLabel::FoldAccumulator, &F::from(7u64));
        }
        assert_eq!(t1.challenge_f_l(FsLabel::FoldChallenge), t2.challenge_f_l(FsLabel::FoldChallenge));
    }

    #[test]
    fn instance_label_separates_domains() {
        let mut a = Transcript::new("folding");
        let mut b = Transcript::new("decider");
        assert_ne!(a.challenge_f_l(FsLabel::DeciderZeta), b.challenge_f_l(FsLabel::DeciderZeta));
    }

    #[test]
    fn successive_challenges_differ() {
        let mut t = Transcript::new("t");
        let a = t.challenge_f_l(FsLabel::MergeKappa);
        let b = t.challenge_f_l(FsLabel::MergeKappa);
        assert_ne!(a, b);
    }

    #[test]
    fn commitment_vector_binds_order() {
        let g = ark_bn254::G1Affine::generator();
        let c1 = Commitment(g);
        let c2 = Commitment((g.into_group() + g.into_group()).into_affine());

        let mut t1 = Transcript::new("t");
        t1.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &[c1, c2]);
        let mut t2 = Transcript::new("t");
        t2.absorb_vec_commitments_l(FsLabel::MergeTableCommit, &[c2, c1]);
        assert_ne!(t1.challenge_f_l(FsLabel::MergeKappa), t2.challenge_f_l(FsLabel::MergeKappa));
    }
}

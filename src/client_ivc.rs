//! Client IVC: accumulate a sequence of circuits into one proof
//!
//! Each call to [`ClientIvc::accumulate`] mutates the incoming circuit before
//! its proving key is built:
//!
//! 1. if a folding proof exists, the previous fold is verified inside the
//!    circuit ([`recursion::verify_folding_proof_in_circuit`]) and the result
//!    becomes the verifier accumulator;
//! 2. Goblin merges the circuit's ECC ops (verifying the previous merge in
//!    circuit) and the default aggregation object is appended;
//! 3. the proving key is built, reusing the accumulator's commitment key;
//! 4. the key is either the first accumulator or folded into the running one.
//!
//! [`ClientIvc::prove`] packages the last folding proof, a decider proof for
//! the final accumulator and the Goblin proof. [`ClientIvc::verify`] needs no
//! instance: it refolds the verifier accumulator from the proof and the key
//! stack, then runs the decider and Goblin verifiers.
//!
//! An instance is single-writer; callers sharing one across threads must
//! serialize `accumulate` and `prove` themselves.

#![forbid(unsafe_code)]

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use tracing::instrument;

use crate::circuit::{Circuit, CircuitError, MaxBlockSizeTracker, TraceStructure};
use crate::decider::{DeciderError, DeciderProof, DeciderProver, DeciderVerifier};
use crate::folding::{FoldingError, FoldingProof, FoldingProver, FoldingVerifier};
use crate::goblin::{
    EccvmVerificationKey, Goblin, GoblinError, GoblinProof, GoblinVerifier, TranslatorVerificationKey,
};
use crate::keys::{DeciderProvingKey, DeciderVerificationKey, ProvingKeyError, VerificationKey};
use crate::recursion;
use crate::srs_setup::{self, SrsSetupError};

/// Errors from accumulating or proving; verification reports `false` instead.
#[derive(Debug, thiserror::Error)]
pub enum IvcError {
    /// The circuit is unsatisfied or its aggregation object was already set.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// Proving or verification key construction failed.
    #[error(transparent)]
    ProvingKey(#[from] ProvingKeyError),
    /// Folding the new circuit into the accumulator failed.
    #[error(transparent)]
    Folding(#[from] FoldingError),
    /// The decider could not prove the final accumulator.
    #[error(transparent)]
    Decider(#[from] DeciderError),
    /// Goblin proving over the op queue failed.
    #[error(transparent)]
    Goblin(#[from] GoblinError),
    /// No SRS is installed, or it is too small for the circuit.
    #[error(transparent)]
    Srs(#[from] SrsSetupError),
    /// `prove` or a key accessor ran before any `accumulate`.
    #[error("no circuit has been accumulated")]
    NotInitialized,
}

/// Full IVC proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Proof {
    /// Proof of the last fold; empty for a single-circuit session.
    pub folding_proof: FoldingProof,
    /// Decider proof for the final accumulator.
    pub decider_proof: DeciderProof,
    /// Merge, ECCVM and Translator proofs over the op queue.
    pub goblin_proof: GoblinProof,
}

/// Running prover accumulator and the proof of the fold that produced it.
#[derive(Debug, Default)]
pub struct FoldOutput {
    /// `None` until the first circuit is accumulated.
    pub accumulator: Option<DeciderProvingKey>,
    /// Empty until the second circuit.
    pub proof: FoldingProof,
}

/// Accumulation session over circuits sharing one [`TraceStructure`].
#[derive(Debug, Default)]
pub struct ClientIvc {
    trace_structure: TraceStructure,
    fold_output: FoldOutput,
    verifier_accumulator: Option<DeciderVerificationKey>,
    decider_vk: Option<VerificationKey>,
    goblin: Goblin,
    tracker: MaxBlockSizeTracker,
    initialized: bool,
}

impl ClientIvc {
    /// Uninitialized session.
    pub fn new(trace_structure: TraceStructure) -> Self {
        Self { trace_structure, ..Self::default() }
    }

    /// Block layout every accumulated circuit is placed into.
    pub fn trace_structure(&self) -> TraceStructure {
        self.trace_structure
    }

    /// `true` once a circuit has been accumulated.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Prover accumulator and the latest folding proof.
    pub fn fold_output(&self) -> &FoldOutput {
        &self.fold_output
    }

    /// Verifier-side accumulator as of the fold before the last one.
    pub fn verifier_accumulator(&self) -> Option<&DeciderVerificationKey> {
        self.verifier_accumulator.as_ref()
    }

    /// Verification key of the most recently accumulated circuit.
    pub fn decider_vk(&self) -> Option<&VerificationKey> {
        self.decider_vk.as_ref()
    }

    /// Op queue and the Goblin prover state.
    pub fn goblin(&self) -> &Goblin {
        &self.goblin
    }

    /// Largest block sizes seen across accumulated circuits.
    pub fn max_block_sizes(&self) -> &MaxBlockSizeTracker {
        &self.tracker
    }

    /// Blank instance with the same trace structure.
    pub fn reset(&mut self) {
        *self = Self::new(self.trace_structure);
    }

    // ========================================================================
    // Accumulation
    // ========================================================================

    /// Add `circuit` to the session; `circuit` gains the recursive verifiers.
    ///
    /// `precomputed_vk` skips committing to the selectors when given. After an
    /// error the instance must be reset.
    #[instrument(level = "info", skip_all, fields(gates = circuit.num_gates()))]
    pub fn accumulate(&mut self, circuit: &mut Circuit, precomputed_vk: Option<VerificationKey>) -> Result<(), IvcError> {
        if !self.fold_output.proof.is_empty() {
            let (acc, vk) = match (&self.verifier_accumulator, &self.decider_vk) {
                (Some(acc), Some(vk)) => (acc, vk),
                _ => return Err(IvcError::NotInitialized),
            };
            let next = recursion::verify_folding_proof_in_circuit(circuit, acc, vk, &self.fold_output.proof)?;
            self.verifier_accumulator = Some(next);
        }

        self.goblin.merge(circuit)?;
        let agg_obj = recursion::init_default_agg_obj_indices(circuit);
        circuit.add_recursive_proof(agg_obj)?;

        let commitment_key = self.fold_output.accumulator.as_ref().map(|acc| acc.commitment_key().clone());
        let mut key = DeciderProvingKey::new(circuit, self.trace_structure, commitment_key)?;
        self.tracker.update(circuit);

        let vk = match precomputed_vk {
            Some(vk) => vk,
            None => VerificationKey::new(&key.proving_key)?,
        };

        match self.fold_output.accumulator.take() {
            None => {
                key.bind_verification_key(&vk);
                self.verifier_accumulator = Some(DeciderVerificationKey::from(vk.clone()));
                self.fold_output.accumulator = Some(key);
                self.initialized = true;
                tracing::debug!(target: "tinyivc::client_ivc", n = vk.circuit_size, "first circuit seeds the accumulator");
            }
            Some(accumulator) => {
                let result = FoldingProver::new(accumulator, key, &vk).prove()?;
                self.fold_output = FoldOutput { accumulator: Some(result.accumulator), proof: result.proof };
            }
        }
        self.decider_vk = Some(vk);
        Ok(())
    }

    // ========================================================================
    // Proving
    // ========================================================================

    /// Decider proof for the final accumulator plus the Goblin proof, next to
    /// the last folding proof.
    #[instrument(level = "info", skip_all)]
    pub fn prove(&mut self) -> Result<Proof, IvcError> {
        let accumulator = self.fold_output.accumulator.as_ref().ok_or(IvcError::NotInitialized)?;
        self.tracker.log();
        let decider_proof = DeciderProver::new(accumulator).construct_proof()?;
        let goblin_proof = self.goblin.prove()?;
        Ok(Proof { folding_proof: self.fold_output.proof.clone(), decider_proof, goblin_proof })
    }

    /// `[verifier accumulator, last instance]`, the keys [`Self::verify`] expects.
    pub fn verification_key_stack(&self) -> Result<[DeciderVerificationKey; 2], IvcError> {
        match (&self.verifier_accumulator, &self.decider_vk) {
            (Some(acc), Some(vk)) => Ok([acc.clone(), DeciderVerificationKey::from(vk.clone())]),
            _ => Err(IvcError::NotInitialized),
        }
    }

    /// Prove and verify against this instance's own key stack.
    pub fn prove_and_verify(&mut self) -> Result<bool, IvcError> {
        let proof = self.prove()?;
        let stack = self.verification_key_stack()?;
        Ok(self.verify_with_vk_stack(&proof, &stack))
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Verify `proof` with no instance state; failures are logged and yield `false`.
    pub fn verify(
        proof: &Proof,
        accumulator_vk: &DeciderVerificationKey,
        final_vk: &DeciderVerificationKey,
        eccvm_vk: &EccvmVerificationKey,
        translator_vk: &TranslatorVerificationKey,
    ) -> bool {
        let goblin_verified = GoblinVerifier::new(*eccvm_vk, *translator_vk).verify(&proof.goblin_proof);
        let decider_verified = match Self::verify_fold_and_decide(proof, accumulator_vk, final_vk) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(target: "tinyivc::client_ivc", error = %e, "IVC verification failed");
                false
            }
        };
        goblin_verified && decider_verified
    }

    fn verify_fold_and_decide(
        proof: &Proof,
        accumulator_vk: &DeciderVerificationKey,
        final_vk: &DeciderVerificationKey,
    ) -> Result<(), IvcError> {
        let pcs_vk = srs_setup::verifier_key()?;
        let folded = FoldingVerifier::new(accumulator_vk.clone(), final_vk.verification_key.clone())
            .verify_folding_proof(&proof.folding_proof)?;
        DeciderVerifier::new(folded, pcs_vk).verify_proof_r(&proof.decider_proof)?;
        Ok(())
    }

    /// [`Self::verify`] with ECCVM and Translator keys taken from this instance's Goblin.
    pub fn verify_with_vk_stack(&self, proof: &Proof, stack: &[DeciderVerificationKey; 2]) -> bool {
        match self.goblin_verification_keys() {
            Ok((eccvm_vk, translator_vk)) => Self::verify(proof, &stack[0], &stack[1], &eccvm_vk, &translator_vk),
            Err(e) => {
                tracing::warn!(target: "tinyivc::client_ivc", error = %e, "IVC verification failed");
                false
            }
        }
    }

    fn goblin_verification_keys(&self) -> Result<(EccvmVerificationKey, TranslatorVerificationKey), GoblinError> {
        let eccvm = EccvmVerificationKey::from(self.goblin.eccvm_proving_key()?);
        let translator = TranslatorVerificationKey::from(self.goblin.translator_proving_key()?);
        Ok((eccvm, translator))
    }

    /// Harvest the verification key of every circuit by accumulating copies.
    ///
    /// Runs the full accumulation, so it costs as much as a real session; the
    /// instance is reset afterwards.
    pub fn precompute_folding_verification_keys(&mut self, circuits: &[Circuit]) -> Result<Vec<VerificationKey>, IvcError> {
        let mut vks = Vec::with_capacity(circuits.len());
        for circuit in circuits {
            let mut copy = circuit.clone();
            self.accumulate(&mut copy, None)?;
            vks.push(self.decider_vk.clone().ok_or(IvcError::NotInitialized)?);
        }
        self.reset();
        Ok(vks)
    }
}

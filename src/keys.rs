//! Proving and verification keys
//!
//! A [`ProvingKey`] holds the trace of one circuit as Lagrange-basis
//! polynomials over a domain of size `N` (the dyadic circuit size). Each
//! polynomial's island covers only the rows its column actually uses, and
//! every island starts at row 1 or later because row 0 is the zero row.
//!
//! The eight folded polynomials are ordered
//! `q_m, q_l, q_r, q_o, q_c, a, b, c` everywhere in the crate.
//!
//! A [`DeciderProvingKey`] adds the relaxation scalar `u`, the error
//! polynomial `e` and the instance commitments; it is what folding consumes
//! and produces. [`DeciderVerificationKey`] is its verifier-side mirror.

#![forbid(unsafe_code)]

use std::sync::Arc;

use ark_ff::{One, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::circuit::{Circuit, CircuitError, TraceStructure};
use crate::domain::{Domain, DomainError};
use crate::pcs::{Commitment, CommitmentKey, PcsError};
use crate::polynomial::Polynomial;
use crate::srs_setup::{self, SrsSetupError};
use crate::F;

/// `q_m, q_l, q_r, q_o, q_c`.
pub const NUM_SELECTORS: usize = 5;
/// `a, b, c`.
pub const NUM_WIRES: usize = 3;
/// Selectors followed by wires.
pub const NUM_FOLDED_POLYS: usize = NUM_SELECTORS + NUM_WIRES;

/// Errors from building proving or verification keys.
#[derive(Debug, thiserror::Error)]
pub enum ProvingKeyError {
    /// The circuit is unsatisfied or does not fit the trace structure.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// No SRS is installed, or it is too small.
    #[error(transparent)]
    Srs(#[from] SrsSetupError),
    /// Committing the selectors failed.
    #[error(transparent)]
    Pcs(#[from] PcsError),
    /// No evaluation domain of the dyadic size exists.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// A caller-supplied key is smaller than [`commitment_key_size`].
    #[error("commitment key has {available} points, circuit of size {circuit_size} needs {needed}")]
    CommitmentKeyTooSmall {
        /// Points required.
        needed: usize,
        /// Points supplied.
        available: usize,
        /// Dyadic circuit size.
        circuit_size: usize,
    },
}

/// Number of SRS points a circuit of dyadic size `n` needs (quotient included).
pub fn commitment_key_size(n: usize) -> usize {
    2 * n
}

// ============================================================================
// ProvingKey
// ============================================================================

/// Trace polynomials of one circuit.
#[derive(Debug)]
pub struct ProvingKey {
    /// Dyadic size `N`.
    pub circuit_size: usize,
    /// Evaluation domain of size `N`.
    pub domain: Domain<F>,
    /// Row of the first public input.
    pub pub_inputs_offset: usize,
    /// Public input values in declaration order.
    pub public_inputs: Vec<F>,
    /// Positions (within `public_inputs`) of the aggregation object.
    pub recursive_proof_public_input_indices: Vec<u32>,
    /// [`NUM_SELECTORS`] polynomials, islands on the arithmetic block.
    pub selectors: Vec<Polynomial<F>>,
    /// [`NUM_WIRES`] polynomials, islands from row 1 to the end of the arithmetic block.
    pub wires: Vec<Polynomial<F>>,
    /// At least [`commitment_key_size`] points.
    pub commitment_key: Arc<CommitmentKey>,
}

impl ProvingKey {
    /// Build the trace polynomials of `circuit`.
    ///
    /// Uses `commitment_key` when given, otherwise takes one from the installed SRS.
    pub fn new(
        circuit: &Circuit,
        trace_structure: TraceStructure,
        commitment_key: Option<Arc<CommitmentKey>>,
    ) -> Result<Self, ProvingKeyError> {
        circuit.check_circuit()?;
        let layout = circuit.layout(trace_structure)?;
        let n = layout.dyadic_size;
        let domain = Domain::<F>::new_r(n)?;

        let needed = commitment_key_size(n);
        let commitment_key = match commitment_key {
            Some(ck) => ck,
            None => srs_setup::commitment_key(needed)?,
        };
        if commitment_key.len() < needed {
            return Err(ProvingKeyError::CommitmentKeyTooSmall {
                needed,
                available: commitment_key.len(),
                circuit_size: n,
            });
        }

        // Wires span every used row after the zero row.
        let wire_start = 1;
        let wire_end = layout.arithmetic.end.max(wire_start);
        let mut wire_values = vec![vec![F::zero(); wire_end - wire_start]; NUM_WIRES];

        for (k, op) in circuit.ecc_ops().iter().enumerate() {
            for (j, row_vals) in op.wire_rows().iter().enumerate() {
                let row = layout.ecc_op.start + 2 * k + j - wire_start;
                for (w, v) in row_vals.iter().enumerate() {
                    wire_values[w][row] = *v;
                }
            }
        }
        let public_inputs = circuit.public_input_values();
        for (i, v) in public_inputs.iter().enumerate() {
            wire_values[0][layout.pub_inputs.start + i - wire_start] = *v;
        }

        let arith_len = layout.arithmetic.len();
        let mut selector_values = vec![vec![F::zero(); arith_len]; NUM_SELECTORS];
        for (i, g) in circuit.gates().iter().enumerate() {
            let row = layout.arithmetic.start + i - wire_start;
            wire_values[0][row] = circuit.get_variable(g.a)?;
            wire_values[1][row] = circuit.get_variable(g.b)?;
            wire_values[2][row] = circuit.get_variable(g.c)?;
            for (s, q) in [g.q_m, g.q_l, g.q_r, g.q_o, g.q_c].into_iter().enumerate() {
                selector_values[s][i] = q;
            }
        }

        let wires = wire_values
            .into_iter()
            .map(|v| Polynomial::from_island(v, n, wire_start))
            .collect();
        let selectors = selector_values
            .into_iter()
            .map(|v| Polynomial::from_island(v, n, layout.arithmetic.start))
            .collect();

        let recursive_proof_public_input_indices = circuit
            .recursive_proof_public_input_indices()
            .unwrap_or_default()
            .iter()
            .filter_map(|var| circuit.public_inputs().iter().position(|p| p == var))
            .map(|pos| pos as u32)
            .collect();

        tracing::debug!(
            target: "tinyivc::keys",
            circuit_size = n,
            gates = circuit.num_gates(),
            ecc_ops = circuit.ecc_ops().len(),
            public_inputs = public_inputs.len(),
            "proving key built"
        );

        Ok(Self {
            circuit_size: n,
            domain,
            pub_inputs_offset: layout.pub_inputs.start,
            public_inputs,
            recursive_proof_public_input_indices,
            selectors,
            wires,
            commitment_key,
        })
    }

    /// The eight folded polynomials, selectors first.
    pub fn folded_polys(&self) -> Vec<&Polynomial<F>> {
        self.selectors.iter().chain(self.wires.iter()).collect()
    }

    /// Mutable [`Self::folded_polys`].
    pub fn folded_polys_mut(&mut self) -> Vec<&mut Polynomial<F>> {
        self.selectors.iter_mut().chain(self.wires.iter_mut()).collect()
    }

    /// Lagrange-basis commitments to the selectors.
    pub fn commit_selectors(&self) -> Result<Vec<Commitment>, PcsError> {
        self.selectors
            .iter()
            .map(|s| self.commitment_key.commit_lagrange(s, &self.domain).map(|(c, _)| c))
            .collect()
    }

    /// Lagrange-basis commitments to the wires.
    pub fn commit_wires(&self) -> Result<Vec<Commitment>, PcsError> {
        self.wires
            .iter()
            .map(|w| self.commitment_key.commit_lagrange(w, &self.domain).map(|(c, _)| c))
            .collect()
    }
}

// ============================================================================
// VerificationKey
// ============================================================================

/// Circuit shape and selector commitments; all a verifier knows of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct VerificationKey {
    /// Dyadic size `N`.
    pub circuit_size: u64,
    /// `log₂ N`.
    pub log_circuit_size: u64,
    /// Number of public inputs.
    pub num_public_inputs: u64,
    /// Row of the first public input.
    pub pub_inputs_offset: u64,
    /// Positions (within the public inputs) of the aggregation object.
    pub recursive_proof_public_input_indices: Vec<u32>,
    /// One commitment per selector, in folded-polynomial order.
    pub selector_comms: Vec<Commitment>,
}

impl VerificationKey {
    /// Derive the key by committing to the selectors of `pk`.
    pub fn new(pk: &ProvingKey) -> Result<Self, ProvingKeyError> {
        Ok(Self {
            circuit_size: pk.circuit_size as u64,
            log_circuit_size: pk.circuit_size.trailing_zeros() as u64,
            num_public_inputs: pk.public_inputs.len() as u64,
            pub_inputs_offset: pk.pub_inputs_offset as u64,
            recursive_proof_public_input_indices: pk.recursive_proof_public_input_indices.clone(),
            selector_comms: pk.commit_selectors()?,
        })
    }
}

// ============================================================================
// Decider keys (relaxed instances)
// ============================================================================

/// Relaxed instance on the prover side.
///
/// A fresh key has `u = 1`, `e = 0` and is not an accumulator. After the first
/// fold the key is an accumulator and all of its fields are folded values.
#[derive(Debug)]
pub struct DeciderProvingKey {
    /// Trace polynomials; folded in place once this is an accumulator.
    pub proving_key: ProvingKey,
    /// Empty until bound to a verification key.
    pub selector_comms: Vec<Commitment>,
    /// Empty until the wires are committed.
    pub witness_comms: Vec<Commitment>,
    /// Relaxation scalar `u`.
    pub relaxation: F,
    /// Lagrange-basis error polynomial.
    pub error: Polynomial<F>,
    /// Commitment to `error`.
    pub error_comm: Commitment,
    /// Set by the first fold.
    pub is_accumulator: bool,
}

impl DeciderProvingKey {
    /// Fresh key: `u = 1`, `e = 0`, nothing committed.
    pub fn new(
        circuit: &Circuit,
        trace_structure: TraceStructure,
        commitment_key: Option<Arc<CommitmentKey>>,
    ) -> Result<Self, ProvingKeyError> {
        let proving_key = ProvingKey::new(circuit, trace_structure, commitment_key)?;
        let n = proving_key.circuit_size;
        Ok(Self {
            proving_key,
            selector_comms: Vec::new(),
            witness_comms: Vec::new(),
            relaxation: F::one(),
            error: Polynomial::new(0, n, 0),
            error_comm: Commitment::identity(),
            is_accumulator: false,
        })
    }

    /// Dyadic size `N`.
    pub fn circuit_size(&self) -> usize {
        self.proving_key.circuit_size
    }

    /// Key the trace polynomials are committed with.
    pub fn commitment_key(&self) -> &Arc<CommitmentKey> {
        &self.proving_key.commitment_key
    }

    /// Take the selector commitments from `vk` instead of recomputing them.
    pub fn bind_verification_key(&mut self, vk: &VerificationKey) {
        if !self.is_accumulator {
            self.selector_comms = vk.selector_comms.clone();
        }
    }

    /// Commit to the wires if not done yet; returns the witness commitments.
    pub fn commit_witnesses(&mut self) -> Result<&[Commitment], PcsError> {
        if self.witness_comms.is_empty() {
            self.witness_comms = self.proving_key.commit_wires()?;
        }
        Ok(&self.witness_comms)
    }

    /// Selector commitments followed by wire commitments.
    pub fn instance_comms(&self) -> Vec<Commitment> {
        self.selector_comms.iter().chain(self.witness_comms.iter()).copied().collect()
    }
}

/// Relaxed instance on the verifier side.
#[derive(Debug, Clone, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct DeciderVerificationKey {
    /// Key of the most recent circuit folded in.
    pub verification_key: VerificationKey,
    /// Folded selector commitments.
    pub selector_comms: Vec<Commitment>,
    /// Empty until the instance has been folded.
    pub witness_comms: Vec<Commitment>,
    /// Relaxation scalar `u`.
    pub relaxation: F,
    /// Commitment to the error polynomial.
    pub error_comm: Commitment,
    /// Set by the first fold.
    pub is_accumulator: bool,
}

impl From<VerificationKey> for DeciderVerificationKey {
    fn from(verification_key: VerificationKey) -> Self {
        let selector_comms = verification_key.selector_comms.clone();
        Self {
            verification_key,
            selector_comms,
            witness_comms: Vec::new(),
            relaxation: F::one(),
            error_comm: Commitment::identity(),
            is_accumulator: false,
        }
    }
}

impl DeciderVerificationKey {
    /// Dyadic size `N`.
    pub fn circuit_size(&self) -> usize {
        self.verification_key.circuit_size as usize
    }

    /// Selector commitments followed by wire commitments.
    pub fn instance_comms(&self) -> Vec<Commitment> {
        self.selector_comms.iter().chain(self.witness_comms.iter()).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ArithmeticGate;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn trace_rows_follow_layout() {
        srs_setup::init_dev_srs(2);
        let mut c = Circuit::new();
        let x = c.add_public_variable(F::from(9u64));
        let y = c.add_variable(F::from(3u64));
        c.create_mul_gate(y, y, x);
        let pk = ProvingKey::new(&c, TraceStructure::None, None).unwrap();

        // zero row, one public input row, one gate row
        assert_eq!(pk.circuit_size, 4);
        assert_eq!(pk.pub_inputs_offset, 1);
        assert_eq!(pk.wires[0].get(0), F::zero());
        assert_eq!(pk.wires[0].get(1), F::from(9u64));
        assert_eq!(pk.wires[0].get(2), F::from(3u64));
        assert_eq!(pk.wires[2].get(2), F::from(9u64));
        assert_eq!(pk.selectors[0].get(2), F::one());
        assert_eq!(pk.selectors[0].start_index(), 2);
        assert!(pk.folded_polys().iter().all(|p| p.start_index() >= 1));
    }

    #[test]
    fn unsatisfied_circuit_is_rejected() {
        srs_setup::init_dev_srs(2);
        let mut c = Circuit::new();
        let a = c.add_variable(F::from(1u64));
        c.create_arithmetic_gate(ArithmeticGate {
            a,
            b: a,
            c: a,
            q_m: F::zero(),
            q_l: F::zero(),
            q_r: F::zero(),
            q_o: F::zero(),
            q_c: F::one(),
        });
        assert!(matches!(
            ProvingKey::new(&c, TraceStructure::None, None),
            Err(ProvingKeyError::Circuit(CircuitError::UnsatisfiedGate { .. }))
        ));
    }

    #[test]
    fn shared_commitment_key_is_reused() {
        srs_setup::init_dev_srs(2);
        let mut rng = StdRng::from_seed([5u8; 32]);
        let c1 = Circuit::mock_function_circuit(20, &mut rng);
        let c2 = Circuit::mock_function_circuit(30, &mut rng);
        let pk1 = ProvingKey::new(&c1, TraceStructure::SmallTest, None).unwrap();
        let ck = Arc::clone(&pk1.commitment_key);
        let pk2 = ProvingKey::new(&c2, TraceStructure::SmallTest, Some(ck)).unwrap();
        assert!(Arc::ptr_eq(&pk1.commitment_key, &pk2.commitment_key));
        assert_eq!(pk1.circuit_size, pk2.circuit_size);
    }

    #[test]
    fn decider_vk_mirrors_fresh_instance() {
        srs_setup::init_dev_srs(2);
        let mut rng = StdRng::from_seed([6u8; 32]);
        let c = Circuit::mock_function_circuit(8, &mut rng);
        let mut dpk = DeciderProvingKey::new(&c, TraceStructure::None, None).unwrap();
        let vk = VerificationKey::new(&dpk.proving_key).unwrap();
        dpk.bind_verification_key(&vk);
        dpk.commit_witnesses().unwrap();
        let dvk = DeciderVerificationKey::from(vk.clone());
        assert_eq!(dvk.selector_comms, dpk.selector_comms);
        assert_eq!(dpk.instance_comms().len(), NUM_FOLDED_POLYS);
        assert_eq!((dvk.relaxation, dvk.is_accumulator), (F::one(), false));
        assert_eq!(dvk.circuit_size(), vk.circuit_size as usize);
    }
}

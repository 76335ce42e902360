//! Client circuits: witnesses, gates, ECC op queue entries and trace layout
//!
//! A [`Circuit`] is a mutable gate list that the IVC layer extends in place
//! (recursive verifiers, merge verifier, aggregation-object placeholder)
//! before a proving key is built from its final shape.
//!
//! The execution trace has three wires `a, b, c` and five selectors. Rows are
//! laid out in blocks:
//!
//! ```text
//! row 0                 zero row (keeps every column shiftable)
//! ecc_op block          2 rows per queued ECC operation
//! pub_inputs block      1 row per public input
//! arithmetic block      1 row per gate: q_m·a·b + q_l·a + q_r·b + q_o·c + q_c = 0
//! ```
//!
//! A [`TraceStructure`] fixes block capacities so that every circuit of a
//! session has the same dyadic size, which folding requires.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::ops::Range;
use std::str::FromStr;

use ark_bn254::{Fq, G1Affine, G1Projective};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, PrimeField, UniformRand, Zero};
use rand::Rng;
use serde::Serialize;

use crate::F;

/// Index of a witness variable.
pub type VarIdx = u32;

#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    #[error("arithmetic gate {gate} is not satisfied")]
    UnsatisfiedGate { gate: usize },
    #[error("variable index {0} out of range")]
    BadVariable(VarIdx),
    #[error("{block} block needs {needed} rows, trace structure allows {capacity}")]
    BlockOverflow { block: &'static str, needed: usize, capacity: usize },
    #[error("circuit already carries a recursive proof aggregation object")]
    AggregationObjectAlreadySet,
    #[error("unknown trace structure {0:?} (expected none, small-test or client-ivc-bench)")]
    UnknownTraceStructure(String),
}

// ============================================================================
// Gates
// ============================================================================

/// `q_m·a·b + q_l·a + q_r·b + q_o·c + q_c = 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticGate {
    pub a: VarIdx,
    pub b: VarIdx,
    pub c: VarIdx,
    pub q_m: F,
    pub q_l: F,
    pub q_r: F,
    pub q_o: F,
    pub q_c: F,
}

// ============================================================================
// ECC op queue entries
// ============================================================================

/// Operation codes of the Goblin ECC op queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EccOpCode {
    /// `acc += P`
    AddAccum = 8,
    /// `acc += z·P`
    MulAccum = 4,
    /// Return `acc` and reset it to the identity.
    EqAndReset = 3,
}

impl EccOpCode {
    pub fn value(self) -> F {
        F::from(self as u8 as u64)
    }
}

/// One queued ECC operation in limb form.
///
/// Coordinates are split into 136-bit limbs and the scalar into 128-bit
/// halves so every value fits the scalar field. The point at infinity maps to
/// all-zero coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UltraOp {
    pub op: EccOpCode,
    pub x_lo: F,
    pub x_hi: F,
    pub y_lo: F,
    pub y_hi: F,
    pub z1: F,
    pub z2: F,
    pub return_is_infinity: bool,
}

const COORD_LO_BYTES: usize = 17; // 136 bits
const SCALAR_LO_BYTES: usize = 16; // 128 bits

fn split_coordinate(v: Fq) -> (F, F) {
    let bytes = v.into_bigint().to_bytes_le();
    let (lo, hi) = bytes.split_at(COORD_LO_BYTES.min(bytes.len()));
    (F::from_le_bytes_mod_order(lo), F::from_le_bytes_mod_order(hi))
}

fn split_scalar(z: F) -> (F, F) {
    let bytes = z.into_bigint().to_bytes_le();
    let (lo, hi) = bytes.split_at(SCALAR_LO_BYTES.min(bytes.len()));
    (F::from_le_bytes_mod_order(lo), F::from_le_bytes_mod_order(hi))
}

impl UltraOp {
    pub fn new(op: EccOpCode, point: G1Affine, scalar: F) -> Self {
        let (x_lo, x_hi, y_lo, y_hi) = if point.infinity {
            (F::zero(), F::zero(), F::zero(), F::zero())
        } else {
            let (x_lo, x_hi) = split_coordinate(point.x);
            let (y_lo, y_hi) = split_coordinate(point.y);
            (x_lo, x_hi, y_lo, y_hi)
        };
        let (z1, z2) = split_scalar(scalar);
        Self { op, x_lo, x_hi, y_lo, y_hi, z1, z2, return_is_infinity: point.infinity }
    }

    /// The two 4-column rows of the op table: `[op, x_lo, x_hi, y_lo]`, `[0, y_hi, z1, z2]`.
    pub fn table_rows(&self) -> [[F; 4]; 2] {
        [
            [self.op.value(), self.x_lo, self.x_hi, self.y_lo],
            [F::zero(), self.y_hi, self.z1, self.z2],
        ]
    }

    /// Wire values `(a, b, c)` of the two trace rows of this op.
    pub fn wire_rows(&self) -> [[F; 3]; 2] {
        [[self.x_lo, self.x_hi, self.y_lo], [self.y_hi, self.z1, self.z2]]
    }
}

// ============================================================================
// Trace structure and block sizes
// ============================================================================

/// Row counts of the three trace blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockSizes {
    pub ecc_op: usize,
    pub pub_inputs: usize,
    pub arithmetic: usize,
}

impl BlockSizes {
    pub fn total(&self) -> usize {
        self.ecc_op + self.pub_inputs + self.arithmetic
    }
}

/// Fixed block capacities shared by every circuit of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TraceStructure {
    /// Blocks sized to the circuit itself.
    #[default]
    None,
    /// 512-row trace for tests.
    SmallTest,
    /// 2^14-row trace for benchmarks.
    ClientIvcBench,
}

impl TraceStructure {
    pub fn capacities(self) -> Option<BlockSizes> {
        match self {
            TraceStructure::None => None,
            TraceStructure::SmallTest => {
                Some(BlockSizes { ecc_op: 128, pub_inputs: 32, arithmetic: 351 })
            }
            TraceStructure::ClientIvcBench => {
                Some(BlockSizes { ecc_op: 1 << 10, pub_inputs: 64, arithmetic: (1 << 14) - 1 - (1 << 10) - 64 })
            }
        }
    }
}

impl FromStr for TraceStructure {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TraceStructure::None),
            "small-test" => Ok(TraceStructure::SmallTest),
            "client-ivc-bench" => Ok(TraceStructure::ClientIvcBench),
            other => Err(CircuitError::UnknownTraceStructure(other.to_string())),
        }
    }
}

/// Row ranges of each block and the dyadic trace size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLayout {
    pub ecc_op: Range<usize>,
    pub pub_inputs: Range<usize>,
    pub arithmetic: Range<usize>,
    pub dyadic_size: usize,
}

/// Largest block sizes seen across a session's circuits.
///
/// Useful for picking a [`TraceStructure`]; has no effect on proving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaxBlockSizeTracker {
    pub max_sizes: BlockSizes,
    pub num_circuits: usize,
}

impl MaxBlockSizeTracker {
    pub fn update(&mut self, circuit: &Circuit) {
        let s = circuit.block_sizes();
        let m = &mut self.max_sizes;
        m.ecc_op = m.ecc_op.max(s.ecc_op);
        m.pub_inputs = m.pub_inputs.max(s.pub_inputs);
        m.arithmetic = m.arithmetic.max(s.arithmetic);
        self.num_circuits += 1;
    }

    pub fn log(&self) {
        tracing::info!(
            target: "tinyivc::circuit",
            circuits = self.num_circuits,
            ecc_op = self.max_sizes.ecc_op,
            pub_inputs = self.max_sizes.pub_inputs,
            arithmetic = self.max_sizes.arithmetic,
            "minimum structured block sizes"
        );
    }
}

// ============================================================================
// Circuit
// ============================================================================

#[derive(Debug, Clone)]
pub struct Circuit {
    variables: Vec<F>,
    public_inputs: Vec<VarIdx>,
    gates: Vec<ArithmeticGate>,
    ecc_ops: Vec<UltraOp>,
    ecc_accumulator: G1Projective,
    recursive_proof_indices: Option<Vec<VarIdx>>,
    zero_idx: VarIdx,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self {
            variables: vec![F::zero()],
            public_inputs: Vec::new(),
            gates: Vec::new(),
            ecc_ops: Vec::new(),
            ecc_accumulator: G1Projective::zero(),
            recursive_proof_indices: None,
            zero_idx: 0,
        }
    }

    // ---- Witnesses ----

    pub fn add_variable(&mut self, value: F) -> VarIdx {
        self.variables.push(value);
        (self.variables.len() - 1) as VarIdx
    }

    pub fn add_public_variable(&mut self, value: F) -> VarIdx {
        let idx = self.add_variable(value);
        self.public_inputs.push(idx);
        idx
    }

    pub fn get_variable(&self, idx: VarIdx) -> Result<F, CircuitError> {
        self.variables.get(idx as usize).copied().ok_or(CircuitError::BadVariable(idx))
    }

    pub fn zero_idx(&self) -> VarIdx {
        self.zero_idx
    }

    pub fn public_inputs(&self) -> &[VarIdx] {
        &self.public_inputs
    }

    /// Values of the public inputs, in declaration order.
    pub fn public_input_values(&self) -> Vec<F> {
        self.public_inputs.iter().map(|&i| self.variables[i as usize]).collect()
    }

    // ---- Gates ----

    pub fn create_arithmetic_gate(&mut self, gate: ArithmeticGate) {
        self.gates.push(gate);
    }

    /// Constrain `a + b = c`.
    pub fn create_add_gate(&mut self, a: VarIdx, b: VarIdx, c: VarIdx) {
        let one = F::from(1u64);
        self.create_arithmetic_gate(ArithmeticGate {
            a,
            b,
            c,
            q_m: F::zero(),
            q_l: one,
            q_r: one,
            q_o: -one,
            q_c: F::zero(),
        });
    }

    /// Constrain `a · b = c`.
    pub fn create_mul_gate(&mut self, a: VarIdx, b: VarIdx, c: VarIdx) {
        let one = F::from(1u64);
        self.create_arithmetic_gate(ArithmeticGate {
            a,
            b,
            c,
            q_m: one,
            q_l: F::zero(),
            q_r: F::zero(),
            q_o: -one,
            q_c: F::zero(),
        });
    }

    /// Constrain `a = value`.
    pub fn fix_witness(&mut self, a: VarIdx, value: F) {
        let zero = self.zero_idx;
        self.create_arithmetic_gate(ArithmeticGate {
            a,
            b: zero,
            c: zero,
            q_m: F::zero(),
            q_l: F::from(1u64),
            q_r: F::zero(),
            q_o: F::zero(),
            q_c: -value,
        });
    }

    pub fn gates(&self) -> &[ArithmeticGate] {
        &self.gates
    }

    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    // ---- ECC op queue ----

    pub fn queue_ecc_add_accum(&mut self, point: G1Affine) {
        self.ecc_accumulator += point.into_group();
        self.ecc_ops.push(UltraOp::new(EccOpCode::AddAccum, point, F::zero()));
    }

    pub fn queue_ecc_mul_accum(&mut self, point: G1Affine, scalar: F) {
        self.ecc_accumulator += point.into_group() * scalar;
        self.ecc_ops.push(UltraOp::new(EccOpCode::MulAccum, point, scalar));
    }

    /// Queue an equality check against the running accumulator and reset it.
    pub fn queue_ecc_eq(&mut self) -> G1Affine {
        let result = self.ecc_accumulator.into_affine();
        self.ecc_accumulator = G1Projective::zero();
        self.ecc_ops.push(UltraOp::new(EccOpCode::EqAndReset, result, F::zero()));
        result
    }

    pub fn ecc_ops(&self) -> &[UltraOp] {
        &self.ecc_ops
    }

    // ---- Aggregation object ----

    /// Mark the public inputs at `indices` as the recursive-proof aggregation object.
    pub fn add_recursive_proof(&mut self, indices: Vec<VarIdx>) -> Result<(), CircuitError> {
        if self.recursive_proof_indices.is_some() {
            return Err(CircuitError::AggregationObjectAlreadySet);
        }
        self.recursive_proof_indices = Some(indices);
        Ok(())
    }

    pub fn recursive_proof_public_input_indices(&self) -> Option<&[VarIdx]> {
        self.recursive_proof_indices.as_deref()
    }

    // ---- Checks and layout ----

    /// Check every arithmetic gate against the current witness.
    pub fn check_circuit(&self) -> Result<(), CircuitError> {
        for (i, g) in self.gates.iter().enumerate() {
            let a = self.get_variable(g.a)?;
            let b = self.get_variable(g.b)?;
            let c = self.get_variable(g.c)?;
            if !(g.q_m * a * b + g.q_l * a + g.q_r * b + g.q_o * c + g.q_c).is_zero() {
                return Err(CircuitError::UnsatisfiedGate { gate: i });
            }
        }
        Ok(())
    }

    pub fn block_sizes(&self) -> BlockSizes {
        BlockSizes {
            ecc_op: 2 * self.ecc_ops.len(),
            pub_inputs: self.public_inputs.len(),
            arithmetic: self.gates.len(),
        }
    }

    /// Row ranges of the blocks under `structure`.
    pub fn layout(&self, structure: TraceStructure) -> Result<TraceLayout, CircuitError> {
        let used = self.block_sizes();
        let caps = match structure.capacities() {
            None => used,
            Some(caps) => {
                for (block, needed, capacity) in [
                    ("ecc_op", used.ecc_op, caps.ecc_op),
                    ("pub_inputs", used.pub_inputs, caps.pub_inputs),
                    ("arithmetic", used.arithmetic, caps.arithmetic),
                ] {
                    if needed > capacity {
                        return Err(CircuitError::BlockOverflow { block, needed, capacity });
                    }
                }
                caps
            }
        };
        let ecc_start = 1;
        let pub_start = ecc_start + caps.ecc_op;
        let arith_start = pub_start + caps.pub_inputs;
        let total = arith_start + caps.arithmetic;
        Ok(TraceLayout {
            ecc_op: ecc_start..ecc_start + used.ecc_op,
            pub_inputs: pub_start..pub_start + used.pub_inputs,
            arithmetic: arith_start..arith_start + used.arithmetic,
            dyadic_size: total.next_power_of_two().max(2),
        })
    }

    // ---- Mock circuits ----

    /// A function circuit of `num_gates` satisfied gates plus a few ECC ops.
    pub fn mock_function_circuit<R: Rng>(num_gates: usize, rng: &mut R) -> Self {
        let mut circuit = Self::new();
        let mut prev = circuit.add_variable(F::rand(rng));
        for i in 0..num_gates {
            let a_val = circuit.get_variable(prev).unwrap_or_default();
            let b_val = F::rand(rng);
            let b = circuit.add_variable(b_val);
            if i % 2 == 0 {
                let c = circuit.add_variable(a_val + b_val);
                circuit.create_add_gate(prev, b, c);
                prev = c;
            } else {
                let c = circuit.add_variable(a_val * b_val);
                circuit.create_mul_gate(prev, b, c);
                prev = c;
            }
        }
        let p = G1Projective::rand(rng).into_affine();
        circuit.queue_ecc_add_accum(p);
        circuit.queue_ecc_mul_accum(p, F::rand(rng));
        circuit.queue_ecc_eq();
        circuit
    }
}

//! In-circuit verifiers
//!
//! Appends to a client circuit the work of verifying the previous folding and
//! merge proofs. Scalar arithmetic becomes arithmetic gates; group operations
//! (the commitment folds) are deferred to the circuit's ECC op queue, where
//! Goblin picks them up. Challenges are replayed natively through the same
//! transcript schedule as the native verifiers, so the gates reproduce exactly
//! the values those verifiers compute.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ec::AffineRepr;
use ark_ff::{BigInteger, One, PrimeField};
use ark_bn254::G1Affine;

use crate::circuit::{Circuit, VarIdx};
use crate::domain::pow_u64;
use crate::folding::{FoldingError, FoldingProof, FoldingVerifier};
use crate::goblin::{self, MergeProof, NUM_TABLE_COLUMNS};
use crate::keys::{DeciderVerificationKey, VerificationKey};
use crate::F;

/// Bits per aggregation-object limb.
pub const AGG_OBJ_LIMB_BITS: usize = 68;
/// Limbs per base-field coordinate.
pub const AGG_OBJ_LIMBS: usize = 4;
/// Public inputs taken by the aggregation object (two points, two coordinates each).
pub const AGG_OBJ_NUM_PUBLIC_INPUTS: usize = 2 * 2 * AGG_OBJ_LIMBS;

fn coordinate_limbs(x: ark_bn254::Fq) -> [F; AGG_OBJ_LIMBS] {
    let bits = x.into_bigint().to_bits_le();
    let mut limbs = [F::from(0u64); AGG_OBJ_LIMBS];
    for (limb, chunk) in limbs.iter_mut().zip(bits.chunks(AGG_OBJ_LIMB_BITS)) {
        let v = chunk.iter().rev().fold(0u128, |acc, b| (acc << 1) | u128::from(*b));
        *limb = F::from(v);
    }
    limbs
}

/// Add the default pairing-point aggregation object as public inputs.
///
/// The two points are `G` and `−G`, so `e(P₀, [1]₂)·e(P₁, [1]₂) = 1`.
pub fn init_default_agg_obj_indices(circuit: &mut Circuit) -> Vec<VarIdx> {
    let g = G1Affine::generator();
    let points = [g, -g];
    let mut indices = Vec::with_capacity(AGG_OBJ_NUM_PUBLIC_INPUTS);
    for p in points {
        for limb in coordinate_limbs(p.x).into_iter().chain(coordinate_limbs(p.y)) {
            indices.push(circuit.add_public_variable(limb));
        }
    }
    indices
}

/// Verify `proof` inside `circuit` and return the folded verifier accumulator.
///
/// Gates: `r`, `r²`, `r³` and `u' = u + r·1`. ECC ops: for every instance
/// commitment `C₂·r + C₁`, and `E + [T₁]·r + [T₂]·r²` for the error, each
/// closed by an equality op.
pub fn verify_folding_proof_in_circuit(
    circuit: &mut Circuit,
    accumulator: &DeciderVerificationKey,
    incoming_vk: &VerificationKey,
    proof: &FoldingProof,
) -> Result<DeciderVerificationKey, FoldingError> {
    let verified = FoldingVerifier::new(accumulator.clone(), incoming_vk.clone()).verify_folding_proof_detailed(proof)?;
    let r = verified.challenge;

    // ---- scalars ----
    let r_idx = circuit.add_variable(r);
    let r2 = r * r;
    let r2_idx = circuit.add_variable(r2);
    circuit.create_mul_gate(r_idx, r_idx, r2_idx);
    let r3_idx = circuit.add_variable(r2 * r);
    circuit.create_mul_gate(r2_idx, r_idx, r3_idx);

    let one_idx = circuit.add_variable(F::one());
    circuit.fix_witness(one_idx, F::one());
    let scaled_idx = circuit.add_variable(r);
    circuit.create_mul_gate(r_idx, one_idx, scaled_idx);
    let u_idx = circuit.add_variable(accumulator.relaxation);
    let folded_u = accumulator.relaxation + r;
    let folded_u_idx = circuit.add_variable(folded_u);
    circuit.create_add_gate(u_idx, scaled_idx, folded_u_idx);
    debug_assert_eq!(folded_u, verified.accumulator.relaxation);

    // ---- commitments ----
    let acc_comms = accumulator.selector_comms.iter().chain(&verified.accumulator_witness_comms);
    let inc_comms = incoming_vk.selector_comms.iter().chain(&verified.incoming_witness_comms);
    for ((c1, c2), folded) in acc_comms.zip(inc_comms).zip(verified.accumulator.instance_comms()) {
        circuit.queue_ecc_mul_accum(c2.0, r);
        circuit.queue_ecc_add_accum(c1.0);
        let out = circuit.queue_ecc_eq();
        debug_assert_eq!(out, folded.0);
    }
    circuit.queue_ecc_add_accum(accumulator.error_comm.0);
    circuit.queue_ecc_mul_accum(proof.cross_term_comms[0].0, r);
    circuit.queue_ecc_mul_accum(proof.cross_term_comms[1].0, r2);
    let out = circuit.queue_ecc_eq();
    debug_assert_eq!(out, verified.accumulator.error_comm.0);

    Ok(verified.accumulator)
}

/// Constrain the merge identity `T(κ) = t(κ) + κ^m·T_prev(κ)` for every column.
///
/// A proof whose evaluations break the identity leaves `circuit` unsatisfied.
pub fn verify_merge_in_circuit(circuit: &mut Circuit, proof: &MergeProof) {
    let (kappa, _) = goblin::merge_challenges(proof);
    let shift = pow_u64(kappa, proof.subtable_rows);
    let shift_idx = circuit.add_variable(shift);
    for e in proof.evaluations.chunks_exact(3).take(NUM_TABLE_COLUMNS) {
        let t_idx = circuit.add_variable(e[0]);
        let prev_idx = circuit.add_variable(e[1]);
        let shifted_idx = circuit.add_variable(shift * e[1]);
        circuit.create_mul_gate(shift_idx, prev_idx, shifted_idx);
        let table_idx = circuit.add_variable(e[2]);
        circuit.create_add_gate(t_idx, shifted_idx, table_idx);
    }
}

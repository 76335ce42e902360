//! Crate root: public surface, core aliases, and protocol-wide invariants
//!
//! `tinyivc` accumulates a sequence of client circuits into one succinct proof
//! by folding, on top of a dense polynomial engine with sparse storage.
//!
//! ## Invariants
//!
//! - **Field & Curve.** The scalar field is `ark_bn254::Fr` (`F` in this
//!   crate). Commitments use KZG on BN254 (`G1 = ark_bn254::G1Affine`). We
//!   **forbid unsafe** throughout the crate.
//!
//! - **Sparse polynomials.** A [`Polynomial`] stores only its island
//!   `[start, end)` of a conceptual length-`virtual_size` vector; every index
//!   outside the island reads as zero. `share()` and `shifted()` alias the same
//!   backing buffer; the only allocating copy path is
//!   [`VirtualArray::expanded_clone`].
//!
//! - **Trace layout.** Row 0 of every trace is the zero row. Circuits of one
//!   session share a [`TraceStructure`] so that their dyadic sizes agree, which
//!   folding requires.
//!
//! - **Fiat–Shamir (FS).** BLAKE3 with explicit domain separation tags,
//!   length-delimited absorbs, and an XOF for challenges. Every verifier
//!   (native and in-circuit) replays the prover's absorb sequence exactly.
//!
//! ## Session
//!
//! ```no_run
//! use tinyivc::{Circuit, ClientIvc, TraceStructure};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! # fn main() -> Result<(), tinyivc::IvcError> {
//! let mut rng = StdRng::from_seed([7u8; 32]);
//! let mut ivc = ClientIvc::new(TraceStructure::SmallTest);
//! for _ in 0..3 {
//!     let mut circuit = Circuit::mock_function_circuit(32, &mut rng);
//!     ivc.accumulate(&mut circuit, None)?;
//! }
//! assert!(ivc.prove_and_verify()?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Fork-join helpers over the rayon pool (thread count, chunking).
pub mod thread;
/// Shared, sparse backing storage with an island of real memory.
pub mod virtual_array;
/// FFT evaluation domain (vanishing polynomial, NTT, barycentric evaluation).
pub mod domain;
/// Sparse polynomial engine (arithmetic, MLE, Kate, shifted/full views).
pub mod polynomial;
/// SRS setup and management (ceremony files, dev SRS, process-wide install).
pub mod srs_setup;
/// KZG commitments and openings on BN254.
pub mod pcs;
/// Fiat–Shamir transcript (domain-separated hashing, hash→field).
pub mod transcript;
/// Quotient by the vanishing polynomial over an extended domain.
pub mod quotient;
/// Client circuits, ECC op entries and trace structure.
pub mod circuit;
/// Proving, verification and decider keys.
pub mod keys;
/// Relaxed gate relation and folding cross terms.
pub mod relation;
/// Folding prover and verifier.
pub mod folding;
/// Decider prover and verifier for the final accumulator.
pub mod decider;
/// ECC op queue, merge protocol and ECCVM / Translator stand-ins.
pub mod goblin;
/// In-circuit folding and merge verifiers, aggregation object.
pub mod recursion;
/// Accumulate / prove / verify state machine.
pub mod client_ivc;
/// Versioned proof file (magic, version, compressed bundle).
pub mod proof_file;

// ============================================================================
// Canonical aliases and root-level re-exports
// ============================================================================

/// Scalar field used across the crate.
pub type F = ark_bn254::Fr;

/// G1 affine group element used for commitments.
pub type G1 = ark_bn254::G1Affine;

pub use crate::circuit::{Circuit, TraceStructure};
pub use crate::client_ivc::{ClientIvc, IvcError, Proof};
pub use crate::keys::{DeciderVerificationKey, VerificationKey};
pub use crate::pcs::{Commitment, OpeningProof};
pub use crate::polynomial::Polynomial;
pub use crate::virtual_array::VirtualArray;

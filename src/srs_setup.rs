//! Structured Reference String (SRS) setup and management
//!
//! KZG needs G1 powers `[τ⁰·G₁, τ¹·G₁, …, τᵈ·G₁]` and the single G2 element
//! `[τ]·G₂`. Security rests on τ being unknown, so production deployments load
//! the output of a multi-party ceremony (Perpetual Powers of Tau, Aztec
//! Ignition, …) converted to arkworks-compressed files:
//!
//! ```text
//! G1.bin : [G1Affine; degree+1]
//! G2.bin : [G2Affine; 1 or 2]     // [τ·G₂] or [G₂, τ·G₂]
//! ```
//!
//! The loaded SRS is installed once per process with [`install_srs`]; proving
//! code then asks for a [`CommitmentKey`] covering the number of coefficients
//! it needs ([`commitment_key`]) and verifiers ask for a
//! [`VerifierCommitmentKey`] ([`verifier_key`]). Every proving key of one IVC
//! session shares the same `Arc<CommitmentKey>`.
//!
//! Nothing is installed implicitly: until [`install_srs`] runs, key lookups fail
//! with [`SrsSetupError::NotInstalled`]. With the opt-in `dev-srs` feature,
//! [`init_dev_srs`] installs a deterministic SRS (seed 42, τ is **public**) and
//! [`commitment_key`] grows it on demand. Never use it where proof integrity
//! matters.

#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use ark_bn254::{Bn254, Fr, G1Affine, G1Projective, G2Affine};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup, Group};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use blake3::Hasher;

use crate::pcs::{CommitmentKey, VerifierCommitmentKey};

/// Errors that can occur during SRS setup and validation.
#[derive(Debug, thiserror::Error)]
pub enum SrsSetupError {
    /// File I/O error (file not found, permissions, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to deserialize SRS from binary format
    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// SRS failed structural validation
    #[error("SRS validation failed: {0}")]
    Validation(String),

    /// Pairing check failed (corrupted or malicious SRS)
    #[error("pairing check failed: {0}")]
    PairingCheck(String),

    /// No SRS has been installed in this process
    #[error("no SRS installed; call srs_setup::install_srs (or init_dev_srs with the dev-srs feature)")]
    NotInstalled,

    /// The installed SRS is too small for the request
    #[error("installed SRS has {available} G1 powers, {needed} requested")]
    Insufficient {
        /// Requested number of powers.
        needed: usize,
        /// Installed number of powers.
        available: usize,
    },
}

// ============================================================================
// Process-wide SRS
// ============================================================================

struct InstalledSrs {
    ck: Arc<CommitmentKey>,
    g1_powers: Vec<G1Affine>,
    tau_g2: G2Affine,
    /// Set only for the development SRS, which grows on demand.
    #[cfg(any(test, feature = "dev-srs"))]
    dev_tau: Option<Fr>,
}

impl InstalledSrs {
    fn trusted(g1_powers: Vec<G1Affine>, tau_g2: G2Affine) -> Self {
        Self {
            ck: Arc::new(CommitmentKey::new(g1_powers.clone())),
            g1_powers,
            tau_g2,
            #[cfg(any(test, feature = "dev-srs"))]
            dev_tau: None,
        }
    }
}

fn installed() -> MutexGuard<'static, Option<InstalledSrs>> {
    static SRS: OnceLock<Mutex<Option<InstalledSrs>>> = OnceLock::new();
    SRS.get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install a trusted SRS for this process, replacing any previous one.
pub fn install_srs(g1_powers: Vec<G1Affine>, tau_g2: G2Affine) -> Result<(), SrsSetupError> {
    if g1_powers.is_empty() {
        return Err(SrsSetupError::Validation("empty G1 SRS".into()));
    }
    *installed() = Some(InstalledSrs::trusted(g1_powers, tau_g2));
    tracing::info!(target: "tinyivc::srs", "installed trusted SRS");
    Ok(())
}

/// Install (or grow) the deterministic development SRS to at least `num_points` powers.
///
/// A trusted SRS installed through [`install_srs`] is left untouched. This is
/// the only way the development SRS gets installed.
#[cfg(any(test, feature = "dev-srs"))]
pub fn init_dev_srs(num_points: usize) {
    install_or_grow_dev(&mut installed(), num_points);
}

#[cfg(any(test, feature = "dev-srs"))]
fn install_or_grow_dev(slot: &mut Option<InstalledSrs>, num_points: usize) {
    match slot.as_mut() {
        None => {
            let tau = dev_tau();
            let g1_powers = dev_g1_powers(tau, 0, num_points.max(2), G1Projective::generator());
            tracing::warn!(
                target: "tinyivc::srs",
                points = g1_powers.len(),
                "using deterministic development SRS (seed=42, tau is public)"
            );
            *slot = Some(InstalledSrs {
                ck: Arc::new(CommitmentKey::new(g1_powers.clone())),
                g1_powers,
                tau_g2: (G2Projective::generator() * tau).into_affine(),
                dev_tau: Some(tau),
            });
        }
        Some(srs) => {
            let Some(tau) = srs.dev_tau else { return };
            let have = srs.g1_powers.len();
            if have >= num_points {
                return;
            }
            let next = srs.g1_powers[have - 1].into_group() * tau;
            let extra = dev_g1_powers(tau, have, num_points, next);
            srs.g1_powers.extend(extra);
            srs.ck = Arc::new(CommitmentKey::new(srs.g1_powers.clone()));
            tracing::debug!(target: "tinyivc::srs", points = num_points, "grew development SRS");
        }
    }
}

#[cfg(any(test, feature = "dev-srs"))]
use ark_bn254::G2Projective;

#[cfg(any(test, feature = "dev-srs"))]
fn dev_tau() -> Fr {
    use ark_ff::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};
    let mut rng = StdRng::from_seed([42u8; 32]);
    Fr::rand(&mut rng)
}

// Powers from index `from` (whose point is `first`) up to `to`, exclusive.
#[cfg(any(test, feature = "dev-srs"))]
fn dev_g1_powers(tau: Fr, from: usize, to: usize, first: G1Projective) -> Vec<G1Affine> {
    let mut projective = Vec::with_capacity(to.saturating_sub(from));
    let mut cur = first;
    for _ in from..to {
        projective.push(cur);
        cur *= tau;
    }
    G1Projective::normalize_batch(&projective)
}

/// Commitment key covering at least `num_points` coefficients.
///
/// The returned key may be longer than requested; keys are shared, not copied.
/// Fails with [`SrsSetupError::NotInstalled`] until an SRS has been installed.
pub fn commitment_key(num_points: usize) -> Result<Arc<CommitmentKey>, SrsSetupError> {
    commitment_key_in(&mut installed(), num_points)
}

fn commitment_key_in(slot: &mut Option<InstalledSrs>, num_points: usize) -> Result<Arc<CommitmentKey>, SrsSetupError> {
    #[cfg(any(test, feature = "dev-srs"))]
    {
        if slot.as_ref().is_some_and(|s| s.dev_tau.is_some()) {
            install_or_grow_dev(slot, num_points);
        }
    }
    let srs = slot.as_ref().ok_or(SrsSetupError::NotInstalled)?;
    if srs.ck.len() < num_points {
        return Err(SrsSetupError::Insufficient { needed: num_points, available: srs.ck.len() });
    }
    Ok(Arc::clone(&srs.ck))
}

/// Verifier-side group elements of the installed SRS.
pub fn verifier_key() -> Result<VerifierCommitmentKey, SrsSetupError> {
    verifier_key_in(&installed())
}

fn verifier_key_in(slot: &Option<InstalledSrs>) -> Result<VerifierCommitmentKey, SrsSetupError> {
    let srs = slot.as_ref().ok_or(SrsSetupError::NotInstalled)?;
    Ok(VerifierCommitmentKey {
        g1: srs.g1_powers[0],
        g2: <Bn254 as Pairing>::G2::generator().into_affine(),
        tau_g2: srs.tau_g2,
    })
}

// ----------------------- SRS digests (public) -----------------------

fn hash_bytes(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Hasher::new();
    h.update(b"TINYIVC.SRS.v1");
    for p in parts {
        h.update(&((*p).len() as u64).to_be_bytes());
        h.update(p);
    }
    *h.finalize().as_bytes()
}

/// Digest of the installed G1 powers (all-zero if nothing is installed).
pub fn srs_g1_digest() -> [u8; 32] {
    let guard = installed();
    let Some(srs) = guard.as_ref() else { return [0u8; 32] };
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(srs.g1_powers.len() as u64).to_be_bytes());
    for p in &srs.g1_powers {
        // Serialization into a Vec cannot fail.
        let _ = p.serialize_compressed(&mut bytes);
    }
    hash_bytes(&[&bytes])
}

/// Digest of the installed `[τ]G₂` (all-zero if nothing is installed).
pub fn srs_g2_digest() -> [u8; 32] {
    let guard = installed();
    let Some(srs) = guard.as_ref() else { return [0u8; 32] };
    let mut bytes = Vec::new();
    let _ = srs.tau_g2.serialize_compressed(&mut bytes);
    hash_bytes(&[&bytes])
}

/// Compare the installed SRS digests against values published by a ceremony.
pub fn verify_ceremony_digests(
    expected_g1: [u8; 32],
    expected_g2: [u8; 32],
) -> Result<(), SrsSetupError> {
    let actual_g1 = srs_g1_digest();
    let actual_g2 = srs_g2_digest();
    if actual_g1 != expected_g1 {
        return Err(SrsSetupError::Validation(format!(
            "G1 digest mismatch: expected {}, actual {}",
            hex::encode(expected_g1),
            hex::encode(actual_g1)
        )));
    }
    if actual_g2 != expected_g2 {
        return Err(SrsSetupError::Validation(format!(
            "G2 digest mismatch: expected {}, actual {}",
            hex::encode(expected_g2),
            hex::encode(actual_g2)
        )));
    }
    Ok(())
}

// ============================================================================
// File loading and validation
// ============================================================================

/// Load G1 powers from `path` and check degree and generator.
///
/// Point validity is enforced by arkworks deserialization.
pub fn load_and_validate_g1_srs(
    path: impl AsRef<Path>,
    expected_degree: usize,
) -> Result<Vec<G1Affine>, SrsSetupError> {
    let bytes = std::fs::read(path.as_ref())?;
    let powers: Vec<G1Affine> = CanonicalDeserialize::deserialize_compressed(bytes.as_slice())
        .map_err(|e| SrsSetupError::Deserialize(format!("G1 SRS: {e}")))?;

    if powers.len() < expected_degree + 1 {
        return Err(SrsSetupError::Validation(format!(
            "G1 SRS has {} powers, need at least {} for degree {}",
            powers.len(),
            expected_degree + 1,
            expected_degree
        )));
    }
    if powers[0] != G1Projective::generator().into_affine() {
        return Err(SrsSetupError::Validation(
            "G1 SRS first element is not the generator".into(),
        ));
    }
    Ok(powers)
}

/// Check `e([τ]G₁, G₂) = e(G₁, [τ]G₂)`. Expensive; run once per file.
pub fn validate_g1_pairing(g1_powers: &[G1Affine], tau_g2: G2Affine) -> Result<(), SrsSetupError> {
    if g1_powers.len() < 2 {
        return Err(SrsSetupError::Validation(
            "need at least 2 G1 powers for pairing check".into(),
        ));
    }
    let g1_gen = <Bn254 as Pairing>::G1::generator();
    let g2_gen = <Bn254 as Pairing>::G2::generator();
    if Bn254::pairing(g1_powers[1], g2_gen) != Bn254::pairing(g1_gen, tau_g2) {
        return Err(SrsSetupError::PairingCheck(
            "G1 powers do not satisfy e(τG₁, G₂) = e(G₁, τG₂)".into(),
        ));
    }
    Ok(())
}

/// Load `[τ]G₂` from a file holding either `[τ·G₂]` or `[G₂, τ·G₂]`.
pub fn load_and_validate_g2_srs(path: impl AsRef<Path>) -> Result<G2Affine, SrsSetupError> {
    let bytes = std::fs::read(path.as_ref())?;
    let elements: Vec<G2Affine> = CanonicalDeserialize::deserialize_compressed(bytes.as_slice())
        .map_err(|e| SrsSetupError::Deserialize(format!("G2 SRS: {e}")))?;

    let tau_g2 = match elements.as_slice() {
        [] => {
            return Err(SrsSetupError::Validation(
                "G2 SRS file is empty (need at least [τ·G₂])".into(),
            ))
        }
        [tau_g2] => *tau_g2,
        [g2, tau_g2, ..] => {
            if *g2 != <Bn254 as Pairing>::G2::generator().into_affine() {
                return Err(SrsSetupError::Validation(
                    "G2 SRS first element is not the generator (expected [G₂, τ·G₂])".into(),
                ));
            }
            *tau_g2
        }
    };
    if tau_g2.is_zero() {
        return Err(SrsSetupError::Validation(
            "τ·G₂ is the point at infinity".into(),
        ));
    }
    Ok(tau_g2)
}

/// Deterministic development SRS of `degree + 1` G1 powers. τ is **public**.
#[cfg(any(test, feature = "dev-srs"))]
pub fn generate_dev_srs(degree: usize) -> (Vec<G1Affine>, G2Affine) {
    let tau = dev_tau();
    tracing::warn!(target: "tinyivc::srs", degree, "generating development SRS (seed=42, tau is public)");
    let g1_powers = dev_g1_powers(tau, 0, degree + 1, G1Projective::generator());
    let tau_g2 = (G2Projective::generator() * tau).into_affine();
    (g1_powers, tau_g2)
}

/// Save G1 powers in compressed arkworks format.
pub fn save_g1_srs(path: impl AsRef<Path>, powers: &[G1Affine]) -> Result<(), SrsSetupError> {
    let mut bytes = Vec::new();
    powers
        .serialize_compressed(&mut bytes)
        .map_err(|e| SrsSetupError::Validation(format!("G1 serialize: {e}")))?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

/// Save `[G₂, τ·G₂]` in compressed arkworks format.
pub fn save_g2_srs(path: impl AsRef<Path>, tau_g2: G2Affine) -> Result<(), SrsSetupError> {
    let elements = vec![<Bn254 as Pairing>::G2::generator().into_affine(), tau_g2];
    let mut bytes = Vec::new();
    elements
        .serialize_compressed(&mut bytes)
        .map_err(|e| SrsSetupError::Validation(format!("G2 serialize: {e}")))?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_srs_has_expected_structure() {
        let (g1_powers, tau_g2) = generate_dev_srs(16);
        assert_eq!(g1_powers.len(), 17);
        assert_eq!(g1_powers[0], G1Projective::generator().into_affine());
        assert!(!tau_g2.is_zero());
        validate_g1_pairing(&g1_powers, tau_g2).expect("pairing check failed");
    }

    #[test]
    fn growing_the_dev_srs_matches_direct_generation() {
        init_dev_srs(8);
        let ck = commitment_key(40).unwrap();
        let (direct, tau_g2) = generate_dev_srs(39);
        let dense = crate::polynomial::Polynomial::from_island(vec![Fr::from(1u64)], 64, 39);
        let expected = crate::pcs::Commitment(direct[39]);
        assert_eq!(ck.commit(&dense).unwrap(), expected);
        assert_eq!(verifier_key().unwrap().tau_g2, tau_g2);
    }

    #[test]
    fn roundtrip_file_io() {
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let g1_path = dir.path().join("test_G1.bin");
        let g2_path = dir.path().join("test_G2.bin");
        let (g1_orig, g2_orig) = generate_dev_srs(32);
        save_g1_srs(&g1_path, &g1_orig).unwrap();
        save_g2_srs(&g2_path, g2_orig).unwrap();

        assert_eq!(load_and_validate_g1_srs(&g1_path, 32).unwrap(), g1_orig);
        assert_eq!(load_and_validate_g2_srs(&g2_path).unwrap(), g2_orig);

        let err = load_and_validate_g1_srs(&g1_path, 64).unwrap_err();
        assert!(err.to_string().contains("need at least"));
    }

    #[test]
    fn ceremony_digest_mismatch_is_reported() {
        init_dev_srs(4);
        let err = verify_ceremony_digests([0xab; 32], srs_g2_digest()).unwrap_err();
        assert!(err.to_string().contains("G1 digest mismatch"));
    }

    #[test]
    fn lookups_fail_until_an_srs_is_installed() {
        let mut slot = None;
        assert!(matches!(commitment_key_in(&mut slot, 4), Err(SrsSetupError::NotInstalled)));
        assert!(matches!(verifier_key_in(&slot), Err(SrsSetupError::NotInstalled)));

        install_or_grow_dev(&mut slot, 4);
        assert_eq!(commitment_key_in(&mut slot, 64).unwrap().len(), 64);
        assert!(verifier_key_in(&slot).is_ok());

        // A trusted SRS is never extended with dev powers.
        let (g1_powers, tau_g2) = generate_dev_srs(7);
        let mut trusted = Some(InstalledSrs::trusted(g1_powers, tau_g2));
        assert!(matches!(
            commitment_key_in(&mut trusted, 64),
            Err(SrsSetupError::Insufficient { needed: 64, available: 8 })
        ));
    }

    #[test]
    fn rejects_empty_g2_file() {
        use tempfile::NamedTempFile;

        let file = NamedTempFile::new().unwrap();
        let empty: Vec<G2Affine> = vec![];
        let mut bytes = Vec::new();
        empty.serialize_compressed(&mut bytes).unwrap();
        std::fs::write(file.path(), bytes).unwrap();

        let err = load_and_validate_g2_srs(file.path()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_corrupted_g1_file() {
        use tempfile::NamedTempFile;

        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0xffu8; 40]).unwrap();
        assert!(matches!(
            load_and_validate_g1_srs(file.path(), 0),
            Err(SrsSetupError::Deserialize(_))
        ));
    }
}

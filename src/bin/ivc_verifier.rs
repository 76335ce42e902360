//! CLI verifier for `ivc_prover` proof files
//!
//! Reads a strict, versioned proof file:
//!   magic: b"TINYIVC\0" (8 bytes) + u16 version + ark-compressed `ProofBundle`
//!
//! The bundled `[τ]G₂` digest must match the loaded SRS; the verifier then
//! refolds the verifier accumulator and checks the decider and Goblin proofs.
//!
//! ```text
//! ivc_verifier [--proof ivc_proof.bin] [--srs-g1 G1.bin --srs-g2 G2.bin]
//! ```
//!
//! With a ceremony SRS, setting `TINYIVC_SRS_G1_DIGEST` and `TINYIVC_SRS_G2_DIGEST`
//! (hex BLAKE3) checks the loaded files against the published digests.

#![forbid(unsafe_code)]

use std::{env, path::Path};

use anyhow::{anyhow, Context};
use tinyivc::{proof_file, srs_setup};
use tracing_subscriber::EnvFilter;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn parse_digest(hex_str: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_str.trim()).context("digest is not hex")?;
    bytes.try_into().map_err(|_| anyhow!("digest must be 32 bytes"))
}

/// Compare the installed SRS against `TINYIVC_SRS_G1_DIGEST` / `TINYIVC_SRS_G2_DIGEST` when both are set.
fn check_ceremony_digests() -> anyhow::Result<()> {
    if let (Ok(g1), Ok(g2)) = (env::var("TINYIVC_SRS_G1_DIGEST"), env::var("TINYIVC_SRS_G2_DIGEST")) {
        srs_setup::verify_ceremony_digests(parse_digest(&g1)?, parse_digest(&g2)?)?;
        tracing::info!("SRS matches published ceremony digests");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tinyivc=info")))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().collect();
    let proof_path = parse_flag(&args, "--proof").unwrap_or_else(|| "ivc_proof.bin".into());

    match (parse_flag(&args, "--srs-g1"), parse_flag(&args, "--srs-g2")) {
        (Some(g1_path), Some(g2_path)) => {
            // Verification reads only [1]G₁ from the G1 file.
            let g1_powers = srs_setup::load_and_validate_g1_srs(Path::new(&g1_path), 0)
                .with_context(|| format!("load G1 SRS from {g1_path}"))?;
            let tau_g2 = srs_setup::load_and_validate_g2_srs(Path::new(&g2_path))
                .with_context(|| format!("load G2 SRS from {g2_path}"))?;
            if env::var("TINYIVC_VALIDATE_PAIRING").ok().as_deref() == Some("1") {
                srs_setup::validate_g1_pairing(&g1_powers, tau_g2).context("SRS pairing check")?;
                tracing::info!("SRS pairing check passed");
            }
            srs_setup::install_srs(g1_powers, tau_g2)?;
            check_ceremony_digests()?;
        }
        #[cfg(feature = "dev-srs")]
        (None, None) => srs_setup::init_dev_srs(2),
        _ => {
            return Err(anyhow!(
                "--srs-g1 and --srs-g2 must be given together{}",
                if cfg!(feature = "dev-srs") { "" } else { " (required in non-dev builds)" }
            ))
        }
    }

    let bundle = proof_file::read_proof_file(&proof_path).with_context(|| format!("read {proof_path}"))?;
    tracing::info!(file = %proof_path, circuit_size = bundle.final_vk.verification_key.circuit_size, "parsed proof file");

    let loaded = srs_setup::srs_g2_digest();
    if bundle.srs_g2_digest != loaded {
        return Err(anyhow!(
            "SRS G2 digest mismatch: proof expects {}, loaded SRS has {}",
            hex::encode(&bundle.srs_g2_digest),
            hex::encode(loaded)
        ));
    }

    if !bundle.verify() {
        return Err(anyhow!("verification failed"));
    }
    tracing::info!("verification successful");
    println!("Verifier result: ok");
    Ok(())
}

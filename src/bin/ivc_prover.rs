//! CLI prover: accumulate mock client circuits and write a proof file
//!
//! Writes a strict, versioned proof file:
//!   magic: b"TINYIVC\0" (8 bytes) + u16 version + ark-compressed `ProofBundle`
//!
//! ```text
//! ivc_prover --circuits 4 --gates 64 --structure small-test \
//!            [--srs-g1 G1.bin --srs-g2 G2.bin] [--out ivc_proof.bin] [--json]
//! ```
//!
//! Without `--srs-g1/--srs-g2` the deterministic dev SRS is used (dev-srs builds only).
//! With a ceremony SRS, setting `TINYIVC_SRS_G1_DIGEST` and `TINYIVC_SRS_G2_DIGEST`
//! (hex BLAKE3) checks the loaded files against the published digests.

#![forbid(unsafe_code)]

use std::{env, path::Path, time::Instant};

use anyhow::{anyhow, Context};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tinyivc::{
    circuit::{Circuit, MaxBlockSizeTracker, TraceStructure},
    client_ivc::ClientIvc,
    goblin::{EccvmVerificationKey, TranslatorVerificationKey},
    keys::commitment_key_size,
    proof_file::{self, ProofBundle},
    srs_setup,
};
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

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

#[derive(Serialize)]
struct Summary<'a> {
    circuits: usize,
    gates_per_circuit: usize,
    trace_structure: TraceStructure,
    circuit_size: u64,
    max_block_sizes: &'a MaxBlockSizeTracker,
    proof_file: String,
    payload_bytes: usize,
    prove_ms: u128,
    srs_g1_digest: String,
    srs_g2_digest: String,
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

/// Load ceremony files into the process-wide SRS, or fall back to the dev SRS.
fn setup_srs(g1: Option<String>, g2: Option<String>, min_points: usize) -> anyhow::Result<()> {
    match (g1, g2) {
        (Some(g1_path), Some(g2_path)) => {
            let g1_powers = srs_setup::load_and_validate_g1_srs(Path::new(&g1_path), min_points.saturating_sub(1))
                .with_context(|| format!("load G1 SRS from {g1_path}"))?;
            let tau_g2 = srs_setup::load_and_validate_g2_srs(Path::new(&g2_path))
                .with_context(|| format!("load G2 SRS from {g2_path}"))?;
            if env::var("TINYIVC_VALIDATE_PAIRING").ok().as_deref() == Some("1") {
                srs_setup::validate_g1_pairing(&g1_powers, tau_g2).context("SRS pairing check")?;
                tracing::info!("SRS pairing check passed");
            }
            tracing::info!(g1_powers = g1_powers.len(), "loaded ceremony SRS");
            srs_setup::install_srs(g1_powers, tau_g2)?;
            check_ceremony_digests()
        }
        #[cfg(feature = "dev-srs")]
        (None, None) => {
            srs_setup::init_dev_srs(min_points);
            Ok(())
        }
        _ => Err(anyhow!(
            "--srs-g1 and --srs-g2 must be given together{}",
            if cfg!(feature = "dev-srs") { "" } else { " (required in non-dev builds)" }
        )),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tinyivc=info")))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().collect();
    let num_circuits: usize = parse_flag(&args, "--circuits").and_then(|s| s.parse().ok()).unwrap_or(3);
    let gates: usize = parse_flag(&args, "--gates").and_then(|s| s.parse().ok()).unwrap_or(64);
    let structure: TraceStructure = parse_flag(&args, "--structure")
        .unwrap_or_else(|| "small-test".into())
        .parse()?;
    let out = parse_flag(&args, "--out").unwrap_or_else(|| "ivc_proof.bin".into());
    if num_circuits < 2 {
        return Err(anyhow!("--circuits must be at least 2 (a single circuit has no folding proof)"));
    }

    // Structured traces know their size up front; otherwise let the dev SRS grow.
    let min_points = structure.capacities().map_or(2, |c| commitment_key_size(c.total().next_power_of_two()));
    setup_srs(parse_flag(&args, "--srs-g1"), parse_flag(&args, "--srs-g2"), min_points)?;

    let mut rng = StdRng::from_seed([42u8; 32]);
    let mut ivc = ClientIvc::new(structure);
    let started = Instant::now();
    for i in 0..num_circuits {
        let mut circuit = Circuit::mock_function_circuit(gates, &mut rng);
        ivc.accumulate(&mut circuit, None).with_context(|| format!("accumulate circuit {i}"))?;
    }
    let proof = ivc.prove()?;
    let prove_ms = started.elapsed().as_millis();

    let [accumulator_vk, final_vk] = ivc.verification_key_stack()?;
    let goblin = ivc.goblin();
    let bundle = ProofBundle {
        proof,
        accumulator_vk,
        final_vk,
        eccvm_vk: EccvmVerificationKey::from(goblin.eccvm_proving_key()?),
        translator_vk: TranslatorVerificationKey::from(goblin.translator_proving_key()?),
        srs_g2_digest: srs_setup::srs_g2_digest().to_vec(),
    };
    let payload_bytes = proof_file::write_proof_file(&out, &bundle).with_context(|| format!("write {out}"))?;
    tracing::info!(file = %out, payload_bytes, prove_ms, "wrote proof");

    if has_flag(&args, "--json") {
        let summary = Summary {
            circuits: num_circuits,
            gates_per_circuit: gates,
            trace_structure: structure,
            circuit_size: bundle.final_vk.verification_key.circuit_size,
            max_block_sizes: ivc.max_block_sizes(),
            proof_file: out,
            payload_bytes,
            prove_ms,
            srs_g1_digest: hex::encode(srs_setup::srs_g1_digest()),
            srs_g2_digest: hex::encode(srs_setup::srs_g2_digest()),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

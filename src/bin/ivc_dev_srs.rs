//! Generate development SRS files (NOT FOR PRODUCTION)
//!
//! ```text
//! ivc_dev_srs [--degree 32767] [--output-g1 G1.bin] [--output-g2 G2.bin]
//! ```
//!
//! The default degree covers the commitment key of a `client-ivc-bench` session.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Result;
use tinyivc::{
    circuit::TraceStructure,
    keys::commitment_key_size,
    srs_setup::{generate_dev_srs, save_g1_srs, save_g2_srs},
};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();
    let args: Vec<String> = std::env::args().collect();

    let bench_points = TraceStructure::ClientIvcBench
        .capacities()
        .map_or(1 << 15, |c| commitment_key_size(c.total().next_power_of_two()));
    let degree = parse_flag(&args, "--degree").and_then(|s| s.parse().ok()).unwrap_or(bench_points - 1);
    let g1_path = parse_flag(&args, "--output-g1").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("G1.bin"));
    let g2_path = parse_flag(&args, "--output-g2").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("G2.bin"));

    let (g1_powers, tau_g2) = generate_dev_srs(degree);
    save_g1_srs(&g1_path, &g1_powers)?;
    save_g2_srs(&g2_path, tau_g2)?;

    println!("Dev SRS (seed=42, tau is PUBLIC): {} G1 powers", g1_powers.len());
    println!("  {}", g1_path.display());
    println!("  {}", g2_path.display());
    Ok(())
}

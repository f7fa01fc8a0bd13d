//! `check-capabilities`: validate capability fixture files before use.
//!
//! Walks a directory of JSON fixtures, checks each against the client
//! capability schema, and reports every violation with its JSON path.
//! Exits non-zero if any fixture fails, so the check slots into CI.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use lsprobe_fixtures::{all_passed, validate_dir, SCHEMA_VERSION};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<bool> {
    let dir = parse_args()?;
    let reports = validate_dir(&dir)
        .with_context(|| format!("failed to scan fixture directory {}", dir.display()))?;
    if reports.is_empty() {
        bail!("no .json fixtures found in {}", dir.display());
    }

    for report in &reports {
        match &report.violation {
            None => println!("PASS {}", report.path.display()),
            Some(violation) => {
                println!("FAIL {}: {}", report.path.display(), violation);
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        tracing::error!(
            failed,
            total = reports.len(),
            schema = SCHEMA_VERSION,
            "capability fixtures failed validation"
        );
        println!(
            "{} of {} fixtures failed against schema {}",
            failed,
            reports.len(),
            SCHEMA_VERSION
        );
    } else {
        tracing::info!(total = reports.len(), schema = SCHEMA_VERSION, "all fixtures passed");
    }
    Ok(all_passed(&reports))
}

fn parse_args() -> anyhow::Result<PathBuf> {
    let mut args = std::env::args_os().skip(1);
    let dir = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => bail!("usage: check-capabilities <fixtures-dir>"),
    };
    if args.next().is_some() {
        bail!("usage: check-capabilities <fixtures-dir>");
    }
    Ok(dir)
}

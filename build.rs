use anyhow::{Context, Result};
use chrono::TimeZone;
use std::env;
use std::fs;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

const LIBRARY_MANIFEST: &str = "onda/Cargo.toml";

fn main() -> Result<()> {
    emit_git_info()?;

    // Reproducible builds pin the timestamp through SOURCE_DATE_EPOCH
    let built = match env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) => chrono::Utc
            .timestamp_opt(epoch.parse::<i64>()?, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now),
        Err(_) => chrono::Utc::now(),
    };
    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        built.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let codec_version = codec_version_from_metadata()
        .or_else(|_| codec_version_from_manifest())
        .unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=ONDA_VERSION={codec_version}");

    println!("cargo:rerun-if-changed={LIBRARY_MANIFEST}");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    Ok(())
}

fn emit_git_info() -> Result<()> {
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let emitted = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = emitted {
        // Not a git checkout: emit the idempotent defaults instead
        eprintln!("git information unavailable: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }
    Ok(())
}

/// Version of the `onda` workspace member, as reported by `cargo metadata`.
fn codec_version_from_metadata() -> Result<String> {
    let output = Command::new(env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
        .args(["metadata", "--format-version", "1", "--no-deps"])
        .output()?;
    anyhow::ensure!(output.status.success(), "cargo metadata failed");

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    metadata["packages"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|package| package["name"] == "onda")
        .and_then(|package| package["version"].as_str())
        .map(str::to_string)
        .context("onda package not found in metadata")
}

fn codec_version_from_manifest() -> Result<String> {
    let manifest = fs::read_to_string(LIBRARY_MANIFEST)?;
    manifest
        .lines()
        .map(str::trim)
        .find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "version").then(|| value.trim().trim_matches(['"', '\'']).to_string())
        })
        .with_context(|| format!("no version in {LIBRARY_MANIFEST}"))
}

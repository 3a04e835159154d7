//! Workspace automation tasks.
//!
//! Run with: `cargo xtask <command>`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Floe workspace automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all CI checks locally
    Ci,
    /// Validate workspace conventions
    Lint,
    /// Generate coverage report
    Coverage,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Lint => run_lint(),
        Commands::Coverage => run_coverage(),
    }
}

fn run_ci() -> Result<()> {
    println!("Running CI checks...\n");

    run_cmd("cargo", &["fmt", "--check"])?;
    run_cmd("cargo", &["clippy", "--workspace", "--", "-D", "warnings"])?;
    run_cmd("cargo", &["test", "--workspace"])?;
    run_cmd("cargo", &["doc", "--workspace", "--no-deps"])?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn run_lint() -> Result<()> {
    println!("Validating workspace conventions...\n");

    for entry in std::fs::read_dir("crates")? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !name.starts_with("floe-") {
            anyhow::bail!("Crate '{name}' does not follow floe-* naming");
        }
        if name != "floe-test-utils" {
            check_sources(&path.join("src"))
                .with_context(|| format!("Crate '{name}' breaks source conventions"))?;
        }
        let manifest = std::fs::read_to_string(path.join("Cargo.toml"))?;
        let unused = unused_dependencies(&manifest, &read_sources(&path.join("src"))?);
        if !unused.is_empty() {
            anyhow::bail!(
                "Crate '{name}' declares dependencies it never uses: {}",
                unused.join(", ")
            );
        }
    }

    println!("All conventions validated!");
    Ok(())
}

/// Library code propagates errors; `unwrap()` belongs in tests only.
fn check_sources(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            check_sources(&path)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }
        let source = std::fs::read_to_string(&path)?;
        let library = source.split("#[cfg(test)]").next().unwrap_or_default();
        let offending = library
            .lines()
            .enumerate()
            .find(|(_, l)| !l.trim_start().starts_with("//") && l.contains(".unwrap()"));
        if let Some((line, _)) = offending {
            anyhow::bail!("{}:{} calls unwrap() outside tests", path.display(), line + 1);
        }
    }
    Ok(())
}

/// Concatenates every `.rs` file under `dir`.
fn read_sources(dir: &Path) -> Result<String> {
    let mut sources = String::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            sources.push_str(&read_sources(&path)?);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            sources.push_str(&std::fs::read_to_string(&path)?);
        }
    }
    Ok(sources)
}

/// Crate names listed under `[dependencies]`, as Rust identifiers.
fn declared_dependencies(manifest: &str) -> Vec<String> {
    let mut in_dependencies = false;
    let mut names = Vec::new();
    for line in manifest.lines().map(str::trim) {
        if line.starts_with('[') {
            in_dependencies = line == "[dependencies]";
        } else if in_dependencies && !line.starts_with('#') {
            if let Some((name, _)) = line.split_once('=') {
                names.push(name.trim().replace('-', "_"));
            }
        }
    }
    names
}

/// Runtime dependencies that no library source refers to.
fn unused_dependencies(manifest: &str, sources: &str) -> Vec<String> {
    declared_dependencies(manifest)
        .into_iter()
        .filter(|name| {
            !sources.contains(&format!("{name}::")) && !sources.contains(&format!("use {name}"))
        })
        .collect()
}

fn run_coverage() -> Result<()> {
    run_cmd("cargo", &["llvm-cov", "--workspace", "--html"])?;
    println!("\nCoverage report: target/llvm-cov/html/index.html");
    Ok(())
}

fn run_cmd(cmd: &str, args: &[&str]) -> Result<()> {
    println!("$ {} {}", cmd, args.join(" "));
    let status = Command::new(cmd)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("Command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[package]
name = "floe-example"

[dependencies]
floe-core = { workspace = true }
# Ambient
bytes = { workspace = true }
tracing-subscriber = { workspace = true }

[dev-dependencies]
tokio = { workspace = true }
"#;

    #[test]
    fn only_runtime_dependencies_are_declared() {
        assert_eq!(
            declared_dependencies(MANIFEST),
            ["floe_core", "bytes", "tracing_subscriber"]
        );
    }

    #[test]
    fn unreferenced_dependencies_are_reported() {
        let sources = "use floe_core::TableIdent;\nfn init() { tracing_subscriber::fmt().init(); }";
        assert_eq!(unused_dependencies(MANIFEST, sources), ["bytes"]);
        assert!(unused_dependencies(MANIFEST, &format!("{sources}\nuse bytes::Bytes;")).is_empty());
    }
}

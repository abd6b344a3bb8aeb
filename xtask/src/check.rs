//! Workspace-wide quality checks.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use xshell::{Shell, cmd};

/// Library crates scanned for `unwrap`/`expect`.
const LIBRARY_SOURCES: [&str; 4] = [
    "cloud/cloud-types/src",
    "cloud/cloud-gpu/src",
    "cloud/cloud-nns/src",
    "cloud/cloud-geometry/src",
];

type Step = (&'static str, fn(&Shell) -> Result<()>);

const STEPS: [Step; 5] = [
    ("Formatting", run_fmt_check),
    ("Clippy", run_clippy),
    ("Tests", run_tests),
    ("Documentation", run_doc_check),
    ("Safety", run_safety_scan),
];

/// Run every check. In CI mode any failure exits non-zero.
pub fn run(ci_mode: bool) -> Result<()> {
    let sh = Shell::new()?;

    println!();
    println!("{}", "CloudForge Quality Check".bold());
    println!("{}", "========================".bold());
    println!();

    let mut failures = Vec::new();
    for (i, (name, step)) in STEPS.iter().enumerate() {
        println!("{}", format!("Step {}/{}: {name}...", i + 1, STEPS.len()).cyan());
        match step(&sh) {
            Ok(()) => println!("  {} {name}", "✓".green()),
            Err(e) => {
                println!("  {} {name} - {e}", "✗".red());
                failures.push(format!("{name}: {e}"));
            }
        }
    }

    println!();

    if failures.is_empty() {
        println!("{}", "✓ All checks passed!".green().bold());
        return Ok(());
    }

    for f in &failures {
        println!("  - {}", f.red());
    }
    if ci_mode {
        println!("{}", "✗ CI FAILED".red().bold());
        std::process::exit(1);
    }
    println!("{}", "⚠ Some checks failed. Fix before committing.".yellow());
    Ok(())
}

fn run_fmt_check(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo fmt --all -- --check")
        .run()
        .context("Formatting check failed")?;
    Ok(())
}

fn run_clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets --all-features -- -D warnings")
        .run()
        .context("Clippy check failed")?;
    Ok(())
}

fn run_tests(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo test --workspace --all-features")
        .run()
        .context("Tests failed")?;
    Ok(())
}

fn run_doc_check(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo doc --workspace --no-deps --all-features")
        .env("RUSTDOCFLAGS", "-D warnings")
        .run()
        .context("Documentation build failed")?;
    Ok(())
}

fn run_safety_scan(sh: &Shell) -> Result<()> {
    let mut violations = 0;
    for dir in LIBRARY_SOURCES {
        let output = cmd!(sh, "grep -rn --include=*.rs -E \\.(unwrap|expect)\\( {dir}")
            .ignore_status()
            .read()
            .unwrap_or_default();
        violations += count_violations(&output);
    }

    if violations > 0 {
        anyhow::bail!("Found {violations} unwrap/expect calls in library code");
    }
    Ok(())
}

/// Counts grep hits outside comments and test modules.
///
/// Test modules sit at the end of each file, so every hit after a
/// `#[cfg(test)]` line in the same file is skipped.
fn count_violations(grep_output: &str) -> usize {
    let mut count = 0;
    for line in grep_output.lines() {
        let mut parts = line.splitn(3, ':');
        let (Some(file), Some(number), Some(code)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let code = code.trim();
        if code.starts_with("//") {
            continue;
        }
        let in_tests = number
            .parse::<usize>()
            .ok()
            .zip(test_module_start(file))
            .is_some_and(|(line, start)| line > start);
        if !in_tests {
            count += 1;
        }
    }
    count
}

fn test_module_start(file: &str) -> Option<usize> {
    std::fs::read_to_string(file)
        .ok()?
        .lines()
        .position(|l| l.trim() == "#[cfg(test)]")
        .map(|i| i + 1)
}

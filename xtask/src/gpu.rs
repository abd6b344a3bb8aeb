//! GPU test runner.
//!
//! Every test that needs an adapter is `#[ignore = "Requires GPU"]`, so this
//! runs only the ignored set.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use xshell::{Shell, cmd};

/// Run the ignored tests, optionally for one package.
pub fn run(package: Option<&str>) -> Result<()> {
    let sh = Shell::new()?;
    let scope: Vec<String> = match package {
        Some(name) => vec!["-p".to_string(), name.to_string()],
        None => vec!["--workspace".to_string()],
    };

    println!("{}", "Running GPU tests...".cyan());
    cmd!(sh, "cargo test {scope...} -- --ignored")
        .run()
        .context("GPU tests failed")?;
    println!("  {} GPU tests OK", "✓".green());
    Ok(())
}

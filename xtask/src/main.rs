//! CloudForge workspace checks.
//!
//! # Commands
//!
//! - `cargo xtask check` - Run all quality checks
//! - `cargo xtask ci` - Full CI suite, fails on any issue
//! - `cargo xtask gpu` - Run the GPU tests that are ignored by default
//!
//! GPU tests are marked `#[ignore = "Requires GPU"]` so that `cargo test`
//! passes on machines without an adapter.

mod check;
mod gpu;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// CloudForge quality checks
#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Quality checks for CloudForge", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all quality checks across the workspace
    Check {
        /// Run in CI mode (fails on any issue)
        #[arg(long)]
        ci: bool,
    },

    /// Run full CI suite
    Ci,

    /// Run the ignored GPU tests
    Gpu {
        /// Restrict to one crate (e.g., "cloud-nns")
        #[arg(long, short)]
        package: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { ci } => check::run(ci),
        Commands::Ci => check::run(true),
        Commands::Gpu { package } => gpu::run(package.as_deref()),
    }
}

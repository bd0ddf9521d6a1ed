//! filterlab benchmark and manifest checker
//!
//! `run` times every strategy and kernel size of a sample on an offscreen target
//! and reports the mean GPU time of each pass. `check` validates manifests and the
//! shaders they reference without opening a device.
//!
//! # Usage
//! ```bash
//! filterlab-bench run gaussian_filter --frames 200 --json
//! filterlab-bench check --manifest my_sample.yaml
//! ```

mod check;
mod run;

use clap::{Parser, Subcommand};

/// Command-line arguments for the benchmark tool
#[derive(Parser)]
#[command(version, about = "Benchmark and check filterlab samples")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Time the strategies and kernel sizes of a sample
    Run(run::RunArgs),
    /// Validate manifests and their shaders
    Check(check::CheckArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Check(args) => check::check(&args),
    }
}

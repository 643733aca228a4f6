//! Settle CLI: wait for a live page to settle
//!
//! ## Usage
//!
//! ```bash
//! settle wait https://app.test/orders                 # Default 4 minute budget
//! settle wait https://app.test --timeout-ms 30000     # Shorter budget
//! settle wait https://app.test --loader busy-overlay  # App-specific loader class
//! settle config --config settle.yaml                  # Show effective configuration
//! ```

use clap::Parser;
use settle_cli::{init_tracing, run_config, run_wait, Cli, CliConfig, CliResult, Commands};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = CliConfig::from_cli(&cli);
    config.color.apply();
    init_tracing(config.verbosity);

    match cli.command {
        Commands::Wait(args) => run_wait(&config, &args),
        Commands::Config(args) => run_config(&config, &args),
    }
}

//! Settle CLI Library
//!
//! Command-line front end for the settle library: open a page in Chromium,
//! wait for it to settle and print what each stage saw.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, ConfigArgs, OutputFormat, SettleOptions, WaitArgs};
pub use config::{resolve_settle_config, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_report_json, render_report_text};
pub use runner::{init_tracing, run_config, run_wait};

//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Settle: wait for a page to stop loading, re-rendering and fetching
#[derive(Parser, Debug)]
#[command(name = "settle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a URL in Chromium and wait for it to settle
    Wait(WaitArgs),

    /// Show the effective settle configuration
    Config(ConfigArgs),
}

/// Options shared by every command that builds a settle configuration
#[derive(Args, Debug, Clone, Default)]
pub struct SettleOptions {
    /// Overall settle budget in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Extra loader pattern (repeatable); a bare word is a class name
    #[arg(long = "loader", value_name = "PATTERN")]
    pub loaders: Vec<String>,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Arguments for the wait command
#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Page to open
    pub url: String,

    /// Settle options
    #[command(flatten)]
    pub settle: SettleOptions,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the Chromium sandbox (containers/CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium binary to launch
    #[arg(long, value_name = "PATH", env = "CHROMIUM_PATH")]
    pub chromium: Option<String>,

    /// Report format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Settle options
    #[command(flatten)]
    pub settle: SettleOptions,
}

/// Color choice argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Detect from terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_wait() {
        let cli = Cli::parse_from([
            "settle",
            "-vv",
            "wait",
            "https://example.test",
            "--timeout-ms",
            "5000",
            "--loader",
            "busy-overlay",
            "--loader",
            "[data-busy]",
            "--no-sandbox",
            "--format",
            "json",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Wait(args) = cli.command else {
            panic!("expected wait");
        };
        assert_eq!(args.url, "https://example.test");
        assert_eq!(args.settle.timeout_ms, Some(5000));
        assert_eq!(args.settle.loaders, ["busy-overlay", "[data-busy]"]);
        assert!(args.no_sandbox);
        assert!(!args.headed);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_parse_config() {
        let cli = Cli::parse_from(["settle", "config", "--config", "settle.yaml"]);
        let Commands::Config(args) = cli.command else {
            panic!("expected config");
        };
        assert_eq!(args.settle.config, Some(PathBuf::from("settle.yaml")));
        assert_eq!(cli.color, ColorArg::Auto);
    }
}

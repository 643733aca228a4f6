//! CLI configuration

use crate::commands::{Cli, ColorArg, SettleOptions};
use crate::error::CliResult;
use settle::SettleConfig;

/// Verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Quiet - errors only
    Quiet,
    /// Normal - warnings and the summary
    #[default]
    Normal,
    /// Verbose - per-stage outcomes
    Verbose,
    /// Debug - every poll
    Debug,
}

impl Verbosity {
    /// Derive from the `-q` / `-v` flags
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Log filter used when `RUST_LOG` is unset
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "settle=debug,info",
            Self::Debug => "settle=trace,debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Apply to the console crate's global switch
    pub fn apply(self) {
        match self {
            Self::Always => console::set_colors_enabled(true),
            Self::Never => console::set_colors_enabled(false),
            Self::Auto => {}
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Global CLI configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
}

impl CliConfig {
    /// Build from parsed arguments
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            verbosity: Verbosity::from_flags(cli.quiet, cli.verbose),
            color: cli.color.into(),
        }
    }
}

/// Effective settle configuration: file (or defaults), then the
/// environment, then command-line flags
pub fn resolve_settle_config(options: &SettleOptions) -> CliResult<SettleConfig> {
    let base = match &options.config {
        Some(path) => SettleConfig::from_file(path)?,
        None => SettleConfig::default(),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(timeout_ms) = options.timeout_ms {
        config = config.with_timeout(timeout_ms);
    }
    config = config.with_extra_loaders(options.loaders.iter().cloned());
    config.validate()?;
    Ok(config)
}

//! Command-line interface implementation
//!
//! This module provides the CLI entry point. The build itself lives in
//! [`build`]; this module parses flags and sets up diagnostics.

mod build;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::build::BuildMode;

/// Exit codes (invalid arguments exit with 2 through clap)
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;

/// themesmith - Build the asset tree of a documentation-site theme
#[derive(Parser, Debug)]
#[command(name = "themesmith")]
#[command(about = "themesmith - Compile styles and scripts, copy icons, and rewrite templates of a theme")]
#[command(version)]
pub struct Cli {
    /// Keep running and rebuild when sources change
    #[arg(short, long)]
    pub watch: bool,

    /// Skip copying vendor and local assets
    #[arg(long)]
    pub dirty: bool,

    /// Hash outputs and rewrite template references to them
    #[arg(long)]
    pub optimize: bool,

    /// Config file (default: themesmith.toml found upward from the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Source root (overrides config)
    #[arg(long)]
    pub src: Option<PathBuf>,

    /// Output root (overrides config)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Show per-phase progress and debug diagnostics
    #[arg(short, long)]
    pub verbose: bool,

    /// Report progress as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// The build mode selected by the flags.
    pub fn mode(&self) -> BuildMode {
        BuildMode::new(self.watch, self.dirty, self.optimize)
    }
}

/// Install the `tracing` subscriber on stderr.
///
/// `RUST_LOG` takes precedence; otherwise `--verbose` selects `debug`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "themesmith=debug" } else { "themesmith=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    build::run_build(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_combine() {
        let cli = Cli::try_parse_from(["themesmith", "--watch", "--dirty", "--optimize"]).unwrap();
        assert_eq!(cli.mode(), BuildMode::new(true, true, true));

        let cli = Cli::try_parse_from(["themesmith"]).unwrap();
        assert!(cli.mode().is_normal());
    }

    #[test]
    fn test_path_overrides() {
        let cli =
            Cli::try_parse_from(["themesmith", "--src", "theme", "-o", "dist", "--config", "a/themesmith.toml"]).unwrap();
        assert_eq!(cli.src, Some(PathBuf::from("theme")));
        assert_eq!(cli.out, Some(PathBuf::from("dist")));
        assert_eq!(cli.config, Some(PathBuf::from("a/themesmith.toml")));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = Cli::try_parse_from(["themesmith", "--fast"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}

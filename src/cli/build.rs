//! Build command implementation

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use super::{Cli, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::progress::{ConsoleProgress, JsonProgress, ProgressReporter};
use crate::build::{BuildContext, Collaborators, Orchestrator};
use crate::config::loader::{check, default_config, find_config, load_config, merge_cli_overrides, CliOverrides};
use crate::config::ThemeConfig;
use crate::watch::{watch_and_rebuild, WatchOptions};

/// Load the configuration and determine the project root.
///
/// The project root is the directory holding the config file, or the current
/// directory when running on defaults.
fn resolve_config(cli: &Cli) -> Result<(ThemeConfig, PathBuf), crate::config::ConfigError> {
    let cwd = std::env::current_dir()?;
    let (mut config, root) = match cli.config.clone().or_else(find_config) {
        Some(config_path) => {
            tracing::debug!(path = %config_path.display(), "using config");
            let config = load_config(Some(&config_path))?;
            let root = match config_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
                _ => cwd,
            };
            (config, root)
        }
        None => {
            tracing::debug!("no themesmith.toml found, using defaults");
            (default_config(), cwd)
        }
    };

    merge_cli_overrides(&mut config, &CliOverrides { out: cli.out.clone(), src: cli.src.clone() });
    check(&config)?;
    Ok((config, root))
}

fn reporter(cli: &Cli) -> Arc<dyn ProgressReporter> {
    if cli.json {
        Arc::new(JsonProgress::new())
    } else {
        Arc::new(ConsoleProgress::new().with_colors(std::io::stderr().is_terminal()).with_verbose(cli.verbose))
    }
}

/// Run the build command
pub fn run_build(cli: &Cli) -> ExitCode {
    let (config, project_root) = match resolve_config(cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mode = cli.mode();
    let watch_options = WatchOptions::from(&config.watch);
    let collaborators = Collaborators::from_config(&config);
    let context = BuildContext::new(config, project_root).with_mode(mode);
    let orchestrator = Orchestrator::new(context, collaborators).with_progress(reporter(cli));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if mode.watch {
        if !cli.json {
            eprintln!("Watching {} (press Ctrl+C to stop)", orchestrator.context().src_dir().display());
        }
        // only returns on setup failure
        match runtime.block_on(watch_and_rebuild(&orchestrator, watch_options)) {
            Ok(()) => ExitCode::from(EXIT_SUCCESS),
            Err(e) => {
                eprintln!("Watch error: {}", e);
                ExitCode::from(EXIT_ERROR)
            }
        }
    } else {
        // failures are already reported through the progress reporter
        match runtime.block_on(orchestrator.run()) {
            Ok(_) => ExitCode::from(EXIT_SUCCESS),
            Err(_) => ExitCode::from(EXIT_ERROR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_config_from_explicit_path() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("themesmith.toml");
        fs::write(&config_path, "[project]\nname = \"demo\"\nsrc = \"theme\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "themesmith".into(),
            "--config".into(),
            config_path.clone().into_os_string(),
            "--out".into(),
            "dist".into(),
        ])
        .unwrap();
        let (config, root) = resolve_config(&cli).unwrap();

        assert_eq!(root, temp.path());
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.project.src, PathBuf::from("theme"));
        assert_eq!(config.project.out, PathBuf::from("dist"));
    }

    #[test]
    fn test_resolve_config_invalid_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("themesmith.toml");
        fs::write(&config_path, "[project\n").unwrap();

        let cli = Cli::try_parse_from(["themesmith".into(), "--config".into(), config_path.into_os_string()]).unwrap();
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn test_resolve_config_rejects_overlapping_override() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("themesmith.toml");
        fs::write(&config_path, "[project]\nname = \"demo\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "themesmith".into(),
            "--config".into(),
            config_path.into_os_string(),
            "--out".into(),
            "src".into(),
        ])
        .unwrap();
        assert!(matches!(resolve_config(&cli), Err(crate::config::ConfigError::Validation(_))));
    }
}

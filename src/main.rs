//! themesmith - Command-line tool for building the assets of a documentation theme

use std::process::ExitCode;

use themesmith::cli;

fn main() -> ExitCode {
    cli::run()
}

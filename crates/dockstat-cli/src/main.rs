//! CLI entrypoint for the dockstat container inspector.
//!
//! The binary delegates to [`dockstat_cli::run`], which loads configuration,
//! parses the subcommand, talks to the daemon socket and renders the result.

use std::io::{self, IsTerminal, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let stdout_is_terminal = io::stdout().is_terminal();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    dockstat_cli::run(
        std::env::args_os(),
        &mut stdout,
        &mut stderr,
        stdout_is_terminal,
    )
}

//! CLI argument definitions for dockstat.
//!
//! Configuration flags (`--daemon-socket`, `--log-filter` and friends) are
//! stripped before these definitions see the argument list, so only the
//! output selector and the subcommand live here.

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Command-line interface for the dockstat container inspector.
#[derive(Parser, Debug)]
#[command(
    name = "dockstat",
    version,
    about = "Inspect and control containers through the daemon's Unix socket",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    /// Controls how results are rendered.
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto)]
    pub(crate) output: OutputFormat,
    /// The operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations exposed by the CLI.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Lists containers.
    Ps(ListArgs),
    /// Shows the details of one container.
    Inspect(ContainerArgs),
    /// Starts a container.
    Start(ContainerArgs),
    /// Stops a container.
    Stop(ContainerArgs),
    /// Pauses a running container.
    Pause(ContainerArgs),
    /// Resumes a paused container.
    Unpause(ContainerArgs),
    /// Removes a container.
    Rm(ContainerArgs),
    /// Prints daemon version information.
    Version,
    /// Re-lists containers every poll interval.
    Watch(WatchArgs),
}

/// Arguments shared by commands that target one container.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContainerArgs {
    /// Container identifier or name.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
}

/// Arguments for `ps`.
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListArgs {
    /// Includes stopped containers.
    #[arg(short, long)]
    pub(crate) all: bool,
}

/// Arguments for `watch`.
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WatchArgs {
    /// Includes stopped containers.
    #[arg(short, long)]
    pub(crate) all: bool,
    /// Stops after this many refreshes instead of running until interrupted.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub(crate) count: Option<u64>,
}

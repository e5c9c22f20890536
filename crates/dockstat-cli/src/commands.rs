//! Executes parsed commands against the daemon.

use std::io::Write;
use std::thread;
use std::time::Duration;

use dockstat_client::{ApiError, DockerClient, Pending};
use dockstat_config::Config;
use tracing::{debug, warn};

use crate::AppError;
use crate::cli::{CliCommand, ContainerArgs, WatchArgs};
use crate::output::Renderer;

/// Upper bound on how long one command waits for the daemon's answer.
pub(crate) const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to the daemon socket named by `config`.
pub(crate) fn connect(config: &Config) -> Result<DockerClient, AppError> {
    let socket = config.daemon_socket();
    DockerClient::connect(socket.path()).map_err(|source| AppError::Connect {
        endpoint: socket.to_string(),
        source,
    })
}

/// Runs `command` over an established connection and renders its result.
///
/// `watch` replaces `client` with a fresh connection when the old one is
/// lost.
pub(crate) fn execute<W: Write>(
    command: &CliCommand,
    client: &mut DockerClient,
    config: &Config,
    renderer: &mut Renderer<'_, W>,
) -> Result<(), AppError> {
    match command {
        CliCommand::Ps(args) => {
            let containers = wait("ps", client.list_containers(args.all))?;
            renderer.containers(&containers)
        }
        CliCommand::Inspect(ContainerArgs { id }) => {
            let details = wait("inspect", client.container(id))?;
            renderer.details(&details)
        }
        CliCommand::Start(ContainerArgs { id }) => {
            wait("start", client.start_container(id))?;
            renderer.action("start", id)
        }
        CliCommand::Stop(ContainerArgs { id }) => {
            wait("stop", client.stop_container(id))?;
            renderer.action("stop", id)
        }
        CliCommand::Pause(ContainerArgs { id }) => {
            wait("pause", client.pause_container(id))?;
            renderer.action("pause", id)
        }
        CliCommand::Unpause(ContainerArgs { id }) => {
            wait("unpause", client.resume_container(id))?;
            renderer.action("unpause", id)
        }
        CliCommand::Rm(ContainerArgs { id }) => {
            wait("rm", client.remove_container(id))?;
            renderer.action("rm", id)
        }
        CliCommand::Version => {
            let version = wait("version", client.version())?;
            renderer.version(&version)
        }
        CliCommand::Watch(args) => watch(*args, client, config, renderer),
    }
}

/// Re-renders the container list every poll interval.
///
/// A failed refresh is logged and the next tick tries again, over a new
/// connection when the old one is gone. With `--count`, the error of a
/// failed final refresh becomes the command's result.
fn watch<W: Write>(
    args: WatchArgs,
    client: &mut DockerClient,
    config: &Config,
    renderer: &mut Renderer<'_, W>,
) -> Result<(), AppError> {
    let interval = config.poll_interval();
    let mut refreshes = 0u64;
    let mut rendered = false;
    loop {
        if refreshes > 0 {
            thread::sleep(interval);
        }
        refreshes = refreshes.saturating_add(1);
        let outcome = wait("watch", client.list_containers(args.all));
        let last = args.count.is_some_and(|limit| refreshes >= limit);
        match outcome {
            Ok(containers) => {
                if rendered {
                    renderer.separator()?;
                }
                renderer.containers(&containers)?;
                rendered = true;
                debug!(refreshes, count = containers.len(), "container list refreshed");
            }
            Err(error) if last => return Err(error),
            Err(error) => {
                warn!(refreshes, %error, "could not refresh the container list");
                if needs_reconnect(&error) {
                    reconnect(client, config);
                }
            }
        }
        if last {
            return Ok(());
        }
    }
}

fn needs_reconnect(error: &AppError) -> bool {
    matches!(error, AppError::Request { source, .. } if source.requires_reconnect())
}

/// Swaps in a new connection. On failure the closed client is kept, so the
/// next refresh fails fast and retries.
fn reconnect(client: &mut DockerClient, config: &Config) {
    match connect(config) {
        Ok(fresh) => {
            debug!(socket = %fresh.socket(), "reconnected to daemon");
            let stale = std::mem::replace(client, fresh);
            stale.close();
        }
        Err(error) => warn!(%error, "could not reconnect to the daemon"),
    }
}

fn wait<T>(command: &'static str, pending: Pending<T>) -> Result<T, AppError> {
    pending
        .wait_timeout(RESPONSE_TIMEOUT)
        .map_err(|source: ApiError| AppError::Request { command, source })
}

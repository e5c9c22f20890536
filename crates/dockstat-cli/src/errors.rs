//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use dockstat_client::{ApiError, ClientError, ConnectionError};
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: ConnectionError,
    },
    #[error("{command} failed: {source}")]
    Request {
        command: &'static str,
        #[source]
        source: ApiError,
    },
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(#[from] io::Error),
}

impl AppError {
    /// Returns true when the daemon does not appear to be listening.
    ///
    /// Covers refused connections and missing sockets, both at connect time
    /// and when surfaced through a request.
    pub(crate) fn is_daemon_unavailable(&self) -> bool {
        match self {
            Self::Connect { source, .. }
            | Self::Request {
                source: ApiError::Client(ClientError::Connection(source)),
                ..
            } => source.is_daemon_unavailable(),
            _ => false,
        }
    }
}

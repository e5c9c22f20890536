//! Shared configuration for the dockstat tools.
//!
//! Configuration is layered with `ortho_config`: built-in defaults, then an
//! optional configuration file (`--config-path` or `DOCKSTAT_CONFIG_PATH`),
//! then `DOCKSTAT_*` environment variables, and finally command-line flags.
//! Later layers win.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod socket;

pub use defaults::{
    DEFAULT_DAEMON_SOCKET, DEFAULT_LOG_FILTER, DEFAULT_POLL_INTERVAL_SECS, default_daemon_socket,
    default_log_filter, default_log_filter_string, default_log_format,
    default_poll_interval_secs,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{DaemonSocket, SocketParseError};

/// Resolved configuration shared by the client library and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "DOCKSTAT")]
pub struct Config {
    /// Unix domain socket exposed by the container daemon.
    #[serde(default = "default_daemon_socket")]
    #[ortho_config(default = default_daemon_socket())]
    pub daemon_socket: DaemonSocket,
    /// `tracing` filter expression applied to log output.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log record format.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Refresh period, in seconds, used by `watch`.
    #[serde(default = "default_poll_interval_secs")]
    #[ortho_config(default = default_poll_interval_secs())]
    pub poll_interval_secs: u64,
}

impl Config {
    /// Returns the configured daemon socket.
    #[must_use]
    pub fn daemon_socket(&self) -> &DaemonSocket {
        &self.daemon_socket
    }

    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the polling period. Zero is treated as one second.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_daemon_socket(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

use crate::logging::LogFormat;
use crate::socket::DaemonSocket;

/// Socket exposed by a stock Docker Engine installation.
pub const DEFAULT_DAEMON_SOCKET: &str = "/var/run/docker.sock";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Default refresh period, in seconds, for polling commands.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default daemon socket location.
pub fn default_daemon_socket() -> DaemonSocket {
    DaemonSocket::new(DEFAULT_DAEMON_SOCKET)
}

/// Default polling period in seconds.
pub fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

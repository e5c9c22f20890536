use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Filesystem location of the container daemon's Unix domain socket.
///
/// Values may be written either as a bare path (`/var/run/docker.sock`) or in
/// the `unix:///var/run/docker.sock` form used by `DOCKER_HOST`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct DaemonSocket {
    path: Utf8PathBuf,
}

impl DaemonSocket {
    /// Builds a socket reference from a filesystem path.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_path()
    }
}

impl fmt::Display for DaemonSocket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.path)
    }
}

impl FromStr for DaemonSocket {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SocketParseError::Empty);
        }
        if !trimmed.contains("://") {
            return Ok(Self::new(trimmed));
        }

        let url = Url::parse(trimmed)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(SocketParseError::MissingUnixPath(trimmed.to_owned()));
                }
                Ok(Self::new(path))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl TryFrom<String> for DaemonSocket {
    type Error = SocketParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DaemonSocket> for String {
    fn from(socket: DaemonSocket) -> Self {
        socket.path.into_string()
    }
}

/// Errors encountered while parsing a [`DaemonSocket`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// The value was blank.
    #[error("daemon socket must not be empty")]
    Empty,
    /// Scheme was not recognised; only Unix domain sockets are supported.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/var/run/docker.sock", "/var/run/docker.sock")]
    #[case("unix:///var/run/docker.sock", "/var/run/docker.sock")]
    #[case("  /tmp/test.sock ", "/tmp/test.sock")]
    fn parses_paths_and_urls(#[case] input: &str, #[case] expected: &str) {
        let socket: DaemonSocket = input.parse().expect("socket should parse");
        assert_eq!(socket.path(), Utf8Path::new(expected));
    }

    #[test]
    fn display_uses_unix_scheme() {
        let socket = DaemonSocket::new("/tmp/docker.sock");
        assert_eq!(socket.to_string(), "unix:///tmp/docker.sock");
    }

    #[test]
    fn rejects_tcp_endpoints() {
        let error = "tcp://127.0.0.1:2375"
            .parse::<DaemonSocket>()
            .expect_err("tcp should be rejected");
        assert!(matches!(error, SocketParseError::UnsupportedScheme(scheme) if scheme == "tcp"));
    }

    #[test]
    fn rejects_blank_values() {
        assert!(matches!(
            "   ".parse::<DaemonSocket>(),
            Err(SocketParseError::Empty)
        ));
    }

    #[test]
    fn serialises_as_plain_path() {
        let socket = DaemonSocket::new("/run/docker.sock");
        assert_eq!(String::from(socket), "/run/docker.sock");
    }
}

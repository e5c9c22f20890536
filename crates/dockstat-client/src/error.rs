//! Error taxonomy for the transport, framing, and encoding layers.
//!
//! "Not enough bytes yet" is deliberately absent: it is modelled as
//! [`ParseOutcome::NeedMoreData`](crate::ParseOutcome::NeedMoreData) and never
//! leaves the dispatcher.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures raised by the Unix socket transport.
///
/// Variants wrapping [`io::Error`] retain the operating system error code,
/// available through [`ConnectionError::errno`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The socket descriptor could not be created.
    #[error("failed to create client socket: {0}")]
    Socket(#[source] io::Error),
    /// The path does not fit in `sockaddr_un.sun_path`.
    #[error(
        "socket path '{path}' is {length} bytes long; Unix domain sockets accept at most {max}"
    )]
    PathTooLong {
        /// Offending path.
        path: Utf8PathBuf,
        /// Length of the path in bytes.
        length: usize,
        /// Longest path the address structure can hold.
        max: usize,
    },
    /// `connect(2)` failed.
    #[error("failed to connect to daemon socket '{path}': {source}")]
    Connect {
        /// Socket path that was dialled.
        path: Utf8PathBuf,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// Reading from the socket failed.
    #[error("client socket read failed: {0}")]
    Read(#[source] io::Error),
    /// Writing to the socket failed.
    #[error("client socket write failed: {0}")]
    Write(#[source] io::Error),
    /// The daemon closed its end of the connection.
    #[error("daemon closed the connection")]
    PeerClosed,
    /// A read handler is already registered for this connection.
    #[error("a read handler is already registered for this connection")]
    AlreadySubscribed,
    /// The connection is not open.
    #[error("connection is closed")]
    Closed,
}

impl ConnectionError {
    /// Returns the operating system error code, when the failure carries one.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Socket(source)
            | Self::Connect { source, .. }
            | Self::Read(source)
            | Self::Write(source) => source.raw_os_error(),
            Self::PathTooLong { .. } | Self::PeerClosed | Self::AlreadySubscribed | Self::Closed => {
                None
            }
        }
    }

    /// Returns true when the error means the daemon is not listening.
    #[must_use]
    pub fn is_daemon_unavailable(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::AddrNotAvailable
            ),
            _ => false,
        }
    }
}

/// Protocol violations detected while framing a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// The status line or header block could not be decoded.
    #[error("incomplete or invalid header: {0}")]
    InvalidHead(String),
    /// The header block holds more fields than the parser accepts.
    #[error("incomplete or invalid header: more than {0} header fields")]
    TooManyHeaders(usize),
    /// `Content-Length` is not a decimal byte count.
    #[error("invalid Content-Length value '{0}'")]
    InvalidContentLength(String),
    /// `Transfer-Encoding` names a coding other than `chunked`.
    #[error("unsupported transfer encoding '{0}'")]
    UnsupportedTransferEncoding(String),
    /// More body bytes arrived than `Content-Length` declared.
    #[error("body length {actual} exceeds Content-Length {expected}")]
    BodyOverrun {
        /// Declared length.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },
    /// A chunk-size line is not valid hexadecimal.
    #[error("could not decode chunk length")]
    InvalidChunkSize,
    /// A chunk's content does not match its declared size.
    #[error("invalid chunk length, expected {expected} got {actual}")]
    ChunkLengthMismatch {
        /// Size announced by the chunk-size line.
        expected: usize,
        /// Bytes found before the next CRLF.
        actual: usize,
    },
    /// Bytes followed the terminating chunk.
    #[error("{0} unexpected bytes after the final chunk")]
    TrailingBytes(usize),
}

/// Reasons a request cannot be written as an HTTP/1.1 message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The request target is not an origin-form path.
    #[error("could not encode HTTP message: invalid request path '{path}': {reason}")]
    InvalidPath {
        /// Offending path, escaped for display.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// A header name is not an HTTP token.
    #[error("could not encode HTTP message: invalid header name '{0}'")]
    InvalidHeaderName(String),
    /// A header value contains CR, LF, or another control character.
    #[error("could not encode HTTP message: invalid value for header '{0}'")]
    InvalidHeaderValue(String),
}

/// Terminal outcome of a failed exchange, delivered through the completion.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure; the connection is closed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// The response violated HTTP framing; the connection is closed.
    #[error("invalid HTTP message: {0}")]
    Framing(#[from] FramingError),
    /// The request could not be serialised.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl ClientError {
    /// Returns true when the connection must be re-established before the
    /// next request.
    ///
    /// A framing error closes the connection too, since the stream can no
    /// longer be split into responses.
    #[must_use]
    pub const fn requires_reconnect(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Framing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_expose_errno() {
        let error = ConnectionError::Read(io::Error::from_raw_os_error(libc::ECONNRESET));
        assert_eq!(error.errno(), Some(libc::ECONNRESET));
        assert_eq!(ConnectionError::PeerClosed.errno(), None);
    }

    #[test]
    fn chunk_mismatch_message_names_both_lengths() {
        let error = FramingError::ChunkLengthMismatch {
            expected: 5,
            actual: 3,
        };
        assert_eq!(error.to_string(), "invalid chunk length, expected 5 got 3");
    }

    #[test]
    fn connection_and_framing_errors_require_reconnect() {
        assert!(ClientError::from(ConnectionError::Closed).requires_reconnect());
        assert!(ClientError::from(FramingError::InvalidChunkSize).requires_reconnect());
        let encoding = EncodingError::InvalidHeaderName("bad name".to_owned());
        assert!(!ClientError::from(encoding).requires_reconnect());
    }
}

//! Unix domain socket transport for the daemon connection.
//!
//! A [`Transport`] owns one stream socket. Reads happen on a dedicated
//! thread started by [`Transport::subscribe`], which forwards every chunk of
//! received bytes, or the failure that ended the stream, to a single
//! handler. Writes are performed synchronously by the owner.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, warn};

use crate::error::ConnectionError;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Upper bound on the time spent in `connect(2)`.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Lifecycle of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created but not yet connected.
    Unconnected,
    /// Reads and writes are permitted.
    Connected,
    /// Closed by the owner or by an unrecoverable error.
    Closed,
}

/// Notification delivered to the read handler.
#[derive(Debug)]
pub enum ReadEvent {
    /// Bytes received from the daemon, in arrival order.
    Data(Vec<u8>),
    /// The stream ended. No further events follow.
    Failed(ConnectionError),
}

struct Reader {
    cancelled: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// A single connection to the daemon socket.
pub struct Transport {
    path: Utf8PathBuf,
    state: ConnectionState,
    stream: Option<UnixStream>,
    reader: Option<Reader>,
    /// Set by the reader thread once the stream has failed.
    failed: Arc<AtomicBool>,
}

impl Transport {
    /// Creates an unconnected transport for `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: ConnectionState::Unconnected,
            stream: None,
            reader: None,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a transport and connects it.
    ///
    /// # Errors
    ///
    /// See [`Transport::connect`].
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, ConnectionError> {
        let mut transport = Self::new(path);
        transport.connect()?;
        Ok(transport)
    }

    /// Socket path this transport dials.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Current lifecycle state.
    ///
    /// A connection whose reader has reported a failure is `Closed`.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.state == ConnectionState::Connected && self.failed.load(Ordering::SeqCst) {
            return ConnectionState::Closed;
        }
        self.state
    }

    /// Connects to the daemon socket.
    ///
    /// Connecting an already connected transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::PathTooLong`] before any system call when
    /// the path does not fit a socket address, [`ConnectionError::Socket`]
    /// or [`ConnectionError::Connect`] when the operating system refuses, and
    /// [`ConnectionError::Closed`] once the transport has been closed.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(ConnectionError::Closed),
            ConnectionState::Unconnected => {}
        }

        check_path_length(&self.path)?;
        let stream = connect_unix(&self.path)?;
        debug!(target: TRANSPORT_TARGET, path = %self.path, "connected to daemon socket");
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Registers the read handler and starts the reader thread.
    ///
    /// The handler runs on the reader thread. It receives every chunk of
    /// bytes as it arrives and, last, the failure that ended the stream. An
    /// orderly shutdown by the daemon is reported as
    /// [`ConnectionError::PeerClosed`]; no event follows [`Transport::close`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::AlreadySubscribed`] on a second call,
    /// [`ConnectionError::Closed`] when the transport is not connected, and
    /// [`ConnectionError::Socket`] when the reader cannot be started.
    pub fn subscribe<F>(&mut self, handler: F) -> Result<(), ConnectionError>
    where
        F: FnMut(ReadEvent) + Send + 'static,
    {
        if self.reader.is_some() {
            return Err(ConnectionError::AlreadySubscribed);
        }
        let stream = self.connected_stream()?;
        let reader_stream = stream.try_clone().map_err(ConnectionError::Socket)?;
        let cancelled = Arc::new(AtomicBool::new(false));
        let reader_cancelled = Arc::clone(&cancelled);
        let reader_failed = Arc::clone(&self.failed);
        let thread = thread::Builder::new()
            .name("dockstat-read".to_owned())
            .spawn(move || {
                read_loop(reader_stream, &reader_cancelled, &reader_failed, handler);
            })
            .map_err(ConnectionError::Socket)?;
        self.reader = Some(Reader { cancelled, thread });
        Ok(())
    }

    /// Writes every byte of `bytes`.
    ///
    /// Partial writes and interrupted system calls are retried until the
    /// buffer is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] when the transport is not
    /// connected or its reader has failed. A failed write returns [`ConnectionError::Write`] and
    /// closes the transport.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let outcome = self.connected_stream()?.write_all(bytes);
        match outcome {
            Ok(()) => {
                debug!(target: TRANSPORT_TARGET, bytes = bytes.len(), "wrote request");
                Ok(())
            }
            Err(error) => {
                warn!(target: TRANSPORT_TARGET, %error, "write to daemon socket failed");
                self.close();
                Err(ConnectionError::Write(error))
            }
        }
    }

    /// Closes the connection and stops the reader.
    ///
    /// Calling `close` more than once has no further effect.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;

        if let Some(reader) = &self.reader {
            reader.cancelled.store(true, Ordering::SeqCst);
        }
        if let Some(stream) = self.stream.take() {
            if let Err(error) = stream.shutdown(Shutdown::Both) {
                if error.kind() != io::ErrorKind::NotConnected {
                    debug!(target: TRANSPORT_TARGET, %error, "socket shutdown failed");
                }
            }
        }
        if let Some(reader) = self.reader.take() {
            // The reader may close the transport from its own handler.
            if reader.thread.thread().id() != thread::current().id()
                && reader.thread.join().is_err()
            {
                warn!(target: TRANSPORT_TARGET, "reader thread panicked");
            }
        }
        debug!(target: TRANSPORT_TARGET, path = %self.path, "closed daemon connection");
    }

    fn connected_stream(&mut self) -> Result<&mut UnixStream, ConnectionError> {
        match (self.state(), self.stream.as_mut()) {
            (ConnectionState::Connected, Some(stream)) => Ok(stream),
            _ => Err(ConnectionError::Closed),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Transport")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("subscribed", &self.reader.is_some())
            .finish()
    }
}

/// Longest socket path, in bytes, that fits `sockaddr_un.sun_path` with its
/// terminating NUL.
#[must_use]
pub const fn max_socket_path_len() -> usize {
    std::mem::size_of::<libc::sockaddr_un>() - std::mem::offset_of!(libc::sockaddr_un, sun_path) - 1
}

fn check_path_length(path: &Utf8Path) -> Result<(), ConnectionError> {
    let length = path.as_str().len();
    let max = max_socket_path_len();
    if length > max {
        return Err(ConnectionError::PathTooLong {
            path: path.to_path_buf(),
            length,
            max,
        });
    }
    Ok(())
}

fn connect_unix(path: &Utf8Path) -> Result<UnixStream, ConnectionError> {
    let connect_error = |source| ConnectionError::Connect {
        path: path.to_path_buf(),
        source,
    };
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(ConnectionError::Socket)?;
    let address = SockAddr::unix(path.as_std_path()).map_err(connect_error)?;
    socket
        .connect_timeout(&address, CONNECTION_TIMEOUT)
        .map_err(connect_error)?;
    Ok(socket.into())
}

fn read_loop<F>(
    mut stream: UnixStream,
    cancelled: &AtomicBool,
    failed: &AtomicBool,
    mut handler: F,
) where
    F: FnMut(ReadEvent),
{
    let mut buffer = [0_u8; READ_BUFFER_SIZE];
    loop {
        let failure = match stream.read(&mut buffer) {
            Ok(0) => ConnectionError::PeerClosed,
            Ok(received) => {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                handler(ReadEvent::Data(
                    buffer.get(..received).unwrap_or_default().to_vec(),
                ));
                continue;
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => ConnectionError::Read(error),
        };
        failed.store(true, Ordering::SeqCst);
        if !cancelled.load(Ordering::SeqCst) {
            debug!(target: TRANSPORT_TARGET, error = %failure, "reader stopped");
            handler(ReadEvent::Failed(failure));
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::sync::mpsc;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Listening {
        _dir: TempDir,
        path: Utf8PathBuf,
        listener: UnixListener,
    }

    #[fixture]
    fn listening() -> Listening {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("daemon.sock")).expect("utf8 path");
        let listener = UnixListener::bind(&path).expect("bind listener");
        Listening {
            _dir: dir,
            path,
            listener,
        }
    }

    #[test]
    fn rejects_paths_longer_than_sun_path() {
        let path = format!("/tmp/{}", "d".repeat(max_socket_path_len()));
        let mut transport = Transport::new(path.as_str());
        let error = transport.connect().expect_err("path should be too long");
        match error {
            ConnectionError::PathTooLong { length, max, .. } => {
                assert_eq!(length, path.len());
                assert_eq!(max, max_socket_path_len());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.state(), ConnectionState::Unconnected);
    }

    #[test]
    fn path_bound_leaves_room_for_nul() {
        assert!(max_socket_path_len() >= 91);
        assert!(max_socket_path_len() < 108);
    }

    #[test]
    fn missing_socket_reports_errno() {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.sock")).expect("utf8 path");
        let error = Transport::open(path).expect_err("nothing is listening");
        assert!(matches!(error, ConnectionError::Connect { .. }));
        assert_eq!(error.errno(), Some(libc::ENOENT));
        assert!(error.is_daemon_unavailable());
    }

    #[rstest]
    fn writes_reach_the_peer(listening: Listening) {
        let mut transport = Transport::open(listening.path.clone()).expect("connect");
        let (mut peer, _) = listening.listener.accept().expect("accept");
        transport.write(b"ping").expect("write");
        let mut received = [0_u8; 4];
        peer.read_exact(&mut received).expect("read");
        assert_eq!(&received, b"ping");
    }

    #[rstest]
    fn subscriber_sees_data_then_peer_close(listening: Listening) {
        let mut transport = Transport::open(listening.path.clone()).expect("connect");
        let (mut peer, _) = listening.listener.accept().expect("accept");
        let (sender, receiver) = mpsc::channel();
        transport
            .subscribe(move |event| {
                let _ = sender.send(event);
            })
            .expect("subscribe");

        peer.write_all(b"hello").expect("peer write");
        drop(peer);

        let mut data = Vec::new();
        loop {
            match receiver
                .recv_timeout(Duration::from_secs(5))
                .expect("event")
            {
                ReadEvent::Data(bytes) => data.extend(bytes),
                ReadEvent::Failed(error) => {
                    assert!(matches!(error, ConnectionError::PeerClosed));
                    break;
                }
            }
        }
        assert_eq!(data, b"hello");
    }

    #[rstest]
    fn read_failure_closes_the_transport(listening: Listening) {
        let mut transport = Transport::open(listening.path.clone()).expect("connect");
        let (peer, _) = listening.listener.accept().expect("accept");
        let (sender, receiver) = mpsc::channel();
        transport
            .subscribe(move |event| {
                let _ = sender.send(event);
            })
            .expect("subscribe");

        drop(peer);
        let event = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("failure event");
        assert!(matches!(event, ReadEvent::Failed(ConnectionError::PeerClosed)));

        assert_eq!(transport.state(), ConnectionState::Closed);
        assert!(matches!(
            transport.write(b"late"),
            Err(ConnectionError::Closed)
        ));
        assert!(matches!(transport.connect(), Err(ConnectionError::Closed)));
        transport.close();
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[rstest]
    fn second_subscription_is_rejected(listening: Listening) {
        let mut transport = Transport::open(listening.path.clone()).expect("connect");
        let _peer = listening.listener.accept().expect("accept");
        transport.subscribe(|_| {}).expect("first subscription");
        let error = transport
            .subscribe(|_| {})
            .expect_err("second subscription");
        assert!(matches!(error, ConnectionError::AlreadySubscribed));
    }

    #[rstest]
    fn close_is_idempotent_and_silences_the_reader(listening: Listening) {
        let mut transport = Transport::open(listening.path.clone()).expect("connect");
        let _peer = listening.listener.accept().expect("accept");
        let (sender, receiver) = mpsc::channel();
        transport
            .subscribe(move |event| {
                let _ = sender.send(event);
            })
            .expect("subscribe");

        transport.close();
        transport.close();

        assert_eq!(transport.state(), ConnectionState::Closed);
        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(matches!(
            transport.write(b"late"),
            Err(ConnectionError::Closed)
        ));
        assert!(matches!(transport.connect(), Err(ConnectionError::Closed)));
    }
}

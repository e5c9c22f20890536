//! Scripted fake daemon for behavioural tests.
//!
//! [`FakeDaemon`] listens on a Unix socket inside a temporary directory,
//! accepts one connection per scripted session, and answers each request it
//! reads with the session's next [`Reply`]. Replies can be split into fragments to exercise
//! incremental parsing, or followed by an abrupt close.

use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

const ACCEPT_DEADLINE: Duration = Duration::from_secs(5);
const FRAGMENT_PAUSE: Duration = Duration::from_millis(2);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Scripted answer to one request.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    fragments: Vec<Vec<u8>>,
    close_after: bool,
}

impl Reply {
    /// Writes `wire` verbatim in one piece.
    #[must_use]
    pub fn raw(wire: impl Into<Vec<u8>>) -> Self {
        Self {
            fragments: vec![wire.into()],
            close_after: false,
        }
    }

    /// A response with a `Content-Length` framed JSON body.
    #[must_use]
    pub fn json(status: u16, body: &str) -> Self {
        Self::raw(format!(
            "HTTP/1.1 {status} {}\r\nApi-Version: 1.43\r\nContent-Type: application/json\r\n\
             Server: Docker/24.0.7 (linux)\r\nContent-Length: {}\r\n\r\n{body}",
            reason(status),
            body.len()
        ))
    }

    /// A response without a body.
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self::raw(format!(
            "HTTP/1.1 {status} {}\r\nServer: Docker/24.0.7 (linux)\r\n\r\n",
            reason(status)
        ))
    }

    /// A chunked JSON response with one chunk per element of `chunks`.
    #[must_use]
    pub fn chunked(status: u16, chunks: &[&str]) -> Self {
        let mut wire = format!(
            "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\n\
             Transfer-Encoding: chunked\r\n\r\n",
            reason(status)
        );
        for chunk in chunks {
            wire.push_str(&format!("{:x}\r\n{chunk}\r\n", chunk.len()));
        }
        wire.push_str("0\r\n\r\n");
        Self::raw(wire)
    }

    /// Reads the request and never answers it.
    #[must_use]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Splits the reply into pieces of at most `size` bytes.
    #[must_use]
    pub fn fragmented(self, size: usize) -> Self {
        let wire: Vec<u8> = self.fragments.concat();
        Self {
            fragments: wire.chunks(size.max(1)).map(<[u8]>::to_vec).collect(),
            close_after: self.close_after,
        }
    }

    /// Writes the reply in two pieces, the first `offset` bytes long.
    #[must_use]
    pub fn split_at(self, offset: usize) -> Self {
        let mut head: Vec<u8> = self.fragments.concat();
        let tail = head.split_off(offset.min(head.len()));
        Self {
            fragments: vec![head, tail],
            close_after: self.close_after,
        }
    }

    /// Writes only the first `length` bytes of the reply.
    #[must_use]
    pub fn truncated(self, length: usize) -> Self {
        let mut wire: Vec<u8> = self.fragments.concat();
        wire.truncate(length);
        Self {
            fragments: vec![wire],
            close_after: self.close_after,
        }
    }

    /// Closes the connection once the reply is written.
    #[must_use]
    pub const fn then_close(mut self) -> Self {
        self.close_after = true;
        self
    }
}

/// A request as seen by the fake daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request method.
    pub method: String,
    /// Request target.
    pub path: String,
    /// Header fields in wire order.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Returns the first value of header `name`, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A fake daemon serving scripted connections from a background thread.
pub struct FakeDaemon {
    _dir: TempDir,
    path: Utf8PathBuf,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl FakeDaemon {
    /// Binds a socket and serves `replies` in order on the first connection.
    ///
    /// # Errors
    ///
    /// Fails when the temporary directory or the listener cannot be created.
    pub fn spawn(replies: Vec<Reply>) -> Result<Self> {
        Self::spawn_sessions(vec![replies])
    }

    /// Binds a socket and serves one connection per entry of `sessions`.
    ///
    /// A session ends when its last reply closes the connection or the
    /// client hangs up; the daemon then waits for the next connection.
    ///
    /// # Errors
    ///
    /// Fails when the temporary directory or the listener cannot be created.
    pub fn spawn_sessions(sessions: Vec<Vec<Reply>>) -> Result<Self> {
        let dir = TempDir::new().context("create fake daemon directory")?;
        let path = Utf8PathBuf::from_path_buf(dir.path().join("docker.sock"))
            .map_err(|path| anyhow!("non UTF-8 socket path: {}", path.display()))?;
        let listener = UnixListener::bind(&path).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let handle = thread::Builder::new()
            .name("fake-daemon".to_owned())
            .spawn(move || serve(&listener, sessions, &recorded))
            .context("spawn fake daemon")?;

        Ok(Self {
            _dir: dir,
            path,
            requests,
            handle: Some(handle),
        })
    }

    /// Socket path clients should dial.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        &self.path
    }

    /// Requests recorded so far.
    ///
    /// # Errors
    ///
    /// Fails when the request log is poisoned.
    pub fn requests(&self) -> Result<Vec<RecordedRequest>> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .map_err(|error| anyhow!("lock requests: {error}"))
    }

    /// Waits for the daemon thread to finish and returns every request.
    ///
    /// The client must have closed its connection, or the daemon must have
    /// closed it after a reply, for this to return.
    ///
    /// # Errors
    ///
    /// Propagates any failure of the daemon thread.
    pub fn finish(&mut self) -> Result<Vec<RecordedRequest>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("fake daemon thread panicked"))?
                .context("fake daemon failed")?;
        }
        self.requests()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        // The thread ends once the client hangs up or the read times out.
        if let Some(handle) = self.handle.take() {
            drop(handle.join());
        }
    }
}

fn serve(
    listener: &UnixListener,
    sessions: Vec<Vec<Reply>>,
    requests: &Arc<Mutex<Vec<RecordedRequest>>>,
) -> Result<()> {
    for replies in sessions {
        let Some(stream) = accept(listener)? else {
            return Ok(());
        };
        serve_connection(stream, replies, requests)?;
    }
    Ok(())
}

fn serve_connection(
    mut stream: UnixStream,
    replies: Vec<Reply>,
    requests: &Arc<Mutex<Vec<RecordedRequest>>>,
) -> Result<()> {
    stream
        .set_nonblocking(false)
        .context("fake daemon blocking stream")?;
    stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .context("fake daemon read timeout")?;

    let mut pending = Vec::new();
    for reply in replies {
        let Some(request) = read_request(&mut stream, &mut pending)? else {
            return Ok(());
        };
        requests
            .lock()
            .map_err(|error| anyhow!("lock requests: {error}"))?
            .push(request);

        for fragment in &reply.fragments {
            stream.write_all(fragment).context("write reply")?;
            stream.flush().context("flush reply")?;
            thread::sleep(FRAGMENT_PAUSE);
        }
        if reply.close_after {
            return Ok(());
        }
    }

    // Drain until the client hangs up so it never sees an unscripted close.
    let mut sink = [0_u8; 1024];
    loop {
        match stream.read(&mut sink) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return Ok(()),
        }
    }
}

fn accept(listener: &UnixListener) -> Result<Option<UnixStream>> {
    let deadline = Instant::now() + ACCEPT_DEADLINE;
    loop {
        match listener.accept() {
            Ok((stream, _)) => return Ok(Some(stream)),
            Err(ref error)
                if error.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline =>
            {
                thread::sleep(Duration::from_millis(5));
            }
            // Nobody connected; tests that fail before dialling must not hang.
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(error) => return Err(error).context("accept connection"),
        }
    }
}

fn read_request(
    stream: &mut UnixStream,
    pending: &mut Vec<u8>,
) -> Result<Option<RecordedRequest>> {
    let mut buffer = [0_u8; 1024];
    loop {
        if let Some((request, consumed)) = parse_request(pending)? {
            *pending = pending.split_off(consumed);
            return Ok(Some(request));
        }
        match stream.read(&mut buffer) {
            Ok(0) if pending.is_empty() => return Ok(None),
            Ok(0) => bail!("client hung up mid-request"),
            Ok(received) => pending.extend_from_slice(buffer.get(..received).unwrap_or_default()),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error).context("read request"),
        }
    }
}

fn parse_request(buffer: &[u8]) -> Result<Option<(RecordedRequest, usize)>> {
    let mut slots = [httparse::EMPTY_HEADER; 32];
    let mut request = httparse::Request::new(&mut slots);
    let head_length = match request.parse(buffer).context("parse request head")? {
        httparse::Status::Complete(length) => length,
        httparse::Status::Partial => return Ok(None),
    };

    let headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|header| {
            (
                header.name.to_owned(),
                String::from_utf8_lossy(header.value).into_owned(),
            )
        })
        .collect();
    let body_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim().parse::<usize>())
        .transpose()
        .context("parse request Content-Length")?
        .unwrap_or(0);

    let Some(body) = buffer.get(head_length..head_length + body_length) else {
        return Ok(None);
    };
    Ok(Some((
        RecordedRequest {
            method: request.method.unwrap_or_default().to_owned(),
            path: request.path.unwrap_or_default().to_owned(),
            headers,
            body: body.to_vec(),
        },
        head_length + body_length,
    )))
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        304 => "Not Modified",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

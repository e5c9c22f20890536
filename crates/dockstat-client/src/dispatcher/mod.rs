//! Request dispatcher.
//!
//! A [`Dispatcher`] runs one exchange at a time over a single daemon
//! connection. Requests submitted with [`Dispatcher::send`] are queued and
//! written in submission order; the next request is only written once the
//! previous response has been delivered, so responses are never handed to
//! the wrong caller. Completions run on the dispatcher's worker thread.

mod exchange;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use self::exchange::{Completion, Queued};
use self::worker::{Message, Worker};
use crate::codec::{OutgoingRequest, ParsedResponse, RequestEncoder};
use crate::error::{ClientError, ConnectionError};
use crate::transport::Transport;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Sequences request/response exchanges over one daemon connection.
#[derive(Debug)]
pub struct Dispatcher {
    socket: Utf8PathBuf,
    sender: Sender<Message>,
    closed: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Connects to the socket at `path` and starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the socket cannot be reached or the
    /// worker cannot be started.
    pub fn connect(
        path: impl Into<Utf8PathBuf>,
        encoder: RequestEncoder,
    ) -> Result<Self, ConnectionError> {
        let mut transport = Transport::open(path)?;
        let socket = transport.path().to_path_buf();
        let (sender, receiver) = mpsc::channel();

        let events = sender.clone();
        transport.subscribe(move |event| {
            if events.send(Message::Read(event)).is_err() {
                debug!(target: DISPATCH_TARGET, "worker gone; dropping read event");
            }
        })?;

        let closed = Arc::new(AtomicBool::new(false));
        let worker = Worker::new(transport, encoder, Arc::clone(&closed));
        let handle = thread::Builder::new()
            .name("dockstat-dispatch".to_owned())
            .spawn(move || worker.run(&receiver))
            .map_err(ConnectionError::Socket)?;

        debug!(target: DISPATCH_TARGET, %socket, "dispatcher started");
        Ok(Self {
            socket,
            sender,
            closed,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Socket path of the underlying connection.
    #[must_use]
    pub fn socket(&self) -> &Utf8Path {
        &self.socket
    }

    /// Returns true once the connection has been closed, by the caller or by
    /// a transport failure.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queues `request` and returns immediately.
    ///
    /// `completion` is invoked exactly once with the parsed response or the
    /// error that ended the exchange. On a closed dispatcher it is invoked
    /// straight away, on the calling thread, with
    /// [`ConnectionError::Closed`].
    pub fn send<F>(&self, request: OutgoingRequest, completion: F)
    where
        F: FnOnce(Result<ParsedResponse, ClientError>) + Send + 'static,
    {
        let completion = Completion::new(completion);
        if self.is_closed() {
            completion.complete(Err(ConnectionError::Closed.into()));
            return;
        }
        // A rejected message is dropped here, which fails its completion.
        if self
            .sender
            .send(Message::Send(Queued {
                request,
                completion,
            }))
            .is_err()
        {
            debug!(target: DISPATCH_TARGET, "worker stopped before the request was queued");
        }
    }

    /// Closes the connection.
    ///
    /// The request in flight and every queued request complete with
    /// [`ConnectionError::Closed`]. Closing twice has no further effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.sender.send(Message::Close).is_err() {
            debug!(target: DISPATCH_TARGET, "worker already stopped");
        }
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            // Completions run on the worker, and may close the dispatcher.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!(target: DISPATCH_TARGET, "dispatcher worker panicked");
            }
        }
        debug!(target: DISPATCH_TARGET, socket = %self.socket, "dispatcher closed");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

//! Per-request state owned by the dispatcher worker.

use std::time::Instant;

use crate::codec::{OutgoingRequest, ParseOutcome, ParsedResponse, ResponseParser};
use crate::error::{ClientError, ConnectionError};

type Callback = Box<dyn FnOnce(Result<ParsedResponse, ClientError>) + Send + 'static>;

/// Caller's callback for one request.
///
/// Fires exactly once: either through [`Completion::complete`] or, if the
/// value is dropped first, with [`ConnectionError::Closed`].
pub(super) struct Completion {
    callback: Option<Callback>,
}

impl Completion {
    pub(super) fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<ParsedResponse, ClientError>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub(super) fn complete(mut self, result: Result<ParsedResponse, ClientError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(ConnectionError::Closed.into()));
        }
    }
}

/// A request waiting for its turn on the connection.
pub(super) struct Queued {
    pub(super) request: OutgoingRequest,
    pub(super) completion: Completion,
}

/// The exchange currently owning the connection's inbound bytes.
pub(super) struct Exchange {
    label: String,
    buffer: Vec<u8>,
    parser: ResponseParser,
    completion: Completion,
    started: Instant,
}

impl Exchange {
    pub(super) fn start(request: &OutgoingRequest, completion: Completion) -> Self {
        Self {
            label: request.to_string(),
            buffer: Vec::new(),
            parser: ResponseParser::for_method(request.method()),
            completion,
            started: Instant::now(),
        }
    }

    pub(super) fn label(&self) -> &str {
        &self.label
    }

    pub(super) fn received(&self) -> usize {
        self.buffer.len()
    }

    pub(super) fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Appends `bytes` to the response buffer and re-runs the parser.
    pub(super) fn feed(&mut self, bytes: &[u8]) -> ParseOutcome {
        self.buffer.extend_from_slice(bytes);
        self.parser.parse(&self.buffer)
    }

    /// Delivers the outcome and discards the buffer.
    pub(super) fn finish(self, result: Result<ParsedResponse, ClientError>) {
        self.completion.complete(result);
    }
}

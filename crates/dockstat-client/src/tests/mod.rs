//! Dispatcher and client coverage against the scripted fake daemon.


use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::codec::ParsedResponse;
use crate::error::ClientError;

pub(super) const RESULT_TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE_TIMEOUT: Duration = Duration::from_millis(200);

pub(super) type Outcome = Result<ParsedResponse, ClientError>;

pub(super) const VERSION_BODY: &str = r#"{"Version":"24.0.7","ApiVersion":"1.43","GitCommit":"311b9ff","GoVersion":"go1.20.10","Os":"linux","Arch":"amd64","KernelVersion":"6.5.0-14-generic","BuildTime":"2023-10-26T09:08:17.000000000+00:00"}"#;

/// Collects completions tagged with the index of the request they answer.
pub(super) struct Completions {
    sender: mpsc::Sender<(usize, Outcome)>,
    receiver: Receiver<(usize, Outcome)>,
}

impl Completions {
    pub(super) fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    pub(super) fn callback(&self, index: usize) -> impl FnOnce(Outcome) + Send + 'static {
        let sender = self.sender.clone();
        // Completions fired during teardown may outlive the receiver.
        move |outcome| drop(sender.send((index, outcome)))
    }

    /// Waits for `expected` completions, then keeps listening briefly so
    /// that duplicate deliveries are caught.
    pub(super) fn collect(&self, expected: usize) -> Vec<(usize, Outcome)> {
        let mut received = Vec::with_capacity(expected);
        while received.len() < expected {
            match self.receiver.recv_timeout(RESULT_TIMEOUT) {
                Ok(entry) => received.push(entry),
                Err(RecvTimeoutError::Timeout) => {
                    panic!("only {} of {expected} completions fired", received.len())
                }
                Err(RecvTimeoutError::Disconnected) => panic!("completion channel closed"),
            }
        }
        while let Ok(extra) = self.receiver.recv_timeout(SETTLE_TIMEOUT) {
            received.push(extra);
        }
        received
    }
}

pub(super) fn container_body(id: &str) -> String {
    format!(
        r#"{{"Id":"{id}","Name":"/{id}","Created":"2024-03-05T10:15:30.5Z","Config":{{"Image":"alpine:3.19","Cmd":["sleep","infinity"]}},"State":{{"Status":"running"}}}}"#
    )
}

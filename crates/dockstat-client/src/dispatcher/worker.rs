//! Dispatcher worker loop.
//!
//! The worker thread is the only owner of the transport, the request queue
//! and the active exchange. Commands from callers and events from the reader
//! thread arrive on one channel and are handled strictly in order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;

use tracing::{debug, warn};

use super::DISPATCH_TARGET;
use super::exchange::{Exchange, Queued};
use crate::codec::{ParseOutcome, RequestEncoder};
use crate::error::{ClientError, ConnectionError};
use crate::transport::{ReadEvent, Transport};

/// Messages consumed by the worker.
pub(super) enum Message {
    Send(Queued),
    Read(ReadEvent),
    Close,
}

pub(super) struct Worker {
    transport: Transport,
    encoder: RequestEncoder,
    queue: VecDeque<Queued>,
    active: Option<Exchange>,
    closed: Arc<AtomicBool>,
}

enum Flow {
    Continue,
    Stop,
}

impl Worker {
    pub(super) fn new(
        transport: Transport,
        encoder: RequestEncoder,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            encoder,
            queue: VecDeque::new(),
            active: None,
            closed,
        }
    }

    pub(super) fn run(mut self, messages: &Receiver<Message>) {
        while let Ok(message) = messages.recv() {
            let flow = match message {
                Message::Send(queued) => {
                    self.queue.push_back(queued);
                    self.advance()
                }
                Message::Read(ReadEvent::Data(bytes)) => self.on_data(&bytes),
                Message::Read(ReadEvent::Failed(error)) => {
                    warn!(target: DISPATCH_TARGET, %error, "daemon connection failed");
                    self.mark_closed();
                    self.fail_active(error.into());
                    Flow::Stop
                }
                Message::Close => {
                    debug!(target: DISPATCH_TARGET, "close requested");
                    Flow::Stop
                }
            };
            if matches!(flow, Flow::Stop) {
                break;
            }
        }
        self.shut_down();
    }

    /// Starts queued requests until one is in flight or the queue is empty.
    fn advance(&mut self) -> Flow {
        while self.active.is_none() {
            let Some(Queued {
                request,
                completion,
            }) = self.queue.pop_front()
            else {
                break;
            };

            let bytes = match self.encoder.encode(&request) {
                Ok(bytes) => bytes,
                Err(error) => {
                    debug!(target: DISPATCH_TARGET, %request, %error, "request rejected");
                    completion.complete(Err(error.into()));
                    continue;
                }
            };
            if let Err(error) = self.transport.write(&bytes) {
                self.mark_closed();
                completion.complete(Err(error.into()));
                return Flow::Stop;
            }
            debug!(target: DISPATCH_TARGET, %request, queued = self.queue.len(), "exchange started");
            self.active = Some(Exchange::start(&request, completion));
        }
        Flow::Continue
    }

    fn on_data(&mut self, bytes: &[u8]) -> Flow {
        let Some(mut exchange) = self.active.take() else {
            warn!(
                target: DISPATCH_TARGET,
                bytes = bytes.len(),
                "discarding bytes received with no request in flight"
            );
            return Flow::Continue;
        };

        match exchange.feed(bytes) {
            ParseOutcome::NeedMoreData => {
                self.active = Some(exchange);
                Flow::Continue
            }
            ParseOutcome::Complete(response) => {
                debug!(
                    target: DISPATCH_TARGET,
                    request = exchange.label(),
                    status = response.status_code(),
                    bytes = exchange.received(),
                    elapsed_ms = exchange.elapsed_ms(),
                    "exchange complete"
                );
                exchange.finish(Ok(response));
                self.advance()
            }
            // Framing is lost; the rest of this response may still arrive.
            ParseOutcome::Malformed(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    request = exchange.label(),
                    %error,
                    "malformed response; closing connection"
                );
                self.mark_closed();
                exchange.finish(Err(ClientError::from(error)));
                Flow::Stop
            }
        }
    }

    fn fail_active(&mut self, error: ClientError) {
        if let Some(exchange) = self.active.take() {
            exchange.finish(Err(error));
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn shut_down(&mut self) {
        self.mark_closed();
        self.transport.close();
        self.fail_active(ConnectionError::Closed.into());
        for Queued { completion, .. } in self.queue.drain(..) {
            completion.complete(Err(ConnectionError::Closed.into()));
        }
    }
}

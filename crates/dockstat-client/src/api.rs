//! Typed Docker Engine API on top of the dispatcher.
//!
//! Every method submits one [`Route`] through [`Dispatcher::send`] and
//! returns a [`Pending`] handle immediately. Bodies are decoded on the
//! dispatcher's worker; callers block only when they ask for the result.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::trace;

use crate::codec::{ParsedResponse, RequestEncoder};
use crate::dispatcher::{DISPATCH_TARGET, Dispatcher};
use crate::error::{ClientError, ConnectionError};
use crate::models::{ContainerDetails, ContainerSummary, VersionInfo};
use crate::routes::Route;

/// Failures reported by [`DockerClient`] operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The exchange failed below the HTTP layer.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The daemon answered `404 Not Found`.
    #[error("not found: {message}")]
    NotFound {
        /// Daemon-supplied explanation, or the route when none was sent.
        message: String,
    },
    /// The daemon answered with an unexpected status.
    #[error("daemon returned status {code}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Daemon-supplied explanation, or the status line.
        message: String,
    },
    /// The body did not match the expected record.
    #[error("failed to decode response to {route}: {source}")]
    Decode {
        /// Route whose response was being decoded.
        route: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// No response arrived within the caller's deadline.
    #[error("no response from the daemon within {0:?}")]
    TimedOut(Duration),
    /// The completion was dropped without reporting a result.
    #[error("the dispatcher stopped without reporting a result")]
    Disconnected,
}

impl ApiError {
    /// Returns true when the client's connection is gone and a new
    /// [`DockerClient`] is needed for further requests.
    #[must_use]
    pub const fn requires_reconnect(&self) -> bool {
        match self {
            Self::Client(error) => error.requires_reconnect(),
            Self::Disconnected => true,
            Self::NotFound { .. }
            | Self::Status { .. }
            | Self::Decode { .. }
            | Self::TimedOut(_) => false,
        }
    }
}

impl From<ConnectionError> for ApiError {
    fn from(error: ConnectionError) -> Self {
        Self::Client(error.into())
    }
}

/// Handle to a response that may not have arrived yet.
#[derive(Debug)]
#[must_use = "a pending response does nothing unless waited on"]
pub struct Pending<T> {
    receiver: Receiver<Result<T, ApiError>>,
}

impl<T> Pending<T> {
    /// Blocks until the response arrives.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] that ended the exchange.
    pub fn wait(self) -> Result<T, ApiError> {
        self.receiver.recv().map_err(|_| ApiError::Disconnected)?
    }

    /// Blocks until the response arrives or `timeout` elapses.
    ///
    /// The exchange itself is not cancelled by a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::TimedOut`] when the deadline passes first, or the
    /// [`ApiError`] that ended the exchange.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, ApiError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ApiError::TimedOut(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ApiError::Disconnected),
        }
    }
}

/// Client for a container daemon listening on a Unix socket.
#[derive(Debug)]
pub struct DockerClient {
    dispatcher: Dispatcher,
}

impl DockerClient {
    /// Connects to the daemon at `socket` with the default request encoder.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the socket cannot be reached.
    pub fn connect(socket: impl Into<Utf8PathBuf>) -> Result<Self, ConnectionError> {
        Self::with_encoder(socket, RequestEncoder::default())
    }

    /// Connects to the daemon at `socket`, encoding requests with `encoder`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the socket cannot be reached.
    pub fn with_encoder(
        socket: impl Into<Utf8PathBuf>,
        encoder: RequestEncoder,
    ) -> Result<Self, ConnectionError> {
        Dispatcher::connect(socket, encoder).map(Self::from_dispatcher)
    }

    /// Wraps an existing dispatcher.
    #[must_use]
    pub const fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Socket path of the connection.
    #[must_use]
    pub fn socket(&self) -> &Utf8Path {
        self.dispatcher.socket()
    }

    /// Returns true once the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Closes the connection; outstanding operations fail with
    /// [`ConnectionError::Closed`].
    pub fn close(&self) {
        self.dispatcher.close();
    }

    /// Lists running containers, or every container when `all` is set.
    pub fn list_containers(&self, all: bool) -> Pending<Vec<ContainerSummary>> {
        self.fetch(Route::ListContainers { all })
    }

    /// Fetches the details of one container.
    pub fn container(&self, id: &str) -> Pending<ContainerDetails> {
        self.fetch(Route::GetContainer { id: id.to_owned() })
    }

    /// Starts a container. Succeeds when it is already running.
    pub fn start_container(&self, id: &str) -> Pending<()> {
        self.execute(Route::StartContainer { id: id.to_owned() })
    }

    /// Stops a container. Succeeds when it is already stopped.
    pub fn stop_container(&self, id: &str) -> Pending<()> {
        self.execute(Route::StopContainer { id: id.to_owned() })
    }

    /// Pauses a container.
    pub fn pause_container(&self, id: &str) -> Pending<()> {
        self.execute(Route::PauseContainer { id: id.to_owned() })
    }

    /// Resumes a paused container.
    pub fn resume_container(&self, id: &str) -> Pending<()> {
        self.execute(Route::ResumeContainer { id: id.to_owned() })
    }

    /// Removes a container.
    pub fn remove_container(&self, id: &str) -> Pending<()> {
        self.execute(Route::RemoveContainer { id: id.to_owned() })
    }

    /// Fetches daemon version information.
    pub fn version(&self) -> Pending<VersionInfo> {
        self.fetch(Route::GetVersion)
    }

    /// Performs `route` and returns the raw response without checking its
    /// status.
    pub fn call(&self, route: Route) -> Pending<ParsedResponse> {
        self.submit(route, |_, response| Ok(response))
    }

    fn fetch<T>(&self, route: Route) -> Pending<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.submit(route, |route, response| {
            let body = check_status(route, response)?.into_body();
            serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
                route: route.to_string(),
                source,
            })
        })
    }

    fn execute(&self, route: Route) -> Pending<()> {
        self.submit(route, |route, response| {
            check_status(route, response).map(|_| ())
        })
    }

    fn submit<T, F>(&self, route: Route, decode: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Route, ParsedResponse) -> Result<T, ApiError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        self.dispatcher.send(route.request(), move |result| {
            let outcome = result
                .map_err(ApiError::from)
                .and_then(|response| decode(&route, response));
            if sender.send(outcome).is_err() {
                trace!(target: DISPATCH_TARGET, %route, "caller stopped waiting");
            }
        });
        Pending { receiver }
    }
}

#[derive(Deserialize)]
struct DaemonMessage {
    message: String,
}

/// Accepts 2xx, and 304 for state changes that were already in effect.
fn check_status(route: &Route, response: ParsedResponse) -> Result<ParsedResponse, ApiError> {
    let code = response.status_code();
    if response.is_success() || (code == 304 && route.is_state_change()) {
        return Ok(response);
    }
    let message = serde_json::from_slice::<DaemonMessage>(response.body())
        .map(|daemon| daemon.message)
        .ok();
    if code == 404 {
        return Err(ApiError::NotFound {
            message: message.unwrap_or_else(|| route.to_string()),
        });
    }
    Err(ApiError::Status {
        code,
        message: message.unwrap_or_else(|| response.status_line().to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ParseOutcome, parse_response};
    use crate::error::FramingError;
    use rstest::rstest;

    fn response(wire: &str) -> ParsedResponse {
        match parse_response(wire.as_bytes()) {
            ParseOutcome::Complete(response) => response,
            other => panic!("fixture response did not parse: {other:?}"),
        }
    }

    fn start() -> Route {
        Route::StartContainer { id: "web".to_owned() }
    }

    #[rstest]
    #[case::peer_closed(ApiError::from(ConnectionError::PeerClosed), true)]
    #[case::framing(ApiError::Client(FramingError::InvalidChunkSize.into()), true)]
    #[case::disconnected(ApiError::Disconnected, true)]
    #[case::timed_out(ApiError::TimedOut(Duration::from_secs(1)), false)]
    #[case::status(ApiError::Status { code: 500, message: "boom".to_owned() }, false)]
    fn reconnect_follows_the_connection_state(#[case] error: ApiError, #[case] expected: bool) {
        assert_eq!(error.requires_reconnect(), expected);
    }

    #[test]
    fn success_statuses_pass() {
        let ok = response("HTTP/1.1 204 No Content\r\n\r\n");
        assert!(check_status(&start(), ok).is_ok());
    }

    #[rstest]
    #[case(start(), true)]
    #[case(Route::GetVersion, false)]
    #[case(Route::RemoveContainer { id: "web".to_owned() }, false)]
    fn not_modified_is_accepted_for_state_changes(#[case] route: Route, #[case] accepted: bool) {
        let not_modified = response("HTTP/1.1 304 Not Modified\r\n\r\n");
        assert_eq!(check_status(&route, not_modified).is_ok(), accepted);
    }

    #[test]
    fn not_found_carries_daemon_message() {
        let body = r#"{"message":"No such container: web"}"#;
        let missing = response(&format!(
            "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ));
        let error = check_status(&start(), missing).expect_err("404 is an error");
        match error {
            ApiError::NotFound { message } => assert_eq!(message, "No such container: web"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn other_statuses_fall_back_to_status_line() {
        let failure = response("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\n\r\noops");
        let error = check_status(&Route::GetVersion, failure).expect_err("500 is an error");
        match error {
            ApiError::Status { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "HTTP/1.1 500 Internal Server Error");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wait_timeout_reports_deadline() {
        let (_sender, receiver) = mpsc::channel::<Result<(), ApiError>>();
        let pending = Pending { receiver };
        let error = pending
            .wait_timeout(Duration::from_millis(10))
            .expect_err("nothing was sent");
        assert!(matches!(error, ApiError::TimedOut(_)));
    }

    #[test]
    fn dropped_sender_is_disconnected() {
        let (sender, receiver) = mpsc::channel::<Result<(), ApiError>>();
        drop(sender);
        let error = Pending { receiver }.wait().expect_err("sender dropped");
        assert!(matches!(error, ApiError::Disconnected));
    }
}

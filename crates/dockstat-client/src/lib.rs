//! HTTP/1.1 client for a container daemon listening on a Unix domain socket.
//!
//! The crate is layered from the socket upwards:
//!
//! - [`transport`] owns the stream socket and delivers received bytes from a
//!   reader thread.
//! - [`codec`] serialises requests and incrementally parses responses,
//!   including chunked bodies, from a buffer that grows in arbitrary
//!   fragments.
//! - [`Dispatcher`] runs one request/response exchange at a time, queueing
//!   later requests and delivering each result to its own completion.
//! - [`Route`] maps daemon operations to methods and paths, and
//!   [`DockerClient`] decodes their responses into the records in
//!   [`models`].
//!
//! ```no_run
//! use dockstat_client::DockerClient;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DockerClient::connect("/var/run/docker.sock")?;
//! for container in client.list_containers(true).wait()? {
//!     println!("{} {}", container.name(), container.state);
//! }
//! # Ok(())
//! # }
//! ```

mod api;
pub mod codec;
mod dispatcher;
mod error;
pub mod models;
mod routes;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(test)]
mod tests;

pub use api::{ApiError, DockerClient, Pending};
pub use codec::{
    Headers, Method, OutgoingRequest, ParseOutcome, ParsedResponse, RequestEncoder,
    ResponseParser,
};
pub use dispatcher::Dispatcher;
pub use error::{ClientError, ConnectionError, EncodingError, FramingError};
pub use models::{ContainerDetails, ContainerState, ContainerSummary, VersionInfo};
pub use routes::Route;
pub use transport::{ConnectionState, ReadEvent, Transport};

//! HTTP/1.1 message codec.
//!
//! Requests are serialised eagerly by [`RequestEncoder`]. Responses are
//! framed incrementally by [`ResponseParser`], which accepts the growing
//! receive buffer and reports whether a complete message is present.

mod chunked;
mod headers;
mod request;
mod response;

pub use chunked::decode_chunked;
pub use headers::Headers;
pub use request::{DEFAULT_HOST, DEFAULT_USER_AGENT, Method, OutgoingRequest, RequestEncoder};
pub use response::{MAX_HEADERS, ParseOutcome, ParsedResponse, ResponseParser, parse_response};

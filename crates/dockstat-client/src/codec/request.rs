//! Request values and their HTTP/1.1 serialisation.

use std::fmt;

use strum::{AsRefStr, Display};

use super::headers::Headers;
use crate::error::EncodingError;

/// `Host` value sent on every request; the daemon ignores it over a Unix
/// socket but HTTP/1.1 requires the field.
pub const DEFAULT_HOST: &str = "localhost";

/// `User-Agent` value identifying this client.
pub const DEFAULT_USER_AGENT: &str = concat!("dockstat/", env!("CARGO_PKG_VERSION"));

const ACCEPT: &str = "application/json";
const RESERVED_HEADERS: [&str; 4] = ["host", "accept", "user-agent", "content-length"];

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Returns the method token as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    /// Methods whose requests always carry a `Content-Length`, even when empty.
    const fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

/// A request to send to the daemon.
///
/// Values are assembled with the builder methods and never change once
/// handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    method: Method,
    path: String,
    headers: Headers,
    body: Vec<u8>,
}

impl OutgoingRequest {
    /// Creates a request without extra headers or a body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header field.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Origin-form request target, query string included.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Caller-supplied header fields.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl fmt::Display for OutgoingRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.method, self.path)
    }
}

/// Serialises [`OutgoingRequest`] values into HTTP/1.1 messages.
///
/// `Host`, `Accept`, and `User-Agent` are always emitted from the encoder's
/// settings and cannot be overridden per request. `Content-Length` is derived
/// from the body so the framing always matches the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEncoder {
    host: String,
    user_agent: String,
}

impl Default for RequestEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl RequestEncoder {
    /// Creates an encoder identifying itself as `user_agent`.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            user_agent: user_agent.into(),
        }
    }

    /// Overrides the `Host` value.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Serialises `request`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError`] when the path, a header name, or a header
    /// value cannot appear in an HTTP/1.1 message.
    pub fn encode(&self, request: &OutgoingRequest) -> Result<Vec<u8>, EncodingError> {
        validate_path(request.path())?;
        validate_header("Host", &self.host)?;
        validate_header("User-Agent", &self.user_agent)?;
        for (name, value) in request.headers().iter() {
            validate_header(name, value)?;
        }

        let mut headers = Headers::new();
        headers.append("Host", self.host.as_str());
        headers.append("Accept", ACCEPT);
        headers.append("User-Agent", self.user_agent.as_str());
        for (name, value) in request.headers().iter() {
            if !is_reserved(name) {
                headers.append(name, value);
            }
        }
        if !request.body().is_empty() || request.method().carries_body() {
            headers.append("Content-Length", request.body().len().to_string());
        }

        let mut out = Vec::with_capacity(128 + request.path().len() + request.body().len());
        out.extend_from_slice(request.method().as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(request.path().as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");
        headers.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(request.body());
        Ok(out)
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

fn validate_path(path: &str) -> Result<(), EncodingError> {
    let invalid = |reason| EncodingError::InvalidPath {
        path: path.escape_default().to_string(),
        reason,
    };
    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path.bytes().any(|byte| !byte.is_ascii_graphic()) {
        return Err(invalid(
            "contains whitespace, control, or non-ASCII characters",
        ));
    }
    Ok(())
}

fn validate_header(name: &str, value: &str) -> Result<(), EncodingError> {
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(EncodingError::InvalidHeaderName(
            name.escape_default().to_string(),
        ));
    }
    if value
        .bytes()
        .any(|byte| byte.is_ascii_control() && byte != b'\t')
    {
        return Err(EncodingError::InvalidHeaderValue(name.to_owned()));
    }
    Ok(())
}

/// `tchar` from RFC 9110 §5.6.2.
const fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn encode(request: &OutgoingRequest) -> String {
        let bytes = RequestEncoder::new("dockstat/test")
            .encode(request)
            .expect("request should encode");
        String::from_utf8(bytes).expect("request is ASCII")
    }

    #[test]
    fn get_request_carries_fixed_headers() {
        let wire = encode(&OutgoingRequest::new(Method::Get, "/version"));
        assert_eq!(
            wire,
            "GET /version HTTP/1.1\r\n\
             Host: localhost\r\n\
             Accept: application/json\r\n\
             User-Agent: dockstat/test\r\n\
             \r\n"
        );
    }

    #[test]
    fn post_without_body_declares_zero_length() {
        let wire = encode(&OutgoingRequest::new(Method::Post, "/containers/abc/start"));
        assert!(wire.starts_with("POST /containers/abc/start HTTP/1.1\r\n"));
        assert!(wire.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn body_is_appended_verbatim_with_its_length() {
        let request = OutgoingRequest::new(Method::Put, "/things")
            .with_header("Content-Type", "application/json")
            .with_body(b"{\"a\":1}".to_vec());
        let wire = encode(&request);
        assert!(wire.contains("Content-Type: application/json\r\n"));
        assert!(wire.contains("Content-Length: 7\r\n"));
        assert!(wire.ends_with("\r\n\r\n{\"a\":1}"));
    }

    #[test]
    fn callers_cannot_override_reserved_headers() {
        let request = OutgoingRequest::new(Method::Get, "/version")
            .with_header("host", "evil")
            .with_header("ACCEPT", "text/html")
            .with_header("User-Agent", "spoof")
            .with_header("Content-Length", "99")
            .with_header("X-Trace", "1");
        let wire = encode(&request);
        assert_eq!(wire.matches("Host:").count(), 1);
        assert!(!wire.contains("evil"));
        assert!(!wire.contains("text/html"));
        assert!(!wire.contains("spoof"));
        assert!(!wire.contains("Content-Length"));
        assert!(wire.contains("X-Trace: 1\r\n"));
    }

    #[rstest]
    #[case("version")]
    #[case("/containers/a b/json")]
    #[case("/containers/a\r\nX: y")]
    #[case("/containers/\u{e9}")]
    fn rejects_unencodable_paths(#[case] path: &str) {
        let error = RequestEncoder::default()
            .encode(&OutgoingRequest::new(Method::Get, path))
            .expect_err("path should be rejected");
        assert!(matches!(error, EncodingError::InvalidPath { .. }));
    }

    #[rstest]
    #[case("Bad Name", "v")]
    #[case("", "v")]
    #[case("X-Colon:", "v")]
    fn rejects_invalid_header_names(#[case] name: &str, #[case] value: &str) {
        let request = OutgoingRequest::new(Method::Get, "/version").with_header(name, value);
        let error = RequestEncoder::default()
            .encode(&request)
            .expect_err("header name should be rejected");
        assert!(matches!(error, EncodingError::InvalidHeaderName(_)));
    }

    #[rstest]
    #[case("line\r\nInjected: yes")]
    #[case("nul\0byte")]
    fn rejects_header_values_with_control_bytes(#[case] value: &str) {
        let request = OutgoingRequest::new(Method::Get, "/version").with_header("X-Value", value);
        let error = RequestEncoder::default()
            .encode(&request)
            .expect_err("header value should be rejected");
        assert_eq!(error, EncodingError::InvalidHeaderValue("X-Value".to_owned()));
    }

    #[test]
    fn display_shows_method_and_path() {
        let request = OutgoingRequest::new(Method::Delete, "/containers/abc");
        assert_eq!(request.to_string(), "DELETE /containers/abc");
    }
}

//! Incremental HTTP/1.1 response parser.
//!
//! [`ResponseParser::parse`] is called with the whole buffer received for the
//! current exchange every time it grows. The parser moves through
//! `AwaitingHead → AwaitingFixedBody | AwaitingChunkedBody → Done`, caching
//! the decoded head so that later calls only inspect the body segment.
//! Selecting the body framing once the head is complete is the transient
//! "headers complete" step. Interim `1xx` heads that precede the final one
//! are skipped.

use super::chunked::{ChunkDecoder, ChunkProgress};
use super::headers::Headers;
use super::request::Method;
use crate::error::FramingError;

/// Upper bound on header fields accepted in one response.
pub const MAX_HEADERS: usize = 64;

/// A complete response. The body is already de-chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    status_code: u16,
    status_line: String,
    headers: Headers,
    body: Vec<u8>,
}

impl ParsedResponse {
    /// Numeric status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// First line of the response, for example `HTTP/1.1 200 OK`.
    #[must_use]
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Response header fields in wire order.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Response payload.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the response, returning the payload.
    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}

/// Result of feeding the accumulated buffer to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The buffer holds exactly one complete response.
    Complete(ParsedResponse),
    /// The buffer is a valid prefix; call again once more bytes arrive.
    NeedMoreData,
    /// The buffer can never become a valid response.
    Malformed(FramingError),
}

#[derive(Debug)]
struct ResponseHead {
    status_code: u16,
    status_line: String,
    headers: Headers,
    body_start: usize,
}

impl ResponseHead {
    fn into_response(self, body: Vec<u8>) -> ParsedResponse {
        ParsedResponse {
            status_code: self.status_code,
            status_line: self.status_line,
            headers: self.headers,
            body,
        }
    }
}

#[derive(Debug, Default)]
enum ParserState {
    #[default]
    AwaitingHead,
    AwaitingFixedBody {
        head: ResponseHead,
        length: usize,
    },
    AwaitingChunkedBody {
        head: ResponseHead,
        decoder: ChunkDecoder,
    },
    Done,
}

enum BodyFraming {
    Empty,
    Fixed(usize),
    Chunked,
}

/// Stateful parser for one response.
#[derive(Debug, Default)]
pub struct ResponseParser {
    state: ParserState,
    bodyless: bool,
    /// Offset of the head being awaited, past any interim responses.
    head_start: usize,
}

impl ResponseParser {
    /// Creates a parser for a response to a request with a body-bearing method.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser for the response to a `method` request.
    ///
    /// Responses to `HEAD` never carry a body, whatever their headers say.
    #[must_use]
    pub fn for_method(method: Method) -> Self {
        Self {
            state: ParserState::AwaitingHead,
            bodyless: method == Method::Head,
            head_start: 0,
        }
    }

    /// Parses the bytes received so far.
    ///
    /// `buffer` must begin with every byte passed on previous calls. Once a
    /// `Complete` or `Malformed` outcome has been returned the parser is spent
    /// and must be [reset](Self::reset) before reuse.
    pub fn parse(&mut self, buffer: &[u8]) -> ParseOutcome {
        match self.step(buffer) {
            Ok(Some(response)) => {
                self.state = ParserState::Done;
                ParseOutcome::Complete(response)
            }
            Ok(None) => ParseOutcome::NeedMoreData,
            Err(error) => {
                self.state = ParserState::Done;
                ParseOutcome::Malformed(error)
            }
        }
    }

    /// Returns the parser to its initial state.
    pub fn reset(&mut self) {
        self.state = ParserState::AwaitingHead;
        self.head_start = 0;
    }

    fn step(&mut self, buffer: &[u8]) -> Result<Option<ParsedResponse>, FramingError> {
        while matches!(self.state, ParserState::AwaitingHead) {
            let Some(head) = parse_head(buffer, self.head_start)? else {
                return Ok(None);
            };
            if is_interim(head.status_code) {
                self.head_start = head.body_start;
                continue;
            }
            self.state = match self.select_framing(&head)? {
                BodyFraming::Empty => return Ok(Some(head.into_response(Vec::new()))),
                BodyFraming::Fixed(length) => ParserState::AwaitingFixedBody { head, length },
                BodyFraming::Chunked => ParserState::AwaitingChunkedBody {
                    head,
                    decoder: ChunkDecoder::new(),
                },
            };
        }

        match std::mem::take(&mut self.state) {
            ParserState::AwaitingFixedBody { head, length } => {
                let segment = buffer.get(head.body_start..).unwrap_or_default();
                match segment.len() {
                    received if received < length => {
                        self.state = ParserState::AwaitingFixedBody { head, length };
                        Ok(None)
                    }
                    received if received == length => {
                        Ok(Some(head.into_response(segment.to_vec())))
                    }
                    received => Err(FramingError::BodyOverrun {
                        expected: length,
                        actual: received,
                    }),
                }
            }
            ParserState::AwaitingChunkedBody { mut head, mut decoder } => {
                let segment = buffer.get(head.body_start..).unwrap_or_default();
                match decoder.decode(segment)? {
                    ChunkProgress::Complete => {
                        head.headers.remove("Transfer-Encoding");
                        let body = decoder.take_body();
                        Ok(Some(head.into_response(body)))
                    }
                    ChunkProgress::NeedMoreData => {
                        self.state = ParserState::AwaitingChunkedBody { head, decoder };
                        Ok(None)
                    }
                }
            }
            state @ (ParserState::AwaitingHead | ParserState::Done) => {
                self.state = state;
                Ok(None)
            }
        }
    }

    fn select_framing(&self, head: &ResponseHead) -> Result<BodyFraming, FramingError> {
        if self.bodyless || matches!(head.status_code, 100..=199 | 204 | 304) {
            return Ok(BodyFraming::Empty);
        }

        if let Some(encoding) = head.headers.get("Transfer-Encoding") {
            let last = encoding.rsplit(',').next().unwrap_or_default().trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(BodyFraming::Chunked);
            }
            return Err(FramingError::UnsupportedTransferEncoding(
                encoding.to_owned(),
            ));
        }

        match head.headers.get("Content-Length") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map(BodyFraming::Fixed)
                .map_err(|_| FramingError::InvalidContentLength(value.to_owned())),
            None => Ok(BodyFraming::Empty),
        }
    }
}

/// `100 Continue` and friends announce that a final response follows.
/// `101 Switching Protocols` is final.
const fn is_interim(status_code: u16) -> bool {
    matches!(status_code, 100 | 102..=199)
}

fn parse_head(buffer: &[u8], offset: usize) -> Result<Option<ResponseHead>, FramingError> {
    let head = buffer.get(offset..).unwrap_or_default();
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut slots);
    let head_length = match response.parse(head) {
        Ok(httparse::Status::Complete(length)) => length,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => {
            return Err(FramingError::TooManyHeaders(MAX_HEADERS));
        }
        Err(error) => return Err(FramingError::InvalidHead(error.to_string())),
    };

    let status_code = response
        .code
        .ok_or_else(|| FramingError::InvalidHead("missing status code".to_owned()))?;

    let mut headers = Headers::new();
    for header in response.headers.iter() {
        let value = std::str::from_utf8(header.value).map_err(|_| {
            FramingError::InvalidHead(format!("value of '{}' is not valid UTF-8", header.name))
        })?;
        headers.append(header.name, value.trim());
    }

    Ok(Some(ResponseHead {
        status_code,
        status_line: status_line(head),
        headers,
        body_start: offset + head_length,
    }))
}

fn status_line(buffer: &[u8]) -> String {
    let end = buffer
        .iter()
        .position(|byte| *byte == b'\n')
        .unwrap_or(buffer.len());
    let raw = buffer.get(..end).unwrap_or_default();
    let line = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(line).into_owned()
}

/// Parses a buffer expected to hold one whole response.
#[must_use]
pub fn parse_response(buffer: &[u8]) -> ParseOutcome {
    ResponseParser::new().parse(buffer)
}

//! Incremental decoder for `Transfer-Encoding: chunked` bodies.
//!
//! The decoder is handed the whole body segment received so far on every
//! call. It remembers how far it has validated and resumes from there, so a
//! body delivered one byte at a time is scanned once.

use crate::error::FramingError;

/// Progress reported by [`ChunkDecoder::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkProgress {
    /// The terminating chunk and trailer section have been consumed.
    Complete,
    /// The segment ends before the terminating chunk.
    NeedMoreData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { declared: usize },
    Trailers,
    Done,
}

#[derive(Debug)]
pub(crate) struct ChunkDecoder {
    state: ChunkState,
    position: usize,
    body: Vec<u8>,
}

impl ChunkDecoder {
    pub(crate) const fn new() -> Self {
        Self {
            state: ChunkState::Size,
            position: 0,
            body: Vec::new(),
        }
    }

    /// Validates as much of `segment` as possible.
    ///
    /// `segment` must start with the bytes passed on earlier calls.
    pub(crate) fn decode(&mut self, segment: &[u8]) -> Result<ChunkProgress, FramingError> {
        loop {
            let pending = segment.get(self.position..).unwrap_or_default();
            match self.state {
                ChunkState::Size => match httparse::parse_chunk_size(pending) {
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        let declared =
                            usize::try_from(size).map_err(|_| FramingError::InvalidChunkSize)?;
                        self.position += consumed;
                        self.state = if declared == 0 {
                            ChunkState::Trailers
                        } else {
                            ChunkState::Data { declared }
                        };
                    }
                    Ok(httparse::Status::Partial) => return Ok(ChunkProgress::NeedMoreData),
                    Err(_) => return Err(FramingError::InvalidChunkSize),
                },
                ChunkState::Data { declared } => {
                    let Some(delimiter) = pending.get(declared..) else {
                        return Ok(ChunkProgress::NeedMoreData);
                    };
                    if !b"\r\n".starts_with(delimiter.get(..2).unwrap_or(delimiter)) {
                        return Err(FramingError::ChunkLengthMismatch {
                            expected: declared,
                            actual: find_crlf(pending).unwrap_or(pending.len()),
                        });
                    }
                    if delimiter.len() < 2 {
                        return Ok(ChunkProgress::NeedMoreData);
                    }
                    self.body.extend_from_slice(pending.get(..declared).unwrap_or_default());
                    self.position += declared + 2;
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let Some(line_end) = find_crlf(pending) else {
                        return Ok(ChunkProgress::NeedMoreData);
                    };
                    self.position += line_end + 2;
                    if line_end == 0 {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => {
                    return match pending.len() {
                        0 => Ok(ChunkProgress::Complete),
                        extra => Err(FramingError::TrailingBytes(extra)),
                    };
                }
            }
        }
    }

    /// Takes the reassembled payload.
    pub(crate) fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|window| window == b"\r\n")
}

/// Decodes a complete chunked body in one pass.
///
/// Returns `Ok(None)` when `segment` stops before the terminating chunk.
///
/// # Errors
///
/// Returns [`FramingError`] when the chunk framing is invalid.
pub fn decode_chunked(segment: &[u8]) -> Result<Option<Vec<u8>>, FramingError> {
    let mut decoder = ChunkDecoder::new();
    match decoder.decode(segment)? {
        ChunkProgress::Complete => Ok(Some(decoder.take_body())),
        ChunkProgress::NeedMoreData => Ok(None),
    }
}

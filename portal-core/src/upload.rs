/// Upload framing detection and multipart payload extraction.
///
/// The extractor is a sliding-window parser: it holds at most
/// `boundary length + 8` bytes between feeds, so memory stays bounded
/// no matter how large the firmware image is. Bytes are produced in
/// arrival order, exactly once, with a single output span per feed.
use crate::image::{check_image_header, ImageError};

/// RFC 2046 caps boundary tokens at 70 characters.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Safety margin on top of the delimiter length; must cover the header
/// terminator so a marker split across two chunks is always caught.
const TAIL_MARGIN: usize = 8;

const HEADER_END: &[u8] = b"\r\n\r\n";
const LINE_END: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// The body is the firmware image itself.
    Raw,
    /// The body is a multipart/form-data envelope; the token excludes
    /// the leading `--`.
    Multipart { boundary: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    EmptyBody,
    /// First line started with `--` but no usable token followed.
    BoundaryMissing,
    BoundaryTooLong,
    /// Neither multipart nor a plausible firmware image.
    NotFirmware(ImageError),
}

impl std::fmt::Display for FramingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramingError::EmptyBody => write!(f, "empty request body"),
            FramingError::BoundaryMissing => write!(f, "multipart boundary missing"),
            FramingError::BoundaryTooLong => {
                write!(f, "multipart boundary exceeds {} bytes", MAX_BOUNDARY_LEN)
            }
            FramingError::NotFirmware(e) => write!(f, "unrecognized upload: {}", e),
        }
    }
}

impl std::error::Error for FramingError {}

/// Classify the upload from the first received chunk only.
///
/// A body starting with `--` is always multipart; a body passing the
/// firmware header check is always raw. Anything else is rejected
/// rather than guessed at.
pub fn detect_framing(first_chunk: &[u8]) -> Result<Framing, FramingError> {
    if first_chunk.is_empty() {
        return Err(FramingError::EmptyBody);
    }
    if first_chunk.starts_with(b"--") {
        return match find(first_chunk, LINE_END) {
            Some(pos) if pos > 2 => {
                let token = &first_chunk[2..pos];
                if token.len() > MAX_BOUNDARY_LEN {
                    Err(FramingError::BoundaryTooLong)
                } else {
                    Ok(Framing::Multipart {
                        boundary: token.to_vec(),
                    })
                }
            }
            Some(_) => Err(FramingError::BoundaryMissing),
            None if first_chunk.len() > 2 + MAX_BOUNDARY_LEN => Err(FramingError::BoundaryTooLong),
            None => Err(FramingError::BoundaryMissing),
        };
    }
    match check_image_header(first_chunk) {
        Ok(_) => Ok(Framing::Raw),
        Err(e) => Err(FramingError::NotFirmware(e)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SeekingBoundary,
    SeekingHeaderEnd,
    StreamingPayload,
    Done,
}

/// Extracts the first part's payload from a multipart body, one fed
/// chunk at a time.
pub struct MultipartExtractor {
    /// `--` + token.
    delimiter: Vec<u8>,
    /// `\r\n` + delimiter; terminates the part body.
    end_marker: Vec<u8>,
    tail_len: usize,
    window: Vec<u8>,
    tail: Vec<u8>,
    phase: Phase,
}

impl MultipartExtractor {
    pub fn new(boundary: &[u8]) -> Result<Self, FramingError> {
        if boundary.is_empty() {
            return Err(FramingError::BoundaryMissing);
        }
        if boundary.len() > MAX_BOUNDARY_LEN {
            return Err(FramingError::BoundaryTooLong);
        }
        let mut delimiter = Vec::with_capacity(2 + boundary.len());
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary);
        let mut end_marker = Vec::with_capacity(2 + delimiter.len());
        end_marker.extend_from_slice(LINE_END);
        end_marker.extend_from_slice(&delimiter);
        let tail_len = delimiter.len() + TAIL_MARGIN;
        Ok(Self {
            delimiter,
            end_marker,
            tail_len,
            window: Vec::new(),
            tail: Vec::new(),
            phase: Phase::SeekingBoundary,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Feed one received chunk; the returned slice is the payload that
    /// is now safe to flush to the sink (possibly empty). Once the end
    /// marker has been seen, further input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> &[u8] {
        if self.phase == Phase::Done {
            return &[];
        }

        self.window.clear();
        std::mem::swap(&mut self.window, &mut self.tail);
        // window now holds the carried tail; tail is the (empty) old window
        self.tail.clear();
        self.window.extend_from_slice(chunk);

        let mut start = 0usize;

        if self.phase == Phase::SeekingBoundary {
            match find(&self.window, &self.delimiter) {
                None => {
                    self.retain_tail(0);
                    return &[];
                }
                Some(pos) => {
                    self.phase = Phase::SeekingHeaderEnd;
                    start = pos;
                }
            }
        }

        if self.phase == Phase::SeekingHeaderEnd {
            match find(&self.window[start..], HEADER_END) {
                None => {
                    self.retain_tail(start);
                    return &[];
                }
                Some(pos) => {
                    self.phase = Phase::StreamingPayload;
                    start += pos + HEADER_END.len();
                }
            }
        }

        match find(&self.window[start..], &self.end_marker) {
            Some(pos) => {
                self.phase = Phase::Done;
                &self.window[start..start + pos]
            }
            None => {
                // Everything but the last tail_len bytes cannot contain
                // a partial end marker and is safe to flush.
                let keep_from = if self.window.len() > start + self.tail_len {
                    self.window.len() - self.tail_len
                } else {
                    start
                };
                self.tail.extend_from_slice(&self.window[keep_from..]);
                &self.window[start..keep_from]
            }
        }
    }

    fn retain_tail(&mut self, floor: usize) {
        let keep_from = if self.window.len() > floor + self.tail_len {
            self.window.len() - self.tail_len
        } else {
            floor
        };
        self.tail.extend_from_slice(&self.window[keep_from..]);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

//! Per-session frame reassembly.
//!
//! Each session owns one `Framer`: an explicit state machine over a
//! reassembly buffer that yields complete raw frames (header through
//! trailer) and resynchronises to the next `8=FIX` marker after any
//! error. Skipped garbage between frames is surfaced once per gap as a
//! parse error. Frame errors are tracked over a sliding window of
//! outcomes; exceeding the budget closes the session for good.

use super::message::SessionError;
use super::tags::{SOH, TRAILER_LEN};
use std::collections::VecDeque;

/// Marker every frame starts with.
const BEGIN_MARKER: &[u8] = b"8=FIX";
/// Bytes of header (`8=…␁9=…␁`) we are willing to scan before giving up.
const MAX_HEADER_BYTES: usize = 32;

/// Reassembly states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Hunting for the begin marker and reading the length header.
    Framing,
    /// Header read; waiting for the declared body bytes.
    Body {
        /// Total frame length including header and trailer.
        total: usize,
    },
    /// Body buffered; waiting for and validating the trailer.
    Trailer {
        /// Total frame length including header and trailer.
        total: usize,
    },
    /// An error was recorded; skip the current marker and rescan.
    Resync,
    /// Torn down after exceeding the frame-error budget.
    Closed,
}

/// Single-threaded reassembly buffer for one session's byte stream.
#[derive(Debug)]
pub struct Framer {
    buffer: Vec<u8>,
    pos: usize,
    state: FramerState,
    max_frame: usize,
    outcomes: VecDeque<bool>,
    window: usize,
    error_limit: usize,
    /// Set while hunting past garbage so one gap counts one error.
    skipping: bool,
}

impl Framer {
    /// Create a framer with a per-frame byte bound and an error budget of
    /// `error_limit` errors over the last `window` frame outcomes.
    pub fn new(max_frame: usize, window: usize, error_limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_frame * 4),
            pos: 0,
            state: FramerState::Framing,
            max_frame,
            outcomes: VecDeque::with_capacity(window),
            window,
            error_limit,
            skipping: false,
        }
    }

    /// Append raw bytes from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.state == FramerState::Closed {
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.state == FramerState::Closed
    }

    /// Current state, for observability.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Extract the next complete raw frame.
    ///
    /// `Ok(None)` means more bytes are needed. Errors advance the state
    /// machine (into `Resync`, or `Closed` once the budget is exhausted)
    /// and must be counted by the caller.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        loop {
            match self.state {
                FramerState::Closed => return Ok(None),
                FramerState::Resync => {
                    // Step past the marker that produced the error and
                    // hunt for the next one.
                    self.pos = (self.pos + 1).min(self.buffer.len());
                    self.state = FramerState::Framing;
                }
                FramerState::Framing => match self.read_header()? {
                    Some(total) => self.state = FramerState::Body { total },
                    None => return Ok(None),
                },
                FramerState::Body { total } => {
                    if self.available() < total - TRAILER_LEN {
                        return Ok(None);
                    }
                    self.state = FramerState::Trailer { total };
                }
                FramerState::Trailer { total } => {
                    if self.available() < total {
                        return Ok(None);
                    }
                    let start = self.pos;
                    let frame = &self.buffer[start..start + total];
                    if &frame[total - TRAILER_LEN..total - TRAILER_LEN + 3] != b"10="
                        || frame[total - 1] != SOH
                    {
                        return Err(self.fail(SessionError::BadTrailer));
                    }
                    let frame = frame.to_vec();
                    self.pos += total;
                    self.state = FramerState::Framing;
                    self.record(false);
                    self.skipping = false;
                    self.compact();
                    return Ok(Some(frame));
                }
            }
        }
    }

    fn available(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Scan for the begin marker and read `9=<len>`. Returns the total
    /// frame length once the header is complete.
    fn read_header(&mut self) -> Result<Option<usize>, SessionError> {
        match find(&self.buffer[self.pos..], BEGIN_MARKER) {
            None => {
                // Keep a tail in case the marker is split across pushes.
                let new_pos = self
                    .buffer
                    .len()
                    .saturating_sub(BEGIN_MARKER.len() - 1)
                    .max(self.pos);
                let skipped = new_pos - self.pos;
                self.pos = new_pos;
                self.compact();
                if skipped > 0 && !self.skipping {
                    return Err(self.desync(skipped));
                }
                return Ok(None);
            }
            Some(offset) => {
                self.pos += offset;
                if offset > 0 && !self.skipping {
                    return Err(self.desync(offset));
                }
            }
        }
        let head = &self.buffer[self.pos..];

        let Some(version_end) = find(head, &[SOH]) else {
            return if head.len() > MAX_HEADER_BYTES {
                Err(self.fail(SessionError::BadBodyLength))
            } else {
                Ok(None)
            };
        };
        let rest = &head[version_end + 1..];
        if rest.len() < 2 {
            return Ok(None);
        }
        if &rest[..2] != b"9=" {
            return Err(self.fail(SessionError::BadBodyLength));
        }
        let digits = &rest[2..];
        let Some(len_end) = find(digits, &[SOH]) else {
            return if digits.len() > 9 {
                Err(self.fail(SessionError::BadBodyLength))
            } else {
                Ok(None)
            };
        };
        let parsed: Option<usize> = std::str::from_utf8(&digits[..len_end])
            .ok()
            .and_then(|s| s.parse().ok());
        let Some(body_len) = parsed else {
            return Err(self.fail(SessionError::BadBodyLength));
        };

        let header_len = version_end + 1 + 2 + len_end + 1;
        let total = header_len + body_len + TRAILER_LEN;
        if total > self.max_frame {
            return Err(self.fail(SessionError::FrameTooLarge {
                size: total,
                bound: self.max_frame,
            }));
        }
        self.skipping = false;
        Ok(Some(total))
    }

    /// One gap of skipped garbage counts as one parse error; the scan
    /// itself continues from wherever the hunt got to.
    fn desync(&mut self, skipped: usize) -> SessionError {
        self.skipping = true;
        self.record(true);
        self.maybe_close();
        SessionError::MalformedField(skipped)
    }

    /// Record an error and arm resynchronisation past the current marker.
    fn fail(&mut self, error: SessionError) -> SessionError {
        self.skipping = true;
        self.record(true);
        if !self.maybe_close() {
            self.state = FramerState::Resync;
        }
        error
    }

    fn maybe_close(&mut self) -> bool {
        let errors = self.outcomes.iter().filter(|&&e| e).count();
        if errors > self.error_limit {
            self.state = FramerState::Closed;
            true
        } else {
            false
        }
    }

    fn record(&mut self, error: bool) {
        if self.outcomes.len() == self.window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(error);
    }

    fn compact(&mut self) {
        if self.pos > self.buffer.len() / 2 {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

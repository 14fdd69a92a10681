//! Line Framing
//!
//! Extracts newline-delimited frames from the chunked response body. The
//! upstream feed emits one JSON object per line and blank lines as
//! keep-alives; chunk boundaries fall anywhere, including mid-line.
//!
//! The framer is synchronous and owns no I/O: the pump pushes raw chunks in
//! and pulls complete lines out. Bytes after the last newline are never
//! surfaced: when the stream ends they are a partial record and are
//! discarded along with the framer.

use bytes::BytesMut;
use thiserror::Error;

/// Default cap on a single line, in bytes.
///
/// A line this long without a terminator means the stream is not the
/// expected record-per-line format; treat it as a decode failure rather
/// than buffering without bound.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

/// Initial buffer capacity.
const INITIAL_CAPACITY: usize = 8192;

/// Errors produced while framing lines.
#[derive(Debug, Error)]
pub enum FramingError {
    /// A line exceeded the configured cap without a terminator.
    #[error("line exceeded {limit} bytes without a newline")]
    LineTooLong {
        /// The configured cap in bytes.
        limit: usize,
    },

    /// A line was not valid UTF-8.
    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Incremental newline-delimited frame extractor.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_line: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Create a framer with the default line cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a framer with a custom line cap.
    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_line,
        }
    }

    /// Append a chunk of raw body bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pull the next complete non-blank line, without its terminator.
    ///
    /// Returns `Ok(None)` when no complete line is buffered yet. Blank and
    /// whitespace-only lines are keep-alives and are skipped. Trailing `\r`
    /// is stripped.
    ///
    /// # Errors
    ///
    /// Returns an error when a line exceeds the cap or is not valid UTF-8.
    pub fn next_line(&mut self) -> Result<Option<String>, FramingError> {
        loop {
            let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > self.max_line {
                    return Err(FramingError::LineTooLong {
                        limit: self.max_line,
                    });
                }
                return Ok(None);
            };

            let mut line = self.buffer.split_to(newline_pos + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            // Keep-alive: empty or whitespace-only line.
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if line.len() > self.max_line {
                return Err(FramingError::LineTooLong {
                    limit: self.max_line,
                });
            }

            return Ok(Some(std::str::from_utf8(&line)?.to_string()));
        }
    }

    /// Number of bytes buffered without a completing newline.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

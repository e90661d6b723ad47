//! Chunk Decoder
//!
//! Turns raw transport deliveries into discrete SSE lines. A delivery is not
//! guaranteed to hold whole lines (or whole UTF-8 sequences), so the trailing
//! partial line is kept as bytes and completed by the next delivery.

use thiserror::Error;

/// Literal end-of-stream sentinel
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedLine {
    /// Payload of a `data:` line
    Data(String),
    /// Name from an `event:` line
    Event(String),
    /// The `[DONE]` sentinel
    Done,
}

/// A line that could not be decoded
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The line bytes are not UTF-8
    #[error("line of {len} bytes is not valid UTF-8")]
    InvalidUtf8 {
        /// Length of the rejected line
        len: usize,
    },
}

/// Incremental SSE line decoder
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Bytes of an incomplete trailing line
    pending: Vec<u8>,
    /// Set once the sentinel has been seen
    done: bool,
}

impl LineDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sentinel has been decoded
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of buffered bytes waiting for a line terminator
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode one delivery
    ///
    /// Returns every complete line it finishes. Input after the sentinel is
    /// ignored.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<DecodedLine> {
        if self.done {
            return Vec::new();
        }

        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let decoded = decode_line(&self.pending[start..end]);
            start = end + 1;
            if self.push(decoded, &mut lines) {
                self.pending.clear();
                return lines;
            }
        }
        self.pending.drain(..start);

        lines
    }

    /// Flush a final unterminated line at connection close
    pub fn finish(&mut self) -> Vec<DecodedLine> {
        if self.done || self.pending.is_empty() {
            self.pending.clear();
            return Vec::new();
        }

        let raw = std::mem::take(&mut self.pending);
        let mut lines = Vec::new();
        self.push(decode_line(&raw), &mut lines);
        lines
    }

    /// Record one decoded line; returns true when it was the sentinel
    fn push(
        &mut self,
        decoded: Result<Option<DecodedLine>, DecodeError>,
        lines: &mut Vec<DecodedLine>,
    ) -> bool {
        match decoded {
            Ok(Some(DecodedLine::Done)) => {
                self.done = true;
                lines.push(DecodedLine::Done);
                true
            }
            Ok(Some(line)) => {
                lines.push(line);
                false
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable stream line");
                false
            }
        }
    }
}

/// Decode one raw line (without its `\n`)
fn decode_line(raw: &[u8]) -> Result<Option<DecodedLine>, DecodeError> {
    let line = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8 { len: raw.len() })?;
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    if let Some(rest) = line.strip_prefix("data:") {
        let payload = rest.strip_prefix(' ').unwrap_or(rest);
        if payload.trim() == DONE_SENTINEL {
            return Ok(Some(DecodedLine::Done));
        }
        return Ok(Some(DecodedLine::Data(payload.to_string())));
    }

    if let Some(rest) = line.strip_prefix("event:") {
        return Ok(Some(DecodedLine::Event(rest.trim().to_string())));
    }

    if line.trim() == DONE_SENTINEL {
        return Ok(Some(DecodedLine::Done));
    }

    // id:, retry: and anything else carry nothing the classifier needs
    tracing::trace!(line = %line, "Ignoring non-data stream line");
    Ok(None)
}

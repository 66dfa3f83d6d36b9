use std::borrow::Cow;
use thiserror::Error;

pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;
pub const MESSAGE_TERMINATOR: &[u8] = b"\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("line exceeds max size: {size} > {max}")]
    OversizedLine { size: usize, max: usize },
    #[error("buffer exceeds max size without delimiter: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
}

/// Splits an inbound byte stream into `\n`-delimited lines.
///
/// Bytes after the last delimiter are kept until a later chunk completes them, so
/// a read that stops mid-line never yields a truncated frame. A line that outgrows
/// the cap is discarded whole, up to and including its delimiter.
#[derive(Debug)]
pub struct LineDecoder {
    max_line_bytes: usize,
    pending: Vec<u8>,
    discarding: bool,
}

impl LineDecoder {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes,
            pending: Vec::new(),
            discarding: false,
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), FrameError> {
        let chunk = if self.discarding {
            match chunk.iter().position(|byte| *byte == b'\n') {
                Some(idx) => {
                    self.discarding = false;
                    &chunk[idx + 1..]
                }
                None => return Ok(()),
            }
        } else {
            chunk
        };
        self.pending.extend_from_slice(chunk);
        let line_start = self
            .pending
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |idx| idx + 1);
        let unterminated = self.pending.len() - line_start;
        if unterminated > self.max_line_bytes {
            self.pending.truncate(line_start);
            self.discarding = true;
            return Err(FrameError::OversizedBuffer {
                size: unterminated,
                max: self.max_line_bytes,
            });
        }
        Ok(())
    }

    /// Next complete line with its `\n` (and a trailing `\r`) removed. Empty lines
    /// are skipped.
    pub fn next_line(&mut self) -> Option<Result<Vec<u8>, FrameError>> {
        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }
            if line.len() > self.max_line_bytes {
                return Some(Err(FrameError::OversizedLine {
                    size: line.len(),
                    max: self.max_line_bytes,
                }));
            }
            return Some(Ok(line));
        }
        None
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

pub fn decode_lossy(line: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(line)
}

/// Collapses line breaks so a single value can never end a frame early.
pub fn sanitize_payload(payload: &str) -> String {
    payload
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `<payload>\n\n`, the frame the server expects for one chat message.
pub fn encode_message(payload: &str) -> Vec<u8> {
    let clean = sanitize_payload(payload);
    let mut encoded = Vec::with_capacity(clean.len() + MESSAGE_TERMINATOR.len());
    encoded.extend_from_slice(clean.as_bytes());
    encoded.extend_from_slice(MESSAGE_TERMINATOR);
    encoded
}

/// Bare `\n`, the registration request.
pub fn encode_blank_line() -> Vec<u8> {
    b"\n".to_vec()
}

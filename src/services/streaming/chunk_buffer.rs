//! Byte accumulator that turns arbitrary network reads into complete lines
//!
//! Reads may split a line, a JSON object, or a UTF-8 codepoint anywhere.
//! Bytes are held until a `\n` arrives; the unterminated tail stays buffered
//! across calls. Splitting happens on the raw byte `\n` before decoding,
//! which is safe because 0x0A never occurs inside a multibyte sequence.

use bytes::BytesMut;
use tracing::warn;

/// Accumulates raw transport bytes and drains complete lines
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    pending: BytesMut,
}

impl ChunkBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from the transport. Empty chunks are a no-op.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Drain every complete line, in arrival order
    ///
    /// When `is_final` is false the unterminated tail stays buffered, even if
    /// it ends in the middle of a codepoint. When `is_final` is true the tail
    /// is returned as a last line and the buffer is cleared; a tail that is
    /// not valid UTF-8 is discarded.
    pub fn drain_complete_lines(&mut self, is_final: bool) -> Vec<String> {
        let mut lines = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw = self.pending.split_to(pos + 1);
            match std::str::from_utf8(&raw[..pos]) {
                Ok(line) => lines.push(line.to_string()),
                Err(e) => warn!(bytes = pos, error = %e, "dropping line that is not valid UTF-8"),
            }
        }

        if is_final && !self.pending.is_empty() {
            let tail = self.pending.split();
            match String::from_utf8(tail.to_vec()) {
                Ok(line) => lines.push(line),
                Err(_) => warn!(
                    bytes = tail.len(),
                    "discarding undecodable residue at end of stream"
                ),
            }
        }

        lines
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

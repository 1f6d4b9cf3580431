//! Reassembly of newline-delimited frames from arbitrarily split chunks.

const RECORD_SEPARATOR: u8 = b'\n';

/// Accumulates raw chunk bytes and yields complete, newline-terminated frames.
///
/// Splitting happens on bytes before decoding, so a multi-byte character cut
/// across two chunks is decoded intact once its frame completes. After every
/// [`append`](FrameBuffer::append) the buffer holds at most one partial frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk and returns every frame it completed, in arrival order.
    ///
    /// Blank frames are returned as empty strings; skipping them is the
    /// dispatcher's job. A `\r` directly before the separator is stripped.
    pub fn append(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let Some(last) = self.pending.iter().rposition(|b| *b == RECORD_SEPARATOR) else {
            return Vec::new();
        };
        let tail = self.pending.split_off(last + 1);
        let complete = std::mem::replace(&mut self.pending, tail);
        complete[..last]
            .split(|b| *b == RECORD_SEPARATOR)
            .map(decode_frame)
            .collect()
    }

    pub fn append_str(&mut self, chunk: &str) -> Vec<String> {
        self.append(chunk.as_bytes())
    }

    /// Bytes of the partial frame still waiting for its separator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flushes the trailing partial frame at end of stream.
    ///
    /// Returns `None` when nothing is pending. The buffer cannot tell a final
    /// chunk from a mid-frame one, so callers must signal the end explicitly.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(decode_frame(&self.pending))
        }
    }
}

fn decode_frame(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

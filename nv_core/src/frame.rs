//! Length-prefixed framing shared by every composite.
//!
//! Wire format of one frame:
//! - 4 bytes: payload length (big-endian `u32`)
//! - N bytes: payload
//!
//! Frames are written back to back with no count prefix and no padding; the
//! end of the buffer is the terminator.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{NoteError, NoteResult};

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

/// Encoded size of a frame carrying `payload_len` bytes.
pub fn frame_len(payload_len: usize) -> usize {
    LEN_PREFIX + payload_len
}

/// Appends one frame to `buf`.
pub fn put_frame(buf: &mut BytesMut, payload: &[u8]) -> NoteResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| NoteError::FrameTooLarge(payload.len()))?;
    buf.reserve(frame_len(payload.len()));
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(())
}

/// Zero-copy reader over back-to-back frames.
///
/// Yields each payload as a slice of the source buffer. The first decode
/// error is yielded once and ends the iteration.
#[derive(Debug, Clone)]
pub struct FrameReader {
    buf: Bytes,
    offset: usize,
    failed: bool,
}

impl FrameReader {
    pub fn new(buf: Bytes) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Byte offset of the next frame.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Reads the next payload, or `None` at a clean end of buffer.
    pub fn next_frame(&mut self) -> Option<NoteResult<Bytes>> {
        if self.failed || self.offset == self.buf.len() {
            return None;
        }
        let start = self.offset;
        let remaining = self.remaining();
        if remaining < LEN_PREFIX {
            self.failed = true;
            return Some(Err(NoteError::TruncatedFrame {
                offset: start,
                needed: LEN_PREFIX,
                remaining,
            }));
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&self.buf[start..start + LEN_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if remaining - LEN_PREFIX < len {
            self.failed = true;
            return Some(Err(NoteError::TruncatedFrame {
                offset: start,
                needed: frame_len(len),
                remaining,
            }));
        }
        let body = start + LEN_PREFIX;
        self.offset = body + len;
        Some(Ok(self.buf.slice(body..body + len)))
    }
}

impl Iterator for FrameReader {
    type Item = NoteResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

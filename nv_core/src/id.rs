use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, BytesMut};

use crate::{ByteDecoding, Note};

/// Monotonic ID source owned by the component that needs IDs.
///
/// Numeric IDs start at 1. Note IDs are 16 bytes: a random 8-byte prefix
/// fixed at construction followed by the big-endian counter, so IDs from
/// two generators do not collide in practice.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: [u8; 8],
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            prefix: rand::random(),
            next: AtomicU64::new(1),
        }
    }

    pub fn next_u64(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_note(&self) -> Note {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_slice(&self.prefix);
        buf.put_u64(self.next_u64());
        Note::new(buf.freeze(), ByteDecoding::Base16)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

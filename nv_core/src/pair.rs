use bytes::{Bytes, BytesMut};

use crate::frame::{FrameReader, LEN_PREFIX, frame_len, put_frame};
use crate::{Note, NoteError, NoteResult};

/// A key/value pair of notes.
///
/// Wire form: `u32_be(len(key)) || key || u32_be(len(value)) || value`.
/// Tags are not part of the wire form; decoded pairs carry
/// [`crate::ByteDecoding::Raw`] notes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NotePair {
    key: Note,
    value: Note,
}

impl NotePair {
    pub fn new(key: impl Into<Note>, value: impl Into<Note>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &Note {
        &self.key
    }

    pub fn value(&self) -> &Note {
        &self.value
    }

    pub fn into_parts(self) -> (Note, Note) {
        (self.key, self.value)
    }

    /// Size of the framed form.
    pub fn encoded_len(&self) -> usize {
        frame_len(self.key.len()) + frame_len(self.value.len())
    }

    /// Appends the framed form to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) -> NoteResult<()> {
        put_frame(buf, self.key.as_bytes())?;
        put_frame(buf, self.value.as_bytes())
    }

    pub fn to_bytes(&self) -> NoteResult<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Reads one pair. `None` means the reader was at a clean end of buffer.
    pub fn read_from(reader: &mut FrameReader) -> Option<NoteResult<NotePair>> {
        let key = match reader.next_frame()? {
            Ok(key) => key,
            Err(e) => return Some(Err(e)),
        };
        let value = match reader.next_frame() {
            Some(Ok(value)) => value,
            Some(Err(e)) => return Some(Err(e)),
            None => {
                return Some(Err(NoteError::TruncatedFrame {
                    offset: reader.offset(),
                    needed: LEN_PREFIX,
                    remaining: 0,
                }));
            }
        };
        Some(Ok(NotePair::new(Note::raw(key), Note::raw(value))))
    }

    /// Decodes a buffer holding exactly one pair.
    pub fn from_bytes(bytes: Bytes) -> NoteResult<NotePair> {
        let total = bytes.len();
        let mut reader = FrameReader::new(bytes);
        let pair = NotePair::read_from(&mut reader).ok_or(NoteError::TruncatedFrame {
            offset: 0,
            needed: LEN_PREFIX,
            remaining: 0,
        })??;
        if reader.offset() != total {
            return Err(NoteError::malformed(format!(
                "{} trailing bytes after pair",
                total - reader.offset()
            )));
        }
        Ok(pair)
    }
}

impl<K: Into<Note>, V: Into<Note>> From<(K, V)> for NotePair {
    fn from((key, value): (K, V)) -> Self {
        NotePair::new(key, value)
    }
}

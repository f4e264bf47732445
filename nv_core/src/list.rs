use bytes::{Bytes, BytesMut};

use crate::frame::{FrameReader, put_frame};
use crate::{ByteDecoding, Note, NoteError, NoteResult};

/// An ordered sequence of notes stored as back-to-back frames.
///
/// The buffer is decoded lazily on every read; mutations rebuild it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteList {
    buf: Bytes,
}

impl NoteList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing buffer without scanning it.
    pub fn wrap(note: Note) -> Self {
        Self {
            buf: note.into_bytes(),
        }
    }

    /// Wraps `note` after checking that it is well-formed.
    pub fn parse(note: Note) -> NoteResult<Self> {
        let list = Self::wrap(note);
        list.len()?;
        Ok(list)
    }

    pub fn from_notes<I, N>(notes: I) -> NoteResult<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<Note>,
    {
        let mut buf = BytesMut::new();
        for note in notes {
            put_frame(&mut buf, note.into().as_bytes())?;
        }
        Ok(Self { buf: buf.freeze() })
    }

    /// Lazily decoded entries.
    pub fn iter(&self) -> impl Iterator<Item = NoteResult<Note>> + '_ {
        FrameReader::new(self.buf.clone()).map(|frame| frame.map(Note::raw))
    }

    pub fn to_vec(&self) -> NoteResult<Vec<Note>> {
        self.iter().collect()
    }

    pub fn len(&self) -> NoteResult<usize> {
        let mut count = 0;
        for entry in FrameReader::new(self.buf.clone()) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn get(&self, index: usize) -> NoteResult<Option<Note>> {
        // Scan the whole buffer so a corrupt tail is reported even on a hit.
        let entries = self.to_vec()?;
        Ok(entries.into_iter().nth(index))
    }

    pub fn push(&mut self, note: impl Into<Note>) -> NoteResult<()> {
        let note = note.into();
        let mut buf = BytesMut::with_capacity(self.buf.len() + 4 + note.len());
        buf.extend_from_slice(&self.buf);
        put_frame(&mut buf, note.as_bytes())?;
        self.buf = buf.freeze();
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> NoteResult<Option<Note>> {
        let entries = self.to_vec()?;
        if index >= entries.len() {
            return Ok(None);
        }
        let mut removed = None;
        let mut buf = BytesMut::with_capacity(self.buf.len());
        for (i, entry) in entries.into_iter().enumerate() {
            if i == index {
                removed = Some(entry);
            } else {
                put_frame(&mut buf, entry.as_bytes())?;
            }
        }
        self.buf = buf.freeze();
        Ok(removed)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn to_note(&self) -> Note {
        Note::new(self.buf.clone(), ByteDecoding::FramedList)
    }

    pub fn into_note(self) -> Note {
        Note::new(self.buf, ByteDecoding::FramedList)
    }
}

impl TryFrom<Note> for NoteList {
    type Error = NoteError;

    fn try_from(note: Note) -> Result<Self, Self::Error> {
        NoteList::parse(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_get_remove() {
        let mut list = NoteList::new();
        assert_eq!(list.len().unwrap(), 0);
        assert_eq!(list.get(0).unwrap(), None);

        list.push("one").unwrap();
        list.push("two").unwrap();
        list.push("one").unwrap();
        assert_eq!(list.len().unwrap(), 3);
        assert_eq!(list.get(1).unwrap(), Some(Note::text("two")));

        assert_eq!(list.remove_at(0).unwrap(), Some(Note::text("one")));
        assert_eq!(list.to_vec().unwrap(), vec![Note::text("two"), Note::text("one")]);
        assert_eq!(list.remove_at(5).unwrap(), None);
    }

    #[test]
    fn wire_form() {
        let list = NoteList::from_notes(["a", "bc"]).unwrap();
        assert_eq!(list.as_bytes(), &[0, 0, 0, 1, b'a', 0, 0, 0, 2, b'b', b'c']);
        assert_eq!(list.to_note().tag(), ByteDecoding::FramedList);
    }

    #[test]
    fn truncated_list_reports_no_partial_results() {
        let note = Note::raw(Bytes::from_static(&[0, 0, 0, 1, b'a', 0, 0]));
        let list = NoteList::wrap(note.clone());
        assert!(matches!(list.to_vec(), Err(NoteError::TruncatedFrame { .. })));
        assert!(list.get(0).is_err());
        assert!(NoteList::parse(note).is_err());
    }
}

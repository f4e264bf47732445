//! Flat-buffer key/value map.
//!
//! A [`NoteMap`] is a note whose buffer is back-to-back [`NotePair`] frames.
//! Lookups return the first match in buffer order, [`NoteMap::add`] appends
//! without deduplicating and [`NoteMap::remove`] drops every match. Each
//! mutation rebuilds the buffer; use [`crate::OrderedPairs`] when a map is
//! edited heavily and convert at the persistence boundary.

use bytes::{Bytes, BytesMut};

use crate::frame::FrameReader;
use crate::{ByteDecoding, Note, NoteError, NotePair, NoteResult};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteMap {
    buf: Bytes,
}

/// Iterator over the pairs of a map buffer.
///
/// Stops after yielding the first decode error.
pub struct PairIter {
    reader: FrameReader,
}

impl Iterator for PairIter {
    type Item = NoteResult<NotePair>;

    fn next(&mut self) -> Option<Self::Item> {
        NotePair::read_from(&mut self.reader)
    }
}

impl NoteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing buffer without scanning it.
    pub fn wrap(note: Note) -> Self {
        Self {
            buf: note.into_bytes(),
        }
    }

    /// Wraps `note` after checking that a full scan consumes the buffer.
    pub fn parse(note: Note) -> NoteResult<Self> {
        let map = Self::wrap(note);
        map.validate()?;
        Ok(map)
    }

    pub fn from_pairs<I, P>(pairs: I) -> NoteResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<NotePair>,
    {
        let mut buf = BytesMut::new();
        for pair in pairs {
            pair.into().write_to(&mut buf)?;
        }
        Ok(Self { buf: buf.freeze() })
    }

    /// Scans the buffer once, failing on any truncated frame.
    pub fn validate(&self) -> NoteResult<()> {
        self.to_sequence().map(|_| ())
    }

    pub fn iter(&self) -> PairIter {
        PairIter {
            reader: FrameReader::new(self.buf.clone()),
        }
    }

    /// All pairs in buffer order. Fails without partial results.
    pub fn to_sequence(&self) -> NoteResult<Vec<NotePair>> {
        self.iter().collect()
    }

    pub fn size(&self) -> NoteResult<usize> {
        let mut count = 0;
        for pair in self.iter() {
            pair?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// First pair whose key equals `key`.
    pub fn get(&self, key: &Note) -> NoteResult<Option<NotePair>> {
        let pairs = self.to_sequence()?;
        Ok(pairs.into_iter().find(|pair| pair.key() == key))
    }

    /// Value of the first pair whose key equals `key`.
    pub fn get_value(&self, key: &Note) -> NoteResult<Option<Note>> {
        Ok(self.get(key)?.map(|pair| pair.into_parts().1))
    }

    pub fn get_at_index(&self, index: usize) -> NoteResult<Option<NotePair>> {
        let pairs = self.to_sequence()?;
        Ok(pairs.into_iter().nth(index))
    }

    pub fn contains_key(&self, key: &Note) -> NoteResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Keys in buffer order, duplicates included.
    pub fn keys(&self) -> NoteResult<Vec<Note>> {
        Ok(self
            .to_sequence()?
            .into_iter()
            .map(|pair| pair.into_parts().0)
            .collect())
    }

    /// Appends `pair`. An existing key is not replaced; the new pair is
    /// shadowed by the earlier one for [`NoteMap::get`].
    pub fn add(&mut self, pair: impl Into<NotePair>) -> NoteResult<()> {
        let pair = pair.into();
        self.validate()?;
        let mut buf = BytesMut::with_capacity(self.buf.len() + pair.encoded_len());
        buf.extend_from_slice(&self.buf);
        pair.write_to(&mut buf)?;
        self.buf = buf.freeze();
        Ok(())
    }

    pub fn add_text(&mut self, key: &str, value: &str) -> NoteResult<()> {
        self.add(NotePair::new(key, value))
    }

    /// Removes every pair whose key equals `key` and returns them in order.
    pub fn remove(&mut self, key: &Note) -> NoteResult<Vec<NotePair>> {
        let pairs = self.to_sequence()?;
        let (removed, kept): (Vec<_>, Vec<_>) =
            pairs.into_iter().partition(|pair| pair.key() == key);
        if !removed.is_empty() {
            self.rebuild(&kept)?;
        }
        Ok(removed)
    }

    /// Removes the pair at ordinal `index`.
    pub fn remove_at(&mut self, index: usize) -> NoteResult<Option<NotePair>> {
        let mut pairs = self.to_sequence()?;
        if index >= pairs.len() {
            return Ok(None);
        }
        let removed = pairs.remove(index);
        self.rebuild(&pairs)?;
        Ok(Some(removed))
    }

    fn rebuild(&mut self, pairs: &[NotePair]) -> NoteResult<()> {
        let capacity = pairs.iter().map(NotePair::encoded_len).sum();
        let mut buf = BytesMut::with_capacity(capacity);
        for pair in pairs {
            pair.write_to(&mut buf)?;
        }
        self.buf = buf.freeze();
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn to_note(&self) -> Note {
        Note::new(self.buf.clone(), ByteDecoding::PairList)
    }

    pub fn into_note(self) -> Note {
        Note::new(self.buf, ByteDecoding::PairList)
    }
}

impl TryFrom<Note> for NoteMap {
    type Error = NoteError;

    fn try_from(note: Note) -> Result<Self, Self::Error> {
        NoteMap::parse(note)
    }
}

impl From<NoteMap> for Note {
    fn from(map: NoteMap) -> Self {
        map.into_note()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Note {
        Note::text(s)
    }

    #[test]
    fn duplicate_keys_first_match_and_remove_all() {
        let mut map = NoteMap::new();
        map.add_text("a", "1").unwrap();
        map.add_text("b", "2").unwrap();
        map.add_text("a", "3").unwrap();

        assert_eq!(map.size().unwrap(), 3);
        assert_eq!(map.get_value(&key("a")).unwrap(), Some(Note::text("1")));

        let removed = map.remove(&key("a")).unwrap();
        assert_eq!(
            removed,
            vec![NotePair::new("a", "1"), NotePair::new("a", "3")]
        );
        assert_eq!(map.size().unwrap(), 1);
        assert_eq!(map.to_sequence().unwrap(), vec![NotePair::new("b", "2")]);
    }

    #[test]
    fn empty_map_scans() {
        let mut map = NoteMap::new();
        assert_eq!(map.size().unwrap(), 0);
        assert_eq!(map.get(&key("x")).unwrap(), None);
        assert_eq!(map.get_at_index(0).unwrap(), None);
        assert!(map.remove(&key("x")).unwrap().is_empty());
        assert_eq!(map.remove_at(0).unwrap(), None);
    }

    #[test]
    fn remove_at_removes_exactly_one() {
        let mut map = NoteMap::from_pairs([("k", "1"), ("k", "2"), ("k", "3")]).unwrap();
        assert_eq!(map.remove_at(1).unwrap(), Some(NotePair::new("k", "2")));
        assert_eq!(map.keys().unwrap().len(), 2);
        assert_eq!(map.get_at_index(1).unwrap(), Some(NotePair::new("k", "3")));
    }

    #[test]
    fn truncated_tail_aborts_the_scan() {
        let mut bytes = NoteMap::from_pairs([("a", "1")])
            .unwrap()
            .as_bytes()
            .to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 1, b'z']);
        let mut map = NoteMap::wrap(Note::raw(bytes.clone()));

        assert!(matches!(map.size(), Err(NoteError::TruncatedFrame { .. })));
        assert!(map.get(&key("a")).is_err());
        assert!(map.add_text("c", "3").is_err());
        assert!(map.remove(&key("a")).is_err());
        assert_eq!(map.as_bytes(), bytes.as_slice());
        assert!(NoteMap::parse(Note::raw(bytes)).is_err());
    }

    #[test]
    fn to_note_is_tagged_as_pair_list() {
        let map = NoteMap::from_pairs([("a", "b")]).unwrap();
        let note: Note = map.clone().into();
        assert_eq!(note.tag(), ByteDecoding::PairList);
        assert_eq!(NoteMap::try_from(note).unwrap(), map);
    }
}

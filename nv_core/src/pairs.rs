use crate::{Note, NoteMap, NotePair, NoteResult};

/// In-memory working form of a [`NoteMap`].
///
/// Same semantics as the flat map (first-match lookup, append-only `add`,
/// remove-all `remove`) but backed by a `Vec`, so appends do not rebuild a
/// buffer. Convert with [`OrderedPairs::from_map`] and
/// [`OrderedPairs::to_map`] at the persistence boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderedPairs {
    pairs: Vec<NotePair>,
}

impl OrderedPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &NoteMap) -> NoteResult<Self> {
        Ok(Self {
            pairs: map.to_sequence()?,
        })
    }

    pub fn to_map(&self) -> NoteResult<NoteMap> {
        NoteMap::from_pairs(self.pairs.iter().cloned())
    }

    pub fn get(&self, key: &Note) -> Option<&NotePair> {
        self.pairs.iter().find(|pair| pair.key() == key)
    }

    pub fn get_value(&self, key: &Note) -> Option<&Note> {
        self.get(key).map(NotePair::value)
    }

    pub fn get_at_index(&self, index: usize) -> Option<&NotePair> {
        self.pairs.get(index)
    }

    pub fn add(&mut self, pair: impl Into<NotePair>) {
        self.pairs.push(pair.into());
    }

    pub fn remove(&mut self, key: &Note) -> Vec<NotePair> {
        let (removed, kept) = std::mem::take(&mut self.pairs)
            .into_iter()
            .partition(|pair| pair.key() == key);
        self.pairs = kept;
        removed
    }

    pub fn remove_at(&mut self, index: usize) -> Option<NotePair> {
        (index < self.pairs.len()).then(|| self.pairs.remove(index))
    }

    pub fn size(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NotePair> {
        self.pairs.iter()
    }

    pub fn to_sequence(&self) -> Vec<NotePair> {
        self.pairs.clone()
    }
}

impl<P: Into<NotePair>> FromIterator<P> for OrderedPairs {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoIterator for OrderedPairs {
    type Item = NotePair;
    type IntoIter = std::vec::IntoIter<NotePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl TryFrom<&NoteMap> for OrderedPairs {
    type Error = crate::NoteError;

    fn try_from(map: &NoteMap) -> Result<Self, Self::Error> {
        OrderedPairs::from_map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_flat_map_semantics() {
        let mut pairs = OrderedPairs::new();
        pairs.add(("a", "1"));
        pairs.add(("b", "2"));
        pairs.add(("a", "3"));

        let mut map = pairs.to_map().unwrap();
        assert_eq!(pairs.size(), map.size().unwrap());
        assert_eq!(
            pairs.get(&Note::text("a")).cloned(),
            map.get(&Note::text("a")).unwrap()
        );

        assert_eq!(
            pairs.remove(&Note::text("a")),
            map.remove(&Note::text("a")).unwrap()
        );
        assert_eq!(OrderedPairs::from_map(&map).unwrap(), pairs);
        assert_eq!(pairs.get_value(&Note::text("b")), Some(&Note::text("2")));
    }

    #[test]
    fn remove_at_out_of_range() {
        let mut pairs: OrderedPairs = [("x", "1")].into_iter().collect();
        assert_eq!(pairs.remove_at(3), None);
        assert_eq!(pairs.remove_at(0), Some(NotePair::new("x", "1")));
        assert!(pairs.is_empty());
    }
}

use nv_core::{Note, NoteList, NoteMap, NotePair, OrderedPairs};
use rand::Rng;

/// Random add/remove/remove_at sequences keep the buffer well-formed and
/// agree with a `Vec` model.
#[test]
fn random_mutations_keep_framing_intact() {
    let mut rng = rand::rng();
    for _ in 0..50 {
        let mut map = NoteMap::new();
        let mut model: Vec<NotePair> = Vec::new();

        for _ in 0..200 {
            match rng.random_range(0..4) {
                0 | 1 => {
                    let key = format!("k{}", rng.random_range(0..8));
                    let len = rng.random_range(0..32);
                    let value: Vec<u8> = (0..len).map(|_| rng.random()).collect();
                    let pair = NotePair::new(key, value);
                    map.add(pair.clone()).unwrap();
                    model.push(pair);
                }
                2 => {
                    let key = Note::text(format!("k{}", rng.random_range(0..8)));
                    let removed = map.remove(&key).unwrap();
                    let expected: Vec<_> =
                        model.iter().filter(|p| p.key() == &key).cloned().collect();
                    model.retain(|p| p.key() != &key);
                    assert_eq!(removed, expected);
                }
                _ => {
                    let index = rng.random_range(0..model.len() + 2);
                    let removed = map.remove_at(index).unwrap();
                    let expected = (index < model.len()).then(|| model.remove(index));
                    assert_eq!(removed, expected);
                }
            }

            assert_eq!(map.size().unwrap(), model.len());
            let encoded: usize = model.iter().map(NotePair::encoded_len).sum();
            assert_eq!(map.as_bytes().len(), encoded);
        }

        assert_eq!(map.to_sequence().unwrap(), model);
        NoteMap::parse(map.to_note()).unwrap();
        assert_eq!(OrderedPairs::from_map(&map).unwrap().to_sequence(), model);
    }
}

#[test]
fn every_truncation_of_a_map_is_rejected() {
    let map = NoteMap::from_pairs([("alpha", "1"), ("beta", "22"), ("gamma", "")]).unwrap();
    let bytes = map.as_bytes().to_vec();
    let boundaries = [0, 14, 28, bytes.len()];

    for cut in 0..=bytes.len() {
        let truncated = NoteMap::wrap(Note::raw(bytes[..cut].to_vec()));
        if boundaries.contains(&cut) {
            assert!(truncated.validate().is_ok(), "cut at {cut}");
        } else {
            assert!(truncated.validate().is_err(), "cut at {cut}");
        }
    }
}

#[test]
fn nested_map_inside_list() {
    let inner = NoteMap::from_pairs([("name", "x")]).unwrap();
    let list = NoteList::from_notes([inner.to_note(), Note::text("tail")]).unwrap();

    let first = list.get(0).unwrap().unwrap();
    let decoded = NoteMap::parse(first).unwrap();
    assert_eq!(
        decoded.get_value(&Note::text("name")).unwrap(),
        Some(Note::text("x"))
    );
}

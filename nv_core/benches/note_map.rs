use criterion::{Criterion, criterion_group, criterion_main};
use nv_core::{Note, NoteMap, NotePair, OrderedPairs};

fn build_map(entries: usize) -> NoteMap {
    NoteMap::from_pairs((0..entries).map(|i| NotePair::new(format!("key-{i}"), vec![0u8; 64])))
        .unwrap()
}

fn bench_lookup(c: &mut Criterion) {
    let map = build_map(1_000);
    let last = Note::text("key-999");

    let mut group = c.benchmark_group("note_map_lookup");
    group.bench_function("get_last_of_1k", |b| {
        b.iter(|| map.get(&last).unwrap());
    });
    group.bench_function("size_1k", |b| {
        b.iter(|| map.size().unwrap());
    });
    group.finish();
}

fn bench_mutation(c: &mut Criterion) {
    let map = build_map(1_000);

    let mut group = c.benchmark_group("note_map_mutation");
    group.bench_function("add_to_1k_flat", |b| {
        b.iter(|| {
            let mut m = map.clone();
            m.add_text("extra", "value").unwrap();
        });
    });
    group.bench_function("add_100_via_ordered_pairs", |b| {
        b.iter(|| {
            let mut pairs = OrderedPairs::from_map(&map).unwrap();
            for i in 0..100 {
                pairs.add((format!("extra-{i}"), "value"));
            }
            pairs.to_map().unwrap()
        });
    });
    group.bench_function("remove_key_from_1k", |b| {
        let key = Note::text("key-500");
        b.iter(|| {
            let mut m = map.clone();
            m.remove(&key).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_lookup, bench_mutation);
criterion_main!(benches);

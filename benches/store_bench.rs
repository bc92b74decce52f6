//! Benchmarks for deteff
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn benchmark_padmap_find(c: &mut Criterion) {
    use deteff::padmap::{HardwareAddress, PadMap};

    let mut lines = vec!["cobo,asad,aget,channel,pad".to_string(), String::new()];
    let mut pad = 0;
    for cobo in 0..10 {
        for asad in 0..4 {
            for aget in 0..4 {
                for channel in 0..68 {
                    lines.push(format!("{},{},{},{},{}", cobo, asad, aget, channel, pad));
                    pad += 1;
                }
            }
        }
    }
    let map = PadMap::build(&lines).unwrap();

    c.bench_function("padmap_find", |b| {
        let addr = HardwareAddress::new(7, 2, 3, 41);
        b.iter(|| black_box(map.find(black_box(&addr))))
    });
}

fn benchmark_insert_rows(c: &mut Criterion) {
    use deteff::db::{schema, RelationalStore, Value};

    c.bench_function("insert_1000_hits", |b| {
        let mut store = RelationalStore::open_in_memory().unwrap();
        store.create_table(&schema::hits_table("hits")).unwrap();
        let rows: Vec<Vec<Value>> = (0..1000i64)
            .map(|i| (0..5).map(|j| Value::Integer(i * 5 + j)).collect())
            .collect();

        b.iter(|| black_box(store.insert_rows("hits", &rows).unwrap()))
    });
}

criterion_group!(benches, benchmark_padmap_find, benchmark_insert_rows);
criterion_main!(benches);

//! Integration tests for deteff
//!
//! These tests use on-disk SQLite stores in temporary directories and a
//! deterministic event source in place of the physics layer.

use deteff::config::{IngestConfig, Schedule};
use deteff::db::{real_row, Column, Matrix, RelationalStore, SharedStore, StoreLocation, TableSchema, Value};
use deteff::error::{SimulationError, StoreError};
use deteff::ingest::{EventResult, IngestCoordinator};
use deteff::padmap::{HardwareAddress, PadIndex, PadMap};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};

const PADMAP: &str = "\
# cobo,asad,aget,channel,pad
header
0,0,0,0,100
0,0,0,1,101
1,2,3,4,102
-1,0,0,0,0

2,0,0,0,103
";

fn padmap() -> PadMap {
    PadMap::build(PADMAP.lines()).unwrap()
}

/// Event `i` hits `params[i][0]` pads, cycling through the mapped ones
fn source(id: u64, params: &[f64]) -> Result<EventResult, SimulationError> {
    let pads = params[0] as u16;
    if pads == 99 {
        return Err(SimulationError::new(id, "no track"));
    }
    let signals: BTreeMap<_, _> = (0..pads)
        .map(|p| (PadIndex(100 + p % 4), vec![0.0, 2.0 + id as f64, 1.0]))
        .collect();
    Ok(EventResult::new(id, signals, pads > 0))
}

fn params(events: usize) -> Matrix {
    let rows: Vec<[f64; 2]> = (0..events).map(|i| [(i % 5) as f64, i as f64 * 0.5]).collect();
    Matrix::from_rows(&rows).unwrap()
}

fn expected_hits(events: usize) -> usize {
    // Four distinct pads at most per event
    (0..events).map(|i| (i % 5).min(4)).sum()
}

#[test]
fn test_padmap_file_scenario() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(PADMAP.as_bytes()).unwrap();

    let map = PadMap::from_path(file.path()).unwrap();
    assert_eq!(map.len(), 4);
    assert_eq!(map.find(&HardwareAddress::new(1, 2, 3, 4)), PadIndex(102));
    assert_eq!(map.find(&HardwareAddress::new(9, 9, 9, 9)), PadIndex::MISSING);
    assert_eq!(map.reverse_find(PadIndex(103)), Some(2));
    assert_eq!(map.reverse_find(PadIndex(5)), None);
}

#[test]
fn test_padmap_malformed_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"h\nh\n0,0,0,0,1\n0,0,zero,1,2\n").unwrap();
    assert!(PadMap::from_path(file.path()).is_err());
}

#[test]
fn test_store_round_trip_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");

    let expected = Matrix::from_rows(&[
        [0.0, 1.5, -2.0],
        [3.0, 4.25, 5.0],
        [6.0, 7.0, 8.125],
        [9.0, 10.0, 11.0],
    ])
    .unwrap();

    {
        let mut store = RelationalStore::open(StoreLocation::from(path.as_path())).unwrap();
        let schema = TableSchema::new("t")
            .column(Column::real("a"))
            .column(Column::real("b"))
            .column(Column::real("c"));
        store.create_table(&schema).unwrap();

        let rows: Vec<_> = expected.iter_rows().map(real_row).collect();
        store.insert_rows("t", &rows[..2]).unwrap();
        store.insert_rows("t", &rows[2..]).unwrap();
    }

    let store = RelationalStore::open(StoreLocation::from(path.as_path())).unwrap();
    let m = store.read_table("t").unwrap();
    assert_eq!((m.rows(), m.cols()), (4, 3));
    assert!(m.max_abs_diff(&expected).unwrap() < 1e-9);

    // Keys are 0..n with no gaps
    let conn = Connection::open(&path).unwrap();
    let keys: Vec<i64> = conn
        .prepare("SELECT idx FROM t ORDER BY idx")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(keys, vec![0, 1, 2, 3]);
}

#[test]
fn test_failed_batch_leaves_store_unchanged() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("atomic.db");

    let mut store = RelationalStore::open(StoreLocation::from(path.as_path())).unwrap();
    store
        .create_table(&TableSchema::new("t").column(Column::real("a")).column(Column::real("b")))
        .unwrap();
    store.insert_rows("t", &[real_row(&[1.0, 2.0])]).unwrap();

    let err = store
        .insert_rows("t", &[real_row(&[3.0, 4.0]), real_row(&[5.0])])
        .unwrap_err();
    assert!(matches!(err, StoreError::Arity { row: 1, .. }));
    drop(store);

    let store = RelationalStore::open(StoreLocation::from(path.as_path())).unwrap();
    let m = store.read_table("t").unwrap();
    assert_eq!(m.rows(), 1);
    assert_eq!(m.row(0), Some(&[1.0, 2.0][..]));
}

fn run_ingest(schedule: Schedule, workers: usize, events: usize) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.db");

    let store = SharedStore::new(RelationalStore::open(StoreLocation::from(path.as_path())).unwrap());
    let config = IngestConfig {
        worker_count: workers,
        flush_threshold: 7,
        flush_stagger: 3,
        schedule,
        ..IngestConfig::default()
    };
    let coordinator = IngestCoordinator::new(config, Arc::new(padmap()), store).unwrap();
    coordinator.create_tables().unwrap();

    let result = coordinator
        .run(Arc::new(source), Arc::new(params(events)))
        .unwrap();
    assert!(result.completed);
    assert_eq!(result.events, events as u64);
    assert_eq!(result.hits_written, expected_hits(events) as u64);
    assert_eq!(result.rows_skipped, 0);
    drop(coordinator);

    let conn = Connection::open(&path).unwrap();
    let trig_ids: Vec<i64> = conn
        .prepare("SELECT evt_id FROM trig ORDER BY evt_id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(trig_ids, (0..events as i64).collect::<Vec<_>>());

    let (hits, distinct): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COUNT(DISTINCT evt_id || '-' || pad) FROM hits",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(hits as usize, expected_hits(events));
    assert_eq!(hits, distinct);

    // Peak of [0, 2 + id, 1] is at tb 1 with magnitude 2 + id
    let bad_peaks: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM hits WHERE tb != 1 OR num_elec != 2 + evt_id",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(bad_peaks, 0);

    // Keys in both tables are gap-free
    for table in ["hits", "trig"] {
        let (min, max, count): (i64, i64, i64) = conn
            .query_row(
                &format!("SELECT MIN(idx), MAX(idx), COUNT(*) FROM {}", table),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((min, max), (0, count - 1), "{} keys", table);
    }
}

#[test]
fn test_static_ingest() {
    run_ingest(Schedule::Static, 4, 203);
}

#[test]
fn test_dynamic_ingest() {
    run_ingest(Schedule::Dynamic { chunk: 11 }, 5, 250);
}

#[test]
fn test_hit_count_backfill() {
    let mut db = RelationalStore::open_in_memory().unwrap();
    db.create_table(
        &TableSchema::new("params")
            .column(Column::real("x"))
            .column(Column::real("y"))
            .column(Column::integer("num_hits")),
    )
    .unwrap();

    let events = 30;
    let input = params(events);
    let rows: Vec<Vec<Value>> = input
        .iter_rows()
        .map(|r| vec![Value::Real(r[0]), Value::Real(r[1]), Value::Null])
        .collect();
    db.insert_rows("params", &rows).unwrap();

    let config = IngestConfig {
        worker_count: 3,
        flush_threshold: 4,
        hit_count_column: Some("num_hits".into()),
        ..IngestConfig::default()
    };
    let coordinator = IngestCoordinator::new(config, Arc::new(padmap()), SharedStore::new(db)).unwrap();
    coordinator.create_tables().unwrap();
    coordinator.run(Arc::new(source), Arc::new(input)).unwrap();

    let stored = coordinator
        .store()
        .with_lock(|db| db.read_table("params"))
        .unwrap();
    for (i, row) in stored.iter_rows().enumerate() {
        assert_eq!(row[2], (i % 5).min(4) as f64, "event {}", i);
    }
}

#[test]
fn test_excluded_pads_and_failures() {
    let map = padmap();
    let excluded: BTreeSet<_> = map.pads_for_addresses(&[
        HardwareAddress::new(0, 0, 0, 0),
        HardwareAddress::new(7, 7, 7, 7),
    ]);
    assert_eq!(excluded, [PadIndex(100)].into_iter().collect());

    let mut input = params(10);
    let rows: Vec<Vec<f64>> = input
        .iter_rows()
        .enumerate()
        .map(|(i, r)| if i == 3 { vec![99.0, r[1]] } else { r.to_vec() })
        .collect();
    input = Matrix::from_rows(&rows).unwrap();

    let config = IngestConfig {
        worker_count: 2,
        ..IngestConfig::default()
    };
    let store = SharedStore::new(RelationalStore::open_in_memory().unwrap());
    let coordinator = IngestCoordinator::new(config, Arc::new(map), store)
        .unwrap()
        .with_excluded(excluded);
    coordinator.create_tables().unwrap();

    let result = coordinator.run(Arc::new(source), Arc::new(input)).unwrap();
    assert_eq!(result.events_failed, 1);

    // Every event with at least one pad loses pad 100; event 3 failed
    let expected: u64 = (0..10)
        .filter(|i| *i != 3)
        .map(|i| ((i % 5) as u64).min(4).saturating_sub(1))
        .sum();
    assert_eq!(result.hits_written, expected);

    let trig = coordinator
        .store()
        .with_lock(|db| db.row_count("trig"))
        .unwrap();
    assert_eq!(trig, 9);
}

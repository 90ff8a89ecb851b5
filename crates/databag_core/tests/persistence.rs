//! File-backed bag tests: reopen, locking and stored sizes.

use databag_codec::Value;
use databag_core::{BagConfig, BagError, DataBag, DocumentBag, Engine, Field, QueryArg};
use databag_storage::StorageError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir) -> BagConfig {
    BagConfig::new()
        .path(dir.path().join("bag.db"))
        .sync_on_commit(false)
}

#[test]
fn reopen_restores_rows_and_versions() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir).versioned(true).history(2);

    {
        let bag = DataBag::open(cfg.clone()).unwrap();
        for v in ["v1", "v2", "v3", "v4"] {
            bag.set("k", &Value::from(v)).unwrap();
        }
        bag.set("other", &Value::map([("n", 1)])).unwrap();
        bag.set("gone", &Value::from(true)).unwrap();
        bag.delete("gone").unwrap();
    }

    let bag = DataBag::open(cfg).unwrap();
    assert_eq!(bag.get("k").unwrap(), Value::from("v4"));
    assert_eq!(bag.get_version("k", -1).unwrap(), Value::from("v3"));
    assert_eq!(bag.get_version("k", -2).unwrap(), Value::from("v2"));
    assert!(bag.get_version("k", -3).unwrap_err().is_not_found());
    assert_eq!(bag.get("other").unwrap(), Value::map([("n", 1)]));
    assert!(!bag.contains("gone"));

    let keys: Vec<String> = bag.iterate().collect();
    assert_eq!(keys, vec!["k", "other"]);

    // Write order survives the reopen
    let newest: Vec<String> = bag.by_created(true).map(|r| r.unwrap().0).collect();
    assert_eq!(newest, vec!["other", "k"]);
}

#[test]
fn reopen_restores_index_tables() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir).table("things");

    let (small, big) = {
        let bag = DocumentBag::open(cfg.clone()).unwrap();
        bag.ensure_index(["x", "y"]).unwrap();
        let small = bag.add(&Value::map([("x", 10), ("y", 99)])).unwrap();
        let big = bag.add(&Value::map([("x", 100), ("y", 999)])).unwrap();
        (small, big)
    };

    let engine = Arc::new(Engine::open_location(&cfg.location, false).unwrap());
    let rows = engine.read(|tables| tables.index("idx_things_x_y").map(|t| t.len()));
    assert_eq!(rows, Some(2));

    let bag = DocumentBag::with_engine(engine, &cfg).unwrap();
    // Not registered until ensured
    assert!(!bag.explain([QueryArg::eq("x", 10)]).unwrap().uses_index());
    bag.ensure_index(["y", "x"]).unwrap();
    assert!(bag.explain([QueryArg::eq("x", 10)]).unwrap().uses_index());

    let (key, _) = bag.find_one([QueryArg::eq("x", 10)]).unwrap().unwrap();
    assert_eq!(key, small);
    let sugar = Value::map([("x", Value::map([("$gt", 50)]))]);
    let (key, _) = bag.find_one([sugar]).unwrap().unwrap();
    assert_eq!(key, big);
}

#[test]
fn second_open_is_locked() {
    let dir = TempDir::new().unwrap();
    let _first = DataBag::open(config(&dir)).unwrap();
    let second = DataBag::open(config(&dir));
    assert!(matches!(
        second,
        Err(BagError::Storage(StorageError::Locked { .. }))
    ));
}

#[test]
fn lock_is_released_on_drop() {
    let dir = TempDir::new().unwrap();
    {
        let bag = DataBag::open(config(&dir)).unwrap();
        bag.set("a", &Value::from(1)).unwrap();
    }
    let bag = DataBag::open(config(&dir)).unwrap();
    assert_eq!(bag.get("a").unwrap(), Value::from(1));
}

#[test]
fn indexed_and_scanned_queries_agree() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open_location(&config(&dir).location, false).unwrap());
    let indexed = DocumentBag::with_engine(engine.clone(), &config(&dir).table("a")).unwrap();
    let scanned = DocumentBag::with_engine(engine, &config(&dir).table("b")).unwrap();
    indexed.ensure_index(["n", "tag"]).unwrap();

    let mut rng = rand::thread_rng();
    for i in 0..200 {
        let n: i64 = rng.gen_range(-50..50);
        let tag = ["red", "green", "blue", "7"][rng.gen_range(0..4)];
        let mut record = Value::map([("n", Value::from(n)), ("tag", Value::from(tag))]);
        if i % 17 == 0 {
            record = Value::map([("tag", tag)]);
        }
        let key = format!("k{i:03}");
        indexed.set(&key, &record).unwrap();
        scanned.set(&key, &record).unwrap();
    }

    let queries: Vec<Vec<QueryArg>> = vec![
        vec![Field::new("n").gt(10).into()],
        vec![Field::new("n").ge(-5).le(5).into()],
        vec![Field::new("n").ne(0).into(), QueryArg::eq("tag", "red")],
        vec![Field::new("tag").gt("blue").into()],
        vec![Field::new("tag").lt(100).into()],
        vec![Value::map([("n", Value::map([("$lte", -40)]))]).into()],
    ];

    for query in queries {
        assert!(indexed.explain(query.clone()).unwrap().uses_index());
        assert!(!scanned.explain(query.clone()).unwrap().uses_index());
        let a: Vec<String> = indexed.find(query.clone()).unwrap().map(|r| r.unwrap().0).collect();
        let b: Vec<String> = scanned.find(query).unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(a, b);
    }
}

#[test]
fn repetitive_values_store_smaller() {
    let dir = TempDir::new().unwrap();
    let bag = DataBag::open(config(&dir)).unwrap();

    let noise: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(100)
        .map(char::from)
        .collect();
    bag.set("same", &Value::from("a".repeat(100))).unwrap();
    bag.set("noise", &Value::from(noise.clone())).unwrap();

    assert!(bag.stored_len("same").unwrap() < bag.stored_len("noise").unwrap());
    assert_eq!(bag.get("same").unwrap(), Value::from("a".repeat(100)));
    assert_eq!(bag.get("noise").unwrap(), Value::from(noise));
}

#[test]
fn torn_tail_is_dropped_on_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bag.db");
    {
        let bag = DataBag::open(config(&dir)).unwrap();
        bag.set("a", &Value::from(1)).unwrap();
        bag.set("b", &Value::from(2)).unwrap();
    }

    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 2).unwrap();
    drop(file);

    let bag = DataBag::open(config(&dir)).unwrap();
    assert_eq!(bag.get("a").unwrap(), Value::from(1));
    assert!(!bag.contains("b"));
    bag.set("c", &Value::from(3)).unwrap();
    drop(bag);

    let bag = DataBag::open(config(&dir)).unwrap();
    assert_eq!(bag.len(), 2);
}

#[test]
fn damaged_middle_length_fails_open_and_keeps_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bag.db");
    let b_frame = {
        let bag = DataBag::open(config(&dir)).unwrap();
        bag.set("a", &Value::from("a")).unwrap();
        let b_frame = bag.engine().journal_size().unwrap() as usize;
        bag.set("b", &Value::from("b")).unwrap();
        bag.set("c", &Value::from("c")).unwrap();
        b_frame
    };

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[b_frame + 3] = 0x7f;
    std::fs::write(&path, &bytes).unwrap();

    let result = DataBag::open(config(&dir));
    assert!(matches!(result, Err(BagError::JournalCorruption { .. })));
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
}

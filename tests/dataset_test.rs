#![allow(missing_docs)]

use std::time::Duration;

use srcarc::{ArchiveError, DataSet, DataSetOptions, Mode, NdArray, Value};

fn options() -> DataSetOptions {
    DataSetOptions {
        array_threshold: Some(100),
        backend: "npy".to_string(),
        lock_timeout: Duration::from_millis(500),
    }
}

/// Creating a data set lays down the sentinel and metadata module; commits
/// and metadata survive a read-only reopen.
#[test]
fn test_create_commit_reopen() -> srcarc::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("run1");

    let small = NdArray::from_f64(vec![3], &[1.0, 2.0, 3.0])?;
    let large = NdArray::from_f64(vec![200], &[0.25; 200])?;

    let mut ds = DataSet::open(&dir, Mode::Write, options())?;
    ds.commit("a", Value::Array(small.clone()))?;
    ds.commit(
        "x",
        Value::list(vec![Value::Array(small.clone()), Value::Array(large.clone())]),
    )?;
    ds.set_info("a", Value::str("meta"))?;
    ds.set_info("x", Value::str("meta2"))?;

    assert!(dir.join("_this_dir_is_a_DataSet").is_file());
    assert!(dir.join("__init__.py").is_file());
    assert!(dir.join("a.py").is_file());
    assert!(dir.join("x.py").is_file());
    // Only the large array leaves the source text.
    assert!(dir.join("x_arrays").join("array_0.npy").is_file());
    assert!(!dir.join("a_arrays").exists());

    let ds = DataSet::open(&dir, Mode::Read, options())?;
    assert_eq!(ds.keys(), vec!["a", "x"]);
    assert!(ds.info("a").expect("info a").py_eq(&Value::str("meta")));
    assert!(ds.info("x").expect("info x").py_eq(&Value::str("meta2")));

    match ds.get("a")? {
        Value::Array(restored) => assert_eq!(restored, small),
        other => panic!("expected array, got {other:?}"),
    }
    match ds.get("x")? {
        Value::List(items) => {
            let items = items.snapshot();
            assert_eq!(items.len(), 2);
            assert!(matches!(&items[0], Value::Array(a) if *a == small));
            assert!(matches!(&items[1], Value::Array(a) if *a == large));
        }
        other => panic!("expected list, got {other:?}"),
    }
    Ok(())
}

/// Key modules collapse to their value on import (single-item form).
#[test]
fn test_key_modules_are_single_item() -> srcarc::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("run2");
    let mut ds = DataSet::open(&dir, Mode::Write, options())?;
    ds.commit("b", Value::list(vec![Value::Int(1), Value::Int(2)]))?;

    let source = std::fs::read_to_string(dir.join("b.py"))?;
    assert!(
        source.contains("_sys.modules[__name__] = b"),
        "module is not single-item:\n{source}"
    );
    Ok(())
}

/// Write operations on a read-only handle are rejected.
#[test]
fn test_read_only_rejected() -> srcarc::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("run3");
    let mut writer = DataSet::open(&dir, Mode::Write, options())?;
    writer.commit("k", Value::Int(1))?;

    let mut reader = DataSet::open(&dir, Mode::Read, options())?;
    match reader.commit("k2", Value::Int(2)) {
        Err(ArchiveError::ReadOnly(_)) => {}
        other => panic!("expected ReadOnly, got {other:?}"),
    }
    match reader.set_info("k", Value::None) {
        Err(ArchiveError::ReadOnly(_)) => {}
        other => panic!("expected ReadOnly, got {other:?}"),
    }
    Ok(())
}

/// Opening a directory without the sentinel fails; opening a missing
/// directory read-only fails.
#[test]
fn test_sentinel_guard() -> srcarc::Result<()> {
    let tmp = tempfile::tempdir()?;
    let plain = tmp.path().join("plain");
    std::fs::create_dir_all(&plain)?;
    match DataSet::open(&plain, Mode::Write, options()) {
        Err(ArchiveError::CorruptArchive(_)) => {}
        other => panic!("expected CorruptArchive, got {other:?}"),
    }
    match DataSet::open(tmp.path().join("absent"), Mode::Read, options()) {
        Err(ArchiveError::Io(_)) => {}
        other => panic!("expected Io, got {other:?}"),
    }
    Ok(())
}

/// A held exclusive lock makes writers time out with `Busy`.
#[test]
fn test_lock_timeout_is_busy() -> srcarc::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("run4");
    let mut ds = DataSet::open(
        &dir,
        Mode::Write,
        DataSetOptions {
            lock_timeout: Duration::from_millis(250),
            ..options()
        },
    )?;
    ds.commit("k", Value::Int(1))?;

    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(dir.join("_locked"))?;
    lock_file.lock()?;

    match ds.commit("k2", Value::Int(2)) {
        Err(ArchiveError::Busy(_)) => {}
        other => panic!("expected Busy, got {other:?}"),
    }
    lock_file.unlock()?;

    ds.commit("k2", Value::Int(2))?;
    assert!(ds.get("k2")?.py_eq(&Value::Int(2)));
    Ok(())
}

/// Committing the same key again replaces the stored value.
#[test]
fn test_recommit_replaces() -> srcarc::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("run5");
    let mut ds = DataSet::open(&dir, Mode::Write, options())?;
    ds.commit("v", Value::Int(1))?;
    ds.commit("v", Value::Int(2))?;
    assert!(ds.get("v")?.py_eq(&Value::Int(2)));
    assert_eq!(ds.keys(), vec!["v"]);
    Ok(())
}

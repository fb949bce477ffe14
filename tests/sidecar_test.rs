#![allow(missing_docs)]

use srcarc::backend::NpyBackend;
use srcarc::format::{read_npy, write_npy, NpyHeader, MAGIC_BYTES};
use srcarc::{Archive, ArchiveError, ArchiveOptions, DType, NdArray, Value};

/// The npy byte stream round-trips bit-exactly and keeps the standard
/// 64-byte header alignment.
#[test]
fn test_npy_format_round_trip() -> srcarc::Result<()> {
    let arrays = vec![
        NdArray::from_f64(vec![3], &[1.0, 2.5, -3.25])?,
        NdArray::from_i64(vec![2, 2], &[1, 2, 3, 4])?,
        NdArray::from_bool(vec![4], &[true, false, true, true])?,
        NdArray::from_c128(
            vec![2],
            &[
                num_complex::Complex64::new(1.0, -2.0),
                num_complex::Complex64::new(0.0, 3.5),
            ],
        )?,
    ];
    for array in arrays {
        let bytes = write_npy(&array);
        assert_eq!(&bytes[..6], &MAGIC_BYTES);
        let (header, offset) = NpyHeader::from_bytes(&bytes)?;
        assert_eq!(offset % 64, 0);
        assert_eq!(header.shape, array.shape());
        assert!(!header.fortran_order);

        let loaded = read_npy(&bytes)?;
        assert_eq!(loaded, array);
        assert_eq!(loaded.dtype(), array.dtype());
    }
    Ok(())
}

/// Unsupported descr strings are reported as corruption.
#[test]
fn test_npy_bad_descr() {
    match DType::from_descr(">f8") {
        Err(ArchiveError::CorruptArchive(_)) => {}
        other => panic!("expected CorruptArchive, got {other:?}"),
    }
}

/// Arrays at the threshold go to the sidecar, smaller ones stay inline.
#[test]
fn test_array_threshold() -> srcarc::Result<()> {
    let mut arch = Archive::with_options(
        ArchiveOptions::new().scoped(false).array_threshold(5),
    );
    let large = NdArray::from_i64(vec![10], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9])?;
    let small = NdArray::from_i64(vec![4], &[7, 8, 9, 10])?;
    arch.insert_as("big", Value::Array(large))?;
    arch.insert_as("small", Value::Array(small))?;
    let source = arch.render()?;

    assert!(source.contains("big = _arrays['array_0']\n"), "source:\n{source}");
    for digit in ["3", "6", "9"] {
        assert!(
            !source
                .lines()
                .find(|l| l.starts_with("big"))
                .expect("big line")
                .contains(digit),
            "big leaked elements:\n{source}"
        );
    }
    assert!(
        source.contains("small = _array([7, 8, 9, 10], dtype='int64')\n"),
        "source:\n{source}"
    );
    assert!(source.contains("from numpy import array as _array\n"));
    assert_eq!(arch.store().len(), 1);
    Ok(())
}

/// Keys are dense, assigned in first-encounter order, and shared arrays
/// keep one key.
#[test]
fn test_sidecar_keys_dense() -> srcarc::Result<()> {
    let mut arch = Archive::with_options(
        ArchiveOptions::new().scoped(false).array_threshold(1),
    );
    let a = NdArray::from_f64(vec![2], &[1.0, 2.0])?;
    let b = NdArray::from_f64(vec![2], &[3.0, 4.0])?;
    arch.insert_as(
        "pair",
        Value::list(vec![
            Value::Array(a.clone()),
            Value::Array(b),
            Value::Array(a),
        ]),
    )?;
    let source = arch.render()?;
    assert!(source.contains("_arrays['array_0']"));
    assert!(source.contains("_arrays['array_1']"));
    assert_eq!(arch.store().len(), 2);

    // The shared array is bound once and referenced twice.
    let ns = srcarc::restore_with(
        &source,
        &arch
            .store()
            .entries()
            .into_iter()
            .collect::<std::collections::HashMap<_, _>>(),
        "_arrays",
    )?;
    let Some(Value::List(pair)) = ns.get("pair") else {
        panic!("pair is not a list");
    };
    let items = pair.snapshot();
    assert_eq!(items[0].identity_key(), items[2].identity_key());
    Ok(())
}

/// Saved modules carry the loader boilerplate and reproduce the arrays
/// bit-exactly from the sidecar directory.
#[test]
fn test_save_and_reload() -> srcarc::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut arch = Archive::with_options(
        ArchiveOptions::new().scoped(false).array_threshold(5),
    );
    let xs = NdArray::from_i64(vec![10], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9])?;
    let ys = NdArray::from_f64(vec![20], &[0.5; 20])?;
    arch.insert_as("xs", Value::Array(xs.clone()))?;
    arch.insert_as("ys", Value::Array(ys.clone()))?;
    arch.save(dir.path(), "data", false, false)?;

    let module = dir.path().join("data.py");
    let sidecar = dir.path().join("data_arrays");
    assert!(module.is_file());
    assert!(sidecar.join("array_0.npy").is_file());
    assert!(sidecar.join("array_1.npy").is_file());

    let source = std::fs::read_to_string(&module)?;
    assert!(source.starts_with("import os as _os\n"), "no loader:\n{source}");
    assert!(source.contains("xs = _arrays['array_0']"));

    let body = srcarc::restore::strip_loader(&source);
    assert!(!body.contains("_ArrayDir"));
    let arrays = srcarc::sidecar::load(&sidecar, &NpyBackend)?;
    let ns = srcarc::restore_with(body, &arrays, "_arrays")?;
    match (ns.get("xs"), ns.get("ys")) {
        (Some(Value::Array(rx)), Some(Value::Array(ry))) => {
            assert_eq!(rx, &xs);
            assert_eq!(ry, &ys);
        }
        other => panic!("arrays missing after reload: {other:?}"),
    }
    Ok(())
}

/// Package layout puts the body in `__init__.py` with an `_arrays`
/// subdirectory.
#[test]
fn test_package_layout() -> srcarc::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut arch = Archive::with_options(ArchiveOptions::new().array_threshold(1));
    arch.insert_as("m", Value::Array(NdArray::from_f64(vec![3], &[1.0, 2.0, 3.0])?))?;
    arch.save(dir.path(), "stored", true, false)?;

    assert!(dir.path().join("stored").join("__init__.py").is_file());
    assert!(dir
        .path()
        .join("stored")
        .join("_arrays")
        .join("array_0.npy")
        .is_file());
    Ok(())
}

/// A source referencing a key the sidecar does not hold is corrupt.
#[test]
fn test_missing_key_is_corrupt() {
    let source = "x = _arrays['array_0']\n";
    match srcarc::restore(source) {
        Err(ArchiveError::CorruptArchive(_)) => {}
        other => panic!("expected CorruptArchive, got {other:?}"),
    }
}

/// `save_data` writes the sidecar without an accompanying module.
#[test]
fn test_save_data_only() -> srcarc::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut arch = Archive::with_options(ArchiveOptions::new().array_threshold(2));
    arch.insert_as("m", Value::Array(NdArray::from_i64(vec![3], &[5, 6, 7])?))?;
    arch.save_data(dir.path())?;
    assert!(dir.path().join("array_0.npy").is_file());

    let loaded = srcarc::sidecar::load(dir.path(), &NpyBackend)?;
    assert_eq!(loaded.len(), 1);
    Ok(())
}

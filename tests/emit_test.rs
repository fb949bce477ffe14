#![allow(missing_docs)]

use srcarc::emit::array_loader;
use srcarc::represent::{py_bytes, py_complex, py_float, py_str};
use srcarc::subst::{free_identifiers, replace_textual, replace_tokenized};

fn reps(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

/// Word-boundary replacement: whole identifiers only.
#[test]
fn test_textual_replacement_boundaries() {
    assert_eq!(
        replace_textual("n = array([1, 2, 3])", &reps(&[("array", "array_1")])),
        "n = array_1([1, 2, 3])"
    );
    assert_eq!(replace_textual("a + aa", &reps(&[("a", "c")])), "c + aa");
    assert_eq!(replace_textual("(a, a)", &reps(&[("a", "c")])), "(c, c)");
    // Attribute accesses are never rewritten.
    assert_eq!(
        replace_textual("obj.append(x)", &reps(&[("append", "bogus"), ("x", "y")])),
        "obj.append(y)"
    );
    // Keyword-argument labels are never rewritten.
    assert_eq!(
        replace_textual("f(x=x, y=x)", &reps(&[("x", "z")])),
        "f(x=z, y=z)"
    );
    // All spans splice at once, so one rewrite cannot feed another.
    assert_eq!(
        replace_textual("[a, b]", &reps(&[("a", "b"), ("b", "a")])),
        "[b, a]"
    );
}

/// The tokenizer-based strategy leaves string literals alone; the textual
/// one does not, which is exactly why `robust_replace` exists.
#[test]
fn test_tokenized_replacement_is_string_safe() -> srcarc::Result<()> {
    let expr = "f(q, 'a kw=q inside')";
    assert_eq!(
        replace_tokenized(expr, &reps(&[("q", "value")]))?,
        "f(value, 'a kw=q inside')"
    );
    assert_eq!(
        replace_textual(expr, &reps(&[("q", "value")])),
        "f(value, 'a kw=value inside')"
    );
    Ok(())
}

/// Free identifiers: first-occurrence order, attribute and keyword labels
/// excluded, literal keywords excluded.
#[test]
fn test_free_identifiers() -> srcarc::Result<()> {
    assert_eq!(
        free_identifiers("[x, y, y]")?,
        vec!["x".to_string(), "y".to_string()]
    );
    assert_eq!(
        free_identifiers("cls.__new__(cls, a, k=b)")?,
        vec!["cls".to_string(), "a".to_string(), "b".to_string()]
    );
    assert_eq!(free_identifiers("{'s': True, 'n': None}")?, Vec::<String>::new());
    assert_eq!(
        free_identifiers("_arrays['array_0']")?,
        vec!["_arrays".to_string()]
    );
    Ok(())
}

/// Python literal rendering round-trips through the evaluator's notion of
/// the same literals.
#[test]
fn test_literal_rendering() {
    assert_eq!(py_float(1.0), "1.0");
    assert_eq!(py_float(-0.5), "-0.5");
    assert_eq!(py_float(1e100), "1e100");
    assert_eq!(py_float(2.5e-7), "2.5e-7");
    assert_eq!(py_complex(1.0, 2.0), "(1.0+2.0j)");
    assert_eq!(py_complex(1.0, -2.0), "(1.0-2.0j)");
    assert_eq!(py_complex(0.0, 3.0), "3.0j");
    assert_eq!(py_str("it's\n"), "'it\\'s\\n'");
    assert_eq!(py_bytes(b"\x00ab\xff"), "b'\\x00ab\\xff'");
}

/// The loader boilerplate names the sidecar relative to the module and
/// ends with the marker line the restore side strips on.
#[test]
fn test_loader_boilerplate() {
    let npy = array_loader("_arrays", "data_arrays", "npy");
    assert!(npy.starts_with("import os as _os\n"));
    assert!(npy.contains("numpy.load"));
    assert!(npy.contains("'data_arrays'"));
    assert!(npy.ends_with("del _os, _ArrayDir\n"));

    let hdf5 = array_loader("_store", "_arrays", "hdf5");
    assert!(hdf5.contains("h5py.File"));
    assert!(hdf5.contains("_store = _ArrayDir"));
}

/// Restore rejects what it cannot faithfully rebuild.
#[test]
fn test_restore_rejects_unknown() {
    assert!(srcarc::restore("x = unknown_name\n").is_err());
    assert!(srcarc::restore("x = 1 +\n").is_err());
    match srcarc::restore("from mymod import Cls as _Cls\nx = _Cls.__new__(_Cls)\n") {
        Err(srcarc::ArchiveError::Restore(_)) => {}
        other => panic!("expected Restore error, got {other:?}"),
    }
}

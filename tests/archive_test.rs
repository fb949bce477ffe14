#![allow(missing_docs)]

use srcarc::{
    Archive, ArchiveError, ArchiveOptions, List, NewArgs, Range, Rep, Representable, Symbol,
    Value,
};

fn flat() -> Archive {
    Archive::with_options(ArchiveOptions::new().scoped(false))
}

/// Simple values survive a render → restore round trip.
/// Validates `Archive::render`, `restore`, primitive representers.
#[test]
fn test_simple_round_trip() -> srcarc::Result<()> {
    let values: Vec<Value> = vec![
        Value::None,
        Value::Bool(true),
        Value::Bool(false),
        Value::Int(1),
        Value::Int(-42),
        Value::BigInt("123456789012345678901234567890".parse().expect("bigint")),
        Value::Float(1.0),
        Value::Float(0.1),
        Value::Float(1e100),
        Value::Complex(num_complex::Complex64::new(1.0, 2.0)),
        Value::str("asd"),
        Value::str("with 'quotes' and\nnewlines"),
        Value::bytes(vec![0u8, 1, 2, 255]),
        Value::Range(Range::new(1, 10, 2)),
        Value::tuple(vec![Value::Int(1)]),
        Value::tuple(vec![]),
        Value::list(vec![Value::Int(1), Value::Int(2)]),
        Value::dict(vec![(Value::str("b"), Value::Int(1)), (Value::str("a"), Value::Int(2))]),
        Value::FrozenSet(std::sync::Arc::new(vec![Value::Int(3), Value::Int(1)])),
    ];
    for value in values {
        let mut arch = flat();
        arch.insert_as("x", value.clone())?;
        let source = arch.render()?;
        let ns = srcarc::restore(&source)?;
        let restored = ns.get("x").expect("x is bound");
        assert!(
            restored.py_eq(&value),
            "round trip changed {value:?} into {restored:?}\nsource:\n{source}"
        );
    }
    Ok(())
}

/// The flat rendering of a small archive is exactly the expected program.
#[test]
fn test_flat_layout() -> srcarc::Result<()> {
    let mut arch = flat();
    arch.insert_as("a", 1i64)?;
    arch.insert_as("x", Range::to(2))?;
    arch.insert_as("y", Range::to(3))?;
    arch.insert_as(
        "b",
        Value::list(vec![
            Value::Range(Range::to(2)),
            Value::Range(Range::to(3)),
            Value::Range(Range::to(3)),
        ]),
    )?;
    let source = arch.render()?;
    assert_eq!(
        source,
        "a = 1\n\
         x = range(0, 2)\n\
         y = range(0, 3)\n\
         b = [x, y, y]\n\
         try: del __builtins__, _arrays\n\
         except NameError: pass\n"
    );
    Ok(())
}

/// Shared references stay shared: the shared list is rendered once and the
/// restored graph aliases one allocation.
#[test]
fn test_sharing_preserved() -> srcarc::Result<()> {
    let shared = Value::list(vec![Value::Int(7)]);
    let graph = Value::list(vec![
        shared.clone(),
        Value::list(vec![shared.clone(), shared.clone()]),
    ]);
    let mut arch = flat();
    arch.insert_as("graph", graph)?;
    let source = arch.render()?;

    assert_eq!(source.matches("[7]").count(), 1, "source:\n{source}");

    let ns = srcarc::restore(&source)?;
    let Some(Value::List(outer)) = ns.get("graph") else {
        panic!("graph is not a list");
    };
    let items = outer.snapshot();
    let Value::List(inner) = &items[1] else {
        panic!("second item is not a list");
    };
    let inner_items = inner.snapshot();
    assert_eq!(items[0].identity_key(), inner_items[0].identity_key());
    assert_eq!(inner_items[0].identity_key(), inner_items[1].identity_key());
    Ok(())
}

/// A node referenced twice by the same parent is not inlined even though it
/// has a single parent.
#[test]
fn test_double_reference_not_duplicated() -> srcarc::Result<()> {
    let child = Value::list(vec![Value::Int(1)]);
    let parent = Value::list(vec![child.clone(), child.clone()]);
    let mut arch = flat();
    arch.insert_as("z", parent)?;
    let source = arch.render()?;
    assert_eq!(source.matches("[1]").count(), 1, "source:\n{source}");

    let ns = srcarc::restore(&source)?;
    let Some(Value::List(z)) = ns.get("z") else {
        panic!("z is not a list");
    };
    let items = z.snapshot();
    assert_eq!(items[0].identity_key(), items[1].identity_key());
    Ok(())
}

/// A self-referencing list is rejected with `Cyclic` and the archive stays
/// usable.
#[test]
fn test_cycle_rejected() -> srcarc::Result<()> {
    let cyclic = List::new();
    cyclic.push(Value::List(cyclic.clone()));

    let mut arch = Archive::new();
    arch.insert_as("a", Value::List(cyclic))?;
    match arch.render() {
        Err(ArchiveError::Cyclic(_)) => {}
        other => panic!("expected Cyclic, got {other:?}"),
    }

    // The failed render had no side effects.
    let mut arch = Archive::new();
    arch.insert_as("b", 1i64)?;
    assert!(arch.render()?.contains("b = 1"));
    Ok(())
}

/// Repeated renders are byte-identical.
#[test]
fn test_idempotent_render() -> srcarc::Result<()> {
    for scoped in [false, true] {
        let mut arch = Archive::with_options(ArchiveOptions::new().scoped(scoped));
        let shared = Value::list(vec![Value::str("s"), Value::Float(2.5)]);
        arch.insert_as("v", Value::list(vec![shared.clone(), shared]))?;
        arch.insert_as("w", Value::dict(vec![(Value::str("k"), Value::Int(1))]))?;
        let first = arch.render()?;
        let second = arch.render()?;
        assert_eq!(first, second);
    }
    Ok(())
}

/// Flat and scoped renderings evaluate to equivalent namespaces.
#[test]
fn test_scoped_flat_equivalence() -> srcarc::Result<()> {
    let build = |scoped: bool| -> srcarc::Result<String> {
        let shared = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let mut arch = Archive::with_options(ArchiveOptions::new().scoped(scoped));
        arch.insert_as("l", Value::list(vec![shared.clone(), shared]))?;
        arch.insert_as(
            "d",
            Value::dict(vec![
                (Value::str("s"), Value::str("hi")),
                (Value::str("t"), Value::tuple(vec![Value::Int(9)])),
            ]),
        )?;
        arch.render()
    };
    let flat_ns = srcarc::restore(&build(false)?)?;
    let scoped_ns = srcarc::restore(&build(true)?)?;
    assert_eq!(flat_ns.names(), scoped_ns.names());
    for name in flat_ns.names() {
        let a = flat_ns.get(name).expect("bound");
        let b = scoped_ns.get(name).expect("bound");
        assert!(a.py_eq(b), "{name} differs: {a:?} vs {b:?}");
    }
    Ok(())
}

/// Equal sets render the same literal regardless of construction order.
#[test]
fn test_set_order_deterministic() -> srcarc::Result<()> {
    let render = |items: Vec<i64>| -> srcarc::Result<String> {
        let set = Value::FrozenSet(std::sync::Arc::new(
            items.into_iter().map(Value::Int).collect(),
        ));
        let mut arch = flat();
        arch.insert_as("s", set)?;
        arch.render()
    };
    assert_eq!(render(vec![3, 1, 2])?, render(vec![2, 3, 1])?);
    assert!(render(vec![3, 1, 2])?.contains("frozenset([1, 2, 3])"));
    Ok(())
}

/// Name validation: reserved prefixes, shadowed builtins, pattern misses
/// and conflicting rebinds are all collisions; an identical rebind is not.
#[test]
fn test_name_validation() -> srcarc::Result<()> {
    let mut arch = Archive::new();
    for bad in ["_a", "range", "not valid", "0x"] {
        match arch.insert_as(bad, 1i64) {
            Err(ArchiveError::NameCollision(_)) => {}
            other => panic!("expected NameCollision for {bad:?}, got {other:?}"),
        }
    }
    arch.insert_as("x", 2i64)?;
    arch.insert_as("x", 2i64)?; // same value: no-op
    match arch.insert_as("x", 3i64) {
        Err(ArchiveError::NameCollision(_)) => {}
        other => panic!("expected NameCollision, got {other:?}"),
    }
    Ok(())
}

/// Two names bound to one value become a definition plus an alias.
#[test]
fn test_alias_binding() -> srcarc::Result<()> {
    let mut arch = flat();
    arch.insert_as("x1", Value::None)?;
    arch.insert_as("x2", Value::None)?;
    let source = arch.render()?;
    assert!(source.contains("x2 = None\n"), "source:\n{source}");
    assert!(source.contains("x1 = x2\n"), "source:\n{source}");

    let ns = srcarc::restore(&source)?;
    assert!(ns.get("x1").expect("x1").py_eq(&Value::None));
    assert!(ns.get("x2").expect("x2").py_eq(&Value::None));
    Ok(())
}

/// Non-finite floats deduplicate onto one helper binding.
#[test]
fn test_nonfinite_floats_shared() -> srcarc::Result<()> {
    let mut arch = flat();
    arch.insert_as(
        "c",
        Value::list(vec![
            Value::Float(f64::INFINITY),
            Value::Float(f64::INFINITY),
            Value::Float(f64::NAN),
        ]),
    )?;
    let source = arch.render()?;
    assert_eq!(source.matches("float(\"inf\")").count(), 1, "source:\n{source}");

    let ns = srcarc::restore(&source)?;
    let Some(Value::List(c)) = ns.get("c") else {
        panic!("c is not a list");
    };
    let items = c.snapshot();
    assert!(items[0].py_eq(&Value::Float(f64::INFINITY)));
    assert!(matches!(items[2], Value::Float(f) if f.is_nan()));
    Ok(())
}

/// Functions and classes archive as imports.
#[test]
fn test_symbol_round_trip() -> srcarc::Result<()> {
    let mut arch = flat();
    arch.insert_as("f", Value::symbol("math", "sin"))?;
    let source = arch.render()?;
    assert!(source.contains("from math import sin as _sin\n"), "source:\n{source}");
    assert!(source.contains("f = _sin\n"));
    assert!(source.contains("del _sin\n"));

    let ns = srcarc::restore(&source)?;
    let Some(Value::Symbol(sym)) = ns.get("f") else {
        panic!("f is not a symbol");
    };
    assert_eq!((sym.module.as_str(), sym.qualname.as_str()), ("math", "sin"));
    Ok(())
}

/// Alias hints from different modules stay distinct.
#[test]
fn test_import_alias_collision() -> srcarc::Result<()> {
    let mut arch = flat();
    arch.insert_as("f", Value::symbol("math", "sin"))?;
    arch.insert_as("g", Value::symbol("mypkg.trig", "sin"))?;
    let source = arch.render()?;
    assert!(source.contains("from math import sin as _sin\n"));
    assert!(source.contains("from mypkg.trig import sin as _sin_2\n"));
    assert!(source.contains("g = _sin_2\n"));
    Ok(())
}

#[derive(Debug)]
struct Broken;

impl Representable for Broken {
    fn type_symbol(&self) -> Symbol {
        Symbol::new("tests", "Broken")
    }

    fn persistent_rep(&self) -> Option<srcarc::Result<Rep>> {
        Some(Err(ArchiveError::NotRepresentable("Broken".into())))
    }
}

/// `check_on_insert` surfaces representation failures at insert time.
#[test]
fn test_check_on_insert() {
    let mut eager = Archive::with_options(ArchiveOptions::new().check_on_insert(true));
    match eager.insert_as("a", Value::object(Broken)) {
        Err(ArchiveError::NotRepresentable(_)) => {}
        other => panic!("expected NotRepresentable, got {other:?}"),
    }

    let mut lazy = Archive::new();
    lazy.insert_as("a", Value::object(Broken)).expect("insert");
    match lazy.render() {
        Err(ArchiveError::NotRepresentable(_)) => {}
        other => panic!("expected NotRepresentable, got {other:?}"),
    }
}

#[derive(Debug)]
struct Opaque;

impl Representable for Opaque {
    fn type_symbol(&self) -> Symbol {
        Symbol::new("tests", "Opaque")
    }
}

/// An object exposing no capability cannot be archived.
#[test]
fn test_no_capability_rejected() {
    let mut arch = Archive::new();
    arch.insert_as("a", Value::object(Opaque)).expect("insert");
    match arch.render() {
        Err(ArchiveError::NotRepresentable(_)) => {}
        other => panic!("expected NotRepresentable, got {other:?}"),
    }
}

#[derive(Debug)]
struct Unbound;

impl Representable for Unbound {
    fn type_symbol(&self) -> Symbol {
        Symbol::new("tests", "Unbound")
    }

    fn persistent_rep(&self) -> Option<srcarc::Result<Rep>> {
        Some(Ok(Rep::literal("mystery + 1")))
    }
}

/// A representer referencing an undefined name is a fatal defect.
#[test]
fn test_unbound_identifier_rejected() {
    let mut arch = Archive::new();
    arch.insert_as("a", Value::object(Unbound)).expect("insert");
    match arch.render() {
        Err(ArchiveError::UnboundFreeIdentifier(_)) => {}
        other => panic!("expected UnboundFreeIdentifier, got {other:?}"),
    }
}

#[derive(Debug)]
struct Pickleable;

impl Representable for Pickleable {
    fn type_symbol(&self) -> Symbol {
        Symbol::new("mymod", "Pickleable")
    }

    fn new_args(&self) -> Option<NewArgs> {
        Some(NewArgs {
            args: vec![Value::str("a"), Value::Int(3)],
            kwargs: Vec::new(),
        })
    }

    fn state(&self) -> Option<Value> {
        Some(Value::dict(vec![(Value::str("x"), Value::Int(1))]))
    }

    fn has_set_state(&self) -> bool {
        true
    }
}

/// Reconstitution via `__new__` plus `__setstate__`; the constructor is
/// never called.
#[test]
fn test_pickle_style_reconstruction() -> srcarc::Result<()> {
    let mut arch = flat();
    arch.insert_as("p", Value::object(Pickleable))?;
    let source = arch.render()?;
    assert!(
        source.contains("p = _Pickleable.__new__(_Pickleable, 'a', 3)\n"),
        "source:\n{source}"
    );
    assert!(
        source.contains("p.__setstate__({'x': 1})\n"),
        "source:\n{source}"
    );
    assert!(!source.contains("_Pickleable("), "constructor call leaked:\n{source}");
    Ok(())
}

#[derive(Debug)]
struct Reduced;

impl Representable for Reduced {
    fn type_symbol(&self) -> Symbol {
        Symbol::new("mymod", "Thing")
    }

    fn reduce(&self) -> Option<srcarc::Reduction> {
        let mut reduction =
            srcarc::Reduction::call(Symbol::new("mymod", "make_thing"), vec![Value::Int(2)]);
        reduction.state = Some(Value::dict(vec![(Value::str("n"), Value::Int(5))]));
        reduction
            .list_items
            .extend([Value::Int(8), Value::Int(9)]);
        Some(reduction)
    }
}

/// The reduce capability becomes a call expression with state and item
/// post-assignments.
#[test]
fn test_reduce_protocol() -> srcarc::Result<()> {
    let mut arch = flat();
    arch.insert_as("t", Value::object(Reduced))?;
    let source = arch.render()?;
    assert!(source.contains("from mymod import make_thing as _make_thing\n"));
    assert!(source.contains("t = _make_thing(2)\n"), "source:\n{source}");
    assert!(
        source.contains("t.__dict__.update({'n': 5})\n"),
        "source:\n{source}"
    );
    assert!(source.contains("t.extend([8, 9])\n"), "source:\n{source}");
    Ok(())
}

/// Deeply nested structures do not overflow the walk.
#[test]
fn test_deep_nesting() -> srcarc::Result<()> {
    let mut value = Value::Int(0);
    for _ in 0..300 {
        value = Value::list(vec![value]);
    }
    let mut arch = flat();
    arch.insert_as("deep", value)?;
    let source = arch.render()?;
    assert!(source.contains("deep = "));
    Ok(())
}

/// Scoped emission wraps each node in an immediately-invoked function.
#[test]
fn test_scoped_layout() -> srcarc::Result<()> {
    let mut arch = Archive::new();
    arch.insert_as("x", Value::list(vec![Value::Int(1)]))?;
    let source = arch.render()?;
    assert_eq!(
        source,
        "def _g0():\n\
         \x20   return 1\n\
         _g0 = _g0()\n\
         def x(_a0=_g0):\n\
         \x20   return [_a0]\n\
         x = x()\n\
         del _g0\n\
         try: del __builtins__, _arrays\n\
         except NameError: pass\n"
    );
    let ns = srcarc::restore(&source)?;
    assert!(ns.get("x").expect("x").py_eq(&Value::list(vec![Value::Int(1)])));
    Ok(())
}

/// Single-item mode appends the module-table replacement.
#[test]
fn test_single_item_epilogue() -> srcarc::Result<()> {
    let mut arch = Archive::with_options(
        ArchiveOptions::new().scoped(false).single_item_mode(true),
    );
    arch.insert_as("b", Value::list(vec![Value::Int(1), Value::Int(2)]))?;
    let source = arch.render()?;
    assert!(source.ends_with(
        "import sys as _sys\n\
         _sys.modules[__name__] = b\n\
         del _sys\n"
    ));
    // Restore tolerates the epilogue.
    let ns = srcarc::restore(&source)?;
    assert!(ns.get("b").is_some());
    Ok(())
}

/// A custom array lookup name flows through the cleanup contract.
#[test]
fn test_custom_data_name() -> srcarc::Result<()> {
    let mut arch = Archive::with_options(
        ArchiveOptions::new()
            .scoped(false)
            .data_name("_store")
            .array_threshold(2),
    );
    let array = srcarc::NdArray::from_i64(vec![4], &[1, 2, 3, 4])?;
    arch.insert_as("m", Value::Array(array))?;
    let source = arch.render()?;
    assert!(source.contains("m = _store['array_0']\n"), "source:\n{source}");
    assert!(source.contains("try: del __builtins__, _store\n"));
    Ok(())
}

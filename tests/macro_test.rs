#![allow(missing_docs)]

use serde::Serialize;
use srcarc::{Archive, ArchiveOptions, Representable, Value};

#[derive(Debug, Serialize, Representable)]
#[representable(module = "geo.shapes")]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, Representable)]
#[representable(module = "geo.shapes", name = "BBox")]
struct BoundingBox {
    lo: Point,
    hi: Point,
    #[representable(skip)]
    cached_area: f64,
}

/// The derived representer renders a keyword-argument constructor call.
#[test]
fn test_derived_rep() -> srcarc::Result<()> {
    let mut arch = Archive::with_options(ArchiveOptions::new().scoped(false));
    arch.insert_as("p", Value::object(Point { x: 1.0, y: 2.5 }))?;
    let source = arch.render()?;
    assert_eq!(
        source,
        "from geo.shapes import Point as _Point\n\
         p = _Point(x=1.0, y=2.5)\n\
         del _Point\n\
         try: del __builtins__, _arrays\n\
         except NameError: pass\n"
    );
    Ok(())
}

/// Nested derived objects become nested constructor calls; skipped fields
/// stay out of the archive.
#[test]
fn test_derived_nested_and_skip() -> srcarc::Result<()> {
    let bbox = BoundingBox {
        lo: Point { x: 0.0, y: 0.0 },
        hi: Point { x: 4.0, y: 3.0 },
        cached_area: 12.0,
    };
    let mut arch = Archive::with_options(ArchiveOptions::new().scoped(false));
    arch.insert_as("b", Value::object(bbox))?;
    let source = arch.render()?;

    assert!(source.contains("from geo.shapes import BBox as _BBox\n"), "source:\n{source}");
    assert!(!source.contains("cached_area"), "skipped field leaked:\n{source}");
    // Fields serialize through the value model, so nested structs arrive
    // as dicts.
    assert!(
        source.contains("b = _BBox(lo={'x': 0.0, 'y': 0.0}, hi={'x': 4.0, 'y': 3.0})\n"),
        "source:\n{source}"
    );
    Ok(())
}

#[derive(Debug, Serialize, Representable)]
#[representable(module = "geo.shapes", name = "Shapes.Square")]
struct Square {
    side: f64,
}

/// A dotted qualified-name override still produces a flat import alias
/// and a valid constructor call.
#[test]
fn test_derived_dotted_name() -> srcarc::Result<()> {
    let mut arch = Archive::with_options(ArchiveOptions::new().scoped(false));
    arch.insert_as("s", Value::object(Square { side: 2.0 }))?;
    let source = arch.render()?;
    assert!(
        source.contains("from geo.shapes import Shapes.Square as _Square\n"),
        "source:\n{source}"
    );
    assert!(source.contains("s = _Square(side=2.0)\n"), "source:\n{source}");
    assert!(source.contains("del _Square\n"), "source:\n{source}");
    Ok(())
}

/// Derived objects inside containers participate in graph sharing.
#[test]
fn test_derived_in_container() -> srcarc::Result<()> {
    let point = Value::object(Point { x: 7.0, y: 8.0 });
    let mut arch = Archive::with_options(ArchiveOptions::new().scoped(false));
    arch.insert_as("pts", Value::list(vec![point.clone(), point]))?;
    let source = arch.render()?;

    assert_eq!(
        source.matches("_Point(x=7.0, y=8.0)").count(),
        1,
        "source:\n{source}"
    );
    assert!(source.contains("pts = [_g0, _g0]\n"), "source:\n{source}");
    Ok(())
}

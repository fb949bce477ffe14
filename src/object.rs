//! The object persistence protocol.
//!
//! User types enter the value model through [`Representable`], a capability
//! trait standing in for the attribute bags and reduction hooks of a dynamic
//! runtime. The object handler in [`crate::representers`] consults the
//! capabilities in a fixed order:
//!
//! 1. [`Representable::persistent_rep`] — a custom representer returning a
//!    full [`Rep`] triple.
//! 2. [`Representable::reduce`] — a `callable(*args)` reconstruction with
//!    optional state, list items and dict items applied afterwards.
//! 3. [`Representable::new_args`] — allocation via `Cls.__new__(Cls, ...)`.
//! 4. Bare `Cls.__new__(Cls)` with state from [`Representable::state`] or
//!    [`Representable::attr_dict`].
//!
//! State restoration deliberately never runs the type's constructor; a
//! stored object is rebuilt exactly from what the capabilities expose.
//!
//! `#[derive(Representable)]` generates capability 1 from a struct's fields.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::represent::Rep;
use crate::value::Value;

/// A class or function addressed by module path, reconstructed on load via
/// `from module import qualname`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    /// Dotted module path, e.g. `collections`.
    pub module: String,
    /// Qualified name inside the module, e.g. `OrderedDict`.
    pub qualname: String,
}

impl Symbol {
    /// Creates a symbol.
    pub fn new(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
        }
    }

    /// The default import alias hint: the qualified name's last segment.
    pub fn alias_hint(&self) -> &str {
        self.qualname
            .rsplit('.')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.qualname)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.qualname)
    }
}

/// The payload of a `reduce` capability: call `callable(*args)`, then apply
/// the optional extras in order.
#[derive(Debug, Clone)]
pub struct Reduction {
    /// The reconstructing callable.
    pub callable: Symbol,
    /// Positional arguments for the callable.
    pub args: Vec<Value>,
    /// State handed to `__setstate__` (or merged into `__dict__`).
    pub state: Option<Value>,
    /// Items appended to the rebuilt object.
    pub list_items: Vec<Value>,
    /// Entries assigned into the rebuilt object.
    pub dict_items: Vec<(Value, Value)>,
}

impl Reduction {
    /// A plain `callable(*args)` reduction with no extras.
    pub fn call(callable: Symbol, args: Vec<Value>) -> Self {
        Self {
            callable,
            args,
            state: None,
            list_items: Vec::new(),
            dict_items: Vec::new(),
        }
    }
}

/// Arguments for allocation through `Cls.__new__(Cls, ...)`.
#[derive(Debug, Clone, Default)]
pub struct NewArgs {
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Vec<(String, Value)>,
}

/// Capability set through which user objects describe their own persistent
/// representation.
///
/// Only [`Representable::type_symbol`] is required; every capability
/// defaults to "absent". An object providing none of them cannot be
/// archived and fails with `NotRepresentable`.
pub trait Representable: fmt::Debug + Send + Sync {
    /// The class this object reconstructs through; drives the emitted
    /// import.
    fn type_symbol(&self) -> Symbol;

    /// Custom representer: a complete `(expr, args, imports)` triple.
    fn persistent_rep(&self) -> Option<Result<Rep>> {
        None
    }

    /// Reconstruction via a callable, in the style of `__reduce__`.
    fn reduce(&self) -> Option<Reduction> {
        None
    }

    /// Allocation arguments, in the style of `__getnewargs_ex__`.
    fn new_args(&self) -> Option<NewArgs> {
        None
    }

    /// Restorable state, in the style of `__getstate__`.
    fn state(&self) -> Option<Value> {
        None
    }

    /// Whether the reconstructed class applies state through
    /// `__setstate__`. When `false`, state merges into the attribute dict.
    fn has_set_state(&self) -> bool {
        false
    }

    /// Attribute dictionary fallback for objects without explicit state.
    fn attr_dict(&self) -> Option<Vec<(String, Value)>> {
        None
    }
}

/// Shared handle to a [`Representable`] object. Identity is the allocation.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Representable>);

impl ObjectRef {
    /// Wraps an object.
    pub fn new<T: Representable + 'static>(obj: T) -> Self {
        Self(Arc::new(obj))
    }

    /// Access to the protocol surface.
    pub fn protocol(&self) -> &dyn Representable {
        self.0.as_ref()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

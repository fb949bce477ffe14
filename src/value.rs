//! The in-memory value model.
//!
//! Archives operate on [`Value`] graphs rather than on arbitrary Rust types.
//! The variant set mirrors the data kinds the emitter knows how to render:
//! primitives, ordered sequences, mappings, sets, ranges, dense numeric
//! arrays, symbols referenced by module path, and objects implementing the
//! [`Representable`](crate::object::Representable) protocol.
//!
//! Mutable containers ([`List`], [`Dict`], [`Set`]) are cheap shared handles:
//! cloning a `Value` clones an `Arc`, so a value appearing twice in an
//! archive is *the same* container, and the emitted source preserves that
//! sharing. Atoms (numbers, strings, ranges, tuples of atoms) deduplicate by
//! value instead, since their identity is not observable.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use num_bigint::BigInt;
use num_complex::Complex64;

use crate::array::NdArray;
use crate::object::{ObjectRef, Representable, Symbol};

/// A value that can be inserted into an archive.
#[derive(Clone)]
pub enum Value {
    /// Python `None`.
    None,
    /// Boolean.
    Bool(bool),
    /// Machine-width integer.
    Int(i64),
    /// Arbitrary-precision integer.
    BigInt(BigInt),
    /// Double-precision float, including the non-finite values.
    Float(f64),
    /// Complex number.
    Complex(Complex64),
    /// Text string.
    Str(Arc<str>),
    /// Byte string.
    Bytes(Arc<[u8]>),
    /// Shared mutable sequence.
    List(List),
    /// Immutable sequence.
    Tuple(Arc<Vec<Value>>),
    /// Shared mutable mapping preserving insertion order.
    Dict(Dict),
    /// Shared mutable unordered collection.
    Set(Set),
    /// Immutable unordered collection.
    FrozenSet(Arc<Vec<Value>>),
    /// An integer range, reconstructed through the `range` constructor.
    Range(Range),
    /// Dense numeric array.
    Array(NdArray),
    /// A class or function referenced by module path.
    Symbol(Arc<Symbol>),
    /// A user object exposing the persistent-representation protocol.
    Object(ObjectRef),
}

/// An integer range `start..stop` advancing by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// First element.
    pub start: i64,
    /// Exclusive upper bound.
    pub stop: i64,
    /// Stride; never zero.
    pub step: i64,
}

impl Range {
    /// A range from zero to `stop` with unit stride.
    pub fn to(stop: i64) -> Self {
        Self { start: 0, stop, step: 1 }
    }

    /// A range with explicit bounds and stride.
    pub fn new(start: i64, stop: i64, step: i64) -> Self {
        Self { start, stop, step }
    }
}

macro_rules! shared_seq {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name(Arc<RwLock<Vec<Value>>>);

        impl $name {
            /// Creates an empty collection.
            pub fn new() -> Self {
                Self(Arc::new(RwLock::new(Vec::new())))
            }

            /// Creates a collection from existing items.
            pub fn from_vec(items: Vec<Value>) -> Self {
                Self(Arc::new(RwLock::new(items)))
            }

            /// Appends an item.
            pub fn push(&self, item: Value) {
                self.0.write().unwrap_or_else(PoisonError::into_inner).push(item);
            }

            /// Number of items.
            pub fn len(&self) -> usize {
                self.0.read().unwrap_or_else(PoisonError::into_inner).len()
            }

            /// True if the collection holds no items.
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Clones out the current items.
            pub fn snapshot(&self) -> Vec<Value> {
                self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
            }

            /// Address of the shared allocation; used as the identity key.
            pub(crate) fn addr(&self) -> usize {
                Arc::as_ptr(&self.0) as *const () as usize
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_list()
                    .entries(self.0.read().unwrap_or_else(PoisonError::into_inner).iter())
                    .finish()
            }
        }
    };
}

shared_seq! {
    /// A shared mutable sequence. Clones alias the same storage.
    List
}

shared_seq! {
    /// A shared mutable collection with set semantics. Duplicate values
    /// (by [`Value::py_eq`]) are ignored on insert.
    Set
}

impl Set {
    /// Inserts an item unless an equal one is already present.
    pub fn insert(&self, item: Value) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|v| v.py_eq(&item)) {
            guard.push(item);
        }
    }
}

/// A shared mutable mapping preserving insertion order.
#[derive(Clone)]
pub struct Dict(Arc<RwLock<Vec<(Value, Value)>>>);

impl Dict {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(Vec::new())))
    }

    /// Creates a mapping from existing entries, keeping their order.
    pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        Self(Arc::new(RwLock::new(entries)))
    }

    /// Inserts or replaces the entry for `key`. Replacement keeps the
    /// original position, like insertion-ordered mappings do.
    pub fn insert(&self, key: Value, value: Value) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = guard.iter_mut().find(|(k, _)| k.py_eq(&key)) {
            slot.1 = value;
        } else {
            guard.push((key, value));
        }
    }

    /// Looks up the value for `key`.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(k, _)| k.py_eq(key))
            .map(|(_, v)| v.clone())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if the mapping holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones out the current entries in insertion order.
    pub fn snapshot(&self) -> Vec<(Value, Value)> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Default for Dict {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.0
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .map(|(k, v)| (k, v)),
            )
            .finish()
    }
}

// --- Identity ---

/// Key under which two source values collapse to one graph node.
///
/// Mutable containers, arrays and objects keep pointer identity so that
/// shared references stay shared in the output. Atoms use value equality:
/// two equal integers are indistinguishable and may share a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjKey {
    /// Pointer identity of a shared allocation.
    Ptr(usize),
    /// Structural identity of an atom.
    Atom(AtomKey),
}

/// Hashable rendition of an identity-unstable atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AtomKey {
    /// `None`.
    None,
    /// Boolean.
    Bool(bool),
    /// Machine integer.
    Int(i64),
    /// Big integer, keyed by its decimal rendering.
    Big(String),
    /// Float, keyed by its bit pattern.
    Float(u64),
    /// Complex, keyed by both bit patterns.
    Complex(u64, u64),
    /// Text string.
    Str(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Range bounds.
    Range(i64, i64, i64),
    /// Module path and qualified name.
    Symbol(String, String),
    /// Tuple whose elements are all atoms.
    Tuple(Vec<AtomKey>),
    /// Frozenset whose elements are all atoms, keyed in sorted order.
    FrozenSet(Vec<AtomKey>),
}

impl Value {
    /// Convenience constructor for a shared list.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(List::from_vec(items))
    }

    /// Convenience constructor for a tuple.
    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Arc::new(items))
    }

    /// Convenience constructor for an insertion-ordered dict.
    pub fn dict(entries: Vec<(Value, Value)>) -> Value {
        Value::Dict(Dict::from_entries(entries))
    }

    /// Convenience constructor for a string.
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Arc::from(s.into().into_boxed_str()))
    }

    /// Convenience constructor for a byte string.
    pub fn bytes(b: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(Arc::from(b.into().into_boxed_slice()))
    }

    /// Convenience constructor for a module-level symbol.
    pub fn symbol(module: impl Into<String>, qualname: impl Into<String>) -> Value {
        Value::Symbol(Arc::new(Symbol::new(module, qualname)))
    }

    /// Wraps a user object implementing the persistence protocol.
    pub fn object<T: Representable + 'static>(obj: T) -> Value {
        Value::Object(ObjectRef::new(obj))
    }

    /// Short type description used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::BigInt(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Range(_) => "range",
            Value::Array(_) => "ndarray",
            Value::Symbol(_) => "symbol",
            Value::Object(_) => "object",
        }
    }

    /// Structural key for atoms; `None` for identity-bearing values.
    pub fn atom_key(&self) -> Option<AtomKey> {
        match self {
            Value::None => Some(AtomKey::None),
            Value::Bool(b) => Some(AtomKey::Bool(*b)),
            Value::Int(i) => Some(AtomKey::Int(*i)),
            Value::BigInt(b) => Some(AtomKey::Big(b.to_string())),
            Value::Float(f) => Some(AtomKey::Float(f.to_bits())),
            Value::Complex(c) => Some(AtomKey::Complex(c.re.to_bits(), c.im.to_bits())),
            Value::Str(s) => Some(AtomKey::Str(s.to_string())),
            Value::Bytes(b) => Some(AtomKey::Bytes(b.to_vec())),
            Value::Range(r) => Some(AtomKey::Range(r.start, r.stop, r.step)),
            Value::Symbol(s) => {
                Some(AtomKey::Symbol(s.module.clone(), s.qualname.clone()))
            }
            Value::Tuple(items) => {
                let keys: Option<Vec<AtomKey>> =
                    items.iter().map(Value::atom_key).collect();
                keys.map(AtomKey::Tuple)
            }
            Value::FrozenSet(items) => {
                let mut keys = items
                    .iter()
                    .map(Value::atom_key)
                    .collect::<Option<Vec<AtomKey>>>()?;
                keys.sort();
                Some(AtomKey::FrozenSet(keys))
            }
            _ => None,
        }
    }

    /// The identity key deciding node collapse in the graph.
    pub fn identity_key(&self) -> ObjKey {
        if let Some(atom) = self.atom_key() {
            return ObjKey::Atom(atom);
        }
        let addr = match self {
            Value::List(l) => l.addr(),
            Value::Dict(d) => d.addr(),
            Value::Set(s) => s.addr(),
            Value::Tuple(t) => Arc::as_ptr(t) as *const () as usize,
            Value::FrozenSet(t) => Arc::as_ptr(t) as *const () as usize,
            Value::Array(a) => a.addr(),
            Value::Object(o) => o.addr(),
            // Atoms are handled above.
            _ => 0,
        };
        ObjKey::Ptr(addr)
    }

    /// True for values whose literal is cheap enough to repeat at every use
    /// site: such values always inline in flat emission. Non-finite floats
    /// are excluded so their helper expression is shared.
    pub fn is_simple(&self) -> bool {
        match self {
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::BigInt(_)
            | Value::Str(_)
            | Value::Bytes(_)
            | Value::Range(_)
            | Value::Symbol(_) => true,
            Value::Float(f) => f.is_finite(),
            Value::Complex(c) => c.re.is_finite() && c.im.is_finite(),
            _ => false,
        }
    }

    /// Structural equality with Python semantics: `Int` and `BigInt`
    /// compare numerically, containers compare element-wise, mappings and
    /// sets compare order-insensitively.
    pub fn py_eq(&self, other: &Value) -> bool {
        fn seq_eq(a: &[Value], b: &[Value]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
        }
        fn set_eq(a: &[Value], b: &[Value]) -> bool {
            a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.py_eq(y)))
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Int(a), Value::BigInt(b)) | (Value::BigInt(b), Value::Int(a)) => {
                BigInt::from(*a) == *b
            }
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Complex(a), Value::Complex(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => {
                a.module == b.module && a.qualname == b.qualname
            }
            (Value::List(a), Value::List(b)) => seq_eq(&a.snapshot(), &b.snapshot()),
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
            (Value::Set(a), Value::Set(b)) => set_eq(&a.snapshot(), &b.snapshot()),
            (Value::FrozenSet(a), Value::FrozenSet(b)) => set_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.py_eq(k2) && v.py_eq(v2))
                    })
            }
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.addr() == b.addr(),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(b) => write!(f, "{b}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Complex(c) => write!(f, "complex({:?}, {:?})", c.re, c.im),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b{b:?}"),
            Value::List(l) => l.fmt(f),
            Value::Tuple(t) => f.debug_list().entries(t.iter()).finish(),
            Value::Dict(d) => d.fmt(f),
            Value::Set(s) => s.fmt(f),
            Value::FrozenSet(t) => f.debug_set().entries(t.iter()).finish(),
            Value::Range(r) => write!(f, "range({}, {}, {})", r.start, r.stop, r.step),
            Value::Array(a) => a.fmt(f),
            Value::Symbol(s) => write!(f, "{}.{}", s.module, s.qualname),
            Value::Object(o) => o.fmt(f),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::str(v)
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Self {
        Value::Array(v)
    }
}

impl From<Range> for Value {
    fn from(v: Range) -> Self {
        Value::Range(v)
    }
}

//! The persistent-representation dispatch.
//!
//! Every value entering an archive is turned into a [`Rep`]: a source-level
//! expression, an ordered list of named sub-values the expression refers to,
//! the imports it needs, and optional post-assignment statements. A
//! [`RepresenterRegistry`] chains [`Representer`] handlers in priority order
//! and returns the first successful triple; custom handlers can be pushed in
//! front of the built-in ones to override how a value kind is rendered.

use crate::error::{ArchiveError, Result};
use crate::sidecar::ArrayStore;
use crate::value::Value;

/// One required import: `from module import name as alias`, or
/// `import module as alias` when `name` is `None`.
///
/// The `alias` is a hint; the reducer may rename it to keep aliases unique
/// and rewrites the expression accordingly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Dotted module path.
    pub module: String,
    /// Name imported from the module, or `None` for a module import.
    pub name: Option<String>,
    /// Local alias the expression refers to.
    pub alias: String,
}

impl Import {
    /// A `from module import name as alias` record.
    pub fn from_module(
        module: impl Into<String>,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            name: Some(name.into()),
            alias: alias.into(),
        }
    }
}

/// How to rebuild one value: `expr` evaluated with `args` bound and
/// `imports` available, followed by the `post` statements.
///
/// `post` statements refer to the freshly built object as `obj`; the
/// emitter rewrites or rebinds that name depending on the output form. A rep
/// with post statements is treated as side-effecting and is never inlined.
#[derive(Debug, Clone)]
pub struct Rep {
    /// Reconstruction expression with free identifiers from `args`.
    pub expr: String,
    /// Ordered `(identifier, sub-value)` pairs; the semantic edge list.
    pub args: Vec<(String, Value)>,
    /// Imports the expression needs.
    pub imports: Vec<Import>,
    /// Statements applied to `obj` after construction.
    pub post: Vec<String>,
}

impl Rep {
    /// A self-contained literal expression.
    pub fn literal(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            args: Vec::new(),
            imports: Vec::new(),
            post: Vec::new(),
        }
    }

    /// An expression over named sub-values.
    pub fn with_args(expr: impl Into<String>, args: Vec<(String, Value)>) -> Self {
        Self {
            expr: expr.into(),
            args,
            imports: Vec::new(),
            post: Vec::new(),
        }
    }
}

/// Context handed to representation handlers.
pub struct ReprContext<'a> {
    /// Element count at or above which arrays move to the sidecar; `None`
    /// inlines everything.
    pub array_threshold: Option<usize>,
    /// Name of the ambient array lookup in the emitted source.
    pub data_name: &'a str,
    /// Sidecar store large arrays are registered with.
    pub store: &'a mut ArrayStore,
}

/// A representation handler. Returns `Ok(None)` when the value is not this
/// handler's business.
pub trait Representer: Send + Sync {
    /// Attempts to represent `value`.
    fn represent(&self, value: &Value, ctx: &mut ReprContext<'_>) -> Result<Option<Rep>>;
}

/// Priority-ordered chain of representation handlers.
pub struct RepresenterRegistry {
    handlers: Vec<Box<dyn Representer>>,
}

impl RepresenterRegistry {
    /// Registry with the built-in handlers for every supported value kind.
    pub fn new() -> Self {
        use crate::representers::*;
        Self {
            handlers: vec![
                Box::new(PrimitiveRepresenter),
                Box::new(SequenceRepresenter),
                Box::new(MappingRepresenter),
                Box::new(SetRepresenter),
                Box::new(RangeRepresenter),
                Box::new(ArrayRepresenter),
                Box::new(SymbolRepresenter),
                Box::new(ObjectRepresenter),
            ],
        }
    }

    /// Registers a handler ahead of the existing ones.
    pub fn register_front(&mut self, handler: Box<dyn Representer>) {
        self.handlers.insert(0, handler);
    }

    /// Runs the chain; the first successful triple wins.
    pub fn represent(&self, value: &Value, ctx: &mut ReprContext<'_>) -> Result<Rep> {
        for handler in &self.handlers {
            if let Some(rep) = handler.represent(value, ctx)? {
                return Ok(rep);
            }
        }
        Err(ArchiveError::NotRepresentable(format!(
            "{} value {:?}",
            value.type_name(),
            value
        )))
    }
}

impl Default for RepresenterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// --- Literal rendering helpers ---

/// Renders a finite float so it re-reads as a Python float (a forced `.0`
/// for integral values, exponent notation outside the plain-decimal range).
pub fn py_float(f: f64) -> String {
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        return format!("{f:e}");
    }
    if f == f.trunc() {
        return format!("{f:.1}");
    }
    format!("{f}")
}

/// Renders a finite complex value as a Python literal.
pub fn py_complex(re: f64, im: f64) -> String {
    if re == 0.0 {
        return format!("{}j", py_float(im));
    }
    if im.is_sign_negative() {
        format!("({}-{}j)", py_float(re), py_float(-im))
    } else {
        format!("({}+{}j)", py_float(re), py_float(im))
    }
}

/// Renders a text string as a single-quoted Python literal.
pub fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Renders a byte string as a Python bytes literal.
pub fn py_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    out
}

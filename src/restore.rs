//! Re-evaluation of emitted archives.
//!
//! The emitter produces a deliberately narrow statement and expression
//! subset; this module evaluates exactly that subset and hands back the
//! resulting namespace as [`Value`]s. It is the library's read side: data
//! sets use it to load key archives, and it makes round-trip properties
//! checkable without a Python interpreter.
//!
//! Supported statements: `from`/`import` forms, plain assignments, the
//! scoped wrapper pattern (`def name(...):` / `return` / `name = name()`),
//! `del`, and the trailing cleanup lines. Supported expressions: literals
//! of every primitive kind, list/tuple/dict/set displays, `range`,
//! `frozenset`, `set`, `complex` and `float` calls, `array(...)` with a
//! `dtype` keyword, and subscripts into the ambient array lookup.
//!
//! Anything else — in particular reconstruction of user classes — fails
//! with [`ArchiveError::Restore`]; a subscript whose key the sidecar does
//! not provide fails with [`ArchiveError::CorruptArchive`].

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigInt;
use num_complex::Complex64;

use crate::array::{DType, NdArray};
use crate::error::{ArchiveError, Result};
use crate::object::Symbol;
use crate::sidecar::ArrayMap;
use crate::subst::{tokenize, Tok, Token};
use crate::value::{Dict, List, Range, Set, Value};

/// Name bindings produced by evaluating an archive, in binding order.
#[derive(Debug, Default)]
pub struct Namespace {
    bindings: Vec<(String, Value)>,
}

impl Namespace {
    /// Looks up a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Bound names in binding order.
    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Evaluates archive source with no sidecar.
pub fn restore(source: &str) -> Result<Namespace> {
    restore_with(source, &ArrayMap::new(), "_arrays")
}

/// Evaluates archive source with `arrays` bound as the ambient lookup
/// `data_name`.
pub fn restore_with(source: &str, arrays: &ArrayMap, data_name: &str) -> Result<Namespace> {
    let mut ev = Evaluator {
        env: HashMap::new(),
        order: Vec::new(),
        arrays,
    };
    ev.env.insert(data_name.to_string(), Slot::Arrays);

    let lines: Vec<&str> = source.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("try:") || trimmed.starts_with("except ") {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("del ") {
            for name in rest.split(',') {
                ev.env.remove(name.trim());
            }
            continue;
        }
        if trimmed.starts_with("from ") || trimmed.starts_with("import ") {
            ev.import(trimmed)?;
            continue;
        }
        if trimmed.starts_with("def ") {
            // Collect the indented body, then require the immediate-call
            // rebind the emitter always writes next.
            let mut body = Vec::new();
            while i < lines.len() && (lines[i].starts_with("    ") || lines[i].is_empty()) {
                body.push(lines[i]);
                i += 1;
            }
            let call_line = lines.get(i).copied().unwrap_or("");
            i += 1;
            ev.scoped_binding(trimmed, &body, call_line)?;
            continue;
        }
        if let Some((lhs, rhs)) = split_assign(trimmed) {
            if is_identifier(lhs) {
                let value = ev.eval(rhs, None)?;
                ev.bind(lhs, value);
            }
            // Non-identifier targets (the module-table swap) are ignored.
            continue;
        }
        return Err(ArchiveError::Restore(format!(
            "unsupported statement {trimmed:?}"
        )));
    }

    let mut bindings = Vec::new();
    for name in &ev.order {
        if let Some(Slot::Val(value)) = ev.env.get(name) {
            if !bindings.iter().any(|(n, _): &(String, Value)| n == name) {
                bindings.push((name.clone(), value.clone()));
            }
        }
    }
    Ok(Namespace { bindings })
}

/// Drops the array-loader boilerplate from a packaged module, leaving the
/// archive body. Sources without the boilerplate pass through unchanged.
pub fn strip_loader(source: &str) -> &str {
    const MARKER: &str = "del _os, _ArrayDir\n";
    if source.starts_with("import os as _os\n") {
        if let Some(pos) = source.find(MARKER) {
            return &source[pos + MARKER.len()..];
        }
    }
    source
}

#[derive(Debug, Clone)]
enum Slot {
    Val(Value),
    Arrays,
    Symbol(Symbol),
    Module(String),
}

struct Evaluator<'a> {
    env: HashMap<String, Slot>,
    order: Vec<String>,
    arrays: &'a ArrayMap,
}

impl Evaluator<'_> {
    fn bind(&mut self, name: &str, value: Value) {
        self.env.insert(name.to_string(), Slot::Val(value));
        self.order.push(name.to_string());
    }

    fn import(&mut self, line: &str) -> Result<()> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["from", module, "import", name, "as", alias] => {
                self.env.insert(
                    alias.to_string(),
                    Slot::Symbol(Symbol::new(*module, *name)),
                );
            }
            ["from", module, "import", name] => {
                self.env.insert(
                    name.to_string(),
                    Slot::Symbol(Symbol::new(*module, *name)),
                );
            }
            ["import", module, "as", alias] => {
                self.env
                    .insert(alias.to_string(), Slot::Module(module.to_string()));
            }
            _ => {
                return Err(ArchiveError::Restore(format!(
                    "unsupported import {line:?}"
                )))
            }
        }
        Ok(())
    }

    /// Evaluates the scoped wrapper pattern.
    fn scoped_binding(&mut self, def_line: &str, body: &[&str], call_line: &str) -> Result<()> {
        let open = def_line
            .find('(')
            .ok_or_else(|| ArchiveError::Restore(format!("bad def {def_line:?}")))?;
        let close = def_line
            .rfind(')')
            .ok_or_else(|| ArchiveError::Restore(format!("bad def {def_line:?}")))?;
        let name = def_line[4..open].trim();
        let params_src = &def_line[open + 1..close];

        if call_line.trim_end() != format!("{name} = {name}()") {
            return Err(ArchiveError::Restore(format!(
                "expected immediate call after def {name:?}"
            )));
        }

        // Defaulted parameters evaluate in the enclosing scope.
        let mut locals: HashMap<String, Slot> = HashMap::new();
        for param in params_src.split(',') {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (pname, default) = param.split_once('=').ok_or_else(|| {
                ArchiveError::Restore(format!("parameter without default {param:?}"))
            })?;
            let value = self.eval(default.trim(), None)?;
            locals.insert(pname.trim().to_string(), Slot::Val(value));
        }

        let body: Vec<&str> = body
            .iter()
            .copied()
            .map(|l| l.strip_prefix("    ").unwrap_or(l).trim_end())
            .filter(|l| !l.is_empty())
            .collect();
        match body.as_slice() {
            [ret] if ret.starts_with("return ") => {
                let value = self.eval(&ret["return ".len()..], Some(&locals))?;
                self.bind(name, value);
                Ok(())
            }
            _ => Err(ArchiveError::Restore(format!(
                "cannot evaluate the body of {name:?}; it reconstructs a user object"
            ))),
        }
    }

    fn eval(&self, src: &str, locals: Option<&HashMap<String, Slot>>) -> Result<Value> {
        let tokens = tokenize(src)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            ev: self,
            locals,
        };
        let value = parser.expression()?;
        if parser.pos != tokens.len() {
            return Err(ArchiveError::Restore(format!(
                "trailing tokens in expression {src:?}"
            )));
        }
        value.into_value()
    }

    fn lookup(&self, name: &str, locals: Option<&HashMap<String, Slot>>) -> Option<Slot> {
        if let Some(locals) = locals {
            if let Some(slot) = locals.get(name) {
                return Some(slot.clone());
            }
        }
        self.env.get(name).cloned()
    }
}

/// Intermediate evaluation result: values proper, plus the callable and
/// ambient forms that only appear as call / subscript targets.
#[derive(Debug, Clone)]
enum Ev {
    Val(Value),
    Arrays,
    Builtin(&'static str),
    Symbol(Symbol),
}

impl Ev {
    fn into_value(self) -> Result<Value> {
        match self {
            Ev::Val(v) => Ok(v),
            Ev::Arrays => Err(ArchiveError::Restore(
                "the array lookup is not a value".into(),
            )),
            Ev::Builtin(name) => Err(ArchiveError::Restore(format!(
                "builtin {name:?} used as a value"
            ))),
            Ev::Symbol(sym) => Ok(Value::Symbol(Arc::new(sym))),
        }
    }
}

const CALLABLE_BUILTINS: &[&str] = &["range", "frozenset", "set", "complex", "float"];

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ev: &'a Evaluator<'a>,
    locals: Option<&'a HashMap<String, Slot>>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn next(&mut self) -> Option<&Tok> {
        let tok = self.tokens.get(self.pos).map(|t| &t.tok);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        match self.next() {
            Some(Tok::Op(o)) if o == op => Ok(()),
            other => Err(ArchiveError::Restore(format!(
                "expected {op:?}, found {other:?}"
            ))),
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Op(o)) if o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Full expression: a unary term, optionally extended by `+`/`-` into a
    /// complex literal.
    fn expression(&mut self) -> Result<Ev> {
        let first = self.unary()?;
        if matches!(self.peek(), Some(Tok::Op(o)) if o == "+" || o == "-") {
            let negate = matches!(self.next(), Some(Tok::Op(o)) if o == "-");
            let second = self.unary()?.into_value()?;
            return combine_complex(first.into_value()?, second, negate).map(Ev::Val);
        }
        Ok(first)
    }

    fn unary(&mut self) -> Result<Ev> {
        if self.eat_op("-") {
            let operand = self.postfix()?.into_value()?;
            let negated = match operand {
                Value::Int(i) => Value::Int(-i),
                Value::BigInt(b) => Value::BigInt(-b),
                Value::Float(f) => Value::Float(-f),
                Value::Complex(c) => Value::Complex(-c),
                other => {
                    return Err(ArchiveError::Restore(format!(
                        "cannot negate {other:?}"
                    )))
                }
            };
            return Ok(Ev::Val(negated));
        }
        self.postfix()
    }

    /// A primary expression with call and subscript trailers.
    fn postfix(&mut self) -> Result<Ev> {
        let mut base = self.primary()?;
        loop {
            if self.eat_op("(") {
                let mut args: Vec<Value> = Vec::new();
                let mut kwargs: Vec<(String, Value)> = Vec::new();
                if !self.eat_op(")") {
                    loop {
                        // Keyword argument: identifier followed by `=`.
                        let kw = match (self.peek(), self.tokens.get(self.pos + 1)) {
                            (Some(Tok::Ident(name)), Some(next))
                                if next.tok == Tok::Op("=".into()) =>
                            {
                                Some(name.clone())
                            }
                            _ => None,
                        };
                        if let Some(name) = kw {
                            self.pos += 2;
                            kwargs.push((name, self.expression()?.into_value()?));
                        } else {
                            args.push(self.expression()?.into_value()?);
                        }
                        if self.eat_op(")") {
                            break;
                        }
                        self.expect_op(",")?;
                        if self.eat_op(")") {
                            break;
                        }
                    }
                }
                base = Ev::Val(apply_call(base, args, kwargs)?);
            } else if self.eat_op("[") {
                let index = self.expression()?.into_value()?;
                self.expect_op("]")?;
                base = Ev::Val(self.subscript(base, index)?);
            } else {
                return Ok(base);
            }
        }
    }

    fn subscript(&self, base: Ev, index: Value) -> Result<Value> {
        match base {
            Ev::Arrays => {
                let Value::Str(key) = index else {
                    return Err(ArchiveError::Restore("array keys are strings".into()));
                };
                self.ev
                    .arrays
                    .get(key.as_ref())
                    .cloned()
                    .map(Value::Array)
                    .ok_or_else(|| {
                        ArchiveError::CorruptArchive(format!(
                            "source references sidecar key {key:?} which is not stored"
                        ))
                    })
            }
            other => Err(ArchiveError::Restore(format!(
                "unsupported subscript target {other:?}"
            ))),
        }
    }

    fn primary(&mut self) -> Result<Ev> {
        let Some(tok) = self.next().cloned() else {
            return Err(ArchiveError::Restore("unexpected end of expression".into()));
        };
        match tok {
            Tok::Number(text) => Ok(Ev::Val(parse_number(&text)?)),
            Tok::Imag(text) => {
                let im: f64 = text[..text.len() - 1].parse().map_err(|_| {
                    ArchiveError::Restore(format!("bad imaginary literal {text:?}"))
                })?;
                Ok(Ev::Val(Value::Complex(Complex64::new(0.0, im))))
            }
            Tok::Str(text) => parse_string_literal(&text).map(Ev::Val),
            Tok::Ident(name) => match name.as_str() {
                "None" => Ok(Ev::Val(Value::None)),
                "True" => Ok(Ev::Val(Value::Bool(true))),
                "False" => Ok(Ev::Val(Value::Bool(false))),
                _ => {
                    if let Some(slot) = self.ev.lookup(&name, self.locals) {
                        match slot {
                            Slot::Val(v) => Ok(Ev::Val(v)),
                            Slot::Arrays => Ok(Ev::Arrays),
                            Slot::Symbol(sym) => Ok(Ev::Symbol(sym)),
                            Slot::Module(module) => Err(ArchiveError::Restore(format!(
                                "module {module:?} used as a value"
                            ))),
                        }
                    } else if CALLABLE_BUILTINS.contains(&name.as_str()) {
                        Ok(Ev::Builtin(match name.as_str() {
                            "range" => "range",
                            "frozenset" => "frozenset",
                            "set" => "set",
                            "complex" => "complex",
                            _ => "float",
                        }))
                    } else {
                        Err(ArchiveError::Restore(format!("unbound name {name:?}")))
                    }
                }
            },
            Tok::Op(op) => match op.as_str() {
                "(" => self.paren(),
                "[" => self.list_display(),
                "{" => self.brace_display(),
                other => Err(ArchiveError::Restore(format!(
                    "unexpected token {other:?}"
                ))),
            },
        }
    }

    fn paren(&mut self) -> Result<Ev> {
        if self.eat_op(")") {
            return Ok(Ev::Val(Value::tuple(Vec::new())));
        }
        let first = self.expression()?;
        if self.eat_op(")") {
            // Parenthesized expression, e.g. a complex literal.
            return first.into_value().map(Ev::Val);
        }
        let mut items = vec![first.into_value()?];
        while self.eat_op(",") {
            if self.eat_op(")") {
                return Ok(Ev::Val(Value::tuple(items)));
            }
            items.push(self.expression()?.into_value()?);
        }
        self.expect_op(")")?;
        Ok(Ev::Val(Value::tuple(items)))
    }

    fn list_display(&mut self) -> Result<Ev> {
        let mut items = Vec::new();
        if !self.eat_op("]") {
            loop {
                items.push(self.expression()?.into_value()?);
                if self.eat_op("]") {
                    break;
                }
                self.expect_op(",")?;
                if self.eat_op("]") {
                    break;
                }
            }
        }
        Ok(Ev::Val(Value::List(List::from_vec(items))))
    }

    fn brace_display(&mut self) -> Result<Ev> {
        if self.eat_op("}") {
            return Ok(Ev::Val(Value::Dict(Dict::new())));
        }
        let first = self.expression()?.into_value()?;
        if self.eat_op(":") {
            let mut entries = vec![(first, self.expression()?.into_value()?)];
            while self.eat_op(",") {
                if self.eat_op("}") {
                    return Ok(Ev::Val(Value::Dict(Dict::from_entries(entries))));
                }
                let key = self.expression()?.into_value()?;
                self.expect_op(":")?;
                entries.push((key, self.expression()?.into_value()?));
            }
            self.expect_op("}")?;
            return Ok(Ev::Val(Value::Dict(Dict::from_entries(entries))));
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.eat_op("}") {
                return Ok(Ev::Val(Value::Set(Set::from_vec(items))));
            }
            items.push(self.expression()?.into_value()?);
        }
        self.expect_op("}")?;
        Ok(Ev::Val(Value::Set(Set::from_vec(items))))
    }
}

fn split_assign(line: &str) -> Option<(&str, &str)> {
    let pos = line.find(" = ")?;
    Some((line[..pos].trim(), line[pos + 3..].trim()))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_number(text: &str) -> Result<Value> {
    if text.contains(['.', 'e', 'E']) {
        let f: f64 = text
            .parse()
            .map_err(|_| ArchiveError::Restore(format!("bad float literal {text:?}")))?;
        return Ok(Value::Float(f));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    let big: BigInt = text
        .parse()
        .map_err(|_| ArchiveError::Restore(format!("bad integer literal {text:?}")))?;
    Ok(Value::BigInt(big))
}

fn parse_string_literal(text: &str) -> Result<Value> {
    let is_bytes = text.starts_with('b') || text.starts_with('B');
    let body_start = text
        .find(['\'', '"'])
        .ok_or_else(|| ArchiveError::Restore(format!("bad string literal {text:?}")))?;
    let body = &text[body_start + 1..text.len() - 1];

    let mut bytes: Vec<u8> = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('r') => bytes.push(b'\r'),
            Some('t') => bytes.push(b'\t'),
            Some('\\') => bytes.push(b'\\'),
            Some('\'') => bytes.push(b'\''),
            Some('"') => bytes.push(b'"'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(ArchiveError::Restore(format!(
                        "bad escape in {text:?}"
                    )));
                };
                let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16).map_err(|_| {
                    ArchiveError::Restore(format!("bad escape in {text:?}"))
                })?;
                bytes.push(byte);
            }
            other => {
                return Err(ArchiveError::Restore(format!(
                    "unsupported escape {other:?} in {text:?}"
                )))
            }
        }
    }
    if is_bytes {
        Ok(Value::bytes(bytes))
    } else {
        let s = String::from_utf8(bytes)
            .map_err(|_| ArchiveError::Restore(format!("non-UTF-8 string {text:?}")))?;
        Ok(Value::str(s))
    }
}

fn combine_complex(first: Value, second: Value, negate: bool) -> Result<Value> {
    let err = || {
        ArchiveError::Restore("only complex literals may use infix arithmetic".to_string())
    };
    let re = match first {
        Value::Int(i) => i as f64,
        Value::Float(f) => f,
        _ => return Err(err()),
    };
    let Value::Complex(c) = second else {
        return Err(err());
    };
    let im = if negate { -c.im } else { c.im };
    Ok(Value::Complex(Complex64::new(re, im)))
}

fn as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(ArchiveError::Restore(format!(
            "expected a number, found {other:?}"
        ))),
    }
}

fn as_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(ArchiveError::Restore(format!(
            "expected an integer, found {other:?}"
        ))),
    }
}

fn apply_call(callee: Ev, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value> {
    match callee {
        Ev::Builtin("range") => {
            if !kwargs.is_empty() {
                return Err(ArchiveError::Restore("range takes no keywords".into()));
            }
            match args.as_slice() {
                [stop] => Ok(Value::Range(Range::to(as_i64(stop)?))),
                [start, stop] => Ok(Value::Range(Range::new(
                    as_i64(start)?,
                    as_i64(stop)?,
                    1,
                ))),
                [start, stop, step] => Ok(Value::Range(Range::new(
                    as_i64(start)?,
                    as_i64(stop)?,
                    as_i64(step)?,
                ))),
                _ => Err(ArchiveError::Restore("bad range arity".into())),
            }
        }
        Ev::Builtin("frozenset") => match args.as_slice() {
            [] => Ok(Value::FrozenSet(Arc::new(Vec::new()))),
            [Value::List(items)] => Ok(Value::FrozenSet(Arc::new(items.snapshot()))),
            _ => Err(ArchiveError::Restore("bad frozenset argument".into())),
        },
        Ev::Builtin("set") => match args.as_slice() {
            [] => Ok(Value::Set(Set::new())),
            [Value::List(items)] => Ok(Value::Set(Set::from_vec(items.snapshot()))),
            _ => Err(ArchiveError::Restore("bad set argument".into())),
        },
        Ev::Builtin("complex") => match args.as_slice() {
            [re, im] => Ok(Value::Complex(Complex64::new(as_f64(re)?, as_f64(im)?))),
            _ => Err(ArchiveError::Restore("bad complex arity".into())),
        },
        Ev::Builtin("float") => match args.as_slice() {
            [Value::Str(text)] => {
                let f = match text.as_ref() {
                    "inf" => f64::INFINITY,
                    "-inf" => f64::NEG_INFINITY,
                    "nan" => f64::NAN,
                    other => other.parse().map_err(|_| {
                        ArchiveError::Restore(format!("bad float string {other:?}"))
                    })?,
                };
                Ok(Value::Float(f))
            }
            [v] => Ok(Value::Float(as_f64(v)?)),
            _ => Err(ArchiveError::Restore("bad float arity".into())),
        },
        Ev::Symbol(sym) if sym.module == "numpy" && sym.qualname == "array" => {
            let dtype = kwargs
                .iter()
                .find(|(k, _)| k == "dtype")
                .map(|(_, v)| match v {
                    Value::Str(name) => DType::from_name(name),
                    other => Err(ArchiveError::Restore(format!(
                        "bad dtype argument {other:?}"
                    ))),
                })
                .transpose()?
                .unwrap_or(DType::Float64);
            let [nested] = args.as_slice() else {
                return Err(ArchiveError::Restore("bad array arity".into()));
            };
            build_array(nested, dtype).map(Value::Array)
        }
        Ev::Symbol(sym) => Err(ArchiveError::Restore(format!(
            "cannot call {sym}; reconstructing user objects requires the originating runtime"
        ))),
        other => Err(ArchiveError::Restore(format!(
            "unsupported call target {other:?}"
        ))),
    }
}

/// Rebuilds an array from its nested-list literal.
fn build_array(nested: &Value, dtype: DType) -> Result<NdArray> {
    fn shape_of(value: &Value, shape: &mut Vec<usize>) -> Result<()> {
        if let Value::List(items) = value {
            let items = items.snapshot();
            shape.push(items.len());
            if let Some(first) = items.first() {
                shape_of(first, shape)?;
            }
        }
        Ok(())
    }
    fn flatten(value: &Value, depth: usize, rank: usize, out: &mut Vec<Value>) -> Result<()> {
        if depth == rank {
            out.push(value.clone());
            return Ok(());
        }
        let Value::List(items) = value else {
            return Err(ArchiveError::Restore("ragged array literal".into()));
        };
        for item in items.snapshot() {
            flatten(&item, depth + 1, rank, out)?;
        }
        Ok(())
    }

    let mut shape = Vec::new();
    shape_of(nested, &mut shape)?;
    let mut elements = Vec::new();
    flatten(nested, 0, shape.len(), &mut elements)?;

    let expected: usize = shape.iter().product();
    if elements.len() != expected {
        return Err(ArchiveError::Restore("ragged array literal".into()));
    }

    let mut data = Vec::with_capacity(elements.len() * dtype.itemsize());
    for element in &elements {
        pack_element(dtype, element, &mut data)?;
    }
    NdArray::from_bytes(shape, dtype, data)
}

fn pack_element(dtype: DType, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    let bad = || ArchiveError::Restore(format!("element {value:?} does not fit {dtype:?}"));
    match dtype {
        DType::Bool => match value {
            Value::Bool(b) => out.push(u8::from(*b)),
            _ => return Err(bad()),
        },
        DType::Int8 => out.push(i8::try_from(as_i64(value)?).map_err(|_| bad())? as u8),
        DType::Int16 => {
            out.extend(i16::try_from(as_i64(value)?).map_err(|_| bad())?.to_le_bytes())
        }
        DType::Int32 => {
            out.extend(i32::try_from(as_i64(value)?).map_err(|_| bad())?.to_le_bytes())
        }
        DType::Int64 => out.extend(as_i64(value)?.to_le_bytes()),
        DType::UInt8 => out.push(u8::try_from(as_i64(value)?).map_err(|_| bad())?),
        DType::UInt16 => {
            out.extend(u16::try_from(as_i64(value)?).map_err(|_| bad())?.to_le_bytes())
        }
        DType::UInt32 => {
            out.extend(u32::try_from(as_i64(value)?).map_err(|_| bad())?.to_le_bytes())
        }
        DType::UInt64 => match value {
            Value::Int(i) => out.extend(u64::try_from(*i).map_err(|_| bad())?.to_le_bytes()),
            Value::BigInt(b) => {
                let (_, digits) = b.to_u64_digits();
                match digits.as_slice() {
                    [] => out.extend(0u64.to_le_bytes()),
                    [d] => out.extend(d.to_le_bytes()),
                    _ => return Err(bad()),
                }
            }
            _ => return Err(bad()),
        },
        DType::Float32 => out.extend((as_f64(value)? as f32).to_le_bytes()),
        DType::Float64 => out.extend(as_f64(value)?.to_le_bytes()),
        DType::Complex128 => match value {
            Value::Complex(c) => {
                out.extend(c.re.to_le_bytes());
                out.extend(c.im.to_le_bytes());
            }
            Value::Int(_) | Value::Float(_) => {
                out.extend(as_f64(value)?.to_le_bytes());
                out.extend(0f64.to_le_bytes());
            }
            _ => return Err(bad()),
        },
    }
    Ok(())
}

//! Built-in representation handlers, one per value class, queried in the
//! order they are registered by
//! [`RepresenterRegistry::new`](crate::represent::RepresenterRegistry::new).

use std::cmp::Ordering;

use crate::array::NdArray;
use crate::error::{ArchiveError, Result};
use crate::represent::{py_bytes, py_complex, py_float, py_str, Import, Rep, ReprContext, Representer};
use crate::value::Value;

/// `None`, booleans, integers, floats, complex numbers, text and byte
/// strings, rendered through their canonical literal form. Non-finite
/// floats become `float("inf")`-style helper expressions; because those
/// deduplicate by value, a multi-use archive binds them once and references
/// the name.
pub struct PrimitiveRepresenter;

impl Representer for PrimitiveRepresenter {
    fn represent(&self, value: &Value, _ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let rep = match value {
            Value::None => Rep::literal("None"),
            Value::Bool(true) => Rep::literal("True"),
            Value::Bool(false) => Rep::literal("False"),
            Value::Int(i) => Rep::literal(i.to_string()),
            Value::BigInt(b) => Rep::literal(b.to_string()),
            Value::Float(f) => Rep::literal(float_expr(*f)),
            Value::Complex(c) => {
                if c.re.is_finite() && c.im.is_finite() {
                    Rep::literal(py_complex(c.re, c.im))
                } else {
                    Rep::with_args(
                        "complex(_re, _im)",
                        vec![
                            ("_re".to_string(), Value::Float(c.re)),
                            ("_im".to_string(), Value::Float(c.im)),
                        ],
                    )
                }
            }
            Value::Str(s) => Rep::literal(py_str(s)),
            Value::Bytes(b) => Rep::literal(py_bytes(b)),
            _ => return Ok(None),
        };
        Ok(Some(rep))
    }
}

fn float_expr(f: f64) -> String {
    if f.is_nan() {
        "float(\"nan\")".to_string()
    } else if f == f64::INFINITY {
        "float(\"inf\")".to_string()
    } else if f == f64::NEG_INFINITY {
        "float(\"-inf\")".to_string()
    } else {
        py_float(f)
    }
}

fn positional_args(items: Vec<Value>) -> (Vec<String>, Vec<(String, Value)>) {
    let mut names = Vec::with_capacity(items.len());
    let mut args = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let name = format!("_a{i}");
        names.push(name.clone());
        args.push((name, item));
    }
    (names, args)
}

/// Lists and tuples.
pub struct SequenceRepresenter;

impl Representer for SequenceRepresenter {
    fn represent(&self, value: &Value, _ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let rep = match value {
            Value::List(list) => {
                let (names, args) = positional_args(list.snapshot());
                Rep::with_args(format!("[{}]", names.join(", ")), args)
            }
            Value::Tuple(items) => {
                if items.is_empty() {
                    Rep::literal("()")
                } else {
                    let (names, args) = positional_args(items.as_ref().clone());
                    let expr = if names.len() == 1 {
                        format!("({},)", names[0])
                    } else {
                        format!("({})", names.join(", "))
                    };
                    Rep::with_args(expr, args)
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(rep))
    }
}

/// Mappings, preserving the source insertion order.
pub struct MappingRepresenter;

impl Representer for MappingRepresenter {
    fn represent(&self, value: &Value, _ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let Value::Dict(dict) = value else {
            return Ok(None);
        };
        let entries = dict.snapshot();
        if entries.is_empty() {
            return Ok(Some(Rep::literal("{}")));
        }
        let mut parts = Vec::with_capacity(entries.len());
        let mut args = Vec::with_capacity(entries.len() * 2);
        for (i, (key, val)) in entries.into_iter().enumerate() {
            let kname = format!("_k{i}");
            let vname = format!("_v{i}");
            parts.push(format!("{kname}: {vname}"));
            args.push((kname, key));
            args.push((vname, val));
        }
        Ok(Some(Rep::with_args(
            format!("{{{}}}", parts.join(", ")),
            args,
        )))
    }
}

/// Sets and frozensets. Elements are ordered canonically (atoms sort by
/// their structural key, other elements keep arrival order) so equal sets
/// always render the same literal, whatever order they were built in.
pub struct SetRepresenter;

fn canonical_order(items: Vec<Value>) -> Vec<Value> {
    let mut indexed: Vec<(usize, Value)> = items.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| match (a.atom_key(), b.atom_key()) {
        (Some(ka), Some(kb)) => ka.cmp(&kb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => ia.cmp(ib),
    });
    indexed.into_iter().map(|(_, v)| v).collect()
}

impl Representer for SetRepresenter {
    fn represent(&self, value: &Value, _ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let rep = match value {
            Value::Set(set) => {
                let items = canonical_order(set.snapshot());
                if items.is_empty() {
                    Rep::literal("set()")
                } else {
                    let (names, args) = positional_args(items);
                    Rep::with_args(format!("{{{}}}", names.join(", ")), args)
                }
            }
            Value::FrozenSet(items) => {
                let items = canonical_order(items.as_ref().clone());
                if items.is_empty() {
                    Rep::literal("frozenset()")
                } else {
                    let (names, args) = positional_args(items);
                    Rep::with_args(format!("frozenset([{}])", names.join(", ")), args)
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(rep))
    }
}

/// Ranges, reconstructed through the public constructor.
pub struct RangeRepresenter;

impl Representer for RangeRepresenter {
    fn represent(&self, value: &Value, _ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let Value::Range(r) = value else {
            return Ok(None);
        };
        let expr = if r.step == 1 {
            format!("range({}, {})", r.start, r.stop)
        } else {
            format!("range({}, {}, {})", r.start, r.stop, r.step)
        };
        Ok(Some(Rep::literal(expr)))
    }
}

/// Numeric arrays. At or above the configured threshold the payload moves
/// to the sidecar and the expression becomes a lookup into the ambient
/// array mapping; below it, a literal `array(...)` reconstruction is
/// emitted.
pub struct ArrayRepresenter;

impl Representer for ArrayRepresenter {
    fn represent(&self, value: &Value, ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let Value::Array(array) = value else {
            return Ok(None);
        };
        if let Some(threshold) = ctx.array_threshold {
            if array.element_count() >= threshold {
                let key = ctx.store.put(array);
                return Ok(Some(Rep::literal(format!(
                    "{}['{}']",
                    ctx.data_name, key
                ))));
            }
        }
        let mut rep = Rep::literal(format!(
            "_array({}, dtype='{}')",
            nested_literal(array, 0, 0),
            array.dtype().name()
        ));
        rep.imports
            .push(Import::from_module("numpy", "array", "_array"));
        Ok(Some(rep))
    }
}

/// Renders the nested list literal for dimension `dim` starting at flat
/// offset `offset`.
fn nested_literal(array: &NdArray, dim: usize, offset: usize) -> String {
    let shape = array.shape();
    if dim == shape.len() {
        return element_literal(array, offset);
    }
    let stride: usize = shape[dim + 1..].iter().product();
    let parts: Vec<String> = (0..shape[dim])
        .map(|i| nested_literal(array, dim + 1, offset + i * stride))
        .collect();
    format!("[{}]", parts.join(", "))
}

fn element_literal(array: &NdArray, i: usize) -> String {
    match array.element(i) {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Float(f) => float_expr(f),
        Value::Complex(c) if c.re.is_finite() && c.im.is_finite() => py_complex(c.re, c.im),
        Value::Complex(c) => format!(
            "complex({}, {})",
            float_expr(c.re),
            float_expr(c.im)
        ),
        other => format!("{other:?}"),
    }
}

/// Classes and functions referenced by module path.
pub struct SymbolRepresenter;

impl Representer for SymbolRepresenter {
    fn represent(&self, value: &Value, _ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let Value::Symbol(symbol) = value else {
            return Ok(None);
        };
        let mut rep;
        if symbol.qualname.is_empty() {
            let last = symbol
                .module
                .rsplit('.')
                .next()
                .unwrap_or(symbol.module.as_str());
            let alias = format!("_{last}");
            rep = Rep::literal(alias.clone());
            rep.imports.push(Import {
                module: symbol.module.clone(),
                name: None,
                alias,
            });
        } else {
            let alias = format!("_{}", symbol.alias_hint());
            rep = Rep::literal(alias.clone());
            rep.imports.push(Import::from_module(
                symbol.module.clone(),
                symbol.qualname.clone(),
                alias,
            ));
        }
        Ok(Some(rep))
    }
}

/// User objects: custom representer, then the reconstitution protocol, then
/// the attribute-dict fallback.
pub struct ObjectRepresenter;

impl Representer for ObjectRepresenter {
    fn represent(&self, value: &Value, _ctx: &mut ReprContext<'_>) -> Result<Option<Rep>> {
        let Value::Object(obj) = value else {
            return Ok(None);
        };
        let protocol = obj.protocol();

        if let Some(rep) = protocol.persistent_rep() {
            return rep.map(Some);
        }

        if let Some(reduction) = protocol.reduce() {
            let alias = format!("_{}", reduction.callable.alias_hint());
            let (names, mut args) = call_args(reduction.args);
            let mut rep = Rep::with_args(
                format!("{alias}({})", names.join(", ")),
                Vec::new(),
            );
            rep.imports.push(Import::from_module(
                reduction.callable.module.clone(),
                reduction.callable.qualname.clone(),
                alias,
            ));
            push_state_posts(
                &mut args,
                &mut rep.post,
                reduction.state,
                protocol.has_set_state(),
            );
            if !reduction.list_items.is_empty() {
                args.push(("_li".to_string(), Value::list(reduction.list_items)));
                rep.post.push("obj.extend(_li)".to_string());
            }
            if !reduction.dict_items.is_empty() {
                args.push(("_di".to_string(), Value::dict(reduction.dict_items)));
                rep.post.push("obj.update(_di)".to_string());
            }
            rep.args = args;
            return Ok(Some(rep));
        }

        let class = protocol.type_symbol();
        let alias = format!("_{}", class.alias_hint());
        let class_import = Import::from_module(
            class.module.clone(),
            class.qualname.clone(),
            alias.clone(),
        );

        if let Some(new_args) = protocol.new_args() {
            let (mut names, mut args) = call_args(new_args.args);
            for (i, (kw, val)) in new_args.kwargs.into_iter().enumerate() {
                let name = format!("_w{i}");
                names.push(format!("{kw}={name}"));
                args.push((name, val));
            }
            let call = if names.is_empty() {
                format!("{alias}.__new__({alias})")
            } else {
                format!("{alias}.__new__({alias}, {})", names.join(", "))
            };
            let mut rep = Rep::with_args(call, Vec::new());
            rep.imports.push(class_import);
            push_state_posts(
                &mut args,
                &mut rep.post,
                protocol.state(),
                protocol.has_set_state(),
            );
            rep.args = args;
            return Ok(Some(rep));
        }

        // Bare allocation; state application is the whole reconstruction,
        // so an object offering neither state nor attributes is rejected.
        let state = protocol.state().or_else(|| {
            protocol.attr_dict().map(|attrs| {
                Value::dict(
                    attrs
                        .into_iter()
                        .map(|(k, v)| (Value::str(k), v))
                        .collect(),
                )
            })
        });
        let Some(state) = state else {
            return Err(ArchiveError::NotRepresentable(format!(
                "object {:?} exposes no persistence capability",
                protocol
            )));
        };
        let mut rep = Rep::with_args(format!("{alias}.__new__({alias})"), Vec::new());
        rep.imports.push(class_import);
        let mut args = Vec::new();
        push_state_posts(
            &mut args,
            &mut rep.post,
            Some(state),
            protocol.has_set_state(),
        );
        rep.args = args;
        Ok(Some(rep))
    }
}

fn call_args(items: Vec<Value>) -> (Vec<String>, Vec<(String, Value)>) {
    let mut names = Vec::with_capacity(items.len());
    let mut args = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let name = format!("_c{i}");
        names.push(name.clone());
        args.push((name, item));
    }
    (names, args)
}

fn push_state_posts(
    args: &mut Vec<(String, Value)>,
    post: &mut Vec<String>,
    state: Option<Value>,
    has_set_state: bool,
) {
    if let Some(state) = state {
        args.push(("_st".to_string(), state));
        if has_set_state {
            post.push("obj.__setstate__(_st)".to_string());
        } else {
            post.push("obj.__dict__.update(_st)".to_string());
        }
    }
}

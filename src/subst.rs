//! Identifier substitution inside emitted expressions.
//!
//! The reducer rewrites identifiers when it renames intermediates, resolves
//! import aliases, and inlines single-use nodes. Two strategies are offered:
//!
//! - [`replace_textual`]: a word-boundary scan over the raw text. Fast, and
//!   correct for every expression the built-in representers emit.
//! - [`replace_tokenized`]: tokenizes the expression first, so identifiers
//!   that happen to appear inside string literals are never touched. This is
//!   the strategy behind the `robust_replace` option and the only safe one
//!   for custom representers embedding arbitrary strings.
//!
//! Both strategies refuse two positions: attribute accesses (`x.append` must
//! not rewrite `append`) and keyword-argument labels (`f(x=x)` rewrites only
//! the second `x`).

use crate::error::{ArchiveError, Result};

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    /// Identifier or keyword.
    Ident(String),
    /// Integer or float literal.
    Number(String),
    /// Imaginary literal (`2j`).
    Imag(String),
    /// String or byte-string literal, including quotes and prefix.
    Str(String),
    /// Operator or punctuation.
    Op(String),
}

/// A token with its byte span in the source expression.
#[derive(Debug, Clone)]
pub struct Token {
    /// Kind and text.
    pub tok: Tok,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a Python expression into tokens. Handles the literal forms the
/// emitter produces: identifiers, numbers (with exponents and imaginary
/// suffix), prefixed single-quoted strings with escapes, and operators.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if is_ident_start(c) {
            let mut j = i + 1;
            while j < bytes.len() && is_ident_continue(bytes[j] as char) {
                j += 1;
            }
            // A string prefix like b'...' is part of the literal.
            let is_prefix = j - i <= 2
                && j < bytes.len()
                && (bytes[j] == b'\'' || bytes[j] == b'"')
                && src[i..j]
                    .chars()
                    .all(|p| matches!(p, 'b' | 'B' | 'r' | 'R' | 'u' | 'U'));
            if is_prefix {
                let j = scan_string(src, j)?;
                tokens.push(Token {
                    tok: Tok::Str(src[start..j].to_string()),
                    start,
                    end: j,
                });
                i = j;
            } else {
                tokens.push(Token {
                    tok: Tok::Ident(src[i..j].to_string()),
                    start,
                    end: j,
                });
                i = j;
            }
        } else if c == '\'' || c == '"' {
            let j = scan_string(src, i)?;
            tokens.push(Token {
                tok: Tok::Str(src[start..j].to_string()),
                start,
                end: j,
            });
            i = j;
        } else if c.is_ascii_digit() {
            let mut j = i;
            let mut seen_exp = false;
            while j < bytes.len() {
                let d = bytes[j] as char;
                if d.is_ascii_digit() || d == '.' || d == '_' {
                    j += 1;
                } else if (d == 'e' || d == 'E') && !seen_exp {
                    seen_exp = true;
                    j += 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                } else {
                    break;
                }
            }
            if j < bytes.len() && (bytes[j] == b'j' || bytes[j] == b'J') {
                j += 1;
                tokens.push(Token {
                    tok: Tok::Imag(src[i..j].to_string()),
                    start,
                    end: j,
                });
            } else {
                tokens.push(Token {
                    tok: Tok::Number(src[i..j].to_string()),
                    start,
                    end: j,
                });
            }
            i = j;
        } else {
            let two = src.get(i..i + 2);
            let op_len = match two {
                Some("==") | Some("!=") | Some("<=") | Some(">=") | Some("**")
                | Some("//") => 2,
                _ => 1,
            };
            tokens.push(Token {
                tok: Tok::Op(src[i..i + op_len].to_string()),
                start,
                end: i + op_len,
            });
            i += op_len;
        }
    }
    Ok(tokens)
}

/// Scans a quoted literal starting at the opening quote; returns the offset
/// one past the closing quote.
fn scan_string(src: &str, open: usize) -> Result<usize> {
    let bytes = src.as_bytes();
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            q if q == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(ArchiveError::Internal(format!(
        "unterminated string literal in expression {src:?}"
    )))
}

/// A pending span replacement `(start, end, replacement)`.
type Span<'a> = (usize, usize, &'a str);

fn splice(src: &str, mut spans: Vec<Span<'_>>) -> String {
    spans.sort_by_key(|s| s.0);
    let mut out = String::with_capacity(src.len());
    let mut cursor = 0;
    for (start, end, new) in spans {
        out.push_str(&src[cursor..start]);
        out.push_str(new);
        cursor = end;
    }
    out.push_str(&src[cursor..]);
    out
}

/// True when the identifier occurrence at `[start, end)` sits in a position
/// that must not be rewritten: an attribute access or a keyword-argument
/// label.
fn guarded(src: &str, start: usize, end: usize) -> bool {
    let bytes = src.as_bytes();
    // Attribute access: preceded by a dot (ignoring whitespace).
    let mut p = start;
    while p > 0 && (bytes[p - 1] as char).is_whitespace() {
        p -= 1;
    }
    if p > 0 && bytes[p - 1] == b'.' {
        return true;
    }
    // Keyword argument: followed by a single `=`.
    let mut n = end;
    while n < bytes.len() && (bytes[n] as char).is_whitespace() {
        n += 1;
    }
    if n < bytes.len() && bytes[n] == b'=' && bytes.get(n + 1) != Some(&b'=') {
        return true;
    }
    false
}

/// Word-boundary textual replacement.
///
/// All replacements are located first and spliced in one pass, so one
/// rewrite can never corrupt another even when a new name contains an old
/// one.
pub fn replace_textual(src: &str, replacements: &[(String, String)]) -> String {
    if replacements.is_empty() {
        return src.to_string();
    }
    let bytes = src.as_bytes();
    let mut spans: Vec<Span<'_>> = Vec::new();
    for (old, new) in replacements {
        if old == new {
            continue;
        }
        for (pos, _) in src.match_indices(old.as_str()) {
            let end = pos + old.len();
            let prev_ok = pos == 0 || {
                let p = bytes[pos - 1] as char;
                !is_ident_continue(p) && p != '.'
            };
            let next_ok = end == bytes.len() || {
                let n = bytes[end] as char;
                !is_ident_continue(n)
            };
            if prev_ok && next_ok && !guarded(src, pos, end) {
                spans.push((pos, end, new));
            }
        }
    }
    splice(src, spans)
}

/// Tokenizer-based replacement; identifiers inside string literals are left
/// alone.
pub fn replace_tokenized(src: &str, replacements: &[(String, String)]) -> Result<String> {
    if replacements.is_empty() {
        return Ok(src.to_string());
    }
    let tokens = tokenize(src)?;
    let mut spans: Vec<Span<'_>> = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        let Tok::Ident(name) = &token.tok else {
            continue;
        };
        let Some((_, new)) = replacements.iter().find(|(old, _)| old == name) else {
            continue;
        };
        // Attribute access.
        if idx > 0 && tokens[idx - 1].tok == Tok::Op(".".into()) {
            continue;
        }
        // Keyword-argument label.
        if let Some(next) = tokens.get(idx + 1) {
            if next.tok == Tok::Op("=".into()) {
                continue;
            }
        }
        spans.push((token.start, token.end, new));
    }
    Ok(splice(src, spans))
}

/// Replacement dispatching on the configured strategy.
pub fn replace(src: &str, replacements: &[(String, String)], robust: bool) -> Result<String> {
    if robust {
        replace_tokenized(src, replacements)
    } else {
        Ok(replace_textual(src, replacements))
    }
}

/// Returns the free identifiers of an expression in first-occurrence order.
///
/// Attribute names, keyword-argument labels and the literal keywords
/// `True`/`False`/`None` are not free.
pub fn free_identifiers(src: &str) -> Result<Vec<String>> {
    let tokens = tokenize(src)?;
    let mut out: Vec<String> = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        let Tok::Ident(name) = &token.tok else {
            continue;
        };
        if matches!(name.as_str(), "True" | "False" | "None") {
            continue;
        }
        if idx > 0 && tokens[idx - 1].tok == Tok::Op(".".into()) {
            continue;
        }
        if let Some(next) = tokens.get(idx + 1) {
            if next.tok == Tok::Op("=".into()) {
                let prev_is_open = idx == 0
                    || matches!(&tokens[idx - 1].tok, Tok::Op(op) if op == "(" || op == ",");
                if prev_is_open {
                    continue;
                }
            }
        }
        if !out.iter().any(|n| n == name) {
            out.push(name.clone());
        }
    }
    Ok(out)
}

/// Python builtins the emitted source may reference freely. User-chosen
/// top-level names must avoid these, which is how the archive guarantees a
/// builtin is never shadowed by a generated binding.
pub const PY_BUILTINS: &[&str] = &[
    "abs", "bool", "bytearray", "bytes", "complex", "dict", "divmod", "enumerate",
    "filter", "float", "frozenset", "getattr", "hasattr", "hash", "id", "int",
    "isinstance", "iter", "len", "list", "map", "max", "min", "next", "object",
    "ord", "pow", "print", "range", "repr", "reversed", "round", "set", "setattr",
    "slice", "sorted", "str", "sum", "tuple", "type", "zip",
];

/// True if `name` is one of the guarded builtins.
pub fn is_builtin(name: &str) -> bool {
    PY_BUILTINS.contains(&name)
}

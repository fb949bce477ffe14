//! The code-emission layer: renders an emission plan as Python source.
//!
//! Two layouts are produced:
//!
//! - **Flat**: a linear sequence of assignments. Intermediates live in the
//!   enclosing scope and are deleted after the last definition.
//! - **Scoped**: every node is wrapped in a function whose defaulted
//!   parameters capture its dependencies, immediately invoked, and rebound
//!   to the node's name. Nothing inside the wrapper needs renaming, which
//!   makes this the simplest form to reason about (and the default).
//!
//! Both layouts share the import section, alias assignments and the
//! trailing cleanup. The final guarded delete of `__builtins__` and the
//! array lookup is part of the wire contract: consumers may `exec` the
//! source into a fresh namespace and find nothing leaked.

use crate::error::{ArchiveError, Result};
use crate::graph::{Node, NodeId, ObjectGraph};
use crate::reduce::Plan;
use crate::represent::Import;
use crate::subst;

/// Emission settings, derived from the archive options.
#[derive(Debug, Clone)]
pub struct EmitOptions<'a> {
    /// Scoped (wrapped) or flat (linear) form.
    pub scoped: bool,
    /// Tokenizer-based substitution for post-statement rewrites.
    pub robust: bool,
    /// Name of the ambient array lookup.
    pub data_name: &'a str,
    /// Append the module-table replacement for single-binding archives.
    pub single_item: bool,
}

/// Renders the plan to source text.
pub fn emit(graph: &ObjectGraph, plan: &Plan, options: &EmitOptions<'_>) -> Result<String> {
    let mut lines: Vec<String> = Vec::new();

    for import in &plan.imports {
        lines.push(import_line(import));
    }

    for &id in &plan.order {
        let node = graph.node(id);
        let name = assigned_name(node)?;
        if options.scoped {
            emit_scoped_node(&mut lines, name, node, graph)?;
        } else {
            emit_flat_node(&mut lines, name, node, options)?;
        }
    }

    for (alias, primary) in &plan.aliases {
        lines.push(format!("{alias} = {primary}"));
    }

    // Cleanup: import aliases first, then the generated intermediates.
    for import in &plan.imports {
        lines.push(format!("del {}", import.alias));
    }
    if !plan.temps.is_empty() {
        lines.push(format!("del {}", plan.temps.join(",")));
    }
    lines.push(format!("try: del __builtins__, {}", options.data_name));
    lines.push("except NameError: pass".to_string());

    if options.single_item {
        if let Some(name) = single_binding(graph, plan) {
            let name = name.to_string();
            lines.push("import sys as _sys".to_string());
            lines.push(format!("_sys.modules[__name__] = {name}"));
            lines.push("del _sys".to_string());
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

/// The archive's only binding, when it has exactly one.
pub fn single_binding<'g>(graph: &'g ObjectGraph, plan: &Plan) -> Option<&'g str> {
    if graph.roots.len() == 1 && plan.aliases.is_empty() {
        graph.node(graph.roots[0].1).name.as_deref()
    } else {
        None
    }
}

fn assigned_name(node: &Node) -> Result<&str> {
    node.name
        .as_deref()
        .ok_or_else(|| ArchiveError::Internal(format!("node {} has no assigned name", node.id)))
}

fn import_line(import: &Import) -> String {
    match &import.name {
        None => format!("import {} as {}", import.module, import.alias),
        Some(name) if *name == import.alias => {
            format!("from {} import {}", import.module, name)
        }
        Some(name) => format!("from {} import {} as {}", import.module, name, import.alias),
    }
}

fn emit_flat_node(
    lines: &mut Vec<String>,
    name: &str,
    node: &Node,
    options: &EmitOptions<'_>,
) -> Result<()> {
    lines.push(format!("{name} = {}", node.expr));
    if !node.post.is_empty() {
        let rebind = [("obj".to_string(), name.to_string())];
        for line in &node.post {
            lines.push(subst::replace(line, &rebind, options.robust)?);
        }
    }
    Ok(())
}

fn emit_scoped_node(
    lines: &mut Vec<String>,
    name: &str,
    node: &Node,
    graph: &ObjectGraph,
) -> Result<()> {
    let mut params: Vec<String> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    for (ident, child) in &node.args {
        if seen.contains(&ident.as_str()) {
            continue;
        }
        seen.push(ident.as_str());
        params.push(format!("{ident}={}", child_name(graph, *child)?));
    }
    lines.push(format!("def {name}({}):", params.join(", ")));
    if node.post.is_empty() {
        lines.push(format!("    return {}", node.expr));
    } else {
        lines.push(format!("    obj = {}", node.expr));
        for line in &node.post {
            lines.push(format!("    {line}"));
        }
        lines.push("    return obj".to_string());
    }
    lines.push(format!("{name} = {name}()"));
    Ok(())
}

// Children of an emitted node are emitted (and named) earlier; a miss here
// is an internal defect, not a user error.
fn child_name(graph: &ObjectGraph, child: NodeId) -> Result<&str> {
    graph
        .node(child)
        .name
        .as_deref()
        .ok_or_else(|| ArchiveError::Internal(format!("child {child} has no assigned name")))
}

/// Loader boilerplate prepended to importable artifacts that carry a
/// sidecar. Resolves the sidecar relative to the module file and exposes a
/// mapping that loads each key once, on first access.
pub fn array_loader(data_name: &str, sidecar_rel: &str, backend: &str) -> String {
    let mut lines: Vec<String> = vec![
        "import os as _os".to_string(),
        "class _ArrayDir(object):".to_string(),
        "    def __init__(self, path):".to_string(),
        "        self._path = path".to_string(),
        "        self._cache = {}".to_string(),
        "    def __getitem__(self, key):".to_string(),
        "        if key not in self._cache:".to_string(),
    ];
    if backend == "hdf5" {
        lines.push("            import h5py".to_string());
        lines.push(
            "            with h5py.File(_os.path.join(self._path, 'arrays.h5'), 'r') as f:"
                .to_string(),
        );
        lines.push("                self._cache[key] = f[key][()]".to_string());
    } else {
        lines.push("            import numpy".to_string());
        lines.push(
            "            self._cache[key] = numpy.load(_os.path.join(self._path, key + '.npy'))"
                .to_string(),
        );
    }
    lines.push("        return self._cache[key]".to_string());
    lines.push(format!(
        "{data_name} = _ArrayDir(_os.path.join(_os.path.dirname(_os.path.abspath(__file__)), '{sidecar_rel}'))"
    ));
    lines.push("del _os, _ArrayDir".to_string());
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

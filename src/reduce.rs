//! The graph reducer: turns a built [`ObjectGraph`] into an ordered
//! emission plan.
//!
//! Responsibilities, in pass order:
//!
//! 1. **Topological ordering** — an iterative post-order walk from the
//!    top-level nodes in insertion order, so every definition precedes its
//!    uses. Ties break on node id, which is allocation (encounter) order.
//! 2. **Inlining** (flat form only) — single-use intermediates and simple
//!    atoms fold into their referents. Children finalize before parents, so
//!    one pass over the order reaches the fixed point.
//! 3. **Name assignment** — surviving intermediates get `_gN` names from a
//!    per-render counter that skips every reserved name.
//! 4. **Import resolution** — `(module, name)` pairs collapse onto one
//!    unique `_`-prefixed alias; expressions are rewritten from the
//!    handler's hint to the final alias.
//! 5. **Validation** — every free identifier of every emitted expression
//!    must be bound earlier, imported, ambient, or a builtin; anything else
//!    is a defect in a representer and fails the render.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::graph::{NodeId, ObjectGraph};
use crate::represent::Import;
use crate::subst;

/// Reduction settings, derived from the archive options.
#[derive(Debug, Clone)]
pub struct ReduceOptions<'a> {
    /// Scoped emission disables inlining and argument substitution.
    pub scoped: bool,
    /// Use the tokenizer-based substitution strategy.
    pub robust: bool,
    /// The ambient array lookup name; reserved and always in scope.
    pub data_name: &'a str,
}

/// The ordered emission plan produced by [`reduce`].
#[derive(Debug)]
pub struct Plan {
    /// Nodes to emit, dependencies first; inlined nodes are absent.
    pub order: Vec<NodeId>,
    /// Resolved imports in first-use order.
    pub imports: Vec<Import>,
    /// Generated intermediate names, in emission order.
    pub temps: Vec<String>,
    /// `(alias, primary)` pairs for values bound under several names.
    pub aliases: Vec<(String, String)>,
}

/// Reduces `graph` to an emission plan, rewriting node expressions in
/// place.
pub fn reduce(graph: &mut ObjectGraph, options: &ReduceOptions<'_>) -> Result<Plan> {
    let order = topological_order(graph);

    // Names that generated identifiers and import aliases must avoid.
    let mut taken: HashSet<String> = graph.roots.iter().map(|(n, _)| n.clone()).collect();
    taken.insert(options.data_name.to_string());

    // -- Inlining decisions (flat form only) --
    let mut inlined: HashSet<NodeId> = HashSet::new();
    if !options.scoped {
        for &id in &order {
            let node = graph.node(id);
            if node.name.is_none()
                && node.post.is_empty()
                && (node.value.is_simple() || node.ref_count() == 1)
            {
                inlined.insert(id);
            }
        }
    }

    // -- Name assignment --
    let mut counter = 0u64;
    let mut temps = Vec::new();
    for &id in &order {
        if graph.node(id).name.is_some() || inlined.contains(&id) {
            continue;
        }
        let name = loop {
            let candidate = format!("_g{counter}");
            counter += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(name.clone());
        temps.push(name.clone());
        graph.node_mut(id).name = Some(name);
    }

    // -- Import resolution --
    let mut imports: Vec<Import> = Vec::new();
    let mut final_alias: HashMap<(String, Option<String>), String> = HashMap::new();
    for &id in &order {
        let mut renames: Vec<(String, String)> = Vec::new();
        for import in graph.node(id).imports.clone() {
            let key = (import.module.clone(), import.name.clone());
            let alias = match final_alias.get(&key) {
                Some(alias) => alias.clone(),
                None => {
                    let alias = unique_name(&import.alias, &taken);
                    taken.insert(alias.clone());
                    imports.push(Import {
                        module: import.module.clone(),
                        name: import.name.clone(),
                        alias: alias.clone(),
                    });
                    final_alias.insert(key, alias.clone());
                    alias
                }
            };
            if alias != import.alias {
                renames.push((import.alias.clone(), alias));
            }
        }
        if !renames.is_empty() {
            let node = graph.node_mut(id);
            node.expr = subst::replace(&node.expr, &renames, options.robust)?;
            for line in &mut node.post {
                *line = subst::replace(line, &renames, options.robust)?;
            }
        }
    }

    // -- Argument substitution and inline folding (flat form only) --
    if !options.scoped {
        for &id in &order {
            let mut replacements: Vec<(String, String)> = Vec::new();
            for (ident, child) in graph.node(id).args.clone() {
                let target = if inlined.contains(&child) {
                    graph.node(child).expr.clone()
                } else {
                    graph
                        .node(child)
                        .name
                        .clone()
                        .ok_or_else(|| ArchiveError::Internal("unnamed child".into()))?
                };
                if ident != target {
                    replacements.push((ident, target));
                }
            }
            if !replacements.is_empty() {
                let node = graph.node_mut(id);
                node.expr = subst::replace(&node.expr, &replacements, options.robust)?;
                for line in &mut node.post {
                    *line = subst::replace(line, &replacements, options.robust)?;
                }
            }
        }
    }

    let emitted: Vec<NodeId> = order
        .iter()
        .copied()
        .filter(|id| !inlined.contains(id))
        .collect();

    validate(graph, &emitted, &imports, options)?;

    let aliases = graph
        .alias_bindings()
        .into_iter()
        .map(|(alias, id)| {
            let primary = graph
                .node(id)
                .name
                .clone()
                .ok_or_else(|| ArchiveError::Internal("unnamed aliased node".into()))?;
            Ok((alias, primary))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        nodes = graph.len(),
        emitted = emitted.len(),
        inlined = inlined.len(),
        imports = imports.len(),
        "reduced object graph"
    );

    Ok(Plan {
        order: emitted,
        imports,
        temps,
        aliases,
    })
}

/// Iterative post-order walk from the roots in insertion order.
fn topological_order(graph: &ObjectGraph) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(graph.len());
    let mut done: HashSet<NodeId> = HashSet::new();
    for root in graph.root_order() {
        if done.contains(&root) {
            continue;
        }
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        while let Some(&(id, idx)) = stack.last() {
            let args = &graph.node(id).args;
            if idx < args.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let child = args[idx].1;
                if !done.contains(&child) && !stack.iter().any(|(n, _)| *n == child) {
                    stack.push((child, 0));
                }
            } else {
                stack.pop();
                if done.insert(id) {
                    order.push(id);
                }
            }
        }
    }
    order
}

/// First name derived from `hint` not present in `taken`, in the style
/// `_x`, `_x_2`, `_x_3`, ...
fn unique_name(hint: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(hint) {
        return hint.to_string();
    }
    let mut n = 2u64;
    loop {
        let candidate = format!("{hint}_{n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Checks the ordering invariant and that every free identifier of every
/// emitted expression resolves.
fn validate(
    graph: &ObjectGraph,
    emitted: &[NodeId],
    imports: &[Import],
    options: &ReduceOptions<'_>,
) -> Result<()> {
    let mut ambient: HashSet<&str> = imports.iter().map(|i| i.alias.as_str()).collect();
    ambient.insert(options.data_name);

    let position: HashMap<NodeId, usize> = emitted
        .iter()
        .enumerate()
        .map(|(pos, id)| (*id, pos))
        .collect();

    let mut bound: HashSet<&str> = HashSet::new();
    for (pos, &id) in emitted.iter().enumerate() {
        let node = graph.node(id);
        for &(_, child) in &node.args {
            if let Some(&child_pos) = position.get(&child) {
                if child_pos >= pos {
                    return Err(ArchiveError::Internal(format!(
                        "residual cycle: {} emitted before its dependency",
                        node.name.as_deref().unwrap_or("?")
                    )));
                }
            }
        }

        let locals: HashSet<&str> = if options.scoped {
            node.args.iter().map(|(ident, _)| ident.as_str()).collect()
        } else {
            HashSet::new()
        };
        for line in std::iter::once(&node.expr).chain(node.post.iter()) {
            for ident in subst::free_identifiers(line)? {
                let ok = ident == "obj"
                    || locals.contains(ident.as_str())
                    || bound.contains(ident.as_str())
                    || ambient.contains(ident.as_str())
                    || subst::is_builtin(&ident);
                if !ok {
                    return Err(ArchiveError::UnboundFreeIdentifier(format!(
                        "{ident:?} in expression {line:?}"
                    )));
                }
            }
        }
        if let Some(name) = node.name.as_deref() {
            bound.insert(name);
        }
    }
    Ok(())
}

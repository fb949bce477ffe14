//! The graph builder: walks inserted values transitively, collapsing shared
//! sub-objects through the identity index and recording edges.
//!
//! The walk keeps its own work stack instead of recursing, so arbitrarily
//! deep user structures never exhaust the call stack. An in-progress set
//! detects cycles: re-encountering a value whose children are still being
//! walked means the user graph is not a DAG, which fails the archive with
//! `Cyclic`.

use std::collections::{HashMap, HashSet};

use super::core::ObjectGraph;
use super::id::NodeId;
use crate::error::{ArchiveError, Result};
use crate::represent::{ReprContext, RepresenterRegistry};
use crate::value::Value;

/// Builds an [`ObjectGraph`] from top-level insertions.
pub struct GraphBuilder<'a> {
    registry: &'a RepresenterRegistry,
    graph: ObjectGraph,
    /// Unresolved child references per node, in representation order.
    pending: HashMap<NodeId, Vec<(String, Value)>>,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder dispatching through `registry`.
    pub fn new(registry: &'a RepresenterRegistry) -> Self {
        Self {
            registry,
            graph: ObjectGraph::new(),
            pending: HashMap::new(),
        }
    }

    /// Inserts one top-level binding and walks everything reachable from
    /// it. Later bindings of an already-known value take over the node's
    /// name; earlier names become aliases.
    pub fn insert_root(
        &mut self,
        name: &str,
        value: &Value,
        ctx: &mut ReprContext<'_>,
    ) -> Result<()> {
        let (id, fresh) = self.intern(value, ctx)?;
        if fresh {
            self.walk(id, ctx)?;
        }
        self.graph.node_mut(id).name = Some(name.to_string());
        self.graph.roots.push((name.to_string(), id));
        Ok(())
    }

    /// Finishes the build and hands the graph to the reducer.
    pub fn finish(self) -> Result<ObjectGraph> {
        if !self.pending.is_empty() {
            return Err(ArchiveError::Internal(
                "graph build finished with unresolved children".into(),
            ));
        }
        Ok(self.graph)
    }

    /// Creates (or finds) the node for `value`. Fresh nodes carry their
    /// representation but no resolved children yet.
    fn intern(&mut self, value: &Value, ctx: &mut ReprContext<'_>) -> Result<(NodeId, bool)> {
        let key = value.identity_key();
        if let Some(id) = self.graph.lookup(&key) {
            return Ok((id, false));
        }
        let rep = self.registry.represent(value, ctx)?;
        let id = self
            .graph
            .add_node(key, value.clone(), rep.expr, rep.post, rep.imports);
        self.pending.insert(id, rep.args);
        Ok((id, true))
    }

    /// Depth-first walk resolving the pending children of `root`.
    fn walk(&mut self, root: NodeId, ctx: &mut ReprContext<'_>) -> Result<()> {
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        let mut in_progress: HashSet<NodeId> = HashSet::new();
        in_progress.insert(root);

        while let Some((id, idx)) = stack.last().copied() {
            let remaining = self.pending.get(&id).map_or(0, Vec::len);
            if idx >= remaining {
                self.pending.remove(&id);
                in_progress.remove(&id);
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let (ident, child_value) = self.pending[&id][idx].clone();

            let child_key = child_value.identity_key();
            if let Some(child) = self.graph.lookup(&child_key) {
                if in_progress.contains(&child) {
                    return Err(ArchiveError::Cyclic(format!(
                        "{} value participates in a reference cycle",
                        child_value.type_name()
                    )));
                }
                self.graph.link(id, ident, child);
            } else {
                let (child, _) = self.intern(&child_value, ctx)?;
                self.graph.link(id, ident, child);
                in_progress.insert(child);
                stack.push((child, 0));
            }
        }
        Ok(())
    }
}

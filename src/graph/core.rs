use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use twox_hash::XxHash64;

use super::id::NodeId;
use crate::represent::Import;
use crate::value::{ObjKey, Value};

/// Classification of a node, used by the reducer's inlining rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// No outgoing references.
    Leaf,
    /// References other nodes.
    Container,
    /// Bound to a user-visible name.
    TopLevel,
}

/// A single node in the object graph.
///
/// # Lifecycle
/// 1. **Created** during the builder walk, carrying its representation.
/// 2. **Mutated** only by the reducer: name finalization, expression
///    rewrites, possible inlining.
/// 3. **Discarded** with the graph once the archive has been rendered.
#[derive(Debug)]
pub struct Node {
    /// The unique ID of this node.
    pub id: NodeId,

    /// The value this node reconstructs. Held alive here so identity keys
    /// stay valid for the graph's lifetime.
    pub value: Value,

    /// Reconstruction expression; rewritten by the reducer.
    pub expr: String,

    /// Ordered `(identifier, child)` references appearing in `expr`.
    pub args: Vec<(String, NodeId)>,

    /// Post-assignment statements (see [`crate::represent::Rep::post`]).
    pub post: Vec<String>,

    /// Imports required by `expr`, with handler-chosen alias hints.
    pub imports: Vec<Import>,

    /// User name for top-level nodes; filled in for every emitted node
    /// during reduction.
    pub name: Option<String>,

    /// Incoming references, one entry per occurrence. The length is the
    /// node's reference count.
    pub parents: Vec<NodeId>,
}

impl Node {
    /// The node's classification flag.
    pub fn kind(&self) -> NodeKind {
        if self.name.is_some() {
            NodeKind::TopLevel
        } else if self.args.is_empty() {
            NodeKind::Leaf
        } else {
            NodeKind::Container
        }
    }

    /// Reference count (in-edges, counted per occurrence).
    pub fn ref_count(&self) -> usize {
        self.parents.len()
    }
}

type IdentityIndex = HashMap<ObjKey, NodeId, BuildHasherDefault<XxHash64>>;

/// The container for the object graph. Acts as an arena for nodes and keeps
/// the identity index that collapses shared sub-objects onto one node.
///
/// The index hasher is seed-fixed so nothing about graph construction
/// depends on per-process hash randomization.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    nodes: Vec<Node>,
    index: IdentityIndex,
    /// Top-level `(name, node)` bindings in insertion order. A node may
    /// appear more than once when the same value was inserted under several
    /// names.
    pub roots: Vec<(String, NodeId)>,
}

impl ObjectGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new node and indexes it under `key`.
    pub fn add_node(
        &mut self,
        key: ObjKey,
        value: Value,
        expr: String,
        post: Vec<String>,
        imports: Vec<Import>,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            value,
            expr,
            args: Vec::new(),
            post,
            imports,
            name: None,
            parents: Vec::new(),
        });
        self.index.insert(key, id);
        id
    }

    /// Looks up the node a value collapsed onto, if any.
    pub fn lookup(&self, key: &ObjKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Records that `parent` references `child` under `ident`.
    pub fn link(&mut self, parent: NodeId, ident: String, child: NodeId) {
        self.nodes[parent.index()].args.push((ident, child));
        self.nodes[child.index()].parents.push(parent);
    }

    /// Returns a reference to a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns a mutable reference to a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in allocation order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Top-level nodes in first-binding order, deduplicated.
    pub fn root_order(&self) -> Vec<NodeId> {
        let mut seen = Vec::new();
        for (_, id) in &self.roots {
            if !seen.contains(id) {
                seen.push(*id);
            }
        }
        seen
    }

    /// Top-level names that are not the node's primary name; emitted as
    /// alias assignments after the definitions.
    pub fn alias_bindings(&self) -> Vec<(String, NodeId)> {
        self.roots
            .iter()
            .filter(|(name, id)| self.node(*id).name.as_deref() != Some(name.as_str()))
            .cloned()
            .collect()
    }
}

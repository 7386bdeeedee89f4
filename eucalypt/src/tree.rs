//! Tree representation.
//!
//! Trees are built through a [`TreeContext`], which hands out [`NodeId`]s in
//! creation order and lets a generator attach children in their final order.
//! [`TreeContext::validate`] checks the shape, computes depth, height, size,
//! sibling positions and structural hashes, and freezes the result into an
//! immutable [`Tree`]. Matchers and the edit script generator only ever see
//! validated trees.
//!
//! Nodes live in an [`indextree::Arena`], so parent and child links are indices
//! rather than owning pointers, and every traversal is iterative.

use core::fmt::{self, Write as _};
use std::collections::VecDeque;

use facet::Facet;
use indextree::{Arena, NodeEdge, NodeId};
use rapidhash::RapidHashMap as HashMap;

use crate::debug;
use crate::hash::{ChildDigest, HashGenerator, NodeHash, RollingHash};

/// Category tag of a node (e.g. the grammar rule that produced it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeKind(pub u32);

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeKind {
    fn from(value: u32) -> Self {
        NodeKind(value)
    }
}

/// Byte range of a node in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Offset of the first byte
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
}

impl Span {
    /// Offset one past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// A line/column position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LineCol {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl LineCol {
    /// `(0, 0)`, used as the insertion point above the root.
    pub const ORIGIN: LineCol = LineCol { line: 0, column: 0 };

    /// Create a position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Begin and end line/column of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineColRange {
    /// First position covered by the node
    pub begin: LineCol,
    /// Position just past the node
    pub end: LineCol,
}

impl LineColRange {
    /// An empty range at `at`.
    pub fn point(at: LineCol) -> Self {
        Self { begin: at, end: at }
    }
}

/// Data stored in each tree node.
///
/// `kind`, `label` and the provenance fields are set at construction; the rest
/// is filled in by validation.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Category tag
    pub kind: NodeKind,
    /// Textual value, `None` when the node carries no label
    pub label: Option<String>,
    /// Byte range in the source, if the generator recorded it
    pub span: Option<Span>,
    /// Line/column range in the source, if the generator recorded it
    pub line_cols: Option<LineColRange>,
    /// Structural hash of the subtree rooted here
    pub hash: NodeHash,
    /// Distance from the root (the root has depth 0)
    pub depth: usize,
    /// Height of the subtree (a leaf has height 1)
    pub height: usize,
    /// Number of nodes in the subtree, this one included
    pub size: usize,
    /// Index among the parent's children
    pub position: usize,
    /// Index in the pre-order traversal of the whole tree
    pub pre_order_index: usize,
    /// Index in the post-order traversal of the whole tree
    pub post_order_index: usize,
}

impl NodeData {
    /// Create node data with the given kind and label. Metadata is computed on validation.
    pub fn new(kind: NodeKind, label: Option<String>) -> Self {
        Self {
            kind,
            label,
            span: None,
            line_cols: None,
            hash: NodeHash::default(),
            depth: 0,
            height: 1,
            size: 1,
            position: 0,
            pre_order_index: 0,
            post_order_index: 0,
        }
    }

    /// The label, or the empty string for unlabeled nodes.
    pub fn label_str(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }
}

/// Human-readable names for node kinds, scoped to one tree.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    names: HashMap<NodeKind, String>,
}

impl TypeRegistry {
    /// Register (or rename) a kind.
    pub fn register(&mut self, kind: NodeKind, name: impl Into<String>) {
        self.names.insert(kind, name.into());
    }

    /// Name of a kind, if registered.
    pub fn name(&self, kind: NodeKind) -> Option<&str> {
        self.names.get(&kind).map(String::as_str)
    }

    /// Registered kinds and their names, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeKind, &str)> + '_ {
        self.names.iter().map(|(kind, name)| (*kind, name.as_str()))
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no kind is registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Errors raised while building or validating a tree.
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum TreeError {
    /// tree has no root
    MissingRoot,

    /// root node {node} has a parent
    RootHasParent { node: usize },

    /// node {node} is not reachable from the root
    DanglingNode { node: usize },

    /// node {node} is already attached to a parent
    AlreadyAttached { node: usize },

    /// attaching node {child} under node {parent} would create a cycle
    Cycle { parent: usize, child: usize },

    /// node {node} does not belong to this tree
    UnknownNode { node: usize },
}

/// A tree under construction.
#[derive(Debug, Default)]
pub struct TreeContext {
    arena: Arena<NodeData>,
    root: Option<NodeId>,
    created: Vec<NodeId>,
    types: TypeRegistry,
}

impl TreeContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding a single root node.
    pub fn with_root(kind: impl Into<NodeKind>, label: Option<&str>) -> (Self, NodeId) {
        let mut ctx = Self::new();
        let root = ctx.create_node(kind, label, None);
        ctx.root = Some(root);
        (ctx, root)
    }

    /// Create a detached node. `type_label`, when given, names the kind in this
    /// tree's type registry.
    pub fn create_node(
        &mut self,
        kind: impl Into<NodeKind>,
        label: Option<&str>,
        type_label: Option<&str>,
    ) -> NodeId {
        let kind = kind.into();
        if let Some(name) = type_label {
            self.types.register(kind, name);
        }
        let id = self
            .arena
            .new_node(NodeData::new(kind, label.map(str::to_owned)));
        self.created.push(id);
        id
    }

    fn check(&self, id: NodeId) -> Result<(), TreeError> {
        if self.arena.get(id).is_some_and(|node| !node.is_removed()) {
            Ok(())
        } else {
            Err(TreeError::UnknownNode {
                node: usize::from(id),
            })
        }
    }

    /// Append `child` as the last child of `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check(parent)?;
        self.check(child)?;

        if self.arena[child].parent().is_some() {
            return Err(TreeError::AlreadyAttached {
                node: usize::from(child),
            });
        }
        let cycle = TreeError::Cycle {
            parent: usize::from(parent),
            child: usize::from(child),
        };
        if parent.ancestors(&self.arena).any(|a| a == child) {
            return Err(cycle);
        }
        parent
            .checked_append(child, &mut self.arena)
            .map_err(|_| cycle)
    }

    /// Create a node and append it to `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: impl Into<NodeKind>,
        label: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        self.check(parent)?;
        let child = self.create_node(kind, label, None);
        self.attach(parent, child)?;
        Ok(child)
    }

    /// Make `id` the root of the tree.
    pub fn set_root(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.check(id)?;
        self.root = Some(id);
        Ok(())
    }

    /// Current root, if set.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Record the byte range of a node.
    pub fn set_span(&mut self, id: NodeId, span: Span) -> Result<(), TreeError> {
        self.check(id)?;
        self.arena[id].get_mut().span = Some(span);
        Ok(())
    }

    /// Record the line/column range of a node.
    pub fn set_line_cols(
        &mut self,
        id: NodeId,
        begin: LineCol,
        end: LineCol,
    ) -> Result<(), TreeError> {
        self.check(id)?;
        self.arena[id].get_mut().line_cols = Some(LineColRange { begin, end });
        Ok(())
    }

    /// Name a kind in this tree's registry.
    pub fn register_type(&mut self, kind: impl Into<NodeKind>, name: impl Into<String>) {
        self.types.register(kind.into(), name);
    }

    /// Validate with the default rolling hash.
    pub fn validate(self) -> Result<Tree, TreeError> {
        self.validate_with(&RollingHash::java())
    }

    /// Check the tree shape and compute all per-node metadata.
    pub fn validate_with(self, generator: &dyn HashGenerator) -> Result<Tree, TreeError> {
        let TreeContext {
            mut arena,
            root,
            created,
            types,
        } = self;

        let root = root.ok_or(TreeError::MissingRoot)?;
        if arena[root].parent().is_some() {
            return Err(TreeError::RootHasParent {
                node: usize::from(root),
            });
        }

        let pre_order: Vec<NodeId> = root.descendants(&arena).collect();
        if pre_order.len() != created.len() {
            let mut reachable = vec![false; arena.count() + 1];
            for &id in &pre_order {
                reachable[usize::from(id)] = true;
            }
            if let Some(&dangling) = created.iter().find(|&&id| !reachable[usize::from(id)]) {
                return Err(TreeError::DanglingNode {
                    node: usize::from(dangling),
                });
            }
        }

        // Top-down: depth, sibling position, pre-order index.
        for (index, &id) in pre_order.iter().enumerate() {
            let depth = arena[id].get().depth;
            let children: Vec<NodeId> = id.children(&arena).collect();
            for (position, child) in children.into_iter().enumerate() {
                let data = arena[child].get_mut();
                data.depth = depth + 1;
                data.position = position;
            }
            arena[id].get_mut().pre_order_index = index;
        }

        // Bottom-up: height, size, hash, post-order index.
        let post_order: Vec<NodeId> = root
            .traverse(&arena)
            .filter_map(|edge| match edge {
                NodeEdge::End(id) => Some(id),
                NodeEdge::Start(_) => None,
            })
            .collect();
        for (index, &id) in post_order.iter().enumerate() {
            let mut digests = Vec::new();
            let mut height = 0;
            for child in id.children(&arena) {
                let data = arena[child].get();
                digests.push(ChildDigest {
                    hash: data.hash,
                    size: data.size,
                });
                height = height.max(data.height);
            }
            let data = arena[id].get();
            let hash = generator.hash_node(data.kind, data.label_str(), &digests);

            let data = arena[id].get_mut();
            data.hash = hash;
            data.height = height + 1;
            data.size = 1 + digests.iter().map(|d| d.size).sum::<usize>();
            data.post_order_index = index;
        }

        debug!(
            nodes = pre_order.len(),
            height = arena[root].get().height,
            "tree validated"
        );

        Ok(Tree {
            arena,
            root,
            node_count: pre_order.len(),
            types,
        })
    }
}

/// A validated, immutable tree.
#[derive(Debug, Clone)]
pub struct Tree {
    arena: Arena<NodeData>,
    root: NodeId,
    node_count: usize,
    types: TypeRegistry,
}

impl Tree {
    /// The root node.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the tree.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Node data. Panics if `id` belongs to another tree.
    #[inline]
    pub fn get(&self, id: NodeId) -> &NodeData {
        self.arena[id].get()
    }

    /// Kind of a node.
    #[inline]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.get(id).kind
    }

    /// Label of a node.
    #[inline]
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.get(id).label.as_deref()
    }

    /// Structural hash of the subtree rooted at `id`.
    #[inline]
    pub fn hash(&self, id: NodeId) -> NodeHash {
        self.get(id).hash
    }

    /// Parent of a node, `None` for the root.
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    /// Children in order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Number of children.
    pub fn child_count(&self, id: NodeId) -> usize {
        id.children(&self.arena).count()
    }

    /// Index among the parent's children (0 for the root).
    #[inline]
    pub fn position(&self, id: NodeId) -> usize {
        self.get(id).position
    }

    /// Height of the subtree (a leaf has height 1).
    #[inline]
    pub fn height(&self, id: NodeId) -> usize {
        self.get(id).height
    }

    /// Depth of the node (the root has depth 0).
    #[inline]
    pub fn depth(&self, id: NodeId) -> usize {
        self.get(id).depth
    }

    /// Number of nodes in the subtree, `id` included.
    #[inline]
    pub fn size(&self, id: NodeId) -> usize {
        self.get(id).size
    }

    /// Whether the node has no children.
    #[inline]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.arena[id].first_child().is_none()
    }

    /// Whether the node is the root.
    #[inline]
    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// Strict descendants of `id` in pre-order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena).skip(1)
    }

    /// Strict ancestors of `id`, closest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.ancestors(&self.arena).skip(1)
    }

    /// Whether `node` is a strict descendant of `ancestor`. O(1).
    pub fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let n = self.get(node).pre_order_index;
        let a = self.get(ancestor);
        n > a.pre_order_index && n < a.pre_order_index + a.size
    }

    /// Number of leaves strictly below `id`.
    pub fn leaf_count(&self, id: NodeId) -> usize {
        self.descendants(id).filter(|&d| self.is_leaf(d)).count()
    }

    /// All nodes in pre-order.
    pub fn pre_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pre_order_from(self.root)
    }

    /// The subtree rooted at `id` in pre-order.
    pub fn pre_order_from(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena)
    }

    /// All nodes in post-order (children before parents).
    pub fn post_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.post_order_from(self.root)
    }

    /// The subtree rooted at `id` in post-order.
    pub fn post_order_from(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.traverse(&self.arena).filter_map(|edge| match edge {
            NodeEdge::End(id) => Some(id),
            NodeEdge::Start(_) => None,
        })
    }

    /// All nodes level by level.
    pub fn breadth_first(&self) -> BreadthFirst<'_> {
        BreadthFirst {
            tree: self,
            queue: VecDeque::from([self.root]),
        }
    }

    /// Name of a kind in this tree's registry.
    pub fn type_label(&self, kind: NodeKind) -> Option<&str> {
        self.types.name(kind)
    }

    /// This tree's type registry.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Whether the subtree at `a` and the subtree at `b` in `other` have the same
    /// shape, kinds and labels.
    pub fn is_isomorphic(&self, a: NodeId, other: &Tree, b: NodeId) -> bool {
        if self.size(a) != other.size(b) {
            return false;
        }
        // Same size plus per-node child counts in pre-order pins down the shape.
        self.pre_order_from(a)
            .zip(other.pre_order_from(b))
            .all(|(x, y)| {
                let (dx, dy) = (self.get(x), other.get(y));
                dx.kind == dy.kind
                    && dx.label == dy.label
                    && self.child_count(x) == other.child_count(y)
            })
    }

    /// S-expression dump of the whole tree, e.g. `(0 "a" (1 "b") (2))`.
    pub fn to_sexp(&self) -> String {
        self.sexp_from(self.root)
    }

    /// S-expression dump of the subtree rooted at `id`.
    pub fn sexp_from(&self, id: NodeId) -> String {
        let mut out = String::new();
        for edge in id.traverse(&self.arena) {
            match edge {
                NodeEdge::Start(node) => {
                    if node != id {
                        out.push(' ');
                    }
                    let data = self.get(node);
                    out.push('(');
                    let _ = write!(out, "{}", data.kind);
                    if let Some(label) = &data.label {
                        let _ = write!(out, " {label:?}");
                    }
                }
                NodeEdge::End(_) => out.push(')'),
            }
        }
        out
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sexp())
    }
}

/// Breadth-first iterator over a [`Tree`].
pub struct BreadthFirst<'a> {
    tree: &'a Tree,
    queue: VecDeque<NodeId>,
}

impl Iterator for BreadthFirst<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.queue.pop_front()?;
        self.queue.extend(self.tree.children(id));
        Some(id)
    }
}

//! Edit script replay.
//!
//! [`WorkTree`] is a mutable copy of a source tree hung under a virtual root.
//! The edit script generator mutates one while it emits operations, and
//! [`apply_edit_script`] replays a finished script onto a fresh one, so both
//! agree on what a position means: the index among the parent's children at
//! the moment the operation runs. A moved node is detached first.

use facet::Facet;
use indextree::{Arena, NodeEdge, NodeId};
use rapidhash::RapidHashMap as HashMap;

use crate::chawathe::EditOp;
use crate::matching::Matching;
use crate::tree::{NodeKind, Tree, TreeContext, TypeRegistry};
use crate::{debug, trace};

/// Errors raised while replaying an edit script.
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum ApplyError {
    /// source node {node} is not in the working tree
    UnknownSource { node: usize },

    /// destination node {node} has no counterpart in the working tree
    UnknownTarget { node: usize },

    /// position {position} is out of range for a parent with {len} children
    PositionOutOfRange { position: usize, len: usize },

    /// cannot delete source node {node}: it still has children
    NotALeaf { node: usize },

    /// cannot move source node {node} into its own subtree
    MoveIntoSubtree { node: usize },

    /// replay left {count} roots instead of one
    RootCount { count: usize },

    /// replayed tree is malformed: {reason}
    Malformed { reason: String },
}

/// One node of the working copy.
#[derive(Debug, Clone)]
pub(crate) struct WorkNode {
    pub(crate) kind: NodeKind,
    pub(crate) label: Option<String>,
    /// Source node this one was copied from, `None` for inserted nodes
    pub(crate) source: Option<NodeId>,
}

/// Mutable copy of a source tree under a virtual root.
#[derive(Debug)]
pub(crate) struct WorkTree {
    arena: Arena<WorkNode>,
    root: NodeId,
    by_source: HashMap<NodeId, NodeId>,
}

impl WorkTree {
    pub(crate) fn from_source(src: &Tree) -> Self {
        let mut arena = Arena::with_capacity(src.node_count() + 1);
        let root = arena.new_node(WorkNode {
            kind: NodeKind::default(),
            label: None,
            source: None,
        });
        let mut by_source: HashMap<NodeId, NodeId> = HashMap::default();

        for a in src.pre_order() {
            let data = src.get(a);
            let w = arena.new_node(WorkNode {
                kind: data.kind,
                label: data.label.clone(),
                source: Some(a),
            });
            // Pre-order: the parent's copy already exists.
            let parent = src.parent(a).map_or(root, |p| by_source[&p]);
            parent.append(w, &mut arena);
            by_source.insert(a, w);
        }

        Self {
            arena,
            root,
            by_source,
        }
    }

    /// The virtual root.
    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    /// Copy of a source node, if it is still in the tree.
    pub(crate) fn for_source(&self, a: NodeId) -> Option<NodeId> {
        self.by_source.get(&a).copied()
    }

    pub(crate) fn get(&self, w: NodeId) -> &WorkNode {
        self.arena[w].get()
    }

    pub(crate) fn parent(&self, w: NodeId) -> Option<NodeId> {
        self.arena[w].parent()
    }

    pub(crate) fn children(&self, w: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        w.children(&self.arena)
    }

    pub(crate) fn child_count(&self, w: NodeId) -> usize {
        w.children(&self.arena).count()
    }

    /// Index among the parent's children.
    pub(crate) fn position(&self, w: NodeId) -> usize {
        // preceding_siblings yields the node itself first
        w.preceding_siblings(&self.arena).count() - 1
    }

    /// Whether `w` is `ancestor` or lies below it.
    pub(crate) fn is_within(&self, w: NodeId, ancestor: NodeId) -> bool {
        w.ancestors(&self.arena).any(|a| a == ancestor)
    }

    /// Every node except the virtual root, children first.
    pub(crate) fn post_order(&self) -> Vec<NodeId> {
        self.root
            .traverse(&self.arena)
            .filter_map(|edge| match edge {
                NodeEdge::End(id) if id != self.root => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Hang a detached node at `index` under `parent`. Indices past the end
    /// append.
    fn attach_at(&mut self, parent: NodeId, node: NodeId, index: usize) {
        match index
            .checked_sub(1)
            .and_then(|i| parent.children(&self.arena).nth(i))
        {
            Some(previous) => previous.insert_after(node, &mut self.arena),
            None if index == 0 => parent.prepend(node, &mut self.arena),
            None => parent.append(node, &mut self.arena),
        }
    }

    pub(crate) fn insert(
        &mut self,
        parent: NodeId,
        index: usize,
        kind: NodeKind,
        label: Option<String>,
    ) -> NodeId {
        let node = self.arena.new_node(WorkNode {
            kind,
            label,
            source: None,
        });
        self.attach_at(parent, node, index);
        node
    }

    /// Detach `node` and hang it at `index` under `parent`.
    pub(crate) fn move_to(&mut self, node: NodeId, parent: NodeId, index: usize) {
        node.detach(&mut self.arena);
        self.attach_at(parent, node, index);
    }

    pub(crate) fn set_label(&mut self, node: NodeId, label: Option<String>) {
        self.arena[node].get_mut().label = label;
    }

    pub(crate) fn remove(&mut self, node: NodeId) {
        if let Some(a) = self.arena[node].get().source {
            self.by_source.remove(&a);
        }
        node.remove(&mut self.arena);
    }

    /// Freeze the single tree under the virtual root, naming kinds with `types`.
    pub(crate) fn into_tree(self, types: &TypeRegistry) -> Result<Tree, ApplyError> {
        let tops: Vec<NodeId> = self.root.children(&self.arena).collect();
        let &[top] = tops.as_slice() else {
            return Err(ApplyError::RootCount { count: tops.len() });
        };

        let malformed = |err: crate::tree::TreeError| ApplyError::Malformed {
            reason: err.to_string(),
        };
        let mut ctx = TreeContext::new();
        for (kind, name) in types.iter() {
            ctx.register_type(kind, name);
        }
        let mut ids: HashMap<NodeId, NodeId> = HashMap::default();
        for w in top.descendants(&self.arena) {
            let data = self.get(w);
            let id = ctx.create_node(data.kind, data.label.as_deref(), None);
            if w == top {
                ctx.set_root(id).map_err(malformed)?;
            } else if let Some(parent) = self.parent(w).and_then(|p| ids.get(&p)) {
                ctx.attach(*parent, id).map_err(malformed)?;
            }
            ids.insert(w, id);
        }
        ctx.validate().map_err(malformed)
    }
}

fn source_node(work: &WorkTree, a: NodeId) -> Result<NodeId, ApplyError> {
    work.for_source(a).ok_or(ApplyError::UnknownSource {
        node: usize::from(a),
    })
}

fn target_parent(
    work: &WorkTree,
    by_target: &HashMap<NodeId, NodeId>,
    parent_b: Option<NodeId>,
) -> Result<NodeId, ApplyError> {
    match parent_b {
        None => Ok(work.root()),
        Some(p) => by_target
            .get(&p)
            .copied()
            .ok_or(ApplyError::UnknownTarget {
                node: usize::from(p),
            }),
    }
}

fn check_position(work: &WorkTree, parent: NodeId, position: usize) -> Result<(), ApplyError> {
    let len = work.child_count(parent);
    if position > len {
        return Err(ApplyError::PositionOutOfRange { position, len });
    }
    Ok(())
}

/// Replay `ops` onto a copy of `src` and return the resulting tree.
///
/// `matching` resolves destination-side parents that already exist in the
/// source; parents inserted by the script are resolved as they appear. The
/// result carries the type registry of `dst`.
pub fn apply_edit_script(
    src: &Tree,
    dst: &Tree,
    matching: &Matching,
    ops: &[EditOp],
) -> Result<Tree, ApplyError> {
    debug!(ops = ops.len(), "apply_edit_script start");
    let mut work = WorkTree::from_source(src);
    let mut by_target: HashMap<NodeId, NodeId> = matching
        .pairs()
        .filter_map(|(a, b)| work.for_source(a).map(|w| (b, w)))
        .collect();

    for op in ops {
        trace!(%op, "replay");
        match op {
            EditOp::Insert {
                node_b,
                parent_b,
                position,
                kind,
                label,
            } => {
                let parent = target_parent(&work, &by_target, *parent_b)?;
                check_position(&work, parent, *position)?;
                let w = work.insert(parent, *position, *kind, label.clone());
                by_target.insert(*node_b, w);
            }
            EditOp::Delete { node_a } => {
                let w = source_node(&work, *node_a)?;
                if work.child_count(w) > 0 {
                    return Err(ApplyError::NotALeaf {
                        node: usize::from(*node_a),
                    });
                }
                work.remove(w);
            }
            EditOp::Update { node_a, label, .. } => {
                let w = source_node(&work, *node_a)?;
                work.set_label(w, label.clone());
            }
            EditOp::Move {
                node_a,
                new_parent_b,
                new_position,
                ..
            } => {
                let w = source_node(&work, *node_a)?;
                let parent = target_parent(&work, &by_target, *new_parent_b)?;
                if work.is_within(parent, w) {
                    return Err(ApplyError::MoveIntoSubtree {
                        node: usize::from(*node_a),
                    });
                }
                let len = work.child_count(parent)
                    - usize::from(work.parent(w) == Some(parent));
                if *new_position > len {
                    return Err(ApplyError::PositionOutOfRange {
                        position: *new_position,
                        len,
                    });
                }
                work.move_to(w, parent, *new_position);
            }
        }
    }

    let tree = work.into_tree(dst.types())?;
    debug!(nodes = tree.node_count(), "apply_edit_script done");
    Ok(tree)
}

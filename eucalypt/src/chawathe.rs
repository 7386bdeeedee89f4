//! Chawathe edit script generation algorithm.
//!
//! Generates an edit script (INSERT, DELETE, UPDATE, MOVE) from a node matching.
//! Based on "Change Detection in Hierarchically Structured Information" (Chawathe et al., 1996).
//!
//! The destination tree is walked breadth-first while a working copy of the
//! source tree is edited to follow it:
//! 1. INSERT: a destination node without partner is created under its parent's partner
//! 2. UPDATE: a matched node whose label differs is relabeled
//! 3. MOVE: a matched node under the wrong parent is moved to the right one
//! 4. ALIGN: the children of every visited pair are put in destination order;
//!    the longest common subsequence stays, the rest is moved
//! 5. DELETE: source nodes without partner go last, children before parents
//!
//! Positions in INSERT and MOVE are indices into the working copy at the time
//! the operation is replayed, so the script can be applied in order with
//! [`crate::apply_edit_script`].

use core::fmt;

use indextree::NodeId;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};

use crate::apply::WorkTree;
use crate::matching::Matching;
use crate::tree::{NodeKind, Tree};
use crate::{debug, trace};

/// An edit operation in the diff.
///
/// Parents are destination nodes; `None` stands for the virtual node above
/// the root.
#[derive(Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Insert a new leaf.
    Insert {
        /// The new node in tree B
        node_b: NodeId,
        /// Parent in tree B
        parent_b: Option<NodeId>,
        /// Position among siblings (0-indexed)
        position: usize,
        /// The node's kind
        kind: NodeKind,
        /// The node's label
        label: Option<String>,
    },

    /// Delete a leaf.
    Delete {
        /// The node in tree A being deleted
        node_a: NodeId,
    },

    /// Change the label of a matched node.
    Update {
        /// The node in tree A
        node_a: NodeId,
        /// The corresponding node in tree B
        node_b: NodeId,
        /// The new label
        label: Option<String>,
    },

    /// Move a node (with its subtree) to a new location.
    Move {
        /// The node in tree A
        node_a: NodeId,
        /// The corresponding node in tree B
        node_b: NodeId,
        /// New parent in tree B
        new_parent_b: Option<NodeId>,
        /// New position among siblings, counted after the node is detached
        new_position: usize,
    },
}

struct Parent(Option<NodeId>);

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "b:{}", usize::from(id)),
            None => f.write_str("top"),
        }
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOp::Insert {
                node_b,
                parent_b,
                position,
                kind,
                label,
            } => {
                write!(f, "Insert(b:{} {}", usize::from(*node_b), kind)?;
                if let Some(label) = label {
                    write!(f, " {label:?}")?;
                }
                write!(f, " @{} under {})", position, Parent(*parent_b))
            }
            EditOp::Delete { node_a } => {
                write!(f, "Delete(a:{})", usize::from(*node_a))
            }
            EditOp::Update {
                node_a,
                node_b,
                label,
            } => {
                write!(
                    f,
                    "Update(a:{} → b:{} label={:?})",
                    usize::from(*node_a),
                    usize::from(*node_b),
                    label
                )
            }
            EditOp::Move {
                node_a,
                node_b,
                new_parent_b,
                new_position,
            } => {
                write!(
                    f,
                    "Move(a:{} → b:{} @{} under {})",
                    usize::from(*node_a),
                    usize::from(*node_b),
                    new_position,
                    Parent(*new_parent_b)
                )
            }
        }
    }
}

impl fmt::Debug for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse Display implementation for Debug
        fmt::Display::fmt(self, f)
    }
}

/// Wrapper for collecting edit operations with automatic tracing.
struct Ops {
    inner: Vec<EditOp>,
}

impl Ops {
    fn new() -> Self {
        Self { inner: Vec::new() }
    }

    fn push(&mut self, op: EditOp) {
        trace!(%op, "emit");
        self.inner.push(op);
    }

    fn into_inner(self) -> Vec<EditOp> {
        self.inner
    }
}

/// Generate an edit script from a matching between two trees.
///
/// Replaying the script on `tree_a` yields a tree isomorphic to `tree_b`.
pub fn generate_edit_script(tree_a: &Tree, tree_b: &Tree, matching: &Matching) -> Vec<EditOp> {
    trace!(matched_pairs = matching.len(), "generate_edit_script start");
    let mut generator = ScriptGenerator::new(tree_a, tree_b, matching);
    generator.run();

    let ops = generator.ops.into_inner();
    debug!(total_ops = ops.len(), "generate_edit_script done");
    ops
}

struct ScriptGenerator<'b> {
    tree_b: &'b Tree,
    work: WorkTree,
    work_to_b: HashMap<NodeId, NodeId>,
    b_to_work: HashMap<NodeId, NodeId>,
    /// Destination nodes whose partner is known to sit at its final position
    in_order: HashSet<NodeId>,
    ops: Ops,
}

impl<'b> ScriptGenerator<'b> {
    fn new(tree_a: &Tree, tree_b: &'b Tree, matching: &Matching) -> Self {
        let work = WorkTree::from_source(tree_a);
        let mut work_to_b: HashMap<NodeId, NodeId> = HashMap::default();
        let mut b_to_work: HashMap<NodeId, NodeId> = HashMap::default();
        for (a, b) in matching.pairs() {
            if let Some(w) = work.for_source(a) {
                work_to_b.insert(w, b);
                b_to_work.insert(b, w);
            }
        }

        Self {
            tree_b,
            work,
            work_to_b,
            b_to_work,
            in_order: HashSet::default(),
            ops: Ops::new(),
        }
    }

    fn run(&mut self) {
        let tree_b = self.tree_b;
        for x in tree_b.breadth_first() {
            // BFS: the parent already has a partner, matched or inserted.
            let z = tree_b
                .parent(x)
                .and_then(|y| self.b_to_work.get(&y).copied())
                .unwrap_or(self.work.root());

            let w = match self.b_to_work.get(&x).copied() {
                None => self.insert(x, z),
                Some(w) => {
                    self.update_and_move(w, x, z);
                    w
                }
            };

            self.in_order.insert(x);
            self.align_children(w, x);
        }

        // Phase 5: DELETE - nodes in A that are not matched
        // Post-order so children are deleted before parents
        for w in self.work.post_order() {
            if self.work_to_b.contains_key(&w) {
                continue;
            }
            if let Some(node_a) = self.work.get(w).source {
                self.ops.push(EditOp::Delete { node_a });
            }
        }
    }

    fn insert(&mut self, x: NodeId, z: NodeId) -> NodeId {
        let tree_b = self.tree_b;
        let k = self.find_pos(x);
        let data = tree_b.get(x);
        self.ops.push(EditOp::Insert {
            node_b: x,
            parent_b: tree_b.parent(x),
            position: k,
            kind: data.kind,
            label: data.label.clone(),
        });

        let w = self.work.insert(z, k, data.kind, data.label.clone());
        self.work_to_b.insert(w, x);
        self.b_to_work.insert(x, w);
        w
    }

    fn update_and_move(&mut self, w: NodeId, x: NodeId, z: NodeId) {
        let Some(node_a) = self.work.get(w).source else {
            return;
        };

        let tree_b = self.tree_b;
        let label = &tree_b.get(x).label;
        if self.work.get(w).label != *label {
            self.ops.push(EditOp::Update {
                node_a,
                node_b: x,
                label: label.clone(),
            });
            self.work.set_label(w, label.clone());
        }

        if self.work.parent(w) != Some(z) {
            let k = self.find_pos(x);
            trace!(
                a = usize::from(node_a),
                b = usize::from(x),
                k,
                "move: parent changed"
            );
            self.ops.push(EditOp::Move {
                node_a,
                node_b: x,
                new_parent_b: tree_b.parent(x),
                new_position: k,
            });
            self.work.move_to(w, z, k);
        }
    }

    /// Put the matched children of `w` in the order of their partners under `x`.
    fn align_children(&mut self, w: NodeId, x: NodeId) {
        let tree_b = self.tree_b;
        for c in tree_b.children(x) {
            self.in_order.remove(&c);
        }

        let s1: Vec<NodeId> = self
            .work
            .children(w)
            .filter(|c| {
                self.work_to_b
                    .get(c)
                    .is_some_and(|&p| tree_b.parent(p) == Some(x))
            })
            .collect();
        let s2: Vec<NodeId> = tree_b
            .children(x)
            .filter(|c| {
                self.b_to_work
                    .get(c)
                    .is_some_and(|&p| self.work.parent(p) == Some(w))
            })
            .collect();
        if s1.is_empty() {
            return;
        }

        let common = self.lcs(&s1, &s2);
        let mut aligned: HashSet<NodeId> = HashSet::default();
        for &(a, b) in &common {
            aligned.insert(a);
            self.in_order.insert(b);
        }

        for a in s1 {
            if aligned.contains(&a) {
                continue;
            }
            let (Some(&b), Some(node_a)) = (self.work_to_b.get(&a), self.work.get(a).source) else {
                continue;
            };

            let k = self.find_pos(b);
            // The position is counted once `a` is out of the list.
            let k = if k > self.work.position(a) { k - 1 } else { k };
            trace!(a = usize::from(node_a), b = usize::from(b), k, "move: misaligned child");
            self.ops.push(EditOp::Move {
                node_a,
                node_b: b,
                new_parent_b: Some(x),
                new_position: k,
            });
            self.work.move_to(a, w, k);
            self.in_order.insert(b);
        }
    }

    /// Longest common subsequence of `xs` and `ys` under the matching.
    fn lcs(&self, xs: &[NodeId], ys: &[NodeId]) -> Vec<(NodeId, NodeId)> {
        let same = |a: NodeId, b: NodeId| self.work_to_b.get(&a) == Some(&b);
        let (m, n) = (xs.len(), ys.len());

        let mut opt = vec![vec![0usize; n + 1]; m + 1];
        for i in (0..m).rev() {
            for j in (0..n).rev() {
                opt[i][j] = if same(xs[i], ys[j]) {
                    opt[i + 1][j + 1] + 1
                } else {
                    opt[i + 1][j].max(opt[i][j + 1])
                };
            }
        }

        let mut common = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < m && j < n {
            if same(xs[i], ys[j]) {
                common.push((xs[i], ys[j]));
                i += 1;
                j += 1;
            } else if opt[i + 1][j] >= opt[i][j + 1] {
                i += 1;
            } else {
                j += 1;
            }
        }
        common
    }

    /// Working-copy index for `x`: just after the partner of its closest
    /// in-order left sibling, or first.
    fn find_pos(&self, x: NodeId) -> usize {
        let Some(y) = self.tree_b.parent(x) else {
            return 0;
        };

        let preceding = self
            .tree_b
            .children(y)
            .take_while(|&c| c != x)
            .filter(|c| self.in_order.contains(c))
            .last();
        match preceding.and_then(|v| self.b_to_work.get(&v)) {
            Some(&u) => self.work.position(u) + 1,
            None => 0,
        }
    }
}

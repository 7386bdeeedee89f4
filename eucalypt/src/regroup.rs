//! Grouping of edit operations into a hierarchy.
//!
//! Each operation is placed under the operation on its parent node, so an
//! inserted or deleted subtree reads as one group and an edit made inside a
//! changed container stays with it. A move only ever takes other moves as
//! sub-actions: an update inside a moved block is a separate change.

use indextree::NodeId;
use rapidhash::RapidHashMap as HashMap;

use crate::chawathe::EditOp;
use crate::debug;
use crate::tree::Tree;

/// An operation and the operations on its node's children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet {
    /// The grouped operation
    pub op: EditOp,
    /// Index of `op` in the edit script
    pub index: usize,
    /// Operations on the children of `op`'s node, ordered by position
    pub sub_actions: Vec<ActionSet>,
}

impl ActionSet {
    /// Number of operations in the group, this one included.
    pub fn op_count(&self) -> usize {
        1 + self.sub_actions.iter().map(ActionSet::op_count).sum::<usize>()
    }

    /// Every operation of the group in pre-order.
    pub fn ops(&self) -> Vec<&EditOp> {
        let mut out = vec![&self.op];
        for sub in &self.sub_actions {
            out.extend(sub.ops());
        }
        out
    }
}

/// Node an operation hangs under, in whichever tree the operation places it.
#[derive(Clone, Copy)]
enum Parent {
    Src(NodeId),
    Dst(NodeId),
}

fn parent_node(op: &EditOp, src: &Tree) -> Option<Parent> {
    match *op {
        EditOp::Insert { parent_b, .. } => parent_b.map(Parent::Dst),
        EditOp::Move { new_parent_b, .. } => new_parent_b.map(Parent::Dst),
        EditOp::Delete { node_a } | EditOp::Update { node_a, .. } => {
            src.parent(node_a).map(Parent::Src)
        }
    }
}

/// Where the operation's node starts in its own tree: the byte offset when the
/// node has a span, the pre-order index otherwise.
fn start(op: &EditOp, src: &Tree, dst: &Tree) -> usize {
    let data = match *op {
        EditOp::Insert { node_b, .. } => dst.get(node_b),
        EditOp::Delete { node_a }
        | EditOp::Update { node_a, .. }
        | EditOp::Move { node_a, .. } => src.get(node_a),
    };
    data.span.map_or(data.pre_order_index, |span| span.offset)
}

/// Group `ops` into a forest of [`ActionSet`]s.
///
/// An operation's parent is the first operation, by position, on the node
/// above its own: the source parent for deletes and updates, the destination
/// parent for inserts and moves. Moves are skipped as parents of anything but
/// moves. Operations without a parent start a group. Groups and sub-actions are
/// ordered by position, ties by script order. Every operation appears exactly
/// once in the result.
pub fn regroup_edit_script(ops: &[EditOp], src: &Tree, dst: &Tree) -> Vec<ActionSet> {
    let mut on_src: HashMap<NodeId, Vec<usize>> = HashMap::default();
    let mut on_dst: HashMap<NodeId, Vec<usize>> = HashMap::default();
    for (i, op) in ops.iter().enumerate() {
        match *op {
            EditOp::Insert { node_b, .. } => on_dst.entry(node_b).or_default().push(i),
            EditOp::Delete { node_a } => on_src.entry(node_a).or_default().push(i),
            EditOp::Update { node_a, node_b, .. } | EditOp::Move { node_a, node_b, .. } => {
                on_src.entry(node_a).or_default().push(i);
                on_dst.entry(node_b).or_default().push(i);
            }
        }
    }

    let mut order: Vec<usize> = (0..ops.len()).collect();
    order.sort_by_key(|&i| (start(&ops[i], src, dst), i));
    let mut rank = vec![0; ops.len()];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }

    let is_move = |op: &EditOp| matches!(op, EditOp::Move { .. });
    let parents: Vec<Option<usize>> = ops
        .iter()
        .map(|op| {
            let candidates = match parent_node(op, src)? {
                Parent::Src(p) => on_src.get(&p)?,
                Parent::Dst(p) => on_dst.get(&p)?,
            };
            candidates
                .iter()
                .copied()
                .filter(|&j| is_move(op) || !is_move(&ops[j]))
                .min_by_key(|&j| rank[j])
        })
        .collect();

    // Walking `order` keeps every child list sorted by position.
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); ops.len()];
    let mut roots = Vec::new();
    for &i in &order {
        match parents[i] {
            Some(p) => children[p].push(i),
            None => roots.push(i),
        }
    }

    let sets: Vec<ActionSet> = roots
        .into_iter()
        .map(|i| action_set(i, ops, &children))
        .collect();
    debug!(ops = ops.len(), groups = sets.len(), "regrouped edit script");
    sets
}

fn action_set(index: usize, ops: &[EditOp], children: &[Vec<usize>]) -> ActionSet {
    ActionSet {
        op: ops[index].clone(),
        index,
        sub_actions: children[index]
            .iter()
            .map(|&child| action_set(child, ops, children))
            .collect(),
    }
}

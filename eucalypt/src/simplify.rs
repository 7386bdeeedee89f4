//! Edit script simplification.
//!
//! Consolidates redundant operations to produce cleaner diffs:
//! - When a subtree is inserted, don't report individual child inserts
//! - When a subtree is deleted, don't report individual child deletes
//! - When a subtree is moved, don't report individual child moves
//!
//! The result is a summary for display. It can no longer be replayed with
//! [`crate::apply_edit_script`].

use crate::chawathe::EditOp;
use crate::tree::Tree;
use crate::{debug, trace};
use indextree::NodeId;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};

/// Simplify an edit script by consolidating subtree operations.
///
/// This removes redundant child operations when a parent operation already
/// covers the entire subtree. Updates are always kept.
pub fn simplify_edit_script(ops: Vec<EditOp>, tree_a: &Tree, tree_b: &Tree) -> Vec<EditOp> {
    debug!(ops_count = ops.len(), "simplify_edit_script start");

    // Collect all nodes involved in each operation type
    let mut inserted_nodes: HashSet<NodeId> = HashSet::default();
    let mut deleted_nodes: HashSet<NodeId> = HashSet::default();
    let mut move_pairs: HashMap<NodeId, NodeId> = HashMap::default(); // node_b -> node_a

    for op in &ops {
        match op {
            EditOp::Insert { node_b, .. } => {
                inserted_nodes.insert(*node_b);
            }
            EditOp::Delete { node_a } => {
                deleted_nodes.insert(*node_a);
            }
            EditOp::Move { node_a, node_b, .. } => {
                move_pairs.insert(*node_b, *node_a);
            }
            EditOp::Update { .. } => {}
        }
    }

    debug!(
        inserted = inserted_nodes.len(),
        deleted = deleted_nodes.len(),
        moved = move_pairs.len(),
        "collected nodes"
    );

    // An op is dominated when its parent is covered by an op of the same kind.
    let dominated_inserts: HashSet<NodeId> = inserted_nodes
        .iter()
        .filter(|&&node| tree_b.parent(node).is_some_and(|p| inserted_nodes.contains(&p)))
        .copied()
        .collect();

    let dominated_deletes: HashSet<NodeId> = deleted_nodes
        .iter()
        .filter(|&&node| tree_a.parent(node).is_some_and(|p| deleted_nodes.contains(&p)))
        .copied()
        .collect();

    // A child move is only dominated if the parent relationship exists in BOTH
    // trees. Otherwise the nodes are unrelated in the source and the child move
    // must be preserved.
    let dominated_moves: HashSet<NodeId> = move_pairs
        .iter()
        .filter(|&(&node_b, &node_a)| {
            let Some(parent_b) = tree_b.parent(node_b) else {
                return false;
            };
            let Some(&parent_a_from_move) = move_pairs.get(&parent_b) else {
                return false;
            };
            tree_a.parent(node_a) == Some(parent_a_from_move)
        })
        .map(|(&node_b, _)| node_b)
        .collect();

    debug!(
        dominated_inserts = dominated_inserts.len(),
        dominated_deletes = dominated_deletes.len(),
        dominated_moves = dominated_moves.len(),
        "found dominated operations"
    );

    let result: Vec<_> = ops
        .into_iter()
        .filter(|op| {
            let dominated = match op {
                EditOp::Insert { node_b, .. } => dominated_inserts.contains(node_b),
                EditOp::Delete { node_a } => dominated_deletes.contains(node_a),
                EditOp::Move { node_b, .. } => dominated_moves.contains(node_b),
                EditOp::Update { .. } => false,
            };
            if dominated {
                trace!(%op, "simplify: dropping dominated op");
            }
            !dominated
        })
        .collect();

    debug!(after = result.len(), "simplify_edit_script done");

    result
}

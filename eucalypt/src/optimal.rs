//! Exact tree edit distance matchers.
//!
//! Both matchers compute a minimum-cost mapping under unit costs: deleting or
//! inserting a node costs 1, relabeling costs 0 for equal labels and 1
//! otherwise. A node is never relabeled into another kind, so only same-kind
//! pairs end up in the mapping.
//!
//! [`ZhangShashaMatcher`] always decomposes along leftmost paths.
//! [`RtedMatcher`] counts the subproblems each decomposition would solve and
//! runs the cheaper of leftmost and rightmost paths. Rightmost-path
//! decomposition is the leftmost one on mirrored trees, so both share one
//! engine.
//!
//! Time is O(n² m²) in the worst case and memory O(n m). Callers bound the
//! input size.

use indextree::NodeId;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};

use crate::matching::{Matcher, Matching};
use crate::tree::Tree;
use crate::{debug, trace};

const DELETE: usize = 1;
const INSERT: usize = 1;
/// Relabeling across kinds. Large enough to never win, small enough not to
/// overflow when added to a distance.
const FORBIDDEN: usize = usize::MAX / 4;

/// One tree seen as a post-order sequence, 1-based.
struct Indexed<'t> {
    tree: &'t Tree,
    /// `nodes[i - 1]` is the i-th node in post-order
    nodes: Vec<NodeId>,
    /// Leftmost leaf descendant of each node, `lld[0]` unused
    lld: Vec<usize>,
    keyroots: Vec<usize>,
}

impl<'t> Indexed<'t> {
    /// Index the subtree rooted at `root`. When `mirrored`, children are read
    /// right to left, which turns leftmost paths into rightmost ones.
    fn new(tree: &'t Tree, root: NodeId, mirrored: bool) -> Self {
        let nodes: Vec<NodeId> = if mirrored {
            let mut pre: Vec<NodeId> = tree.pre_order_from(root).collect();
            pre.reverse();
            pre
        } else {
            tree.post_order_from(root).collect()
        };
        let sizes = nodes.iter().map(|&id| tree.size(id)).collect();
        Self::with_sizes(tree, nodes, sizes)
    }

    /// Index the subtree rooted at `root` without the subtrees of the nodes
    /// `cut` selects. The root is always kept.
    fn pruned(
        tree: &'t Tree,
        root: NodeId,
        mirrored: bool,
        cut: impl Fn(NodeId) -> bool,
    ) -> Self {
        let mut kept: HashSet<NodeId> = HashSet::default();
        let mut pre = Vec::new();
        for id in tree.pre_order_from(root) {
            let keep = id == root
                || (!cut(id) && tree.parent(id).is_some_and(|p| kept.contains(&p)));
            if keep {
                kept.insert(id);
                pre.push(id);
            }
        }

        let nodes: Vec<NodeId> = if mirrored {
            pre.reverse();
            pre
        } else {
            tree.post_order_from(root)
                .filter(|id| kept.contains(id))
                .collect()
        };

        // Post-order in both cases, so children are sized before parents.
        let mut below: HashMap<NodeId, usize> = HashMap::default();
        let mut sizes = Vec::with_capacity(nodes.len());
        for &id in &nodes {
            let size = below.remove(&id).unwrap_or(0) + 1;
            sizes.push(size);
            if let Some(parent) = tree.parent(id).filter(|_| id != root) {
                *below.entry(parent).or_default() += size;
            }
        }
        Self::with_sizes(tree, nodes, sizes)
    }

    /// `sizes[i]` is the size of the subtree of `nodes[i]` as indexed.
    fn with_sizes(tree: &'t Tree, nodes: Vec<NodeId>, sizes: Vec<usize>) -> Self {
        let mut lld = vec![0; nodes.len() + 1];
        for (i, size) in sizes.into_iter().enumerate() {
            // Subtrees are contiguous in post-order and end at their root.
            lld[i + 1] = i + 2 - size;
        }

        let mut seen = vec![false; nodes.len() + 1];
        let mut keyroots = Vec::new();
        for i in (1..=nodes.len()).rev() {
            if !seen[lld[i]] {
                seen[lld[i]] = true;
                keyroots.push(i);
            }
        }
        keyroots.reverse();

        Self {
            tree,
            nodes,
            lld,
            keyroots,
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, i: usize) -> NodeId {
        self.nodes[i - 1]
    }

    /// Sum of the sizes of the keyroot subtrees.
    fn keyroot_work(&self) -> usize {
        self.keyroots.iter().map(|&k| k + 1 - self.lld[k]).sum()
    }
}

/// Row-major (n + 1) x (m + 1) matrix.
struct Matrix {
    cols: usize,
    cells: Vec<usize>,
}

impl Matrix {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            cells: vec![0; rows * cols],
        }
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> usize {
        self.cells[row * self.cols + col]
    }

    #[inline]
    fn set(&mut self, row: usize, col: usize, value: usize) {
        self.cells[row * self.cols + col] = value;
    }
}

/// Zhang-Shasha forest distance with mapping recovery.
struct ForestDistance<'s, 'd> {
    src: Indexed<'s>,
    dst: Indexed<'d>,
    tree_dist: Matrix,
    forest_dist: Matrix,
}

impl<'s, 'd> ForestDistance<'s, 'd> {
    fn new(src: Indexed<'s>, dst: Indexed<'d>) -> Self {
        let rows = src.len() + 1;
        let cols = dst.len() + 1;
        Self {
            src,
            dst,
            tree_dist: Matrix::new(rows, cols),
            forest_dist: Matrix::new(rows, cols),
        }
    }

    fn relabel_cost(&self, i: usize, j: usize) -> usize {
        let a = self.src.tree.get(self.src.node(i));
        let b = self.dst.tree.get(self.dst.node(j));
        if a.kind != b.kind {
            FORBIDDEN
        } else if a.label == b.label {
            0
        } else {
            1
        }
    }

    /// Fill the tree distances for every keyroot pair. Returns the distance
    /// between the two whole trees.
    fn compute(&mut self) -> usize {
        let src_keyroots = self.src.keyroots.clone();
        let dst_keyroots = self.dst.keyroots.clone();
        for &i in &src_keyroots {
            for &j in &dst_keyroots {
                self.forest(i, j);
            }
        }
        self.tree_dist.get(self.src.len(), self.dst.len())
    }

    fn forest(&mut self, i: usize, j: usize) {
        let li = self.src.lld[i];
        let lj = self.dst.lld[j];

        self.forest_dist.set(li - 1, lj - 1, 0);
        for di in li..=i {
            let value = self.forest_dist.get(di - 1, lj - 1) + DELETE;
            self.forest_dist.set(di, lj - 1, value);
            for dj in lj..=j {
                let value = self.forest_dist.get(li - 1, dj - 1) + INSERT;
                self.forest_dist.set(li - 1, dj, value);

                let delete = self.forest_dist.get(di - 1, dj) + DELETE;
                let insert = self.forest_dist.get(di, dj - 1) + INSERT;
                let (ldi, ldj) = (self.src.lld[di], self.dst.lld[dj]);
                if ldi == li && ldj == lj {
                    let relabel = self.forest_dist.get(di - 1, dj - 1) + self.relabel_cost(di, dj);
                    let value = delete.min(insert).min(relabel);
                    self.forest_dist.set(di, dj, value);
                    self.tree_dist.set(di, dj, value);
                } else {
                    let subtree =
                        self.forest_dist.get(ldi - 1, ldj - 1) + self.tree_dist.get(di, dj);
                    self.forest_dist.set(di, dj, delete.min(insert).min(subtree));
                }
            }
        }
    }

    /// Walk the distance tables back from the roots and collect the mapped
    /// same-kind pairs.
    fn mapping(&mut self) -> Vec<(NodeId, NodeId)> {
        let mut pairs = Vec::new();
        if self.src.len() == 0 || self.dst.len() == 0 {
            return pairs;
        }

        let mut subproblems = vec![(self.src.len(), self.dst.len())];
        let mut root_pair = true;
        while let Some((last_row, last_col)) = subproblems.pop() {
            // The root subproblem is the last one `compute` filled in.
            if !root_pair {
                self.forest(last_row, last_col);
            }
            root_pair = false;

            let first_row = self.src.lld[last_row] - 1;
            let first_col = self.dst.lld[last_col] - 1;
            let (mut row, mut col) = (last_row, last_col);
            while row > first_row || col > first_col {
                let fd = &self.forest_dist;
                if row > first_row && fd.get(row - 1, col) + DELETE == fd.get(row, col) {
                    row -= 1;
                } else if col > first_col && fd.get(row, col - 1) + INSERT == fd.get(row, col) {
                    col -= 1;
                } else if self.src.lld[row] == self.src.lld[last_row]
                    && self.dst.lld[col] == self.dst.lld[last_col]
                {
                    // Both on the leftmost path of the current subproblem.
                    let (a, b) = (self.src.node(row), self.dst.node(col));
                    if self.src.tree.kind(a) == self.dst.tree.kind(b) {
                        pairs.push((a, b));
                    }
                    row -= 1;
                    col -= 1;
                } else {
                    subproblems.push((row, col));
                    row = self.src.lld[row] - 1;
                    col = self.dst.lld[col] - 1;
                }
            }
        }
        pairs
    }
}

/// Decomposition strategy for the forest distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Paths {
    Left,
    Right,
}

fn solve(src: Indexed<'_>, dst: Indexed<'_>, _paths: Paths) -> Vec<(NodeId, NodeId)> {
    let mut engine = ForestDistance::new(src, dst);
    let _cost = engine.compute();
    let pairs = engine.mapping();
    trace!(paths = ?_paths, cost = _cost, pairs = pairs.len(), "forest distance solved");
    pairs
}

/// Pick the decomposition with fewer relevant subproblems. Ties go left.
fn cheaper_paths(src: &Tree, src_root: NodeId, dst: &Tree, dst_root: NodeId) -> Paths {
    let left = Indexed::new(src, src_root, false).keyroot_work()
        * Indexed::new(dst, dst_root, false).keyroot_work();
    let right = Indexed::new(src, src_root, true).keyroot_work()
        * Indexed::new(dst, dst_root, true).keyroot_work();
    trace!(left, right, "decomposition cost");
    if right < left { Paths::Right } else { Paths::Left }
}

/// Minimum-cost mapping between two subtrees, leftmost-path decomposition.
pub(crate) fn zhang_shasha(
    src: &Tree,
    src_root: NodeId,
    dst: &Tree,
    dst_root: NodeId,
) -> Vec<(NodeId, NodeId)> {
    solve(
        Indexed::new(src, src_root, false),
        Indexed::new(dst, dst_root, false),
        Paths::Left,
    )
}

/// Minimum-cost mapping between the parts of two subtrees that `matching`
/// leaves free, leftmost-path decomposition.
///
/// Matched descendants are cut off together with their subtrees; the two
/// roots are always kept. Returns `None` when either remaining part has
/// `max_size` nodes or more.
pub(crate) fn zhang_shasha_free(
    src: &Tree,
    src_root: NodeId,
    dst: &Tree,
    dst_root: NodeId,
    matching: &Matching,
    max_size: usize,
) -> Option<Vec<(NodeId, NodeId)>> {
    let src_index = Indexed::pruned(src, src_root, false, |a| matching.contains_a(a));
    let dst_index = Indexed::pruned(dst, dst_root, false, |b| matching.contains_b(b));
    if src_index.len() >= max_size || dst_index.len() >= max_size {
        return None;
    }
    Some(solve(src_index, dst_index, Paths::Left))
}

/// Minimum-cost mapping between two subtrees, cheaper decomposition.
pub(crate) fn rted(
    src: &Tree,
    src_root: NodeId,
    dst: &Tree,
    dst_root: NodeId,
) -> Vec<(NodeId, NodeId)> {
    let paths = cheaper_paths(src, src_root, dst, dst_root);
    let mirrored = paths == Paths::Right;
    solve(
        Indexed::new(src, src_root, mirrored),
        Indexed::new(dst, dst_root, mirrored),
        paths,
    )
}

fn extend_with(matching: &mut Matching, pairs: Vec<(NodeId, NodeId)>) {
    let _before = matching.len();
    for (a, b) in pairs {
        matching.add(a, b);
    }
    debug!(added = matching.len() - _before, "exact matching done");
}

/// Zhang-Shasha tree edit distance matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZhangShashaMatcher;

impl Matcher for ZhangShashaMatcher {
    fn extend_matching(&self, src: &Tree, dst: &Tree, matching: &mut Matching) {
        debug!(
            nodes_a = src.node_count(),
            nodes_b = dst.node_count(),
            "zhang-shasha start"
        );
        extend_with(matching, zhang_shasha(src, src.root(), dst, dst.root()));
    }
}

/// Tree edit distance matcher choosing between leftmost and rightmost path
/// decomposition for each input.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtedMatcher;

impl Matcher for RtedMatcher {
    fn extend_matching(&self, src: &Tree, dst: &Tree, matching: &mut Matching) {
        debug!(
            nodes_a = src.node_count(),
            nodes_b = dst.node_count(),
            "rted start"
        );
        extend_with(matching, rted(src, src.root(), dst, dst.root()));
    }
}

/// Edit cost implied by a mapping: one per unmapped node on either side, one
/// per mapped pair whose labels differ, and two for a cross-kind pair.
///
/// Only meaningful for mappings that preserve ancestry and sibling order, which
/// is what every matcher in this crate produces when run alone.
pub fn edit_cost(src: &Tree, dst: &Tree, matching: &Matching) -> usize {
    let deletes = src.pre_order().filter(|&a| !matching.contains_a(a)).count();
    let inserts = dst.pre_order().filter(|&b| !matching.contains_b(b)).count();
    let relabels: usize = matching
        .pairs()
        .map(|(a, b)| {
            if src.kind(a) != dst.kind(b) {
                DELETE + INSERT
            } else if src.label(a) != dst.label(b) {
                1
            } else {
                0
            }
        })
        .sum();
    deletes + inserts + relabels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeContext;
    use facet_testhelpers::test;

    fn leaf_pair(a: (u32, &str), b: (u32, &str)) -> (Tree, Tree) {
        let (ctx_a, _) = TreeContext::with_root(a.0, Some(a.1));
        let (ctx_b, _) = TreeContext::with_root(b.0, Some(b.1));
        (ctx_a.validate().unwrap(), ctx_b.validate().unwrap())
    }

    #[test]
    fn test_relabel_same_kind() {
        let (a, b) = leaf_pair((0, "x"), (0, "y"));
        let matching = ZhangShashaMatcher.compute_matching(&a, &b);
        assert!(matching.has(a.root(), b.root()));
        assert_eq!(edit_cost(&a, &b, &matching), 1);
    }

    #[test]
    fn test_no_relabel_across_kinds() {
        let (a, b) = leaf_pair((0, "x"), (1, "x"));
        let matching = ZhangShashaMatcher.compute_matching(&a, &b);
        assert!(matching.is_empty());
        assert_eq!(edit_cost(&a, &b, &matching), 2);
    }

    #[test]
    fn test_keyroots() {
        // r[a[b, c], d]: post-order b c a d r
        let (mut ctx, r) = TreeContext::with_root(0, Some("r"));
        let a = ctx.add_child(r, 0, Some("a")).unwrap();
        ctx.add_child(a, 0, Some("b")).unwrap();
        ctx.add_child(a, 0, Some("c")).unwrap();
        ctx.add_child(r, 0, Some("d")).unwrap();
        let tree = ctx.validate().unwrap();

        let left = Indexed::new(&tree, tree.root(), false);
        assert_eq!(left.lld, vec![0, 1, 2, 1, 4, 1]);
        assert_eq!(left.keyroots, vec![2, 4, 5]);
        assert_eq!(left.keyroot_work(), 1 + 1 + 5);

        // Mirrored post-order: d c b a r
        let right = Indexed::new(&tree, tree.root(), true);
        assert_eq!(right.lld, vec![0, 1, 2, 3, 2, 1]);
        assert_eq!(right.keyroots, vec![3, 4, 5]);
        assert_eq!(right.keyroot_work(), 1 + 3 + 5);
    }

    #[test]
    fn test_pruned_index_skips_cut_subtrees() {
        // r[a[b, c], d] without a: post-order d r
        let (mut ctx, r) = TreeContext::with_root(0, Some("r"));
        let a = ctx.add_child(r, 0, Some("a")).unwrap();
        ctx.add_child(a, 0, Some("b")).unwrap();
        ctx.add_child(a, 0, Some("c")).unwrap();
        let d = ctx.add_child(r, 0, Some("d")).unwrap();
        let tree = ctx.validate().unwrap();

        let index = Indexed::pruned(&tree, tree.root(), false, |id| id == a);
        assert_eq!(index.nodes, vec![d, r]);
        assert_eq!(index.lld, vec![0, 1, 1]);
        assert_eq!(index.keyroots, vec![2]);
        assert_eq!(index.keyroot_work(), 2);

        // Cutting the root itself has no effect.
        let whole = Indexed::pruned(&tree, tree.root(), false, |id| id == r);
        assert_eq!(whole.lld, Indexed::new(&tree, tree.root(), false).lld);
    }

    /// `c[m[x, y], u]` against `c[v, m[x, y]]` with the `m` subtrees matched.
    fn anchored_block() -> (Tree, Tree, Matching, [NodeId; 2]) {
        let (mut ctx, c) = TreeContext::with_root(0, Some("c"));
        let m = ctx.add_child(c, 1, Some("m")).unwrap();
        ctx.add_child(m, 2, Some("x")).unwrap();
        ctx.add_child(m, 2, Some("y")).unwrap();
        let u = ctx.add_child(c, 3, Some("u")).unwrap();
        let src = ctx.validate().unwrap();

        let (mut ctx, c) = TreeContext::with_root(0, Some("c"));
        let v = ctx.add_child(c, 3, Some("v")).unwrap();
        let m = ctx.add_child(c, 1, Some("m")).unwrap();
        ctx.add_child(m, 2, Some("x")).unwrap();
        ctx.add_child(m, 2, Some("y")).unwrap();
        let dst = ctx.validate().unwrap();

        let mut matching = Matching::for_trees(&src, &dst);
        let src_m = src.children(src.root()).next().unwrap();
        let dst_m = dst.children(dst.root()).nth(1).unwrap();
        for (a, b) in src.pre_order_from(src_m).zip(dst.pre_order_from(dst_m)) {
            matching.add(a, b);
        }
        (src, dst, matching, [u, v])
    }

    #[test]
    fn test_free_parts_ignore_matched_subtrees() {
        let (src, dst, matching, [u, v]) = anchored_block();

        // Over the whole subtrees the anchored block wins and u stays alone.
        let whole = zhang_shasha(&src, src.root(), &dst, dst.root());
        assert!(!whole.contains(&(u, v)));

        let free = zhang_shasha_free(&src, src.root(), &dst, dst.root(), &matching, 3).unwrap();
        assert_eq!(free, vec![(src.root(), dst.root()), (u, v)]);
    }

    #[test]
    fn test_free_parts_size_limit() {
        let (src, dst, matching, _) = anchored_block();
        // Two free nodes on each side, whatever the full sizes are.
        assert!(zhang_shasha_free(&src, src.root(), &dst, dst.root(), &matching, 2).is_none());
        assert!(zhang_shasha_free(&src, src.root(), &dst, dst.root(), &matching, 3).is_some());
    }

    #[test]
    fn test_identical_trees_cost_nothing() {
        let build = || {
            let (mut ctx, r) = TreeContext::with_root(0, Some("r"));
            let a = ctx.add_child(r, 1, Some("a")).unwrap();
            ctx.add_child(a, 2, Some("b")).unwrap();
            ctx.add_child(r, 1, Some("c")).unwrap();
            ctx.validate().unwrap()
        };
        let (a, b) = (build(), build());
        for matching in [
            ZhangShashaMatcher.compute_matching(&a, &b),
            RtedMatcher.compute_matching(&a, &b),
        ] {
            assert_eq!(matching.len(), 4);
            assert_eq!(edit_cost(&a, &b, &matching), 0);
        }
    }
}

//! GumTree node matching algorithm.
//!
//! Implements two-phase matching:
//! 1. Top-down: anchor the largest identical subtrees, found by hash and
//!    confirmed by an isomorphism check
//! 2. Bottom-up: match remaining containers by how many of their descendants
//!    are already matched to each other, then recover leaf-level pairs inside
//!    each new container pair with an exact matcher

use core::cmp::Ordering;
use core::mem;

use indextree::NodeId;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};

use crate::matching::{Matcher, Matching, Similarity};
use crate::optimal;
use crate::tree::Tree;
use crate::{Algorithm, debug, trace};

/// Configuration for the matching algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingConfig {
    /// Which matcher [`crate::compute_matching`] runs.
    pub algorithm: Algorithm,

    /// Minimum height for a subtree to be anchored by the top-down phase.
    /// Smaller subtrees are left for bottom-up matching.
    pub min_height: usize,

    /// Similarity a container with few leaves must reach to be matched.
    pub strict_threshold: f64,

    /// Similarity a container with many leaves must reach to be matched.
    pub loose_threshold: f64,

    /// Containers with at most this many leaf descendants use
    /// `strict_threshold`, larger ones `loose_threshold`.
    pub leaf_count_cutoff: usize,

    /// Coefficient used to score container pairs.
    pub similarity: Similarity,

    /// Container pairs whose unmatched parts both have fewer nodes than this
    /// are refined with the exact matcher. 0 disables the refinement.
    pub max_exact_size: usize,

    /// Match the two roots when nothing else did and their kinds agree.
    pub match_roots: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::GumTree,
            min_height: 2,
            strict_threshold: 0.6,
            loose_threshold: 0.4,
            leaf_count_cutoff: 4,
            similarity: Similarity::Jaccard,
            max_exact_size: 1000,
            match_roots: true,
        }
    }
}

impl MatchingConfig {
    /// Acceptance threshold for a source container with `leaf_count` leaves.
    pub fn threshold_for(&self, leaf_count: usize) -> f64 {
        if leaf_count <= self.leaf_count_cutoff {
            self.strict_threshold
        } else {
            self.loose_threshold
        }
    }
}

/// The heuristic top-down plus bottom-up matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct GumTreeMatcher {
    /// Phase parameters
    pub config: MatchingConfig,
}

impl GumTreeMatcher {
    /// Create a matcher with the given configuration.
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }
}

impl Matcher for GumTreeMatcher {
    fn extend_matching(&self, src: &Tree, dst: &Tree, matching: &mut Matching) {
        debug!(
            nodes_a = src.node_count(),
            nodes_b = dst.node_count(),
            "gumtree matching start"
        );

        // Phase 1: Top-down matching (identical subtrees)
        top_down_phase(src, dst, matching, &self.config);
        debug!(matched = matching.len(), "after top_down_phase");

        // Phase 2: Bottom-up matching (similar containers)
        bottom_up_phase(src, dst, matching, &self.config);
        debug!(matched = matching.len(), "after bottom_up_phase");
    }
}

/// Nodes bucketed by height, popped tallest first.
struct HeightQueue<'t> {
    tree: &'t Tree,
    min_height: usize,
    levels: Vec<Vec<NodeId>>,
    current: usize,
}

impl<'t> HeightQueue<'t> {
    fn new(tree: &'t Tree, min_height: usize) -> Self {
        let height = tree.height(tree.root());
        let mut queue = Self {
            tree,
            min_height: min_height.max(1),
            levels: vec![Vec::new(); height + 1],
            current: height,
        };
        queue.push(tree.root());
        queue
    }

    fn push(&mut self, id: NodeId) {
        let height = self.tree.height(id);
        if height >= self.min_height {
            self.levels[height].push(id);
        }
    }

    fn open(&mut self, id: NodeId) {
        let tree = self.tree;
        for child in tree.children(id) {
            self.push(child);
        }
    }

    /// Height of the tallest queued nodes.
    fn peek_height(&mut self) -> Option<usize> {
        while self.current > 0 && self.levels[self.current].is_empty() {
            self.current -= 1;
        }
        (!self.levels[self.current].is_empty()).then_some(self.current)
    }

    /// Take every node of the tallest height, in insertion order.
    fn pop(&mut self) -> Vec<NodeId> {
        match self.peek_height() {
            Some(height) => mem::take(&mut self.levels[height]),
            None => Vec::new(),
        }
    }

    /// Replace the tallest nodes by their children.
    fn pop_and_open(&mut self) {
        for id in self.pop() {
            self.open(id);
        }
    }
}

/// Phase 1: Top-down matching.
///
/// Both trees are consumed tallest subtree first. At each height, every pair of
/// isomorphic, still unmatched subtrees is a candidate. Nodes with no candidate
/// are opened so their children compete at lower heights. Candidates that are
/// unique on both sides are matched right away with their whole subtree;
/// ambiguous ones are matched greedily, best parent similarity first.
fn top_down_phase(src: &Tree, dst: &Tree, matching: &mut Matching, config: &MatchingConfig) {
    trace!("top_down_phase start");

    let mut src_queue = HeightQueue::new(src, config.min_height);
    let mut dst_queue = HeightQueue::new(dst, config.min_height);
    let mut candidates: Vec<(NodeId, NodeId)> = Vec::new();

    while let (Some(src_height), Some(dst_height)) =
        (src_queue.peek_height(), dst_queue.peek_height())
    {
        match src_height.cmp(&dst_height) {
            Ordering::Greater => {
                src_queue.pop_and_open();
                continue;
            }
            Ordering::Less => {
                dst_queue.pop_and_open();
                continue;
            }
            Ordering::Equal => {}
        }

        let srcs = src_queue.pop();
        let dsts = dst_queue.pop();
        let mut src_marked = vec![false; srcs.len()];
        let mut dst_marked = vec![false; dsts.len()];

        for (i, &a) in srcs.iter().enumerate() {
            if matching.contains_a(a) {
                continue;
            }
            for (j, &b) in dsts.iter().enumerate() {
                if !matching.contains_b(b)
                    && src.hash(a) == dst.hash(b)
                    && src.is_isomorphic(a, dst, b)
                {
                    trace!(a = usize::from(a), b = usize::from(b), height = src_height, "top_down: isomorphic");
                    candidates.push((a, b));
                    src_marked[i] = true;
                    dst_marked[j] = true;
                }
            }
        }

        for (&a, marked) in srcs.iter().zip(src_marked) {
            if !marked {
                src_queue.open(a);
            }
        }
        for (&b, marked) in dsts.iter().zip(dst_marked) {
            if !marked {
                dst_queue.open(b);
            }
        }
    }

    let mut src_counts: HashMap<NodeId, usize> = HashMap::default();
    let mut dst_counts: HashMap<NodeId, usize> = HashMap::default();
    for &(a, b) in &candidates {
        *src_counts.entry(a).or_default() += 1;
        *dst_counts.entry(b).or_default() += 1;
    }

    let mut ambiguous = Vec::new();
    for (a, b) in candidates {
        if src_counts[&a] == 1 && dst_counts[&b] == 1 {
            match_isomorphic(src, dst, a, b, matching);
        } else {
            ambiguous.push(scored_by_parents(src, dst, a, b, matching));
        }
    }

    debug!(ambiguous = ambiguous.len(), "top_down: resolving ambiguous candidates");
    ambiguous.sort_by(|x, y| {
        y.0.total_cmp(&x.0)
            .then_with(|| src.get(x.1).pre_order_index.cmp(&src.get(y.1).pre_order_index))
            .then_with(|| dst.get(x.2).pre_order_index.cmp(&dst.get(y.2).pre_order_index))
    });
    for (_score, a, b) in ambiguous {
        if !matching.contains_a(a) && !matching.contains_b(b) {
            trace!(a = usize::from(a), b = usize::from(b), _score, "top_down: ambiguous match");
            match_isomorphic(src, dst, a, b, matching);
        }
    }
}

/// Candidate pair with the Dice similarity of the two parents.
fn scored_by_parents(
    src: &Tree,
    dst: &Tree,
    a: NodeId,
    b: NodeId,
    matching: &Matching,
) -> (f64, NodeId, NodeId) {
    let score = match (src.parent(a), dst.parent(b)) {
        (Some(pa), Some(pb)) => Similarity::Dice.score(src, dst, pa, pb, matching),
        _ => 0.0,
    };
    (score, a, b)
}

/// Match two isomorphic subtrees node by node.
fn match_isomorphic(src: &Tree, dst: &Tree, a: NodeId, b: NodeId, matching: &mut Matching) {
    for (x, y) in src.pre_order_from(a).zip(dst.pre_order_from(b)) {
        matching.add(x, y);
    }
}

/// Phase 2: Bottom-up matching.
///
/// Source containers are visited in post-order, so their children are settled
/// first. Each one is compared against the unmatched destination containers of
/// the same kind that hold partners of its descendants; the best score wins if
/// it clears the threshold for the container's leaf count. The first candidate
/// in destination post-order wins ties.
fn bottom_up_phase(src: &Tree, dst: &Tree, matching: &mut Matching, config: &MatchingConfig) {
    trace!("bottom_up_phase start");

    let leaves = leaf_counts(src);
    let src_root = src.root();
    let dst_root = dst.root();

    for a in src.post_order() {
        if a == src_root
            && config.match_roots
            && !matching.contains_a(a)
            && !matching.contains_b(dst_root)
            && src.kind(a) == dst.kind(dst_root)
        {
            trace!(a = usize::from(a), b = usize::from(dst_root), "bottom_up: roots");
            matching.add(a, dst_root);
            last_chance_match(src, dst, a, dst_root, matching, config);
            continue;
        }

        if matching.contains_a(a) || src.is_leaf(a) {
            continue;
        }

        let candidates = destination_candidates(src, dst, a, matching, config);
        if candidates.is_empty() {
            continue;
        }

        let threshold = config.threshold_for(leaves[src.get(a).post_order_index]);
        let mut best: Option<(NodeId, f64)> = None;
        for b in candidates {
            let score = config.similarity.score(src, dst, a, b, matching);
            trace!(
                a = usize::from(a),
                b = usize::from(b),
                score,
                threshold,
                "bottom_up: candidate"
            );
            if score >= threshold && best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((b, score));
            }
        }

        if let Some((b, _score)) = best {
            trace!(a = usize::from(a), b = usize::from(b), _score, "bottom_up: match");
            matching.add(a, b);
            last_chance_match(src, dst, a, b, matching, config);
        }
    }
}

/// Leaf descendants of every node, indexed by post-order index.
fn leaf_counts(tree: &Tree) -> Vec<usize> {
    let mut counts = vec![0; tree.node_count()];
    for id in tree.post_order() {
        let count = tree
            .children(id)
            .map(|child| {
                if tree.is_leaf(child) {
                    1
                } else {
                    counts[tree.get(child).post_order_index]
                }
            })
            .sum();
        counts[tree.get(id).post_order_index] = count;
    }
    counts
}

/// Unmatched same-kind ancestors of the partners of `a`'s descendants, in
/// destination post-order.
fn destination_candidates(
    src: &Tree,
    dst: &Tree,
    a: NodeId,
    matching: &Matching,
    config: &MatchingConfig,
) -> Vec<NodeId> {
    let kind = src.kind(a);
    // The destination root is held back for the source root, but only while
    // the two can still be paired.
    let root_reserved = config.match_roots
        && src.kind(src.root()) == dst.kind(dst.root())
        && !matching.contains_a(src.root());
    let mut visited: HashSet<NodeId> = HashSet::default();
    let mut candidates = Vec::new();

    for descendant in src.descendants(a) {
        let Some(mut seed) = matching.get_b(descendant) else {
            continue;
        };
        while let Some(parent) = dst.parent(seed) {
            if !visited.insert(parent) {
                break;
            }
            let reserved = root_reserved && dst.is_root(parent);
            if dst.kind(parent) == kind && !matching.contains_b(parent) && !reserved {
                candidates.push(parent);
            }
            seed = parent;
        }
    }

    candidates.sort_by_key(|&b| dst.get(b).post_order_index);
    candidates
}

/// Refine a fresh container pair with an exact match of what is still free
/// below it.
///
/// Matched descendants are cut off together with their subtrees before the
/// exact matcher runs, and the size limit applies to what remains. Only pairs
/// of free, same-kind nodes whose parents have the same kind are kept.
fn last_chance_match(
    src: &Tree,
    dst: &Tree,
    a: NodeId,
    b: NodeId,
    matching: &mut Matching,
    config: &MatchingConfig,
) {
    let Some(pairs) = optimal::zhang_shasha_free(src, a, dst, b, matching, config.max_exact_size)
    else {
        trace!(a = usize::from(a), b = usize::from(b), "last chance match: too large");
        return;
    };

    let _before = matching.len();
    for (x, y) in pairs {
        if matching.contains_a(x) || matching.contains_b(y) || src.kind(x) != dst.kind(y) {
            continue;
        }
        let parent_kinds_agree =
            src.parent(x).map(|p| src.kind(p)) == dst.parent(y).map(|p| dst.kind(p));
        if parent_kinds_agree {
            matching.add(x, y);
        }
    }
    trace!(
        a = usize::from(a),
        b = usize::from(b),
        added = matching.len() - _before,
        "last chance match"
    );
}

//! Mapping store and the matcher capability.
//!
//! A [`Matching`] records which source node corresponds to which destination
//! node. Every matcher, heuristic or exact, fills one through the [`Matcher`]
//! trait, and the edit script generator reads it.

use indextree::NodeId;

use crate::tree::Tree;

/// A bidirectional mapping between nodes in two trees.
/// Uses Vec for O(1) lookups indexed by NodeId.
#[derive(Debug, Clone)]
pub struct Matching {
    /// Map from tree A node to tree B node (indexed by A's NodeId)
    a_to_b: Vec<Option<NodeId>>,
    /// Map from tree B node to tree A node (indexed by B's NodeId)
    b_to_a: Vec<Option<NodeId>>,
    /// All matched pairs, in insertion order
    pairs: Vec<(NodeId, NodeId)>,
}

impl Default for Matching {
    fn default() -> Self {
        Self::new()
    }
}

impl Matching {
    /// Create a new empty matching.
    pub fn new() -> Self {
        Self {
            a_to_b: Vec::new(),
            b_to_a: Vec::new(),
            pairs: Vec::new(),
        }
    }

    /// Create a new matching with preallocated capacity.
    pub fn with_capacity(max_a: usize, max_b: usize) -> Self {
        Self {
            a_to_b: vec![None; max_a],
            b_to_a: vec![None; max_b],
            pairs: Vec::new(),
        }
    }

    /// Create an empty matching sized for two trees.
    pub fn for_trees(src: &Tree, dst: &Tree) -> Self {
        // NodeIds are 1-based
        Self::with_capacity(src.node_count() + 1, dst.node_count() + 1)
    }

    /// Add a match between two nodes.
    ///
    /// Returns `false` and leaves the matching untouched if either node
    /// already has a partner.
    #[inline]
    pub fn add(&mut self, a: NodeId, b: NodeId) -> bool {
        if self.contains_a(a) || self.contains_b(b) {
            return false;
        }

        let a_idx = usize::from(a);
        let b_idx = usize::from(b);

        // Grow vectors if needed
        if a_idx >= self.a_to_b.len() {
            self.a_to_b.resize(a_idx + 1, None);
        }
        if b_idx >= self.b_to_a.len() {
            self.b_to_a.resize(b_idx + 1, None);
        }

        self.a_to_b[a_idx] = Some(b);
        self.b_to_a[b_idx] = Some(a);
        self.pairs.push((a, b));
        true
    }

    /// Check whether `a` is matched to exactly `b`.
    #[inline]
    pub fn has(&self, a: NodeId, b: NodeId) -> bool {
        self.get_b(a) == Some(b)
    }

    /// Check if a node from tree A is matched.
    #[inline(always)]
    pub fn contains_a(&self, a: NodeId) -> bool {
        let idx = usize::from(a);
        self.a_to_b.get(idx).is_some_and(|opt| opt.is_some())
    }

    /// Check if a node from tree B is matched.
    #[inline(always)]
    pub fn contains_b(&self, b: NodeId) -> bool {
        let idx = usize::from(b);
        self.b_to_a.get(idx).is_some_and(|opt| opt.is_some())
    }

    /// Get the match for a node from tree A.
    #[inline(always)]
    pub fn get_b(&self, a: NodeId) -> Option<NodeId> {
        let idx = usize::from(a);
        self.a_to_b.get(idx).copied().flatten()
    }

    /// Get the match for a node from tree B.
    #[inline(always)]
    pub fn get_a(&self, b: NodeId) -> Option<NodeId> {
        let idx = usize::from(b);
        self.b_to_a.get(idx).copied().flatten()
    }

    /// Get all matched pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.pairs.iter().copied()
    }

    /// Get the number of matched pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if there are no matches.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Something that can find correspondences between two trees.
///
/// Implementations are deterministic: the same pair of trees always yields the
/// same matching.
pub trait Matcher: Sync {
    /// Add pairs to an existing matching. Pairs already present are kept, and
    /// nodes that already have a partner are never remapped.
    fn extend_matching(&self, src: &Tree, dst: &Tree, matching: &mut Matching);

    /// Compute a fresh matching between `src` and `dst`.
    fn compute_matching(&self, src: &Tree, dst: &Tree) -> Matching {
        let mut matching = Matching::for_trees(src, dst);
        self.extend_matching(src, dst, &mut matching);
        matching
    }
}

/// Container similarity over already matched descendants.
///
/// With `c` the number of descendants of `a` whose partner is a descendant of
/// `b`, and `da`, `db` the descendant counts:
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Similarity {
    /// `c / (da + db - c)`
    #[default]
    Jaccard,
    /// `2c / (da + db)`
    Dice,
    /// `c / max(da, db)`
    Chawathe,
}

impl Similarity {
    /// Score `a` (in `src`) against `b` (in `dst`). Two leaves score 1.
    pub fn score(self, src: &Tree, dst: &Tree, a: NodeId, b: NodeId, matching: &Matching) -> f64 {
        let da = src.size(a) - 1;
        let db = dst.size(b) - 1;
        if da == 0 && db == 0 {
            return 1.0;
        }

        let common = common_descendants(src, dst, a, b, matching) as f64;
        let (da, db) = (da as f64, db as f64);
        match self {
            Similarity::Jaccard => common / (da + db - common),
            Similarity::Dice => 2.0 * common / (da + db),
            Similarity::Chawathe => common / da.max(db),
        }
    }
}

/// Number of descendants of `a` mapped to a descendant of `b`.
pub fn common_descendants(
    src: &Tree,
    dst: &Tree,
    a: NodeId,
    b: NodeId,
    matching: &Matching,
) -> usize {
    src.descendants(a)
        .filter(|&d| {
            matching
                .get_b(d)
                .is_some_and(|partner| dst.is_descendant(partner, b))
        })
        .count()
}

//! # Eucalypt
//!
//! GumTree-style tree diffing with Chawathe edit script generation.
//!
//! Named after the gum tree the algorithm is named for.
//!
//! ## Algorithm Overview
//!
//! Eucalypt implements a tree diff algorithm based on:
//! - **GumTree** (Falleri et al., ASE 2014) for node matching
//! - **Zhang-Shasha** (1989) and an **RTED**-style path choice for optimal matching
//! - **Chawathe algorithm** (1996) for edit script generation
//!
//! The algorithm works in phases:
//!
//! 1. **Top-down matching**: Match identical subtrees by hash (Merkle-tree style)
//! 2. **Bottom-up matching**: Match remaining containers by the similarity of
//!    their descendants, rescuing small subtrees with an optimal edit distance
//! 3. **Edit script generation**: Produce INSERT, DELETE, UPDATE, MOVE operations
//!
//! Scripts can then be located in the source text ([`annotate`]), trimmed of
//! operations implied by others ([`simplify_edit_script`]) or grouped by the
//! tree structure they touch ([`regroup_edit_script`]).
//!
//! ## Usage
//!
//! ```
//! use eucalypt::{TreeContext, MatchingConfig, diff_trees};
//!
//! let (mut ctx, root) = TreeContext::with_root(0, Some("root"));
//! ctx.add_child(root, 1, Some("leaf")).unwrap();
//! let tree_a = ctx.validate().unwrap();
//!
//! let (mut ctx, root) = TreeContext::with_root(0, Some("root"));
//! ctx.add_child(root, 1, Some("leaf2")).unwrap();
//! let tree_b = ctx.validate().unwrap();
//!
//! let ops = diff_trees(&tree_a, &tree_b, &MatchingConfig::default());
//! assert_eq!(ops.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

pub use indextree;

mod tracing_macros;
#[allow(unused_imports)]
pub(crate) use tracing_macros::{debug, trace};

mod apply;
mod chawathe;
/// Heuristic GumTree matcher
pub mod gumtree;
/// Structural hashing
pub mod hash;
/// Mapping store and matcher trait
pub mod matching;
/// Optimal tree edit distance matchers
pub mod optimal;
mod provenance;
mod regroup;
mod simplify;
/// Tree representation
pub mod tree;

use rayon::prelude::*;

pub use apply::{ApplyError, apply_edit_script};
pub use chawathe::*;
pub use gumtree::{GumTreeMatcher, MatchingConfig};
pub use hash::{HashGenerator, NodeHash, RollingHash};
pub use matching::{Matcher, Matching, Similarity};
pub use optimal::{RtedMatcher, ZhangShashaMatcher, edit_cost};
pub use provenance::{ActionProvenance, annotate};
pub use regroup::{ActionSet, regroup_edit_script};
pub use simplify::simplify_edit_script;
pub use tree::{LineCol, LineColRange, NodeData, NodeKind, Span, Tree, TreeContext, TreeError};

/// Which matcher [`compute_matching`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Top-down hash anchoring followed by bottom-up similarity matching
    #[default]
    GumTree,
    /// Optimal matching with left-path decomposition
    ZhangShasha,
    /// Optimal matching with the cheaper of left and right paths
    Rted,
    /// RTED when both trees have fewer than `exact_below` nodes, GumTree otherwise
    Auto {
        /// Node count from which the heuristic takes over
        exact_below: usize,
    },
}

/// Compute a matching between two trees with the matcher `config` selects.
pub fn compute_matching(tree_a: &Tree, tree_b: &Tree, config: &MatchingConfig) -> Matching {
    let algorithm = match config.algorithm {
        Algorithm::Auto { exact_below }
            if tree_a.node_count() < exact_below && tree_b.node_count() < exact_below =>
        {
            Algorithm::Rted
        }
        Algorithm::Auto { .. } => Algorithm::GumTree,
        other => other,
    };
    debug!(?algorithm, "compute_matching");

    match algorithm {
        Algorithm::ZhangShasha => ZhangShashaMatcher.compute_matching(tree_a, tree_b),
        Algorithm::Rted => RtedMatcher.compute_matching(tree_a, tree_b),
        _ => GumTreeMatcher::new(*config).compute_matching(tree_a, tree_b),
    }
}

/// Compute a diff between two trees.
///
/// This is the main entry point for tree diffing. It:
/// 1. Computes a matching between nodes with the configured matcher
/// 2. Generates an edit script using Chawathe's algorithm
///
/// Replaying the result with [`apply_edit_script`] turns `tree_a` into a tree
/// isomorphic to `tree_b`.
pub fn diff_trees(tree_a: &Tree, tree_b: &Tree, config: &MatchingConfig) -> Vec<EditOp> {
    let (ops, _matching) = diff_trees_with_matching(tree_a, tree_b, config);
    ops
}

/// Like [`diff_trees`], but also returns the node matching.
///
/// This is useful when you need to translate NodeId-based operations
/// into path-based operations, as you need to track which nodes in
/// tree_a correspond to nodes in tree_b.
pub fn diff_trees_with_matching(
    tree_a: &Tree,
    tree_b: &Tree,
    config: &MatchingConfig,
) -> (Vec<EditOp>, Matching) {
    let matching = compute_matching(tree_a, tree_b, config);
    let ops = generate_edit_script(tree_a, tree_b, &matching);
    (ops, matching)
}

/// Diff independent tree pairs in parallel. Results keep the order of `pairs`.
pub fn diff_many(pairs: &[(Tree, Tree)], config: &MatchingConfig) -> Vec<(Vec<EditOp>, Matching)> {
    debug!(pairs = pairs.len(), "diff_many");
    pairs
        .par_iter()
        .map(|(tree_a, tree_b)| diff_trees_with_matching(tree_a, tree_b, config))
        .collect()
}

mod common;

use common::{assert_replays, at, build, leaf, node};
use eucalypt::{
    EditOp, GumTreeMatcher, Matcher, MatchingConfig, Similarity, Tree, diff_trees_with_matching,
};
use facet_testhelpers::test;

/// `root[block[l[l], ...]]`, one small subtree per label.
fn blocks(labels: &[&'static str]) -> Tree {
    let pairs = labels
        .iter()
        .map(|&label| node(2, label, vec![leaf(3, label)]))
        .collect();
    build(&node(0, "root", vec![node(1, "block", pairs)]))
}

fn config() -> MatchingConfig {
    MatchingConfig {
        max_exact_size: 0,
        match_roots: false,
        ..MatchingConfig::default()
    }
}

#[test]
fn container_matches_when_enough_descendants_agree() {
    // Three of five pairs survive: 6 / (10 + 10 - 6) clears the loose
    // threshold used for five leaves.
    let src = blocks(&["a", "b", "c", "d", "e"]);
    let dst = blocks(&["a", "b", "c", "x", "y"]);
    let matching = GumTreeMatcher::new(config()).compute_matching(&src, &dst);

    assert!(matching.has(at(&src, &[0]), at(&dst, &[0])));
    assert!(!matching.contains_a(at(&src, &[0, 3])));
}

#[test]
fn container_stays_unmatched_below_threshold() {
    // One of three pairs survives: 2 / 10 is under both thresholds.
    let src = blocks(&["a", "b", "c"]);
    let dst = blocks(&["a", "y", "x"]);
    let matching = GumTreeMatcher::new(config()).compute_matching(&src, &dst);

    assert!(!matching.contains_a(at(&src, &[0])));
    assert_eq!(matching.len(), 2);
}

#[test]
fn dice_is_more_lenient_than_jaccard() {
    // Three of six pairs survive: Jaccard 6 / 18, Dice 12 / 24.
    let src = blocks(&["a", "b", "c", "d", "e", "f"]);
    let dst = blocks(&["a", "b", "c", "x", "y", "z"]);

    let jaccard = GumTreeMatcher::new(config()).compute_matching(&src, &dst);
    assert!(!jaccard.contains_a(at(&src, &[0])));

    let dice = GumTreeMatcher::new(MatchingConfig {
        similarity: Similarity::Dice,
        ..config()
    })
    .compute_matching(&src, &dst);
    assert!(dice.has(at(&src, &[0]), at(&dst, &[0])));
}

#[test]
fn roots_are_matched_last() {
    let src = blocks(&["a"]);
    let dst = build(&node(0, "other", vec![leaf(9, "z")]));
    let matching = GumTreeMatcher::default().compute_matching(&src, &dst);
    assert!(matching.has(src.root(), dst.root()));
    assert_eq!(matching.len(), 1);
}

fn block() -> common::Shape {
    node(1, "m", vec![leaf(2, "x"), leaf(2, "y")])
}

#[test]
fn destination_root_open_when_root_kinds_differ() {
    // src `z[a[m[x, y], u]]`, dst `a[m[x, y], v]`: the source root can never
    // take the destination root, so `a` may.
    let src = build(&node(
        9,
        "z",
        vec![node(0, "a", vec![block(), leaf(3, "u")])],
    ));
    let dst = build(&node(0, "a", vec![block(), leaf(3, "v")]));
    let (ops, matching) = diff_trees_with_matching(&src, &dst, &MatchingConfig::default());

    assert!(matching.has(at(&src, &[0]), dst.root()));
    assert!(matching.has(at(&src, &[0, 1]), at(&dst, &[1])));
    assert!(!matching.contains_a(src.root()));
    assert_eq!(ops.len(), 3, "{ops:#?}");
    assert!(!ops.iter().any(|op| matches!(op, EditOp::Insert { .. })));
    assert_replays(&src, &dst, &matching, &ops);
}

#[test]
fn destination_root_held_for_source_root_of_same_kind() {
    // Same shape under a root of the destination's kind: `a` stays out of the
    // destination root, which goes to the source root.
    let src = build(&node(
        0,
        "z",
        vec![node(0, "a", vec![block(), leaf(3, "u")])],
    ));
    let dst = build(&node(0, "a", vec![block(), leaf(3, "v")]));
    let (ops, matching) = diff_trees_with_matching(&src, &dst, &MatchingConfig::default());

    assert!(matching.has(src.root(), dst.root()));
    assert!(!matching.contains_a(at(&src, &[0])));
    assert_replays(&src, &dst, &matching, &ops);
}

#[test]
fn last_chance_pairs_leaves_around_anchored_subtrees() {
    // src `c[m[x, y], u]`, dst `c[v, m[x, y]]`: with the `m` blocks anchored,
    // `u` and `v` are the only free nodes left and get paired.
    let src = build(&node(0, "c", vec![block(), leaf(3, "u")]));
    let dst = build(&node(0, "c", vec![leaf(3, "v"), block()]));
    let (ops, matching) = diff_trees_with_matching(&src, &dst, &MatchingConfig::default());

    assert!(matching.has(at(&src, &[1]), at(&dst, &[0])));
    let updates = ops
        .iter()
        .filter(|op| matches!(op, EditOp::Update { label, .. } if label.as_deref() == Some("v")))
        .count();
    assert_eq!(updates, 1, "{ops:#?}");
    assert!(
        !ops.iter()
            .any(|op| matches!(op, EditOp::Insert { .. } | EditOp::Delete { .. })),
        "{ops:#?}"
    );
    assert_replays(&src, &dst, &matching, &ops);
}

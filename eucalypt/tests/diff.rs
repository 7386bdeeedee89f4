mod common;

use common::{assert_replays, at, build, class_with_statement, leaf, node, slide, wrapped};
use eucalypt::indextree::NodeId;
use eucalypt::{
    ActionSet, Algorithm, EditOp, MatchingConfig, Tree, diff_many, diff_trees_with_matching,
    regroup_edit_script, simplify_edit_script,
};
use facet_testhelpers::test;

const ALGORITHMS: [Algorithm; 4] = [
    Algorithm::GumTree,
    Algorithm::ZhangShasha,
    Algorithm::Rted,
    Algorithm::Auto { exact_below: 8 },
];

fn config(algorithm: Algorithm) -> MatchingConfig {
    MatchingConfig {
        algorithm,
        ..MatchingConfig::default()
    }
}

fn count(ops: &[EditOp], pred: impl Fn(&EditOp) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

/// `r[p[m[x, y, z]], q]` and `r[p, q[m[x, y, z]]]`, `p` and `q` of different kinds.
fn moved_subtree() -> (Tree, Tree) {
    let m = || node(3, "m", vec![leaf(4, "x"), leaf(4, "y"), leaf(4, "z")]);
    let src = node(0, "r", vec![node(1, "p", vec![m()]), leaf(2, "q")]);
    let dst = node(0, "r", vec![leaf(1, "p"), node(2, "q", vec![m()])]);
    (build(&src), build(&dst))
}

/// `r[a[x1, x2], b[y1, y2]]`, children of the root optionally swapped.
fn two_blocks(swapped: bool) -> Tree {
    let a = node(1, "a", vec![leaf(2, "x1"), leaf(2, "x2")]);
    let b = node(1, "b", vec![leaf(2, "y1"), leaf(2, "y2")]);
    let children = if swapped { vec![b, a] } else { vec![a, b] };
    build(&node(0, "r", children))
}

fn scenarios() -> Vec<(&'static str, Tree, Tree)> {
    let (wrapped_src, wrapped_dst) = wrapped();
    let (slide_src, slide_dst) = slide();
    let (moved_src, moved_dst) = moved_subtree();
    vec![
        ("wrapped", wrapped_src, wrapped_dst),
        ("slide", slide_src, slide_dst),
        ("moved subtree", moved_src, moved_dst),
        ("swapped blocks", two_blocks(false), two_blocks(true)),
        ("renamed statement", class_with_statement("y"), class_with_statement("w")),
        ("unrelated roots", build(&leaf(0, "a")), build(&node(7, "b", vec![leaf(8, "c")]))),
    ]
}

#[test]
fn identical_trees_produce_no_operations() {
    for algorithm in ALGORITHMS {
        let (src, _) = slide();
        let (dst, _) = slide();
        let (ops, matching) = diff_trees_with_matching(&src, &dst, &config(algorithm));
        assert!(ops.is_empty(), "{algorithm:?}: {ops:?}");
        assert_eq!(matching.len(), src.node_count(), "{algorithm:?}");
        for a in src.pre_order() {
            assert!(matching.contains_a(a), "{algorithm:?}: {a:?} unmatched");
        }
    }
}

#[test]
fn every_script_replays_to_the_destination() {
    for algorithm in ALGORITHMS {
        for (name, src, dst) in scenarios() {
            let (ops, matching) = diff_trees_with_matching(&src, &dst, &config(algorithm));
            tracing::debug!(name, ?algorithm, ops = ops.len(), "replaying");
            assert_replays(&src, &dst, &matching, &ops);
        }
    }
}

#[test]
fn renamed_statement_is_a_single_update() {
    let src = class_with_statement("y");
    let dst = class_with_statement("w");
    for algorithm in ALGORITHMS {
        let (ops, _) = diff_trees_with_matching(&src, &dst, &config(algorithm));
        assert_eq!(
            ops,
            vec![EditOp::Update {
                node_a: at(&src, &[0, 1, 1]),
                node_b: at(&dst, &[0, 1, 1]),
                label: Some("w".into()),
            }],
            "{algorithm:?}"
        );
    }
}

#[test]
fn swapped_blocks_move_once() {
    let src = two_blocks(false);
    let dst = two_blocks(true);
    let (ops, matching) = diff_trees_with_matching(&src, &dst, &MatchingConfig::default());

    assert_eq!(matching.len(), src.node_count());
    assert_eq!(
        ops,
        vec![EditOp::Move {
            node_a: at(&src, &[0]),
            node_b: at(&dst, &[1]),
            new_parent_b: Some(dst.root()),
            new_position: 1,
        }]
    );
}

#[test]
fn anchored_subtree_moves_to_its_new_parent() {
    let (src, dst) = moved_subtree();
    let (ops, matching) = diff_trees_with_matching(&src, &dst, &MatchingConfig::default());

    let m_a = at(&src, &[0, 0]);
    let m_b = at(&dst, &[1, 0]);
    assert!(matching.has(m_a, m_b));
    assert!(ops.contains(&EditOp::Move {
        node_a: m_a,
        node_b: m_b,
        new_parent_b: Some(at(&dst, &[1])),
        new_position: 0,
    }));
    // With `m` anchored, `p` and `q` are the only free nodes under the roots
    // and pair up, so nothing is rebuilt.
    assert!(matching.has(at(&src, &[0]), at(&dst, &[0])));
    assert!(matching.has(at(&src, &[1]), at(&dst, &[1])));
    assert_eq!(ops.len(), 1, "{ops:#?}");
}

#[test]
fn inserted_subtree_simplifies_to_one_insert() {
    let src = build(&node(0, "r", vec![leaf(0, "a")]));
    let dst = build(&node(
        0,
        "r",
        vec![
            leaf(0, "a"),
            node(0, "s", vec![node(0, "t", vec![leaf(0, "u")]), leaf(0, "v")]),
        ],
    ));
    let (ops, _) = diff_trees_with_matching(&src, &dst, &MatchingConfig::default());
    assert_eq!(count(&ops, |op| matches!(op, EditOp::Insert { .. })), 4);
    assert_eq!(ops.len(), 4);

    let simplified = simplify_edit_script(ops, &src, &dst);
    assert_eq!(simplified.len(), 1);
    assert!(
        matches!(&simplified[0], EditOp::Insert { node_b, .. } if *node_b == at(&dst, &[1]))
    );
}

#[test]
fn auto_switches_on_tree_size() {
    let (src, dst) = wrapped();
    let exact = config(Algorithm::Auto {
        exact_below: usize::MAX,
    });
    let heuristic = config(Algorithm::Auto { exact_below: 2 });

    let (_, exact_matching) = diff_trees_with_matching(&src, &dst, &exact);
    let (_, rted_matching) = diff_trees_with_matching(&src, &dst, &config(Algorithm::Rted));
    assert_eq!(
        exact_matching.pairs().collect::<Vec<_>>(),
        rted_matching.pairs().collect::<Vec<_>>()
    );

    let (_, heuristic_matching) = diff_trees_with_matching(&src, &dst, &heuristic);
    let (_, gumtree_matching) = diff_trees_with_matching(&src, &dst, &config(Algorithm::GumTree));
    assert_eq!(
        heuristic_matching.pairs().collect::<Vec<_>>(),
        gumtree_matching.pairs().collect::<Vec<_>>()
    );
}

#[test]
fn diff_many_matches_sequential_diffs() {
    let pairs: Vec<(Tree, Tree)> = scenarios()
        .into_iter()
        .map(|(_, src, dst)| (src, dst))
        .collect();
    let config = MatchingConfig::default();

    let results = diff_many(&pairs, &config);
    assert_eq!(results.len(), pairs.len());
    for ((src, dst), (ops, matching)) in pairs.iter().zip(&results) {
        let (expected, _) = diff_trees_with_matching(src, dst, &config);
        assert_eq!(ops, &expected);
        assert_replays(src, dst, matching, ops);
    }
}

fn script_indices(sets: &[ActionSet], out: &mut Vec<usize>) {
    for set in sets {
        out.push(set.index);
        script_indices(&set.sub_actions, out);
    }
}

#[test]
fn regrouping_keeps_every_operation_once() {
    for algorithm in ALGORITHMS {
        for (name, src, dst) in scenarios() {
            let (ops, _) = diff_trees_with_matching(&src, &dst, &config(algorithm));
            let sets = regroup_edit_script(&ops, &src, &dst);

            let mut indices = Vec::new();
            script_indices(&sets, &mut indices);
            indices.sort_unstable();
            assert_eq!(
                indices,
                (0..ops.len()).collect::<Vec<_>>(),
                "{name} {algorithm:?}"
            );
            let total: usize = sets.iter().map(ActionSet::op_count).sum();
            assert_eq!(total, ops.len(), "{name} {algorithm:?}");
        }
    }
}

/// Source and destination node an operation acts on.
fn acted_on(op: &EditOp) -> (Option<NodeId>, Option<NodeId>) {
    match *op {
        EditOp::Insert { node_b, .. } => (None, Some(node_b)),
        EditOp::Delete { node_a } => (Some(node_a), None),
        EditOp::Update { node_a, node_b, .. } | EditOp::Move { node_a, node_b, .. } => {
            (Some(node_a), Some(node_b))
        }
    }
}

fn assert_nested_on_parent(set: &ActionSet, src: &Tree) {
    let (on_a, on_b) = acted_on(&set.op);
    for sub in &set.sub_actions {
        match sub.op {
            EditOp::Insert { parent_b, .. } => assert_eq!(parent_b, on_b),
            EditOp::Move { new_parent_b, .. } => assert_eq!(new_parent_b, on_b),
            EditOp::Delete { node_a } | EditOp::Update { node_a, .. } => {
                assert_eq!(src.parent(node_a), on_a)
            }
        }
        if !matches!(sub.op, EditOp::Move { .. }) {
            assert!(!matches!(set.op, EditOp::Move { .. }), "{set:#?}");
        }
        assert_nested_on_parent(sub, src);
    }
}

#[test]
fn regrouped_operations_sit_under_their_parent_node() {
    for algorithm in ALGORITHMS {
        for (_, src, dst) in scenarios() {
            let (ops, _) = diff_trees_with_matching(&src, &dst, &config(algorithm));
            for set in regroup_edit_script(&ops, &src, &dst) {
                assert_nested_on_parent(&set, &src);
            }
        }
    }

    // The new `a` is inserted under the relabeled root and takes the old
    // children with it.
    let (src, dst) = wrapped();
    let (ops, _) = diff_trees_with_matching(&src, &dst, &config(Algorithm::GumTree));
    let sets = regroup_edit_script(&ops, &src, &dst);
    assert!(sets.iter().any(|set| !set.sub_actions.is_empty()), "{sets:#?}");
}

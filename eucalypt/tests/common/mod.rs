#![allow(dead_code)]

use eucalypt::indextree::NodeId;
use eucalypt::{EditOp, Matching, Tree, TreeContext, apply_edit_script};

/// Tree literal used by the fixtures.
pub struct Shape {
    kind: u32,
    label: &'static str,
    children: Vec<Shape>,
}

pub fn node(kind: u32, label: &'static str, children: Vec<Shape>) -> Shape {
    Shape {
        kind,
        label,
        children,
    }
}

pub fn leaf(kind: u32, label: &'static str) -> Shape {
    node(kind, label, Vec::new())
}

pub fn build(shape: &Shape) -> Tree {
    let (mut ctx, root) = TreeContext::with_root(shape.kind, Some(shape.label));
    let mut stack = vec![(root, shape)];
    while let Some((id, shape)) = stack.pop() {
        for child in &shape.children {
            let child_id = ctx.add_child(id, child.kind, Some(child.label)).unwrap();
            stack.push((child_id, child));
        }
    }
    ctx.validate().unwrap()
}

/// Node reached by following child indices from the root.
pub fn at(tree: &Tree, path: &[usize]) -> NodeId {
    path.iter().fold(tree.root(), |id, &i| {
        tree.children(id)
            .nth(i)
            .unwrap_or_else(|| panic!("no child {i} on path {path:?}"))
    })
}

/// Replay `ops` on `src` and check the result has the shape of `dst`.
pub fn assert_replays(src: &Tree, dst: &Tree, matching: &Matching, ops: &[EditOp]) {
    let result = apply_edit_script(src, dst, matching, ops)
        .unwrap_or_else(|err| panic!("replay failed: {err}\nops: {ops:#?}"));
    assert!(
        result.is_isomorphic(result.root(), dst, dst.root()),
        "replay produced\n  {result}\nexpected\n  {dst}\nops: {ops:#?}"
    );
}

/// src `a[b, c[d, e, f]]`, dst `z[a[b, c[d, y, f, r]]]` with `y` and `r` of
/// other kinds.
pub fn wrapped() -> (Tree, Tree) {
    let src = node(
        0,
        "a",
        vec![
            leaf(0, "b"),
            node(0, "c", vec![leaf(0, "d"), leaf(0, "e"), leaf(0, "f")]),
        ],
    );
    let dst = node(
        0,
        "z",
        vec![node(
            0,
            "a",
            vec![
                leaf(0, "b"),
                node(
                    0,
                    "c",
                    vec![leaf(0, "d"), leaf(1, "y"), leaf(0, "f"), leaf(2, "r")],
                ),
            ],
        )],
    );
    (build(&src), build(&dst))
}

/// src `6[5[2[1], 3, 4]]`, dst `6[2[1], 4[3], 5]`.
pub fn slide() -> (Tree, Tree) {
    let src = node(
        0,
        "6",
        vec![node(
            0,
            "5",
            vec![node(0, "2", vec![leaf(0, "1")]), leaf(0, "3"), leaf(0, "4")],
        )],
    );
    let dst = node(
        0,
        "6",
        vec![
            node(0, "2", vec![leaf(0, "1")]),
            node(0, "4", vec![leaf(0, "3")]),
            leaf(0, "5"),
        ],
    );
    (build(&src), build(&dst))
}

/// `class[method[name, body[x, y]], field]` with the last statement relabeled.
pub fn class_with_statement(last: &'static str) -> Tree {
    build(&node(
        0,
        "Foo",
        vec![
            node(
                1,
                "bar",
                vec![
                    leaf(2, "bar"),
                    node(3, "", vec![leaf(4, "x"), leaf(4, last)]),
                ],
            ),
            leaf(5, "z"),
        ],
    ))
}

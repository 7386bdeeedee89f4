//! Source position annotation of edit operations.
//!
//! Positions are read from the trees the operations refer to; nodes built
//! without line/column or byte range information simply yield `None`.

use indextree::NodeId;

use crate::chawathe::EditOp;
use crate::tree::{LineCol, LineColRange, NodeData, Span, Tree};

/// Where an operation happens in the source and destination text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionProvenance {
    /// Registered name of the node's kind
    pub type_label: Option<String>,
    /// Range in the source text, or the insertion point for inserts
    pub before: Option<LineColRange>,
    /// Range in the destination text
    pub after: Option<LineColRange>,
    /// Byte range in the source text, or an empty span at the insertion
    /// point for inserts
    pub before_span: Option<Span>,
    /// Byte range in the destination text
    pub after_span: Option<Span>,
}

/// Locate `op` in the texts of `src` and `dst`.
pub fn annotate(op: &EditOp, src: &Tree, dst: &Tree) -> ActionProvenance {
    let type_label = |tree: &Tree, node: NodeId| tree.type_label(tree.kind(node)).map(str::to_owned);

    match *op {
        EditOp::Insert { node_b, .. } => {
            let at = dst.get(node_b);
            ActionProvenance {
                type_label: type_label(dst, node_b),
                before: insertion_point(
                    dst,
                    node_b,
                    LineCol::ORIGIN,
                    |data| data.line_cols.map(|r| r.begin),
                    |data| data.line_cols.map(|r| r.end),
                )
                .map(LineColRange::point),
                after: at.line_cols,
                before_span: insertion_point(
                    dst,
                    node_b,
                    0,
                    |data| data.span.map(|s| s.offset),
                    |data| data.span.map(|s| s.end()),
                )
                .map(|offset| Span { offset, length: 0 }),
                after_span: at.span,
            }
        }
        EditOp::Delete { node_a } => ActionProvenance {
            type_label: type_label(src, node_a),
            before: src.get(node_a).line_cols,
            before_span: src.get(node_a).span,
            ..ActionProvenance::default()
        },
        EditOp::Update { node_a, node_b, .. } | EditOp::Move { node_a, node_b, .. } => {
            let (a, b) = (src.get(node_a), dst.get(node_b));
            ActionProvenance {
                type_label: type_label(src, node_a),
                before: a.line_cols,
                after: b.line_cols,
                before_span: a.span,
                after_span: b.span,
            }
        }
    }
}

/// Where `node` starts to exist in `dst`: `above_root` for the root, the
/// parent's `begin` for a first child, the previous sibling's `end` otherwise.
fn insertion_point<T>(
    dst: &Tree,
    node: NodeId,
    above_root: T,
    begin: impl Fn(&NodeData) -> Option<T>,
    end: impl Fn(&NodeData) -> Option<T>,
) -> Option<T> {
    let Some(parent) = dst.parent(node) else {
        return Some(above_root);
    };

    match dst.position(node) {
        0 => begin(dst.get(parent)),
        i => {
            let previous = dst.children(parent).nth(i - 1)?;
            end(dst.get(previous))
        }
    }
}

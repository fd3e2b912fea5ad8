//! Deepest-valid-position rules.
//!
//! Several boundary points render as the same caret. The rules below pick one
//! canonical representative; they are applied repeatedly until nothing moves.

use crate::schema::{self, Schema, is_inline_formatting_tag, is_void_tag};
use crate::tree::{Document, NodeId};

use super::types::Position;

/// Upper bound on rule applications; each rule moves strictly down or out of a
/// node, so real trees settle long before this.
const MAX_ITERATIONS: usize = 64;

/// Clamp the offset to the node size.
pub fn clamp(doc: &Document, pos: Position) -> Position {
    Position::new(pos.node, pos.offset.min(doc.size(pos.node)))
}

/// Map a position to its canonical equivalent.
pub fn normalize_position(doc: &Document, schema: &Schema, pos: Position) -> Position {
    let mut current = clamp(doc, pos);
    for _ in 0..MAX_ITERATIONS {
        let next = clamp(doc, step(doc, schema, current));
        if next == current {
            return current;
        }
        current = next;
    }
    tracing::warn!(
        target: "weaver::selection",
        node = %pos.node,
        offset = pos.offset,
        "selection normalization did not settle"
    );
    current
}

fn step(doc: &Document, schema: &Schema, pos: Position) -> Position {
    let root = doc.root();

    // Out of non-editable regions, towards the side the offset points to.
    if let Some(boundary) = schema::non_editable_boundary(doc, pos.node) {
        if let Some(before) = before_node(doc, boundary) {
            return if pos.offset == 0 {
                before
            } else {
                Position::new(before.node, before.offset + 1)
            };
        }
    }

    // Voids cannot hold a caret.
    if doc.tag(pos.node).is_some_and(is_void_tag) {
        if let Some(before) = before_node(doc, pos.node) {
            return before;
        }
    }

    // Start of a node right after a placeholder: caret sits after the placeholder.
    if pos.offset == 0 && pos.node != root {
        let after_void = doc
            .previous_sibling(pos.node)
            .and_then(|prev| doc.tag(prev))
            .is_some_and(is_void_tag);
        if after_void {
            if let Some(before) = before_node(doc, pos.node) {
                return before;
            }
        }
    }

    // Descend into text and inline formatting.
    if doc.is_element(pos.node) {
        if pos.offset > 0 {
            if let Some(left) = doc.child(pos.node, pos.offset - 1) {
                if can_descend(doc, schema, left) {
                    return Position::new(left, doc.size(left));
                }
            }
        } else if let Some(right) = doc.child(pos.node, 0) {
            if can_descend(doc, schema, right) {
                return Position::new(right, 0);
            }
        }
    }

    pos
}

fn can_descend(doc: &Document, schema: &Schema, node: NodeId) -> bool {
    if doc.is_text(node) {
        return true;
    }
    doc.tag(node)
        .is_some_and(|tag| is_inline_formatting_tag(tag) && !schema.is_block_tag(tag))
        && schema::is_editable(doc, node)
}

/// The boundary point just before `node` in its parent.
fn before_node(doc: &Document, node: NodeId) -> Option<Position> {
    let parent = doc.parent(node)?;
    let index = doc.index_of(node)?;
    Some(Position::new(parent, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::parse_doc;

    fn find(doc: &Document, text: &str) -> NodeId {
        doc.descendants(doc.root())
            .into_iter()
            .find(|&n| doc.text(n) == Some(text))
            .unwrap()
    }

    #[test]
    fn test_descends_left_into_formatting() {
        let (doc, _) = parse_doc("<p>a<b>bold</b></p>");
        let schema = Schema::default();
        let p = doc.first_child(doc.root()).unwrap();
        let bold = find(&doc, "bold");
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(p, 2)),
            Position::new(bold, 4)
        );
    }

    #[test]
    fn test_descends_right_only_at_start() {
        let (doc, _) = parse_doc("<p><i>x</i>y</p>");
        let schema = Schema::default();
        let p = doc.first_child(doc.root()).unwrap();
        let x = find(&doc, "x");
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(p, 0)),
            Position::new(x, 0)
        );
        // A left neighbour wins over the right one.
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(p, 1)),
            Position::new(x, 1)
        );
    }

    #[test]
    fn test_after_placeholder() {
        let (doc, _) = parse_doc("<p>a<br>b</p>");
        let schema = Schema::default();
        let p = doc.first_child(doc.root()).unwrap();
        let b = find(&doc, "b");
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(b, 0)),
            Position::new(p, 2)
        );
        let br = doc.child(p, 1).unwrap();
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(br, 0)),
            Position::new(find(&doc, "a"), 1)
        );
    }

    #[test]
    fn test_leaves_non_editable() {
        let (doc, _) = parse_doc(
            "<p>a</p><div contenteditable=\"false\"><p>locked</p></div><p>c</p>",
        );
        let schema = Schema::default();
        let locked = find(&doc, "locked");
        let root = doc.root();
        // Blocks are never descended into, so the caret stays between blocks.
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(locked, 0)),
            Position::new(root, 1)
        );
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(locked, 3)),
            Position::new(root, 2)
        );
    }

    #[test]
    fn test_clamps_offsets() {
        let (doc, _) = parse_doc("<p>abc</p>");
        let schema = Schema::default();
        let t = find(&doc, "abc");
        assert_eq!(
            normalize_position(&doc, &schema, Position::new(t, 99)),
            Position::new(t, 3)
        );
    }

    #[test]
    fn test_normalization_reaches_fixed_point() {
        let (doc, _) = parse_doc(
            "<p><b><i>x</i></b><br>y</p><div data-oe-protected=\"true\"><p>z</p></div><p><img></p>",
        );
        let schema = Schema::default();
        for node in doc.descendants(doc.root()) {
            for offset in 0..=doc.size(node) {
                let once = normalize_position(&doc, &schema, Position::new(node, offset));
                let twice = normalize_position(&doc, &schema, once);
                assert_eq!(once, twice, "not a fixed point from {node}:{offset}");
            }
        }
    }
}

//! Structural edits behind the built-in commands.
//!
//! Every function works on a caret (or range) that already went through
//! selection normalization, so boundaries never sit inside void or
//! non-editable nodes. The caret is parked in the document's live selection
//! while the tree changes and read back at the end.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{EditorError, Result};
use crate::schema::{self, Schema, is_void_tag};
use crate::selection::{Position, Selection};
use crate::tree::{Document, NodeId};

const LINE_BREAK_TAG: &str = "br";

fn place_caret(doc: &mut Document, caret: Position) -> Position {
    doc.set_live_selection(Some(Selection::collapsed(caret)));
    caret
}

fn live_caret(doc: &Document, fallback: Position) -> Position {
    doc.live_selection().map_or(fallback, |s| s.focus)
}

fn block_of(doc: &Document, schema: &Schema, node: NodeId) -> NodeId {
    schema.closest_block(doc, node).unwrap_or(doc.root())
}

fn is_atomic(doc: &Document, node: NodeId) -> bool {
    doc.tag(node).is_some_and(is_void_tag) || !schema::is_editable(doc, node)
}

fn detached(node: NodeId) -> EditorError {
    EditorError::InvalidHierarchy(format!("{node} is not attached"))
}

/// What sits right next to a caret inside its block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Adjacent {
    /// A text node, void, non-editable subtree or empty inline element.
    Leaf(NodeId),
    /// A nested block.
    Block(NodeId),
    /// The caret is at the edge of its block.
    Edge,
}

fn adjacent(
    doc: &Document,
    schema: &Schema,
    block: NodeId,
    caret: Position,
    backward: bool,
) -> Adjacent {
    let mut sibling = if doc.is_element(caret.node) {
        if backward {
            caret
                .offset
                .checked_sub(1)
                .and_then(|i| doc.child(caret.node, i))
        } else {
            doc.child(caret.node, caret.offset)
        }
    } else {
        None
    };

    let mut current = caret.node;
    while sibling.is_none() {
        if current == block {
            return Adjacent::Edge;
        }
        sibling = if backward {
            doc.previous_sibling(current)
        } else {
            doc.next_sibling(current)
        };
        match doc.parent(current) {
            Some(parent) => current = parent,
            None => return Adjacent::Edge,
        }
    }

    let Some(mut node) = sibling else {
        return Adjacent::Edge;
    };
    loop {
        if schema.is_block(doc, node) {
            return Adjacent::Block(node);
        }
        if !doc.is_element(node) || is_atomic(doc, node) {
            return Adjacent::Leaf(node);
        }
        let next = if backward {
            doc.last_child(node)
        } else {
            doc.first_child(node)
        };
        match next {
            Some(child) => node = child,
            None => return Adjacent::Leaf(node),
        }
    }
}

/// Descend through the first (or last) editable child blocks of `node`.
fn innermost_block(doc: &Document, schema: &Schema, node: NodeId, last: bool) -> NodeId {
    let mut node = node;
    loop {
        let child = if last {
            doc.last_child(node)
        } else {
            doc.first_child(node)
        };
        match child {
            Some(c) if schema.is_block(doc, c) && !is_atomic(doc, c) => node = c,
            _ => return node,
        }
    }
}

/// Remove `node` and then every ancestor left empty, stopping below the root.
fn remove_empty_chain(doc: &mut Document, node: NodeId) -> Result<()> {
    let mut current = node;
    while current != doc.root() && doc.is_element(current) && doc.children(current).is_empty() {
        let Some(parent) = doc.parent(current) else {
            break;
        };
        doc.remove(current)?;
        current = parent;
    }
    Ok(())
}

/// A lone `<br>` placeholder is dropped before content moves in.
fn drop_placeholder(doc: &mut Document, block: NodeId) -> Result<()> {
    if let [only] = doc.children(block) {
        let only = *only;
        if doc.is_tag(only, LINE_BREAK_TAG) {
            doc.remove(only)?;
        }
    }
    Ok(())
}

/// Turn a caret into an element boundary, splitting a text node when needed.
fn split_point(doc: &mut Document, caret: Position) -> Result<(NodeId, usize)> {
    if !doc.is_text(caret.node) {
        return Ok((caret.node, caret.offset));
    }
    let parent = doc.parent(caret.node).ok_or_else(|| detached(caret.node))?;
    let index = doc
        .index_of(caret.node)
        .ok_or(EditorError::NodeNotFound(caret.node))?;
    let len = doc.size(caret.node);
    if caret.offset == 0 {
        Ok((parent, index))
    } else if caret.offset >= len {
        Ok((parent, index + 1))
    } else {
        doc.split_text(caret.node, caret.offset)?;
        Ok((parent, index + 1))
    }
}

// === Insertion ===

/// Insert `text` at the caret, growing a neighbouring text node when possible.
pub fn insert_text(doc: &mut Document, caret: Position, text: &str) -> Result<Position> {
    let len = text.chars().count();
    if len == 0 {
        return Ok(caret);
    }
    if doc.is_text(caret.node) {
        doc.insert_text(caret.node, caret.offset, text)?;
        return Ok(place_caret(doc, Position::new(caret.node, caret.offset + len)));
    }

    let left = caret
        .offset
        .checked_sub(1)
        .and_then(|i| doc.child(caret.node, i))
        .filter(|&n| doc.is_text(n));
    if let Some(left) = left {
        let end = doc.size(left);
        doc.insert_text(left, end, text)?;
        return Ok(place_caret(doc, Position::new(left, end + len)));
    }
    let right = doc.child(caret.node, caret.offset);
    if let Some(right) = right.filter(|&n| doc.is_text(n)) {
        doc.insert_text(right, 0, text)?;
        return Ok(place_caret(doc, Position::new(right, len)));
    }

    let node = doc.create_text(text);
    doc.insert_before(caret.node, node, right)?;
    Ok(place_caret(doc, Position::new(node, len)))
}

/// Wrap the inline run around a caret at the root into the default block.
///
/// Returns the caret's block and the caret, remapped if it pointed at the root.
fn ensure_block(
    doc: &mut Document,
    schema: &Schema,
    caret: Position,
) -> Result<(NodeId, Position)> {
    let block = block_of(doc, schema, caret.node);
    let root = doc.root();
    if block != root {
        return Ok((block, caret));
    }

    let children = doc.children(root).to_vec();
    let (index, end) = if caret.node == root {
        (caret.offset, caret.offset)
    } else {
        let top = doc
            .child_containing(root, caret.node)
            .ok_or_else(|| detached(caret.node))?;
        let index = doc.index_of(top).ok_or(EditorError::NodeNotFound(top))?;
        (index, index + 1)
    };
    let mut first = index;
    while first > 0 && schema.is_inline(doc, children[first - 1]) {
        first -= 1;
    }
    let mut last = end;
    while last < children.len() && schema.is_inline(doc, children[last]) {
        last += 1;
    }

    let wrapper = doc.create_element(schema.default_block());
    doc.insert_before(root, wrapper, children.get(first).copied())?;
    for &child in &children[first..last] {
        doc.append_child(wrapper, child)?;
    }
    let caret = if caret.node == root {
        Position::new(wrapper, index - first)
    } else {
        caret
    };
    Ok((wrapper, place_caret(doc, caret)))
}

/// Split the caret's block in two, cloning the inline ancestors on the way.
///
/// Returns the caret at the start of the new block.
pub fn insert_paragraph_break(
    doc: &mut Document,
    schema: &Schema,
    caret: Position,
) -> Result<Position> {
    place_caret(doc, caret);
    let (block, caret) = ensure_block(doc, schema, caret)?;
    let (mut container, mut index) = split_point(doc, caret)?;

    loop {
        let clone = doc.shallow_clone(container)?;
        // Attach first so the moves below are recorded into the clone.
        doc.insert_after(container, clone)?;
        for child in doc.children(container)[index..].to_vec() {
            doc.append_child(clone, child)?;
        }
        if container == block {
            tracing::trace!(target: "weaver::dispatch", block = %block, new_block = %clone, "split block");
            return Ok(place_caret(doc, Position::new(clone, 0)));
        }
        let parent = doc.parent(container).ok_or_else(|| detached(container))?;
        index = doc
            .index_of(container)
            .ok_or(EditorError::NodeNotFound(container))?
            + 1;
        container = parent;
    }
}

/// Insert a `<br>` at the caret. A break ending its block gets a second one so
/// the new line renders.
pub fn insert_line_break(
    doc: &mut Document,
    schema: &Schema,
    caret: Position,
) -> Result<Position> {
    place_caret(doc, caret);
    let (parent, index) = split_point(doc, caret)?;
    let br = doc.create_element(LINE_BREAK_TAG);
    let next = doc.child(parent, index);
    doc.insert_before(parent, br, next)?;

    let after = Position::new(parent, index + 1);
    let block = block_of(doc, schema, parent);
    if adjacent(doc, schema, block, after, false) == Adjacent::Edge {
        let filler = doc.create_element(LINE_BREAK_TAG);
        doc.insert_before(parent, filler, next)?;
    }
    Ok(place_caret(doc, after))
}

// === Deletion ===

/// Delete the selected content, collapsing onto its start.
pub fn delete_selection(
    doc: &mut Document,
    schema: &Schema,
    selection: Selection,
) -> Result<Position> {
    if selection.is_collapsed() {
        return Ok(place_caret(doc, selection.focus));
    }
    delete_range(doc, schema, selection.start(), selection.end())
}

/// Delete everything between two boundaries. When they sit in different
/// blocks, the end block's remaining content joins the start block.
pub fn delete_range(
    doc: &mut Document,
    schema: &Schema,
    start: Position,
    end: Position,
) -> Result<Position> {
    place_caret(doc, start);
    if doc.compare_positions(start, end) != Ordering::Less {
        return Ok(start);
    }
    if start.node == end.node && doc.is_text(start.node) {
        doc.delete_text(start.node, start.offset..end.offset)?;
        return Ok(live_caret(doc, start));
    }

    let start_block = block_of(doc, schema, start.node);
    let end_block = block_of(doc, schema, end.node);
    let contained = contained_nodes(doc, start, end);

    if doc.is_text(start.node) {
        let len = doc.size(start.node);
        doc.delete_text(start.node, start.offset..len)?;
    }
    if doc.is_text(end.node) {
        doc.delete_text(end.node, 0..end.offset)?;
    }
    for node in contained {
        doc.remove(node)?;
    }

    if start_block != end_block && !doc.is_inclusive_ancestor(end_block, start_block) {
        let before = if start.node == start_block {
            doc.child(start_block, start.offset)
        } else {
            doc.child_containing(start_block, start.node)
                .and_then(|c| doc.next_sibling(c))
        };
        for child in doc.children(end_block).to_vec() {
            doc.insert_before(start_block, child, before)?;
        }
        remove_empty_chain(doc, end_block)?;
    }
    Ok(live_caret(doc, start))
}

/// Top-most nodes lying entirely between `start` and `end`.
fn contained_nodes(doc: &Document, start: Position, end: Position) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut inside: HashSet<NodeId> = HashSet::new();
    for node in doc.descendants(doc.root()) {
        let (Some(parent), Some(index)) = (doc.parent(node), doc.index_of(node)) else {
            continue;
        };
        if inside.contains(&parent) {
            inside.insert(node);
            continue;
        }
        let before = Position::new(parent, index);
        let after = Position::new(parent, index + 1);
        if doc.compare_positions(start, before).is_le() && doc.compare_positions(after, end).is_le() {
            inside.insert(node);
            out.push(node);
        }
    }
    out
}

/// Delete one character (or atomic node) before the caret, joining with the
/// previous block at a block start.
pub fn delete_backward(doc: &mut Document, schema: &Schema, caret: Position) -> Result<Position> {
    place_caret(doc, caret);
    if doc.is_text(caret.node) && caret.offset > 0 {
        doc.delete_text(caret.node, caret.offset - 1..caret.offset)?;
        return Ok(live_caret(doc, caret));
    }

    let block = block_of(doc, schema, caret.node);
    match adjacent(doc, schema, block, caret, true) {
        Adjacent::Leaf(leaf) => {
            match doc.text(leaf).map(|t| t.chars().count()) {
                Some(len) if len > 0 => {
                    doc.delete_text(leaf, len - 1..len)?;
                    return Ok(place_caret(doc, Position::new(leaf, len - 1)));
                }
                _ => doc.remove(leaf)?,
            }
            Ok(live_caret(doc, caret))
        }
        Adjacent::Block(prev) => step_into_block(doc, schema, prev, true, caret),
        Adjacent::Edge => join_backward(doc, schema, block, caret),
    }
}

/// Delete one character (or atomic node) after the caret, pulling the next
/// block in at a block end.
pub fn delete_forward(doc: &mut Document, schema: &Schema, caret: Position) -> Result<Position> {
    place_caret(doc, caret);
    if doc.is_text(caret.node) && caret.offset < doc.size(caret.node) {
        doc.delete_text(caret.node, caret.offset..caret.offset + 1)?;
        return Ok(live_caret(doc, caret));
    }

    let block = block_of(doc, schema, caret.node);
    match adjacent(doc, schema, block, caret, false) {
        Adjacent::Leaf(leaf) => {
            match doc.text(leaf).map(str::is_empty) {
                Some(false) => doc.delete_text(leaf, 0..1)?,
                _ => doc.remove(leaf)?,
            }
            Ok(live_caret(doc, caret))
        }
        Adjacent::Block(next) => step_into_block(doc, schema, next, false, caret),
        Adjacent::Edge => join_forward(doc, schema, block, caret),
    }
}

/// A caret between blocks moves into the neighbouring one; atomic blocks
/// (`<hr>`, non-editable) are deleted instead.
fn step_into_block(
    doc: &mut Document,
    schema: &Schema,
    block: NodeId,
    backward: bool,
    caret: Position,
) -> Result<Position> {
    if is_atomic(doc, block) {
        doc.remove(block)?;
        return Ok(live_caret(doc, caret));
    }
    let target = innermost_block(doc, schema, block, backward);
    let offset = if backward { doc.size(target) } else { 0 };
    Ok(place_caret(doc, Position::new(target, offset)))
}

fn join_backward(
    doc: &mut Document,
    schema: &Schema,
    block: NodeId,
    caret: Position,
) -> Result<Position> {
    if block == doc.root() {
        return Ok(caret);
    }
    // The first block of a container has nothing to join.
    let Some(prev) = doc.previous_sibling(block) else {
        return Ok(caret);
    };
    if !schema.is_block(doc, prev) {
        doc.unwrap(block)?;
        return Ok(live_caret(doc, caret));
    }
    if is_atomic(doc, prev) {
        doc.remove(prev)?;
        return Ok(live_caret(doc, caret));
    }

    let target = innermost_block(doc, schema, prev, true);
    drop_placeholder(doc, target)?;
    let joined = place_caret(doc, Position::new(target, doc.children(target).len()));
    for child in doc.children(block).to_vec() {
        doc.append_child(target, child)?;
    }
    remove_empty_chain(doc, block)?;
    tracing::trace!(target: "weaver::dispatch", from = %block, into = %target, "joined blocks");
    Ok(live_caret(doc, joined))
}

fn join_forward(
    doc: &mut Document,
    schema: &Schema,
    block: NodeId,
    caret: Position,
) -> Result<Position> {
    if block == doc.root() {
        return Ok(caret);
    }
    let Some(next) = doc.next_sibling(block) else {
        return Ok(caret);
    };
    if !schema.is_block(doc, next) {
        doc.append_child(block, next)?;
        return Ok(live_caret(doc, caret));
    }
    if is_atomic(doc, next) {
        doc.remove(next)?;
        return Ok(live_caret(doc, caret));
    }

    let source = innermost_block(doc, schema, next, false);
    drop_placeholder(doc, block)?;
    let caret = live_caret(doc, caret);
    for child in doc.children(source).to_vec() {
        doc.append_child(block, child)?;
    }
    remove_empty_chain(doc, source)?;
    Ok(live_caret(doc, caret))
}

//! Arena-backed document tree.
//!
//! Nodes live in a flat map keyed by [`NodeId`]; each stores its parent id and
//! ordered child ids. Every mutating primitive:
//!
//! 1. validates its arguments and fails without touching the tree,
//! 2. performs the change,
//! 3. adjusts the live selection the way a DOM live range would (except that
//!    moving a node carries the boundaries inside it along),
//! 4. reports a [`MutationRecord`] on the mutation bus.
//!
//! Detached nodes stay in the arena so history can reattach them.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;

use smol_str::SmolStr;

use crate::error::{EditorError, Result};
use crate::mutation::{MutationRecord, Origin, QueuedMutation};
use crate::schema::{self, PROTECTED_ATTR};
use crate::selection::{Position, Selection};

use super::node::{Node, NodeData, NodeId};

/// Tag of the editable root created by [`Document::new`].
pub const ROOT_TAG: &str = "div";

/// The editable document: node arena, mutation bus and live selection.
#[derive(Clone, Debug)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u32,
    queue: Vec<QueuedMutation>,
    silent_depth: u32,
    replay_depth: u32,
    /// Set while both halves of a move must be tagged protected.
    protected_depth: u32,
    live_selection: Option<Selection>,
    version: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `<div>` editable root.
    pub fn new() -> Self {
        let root = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                id: root,
                parent: None,
                data: NodeData::Element {
                    tag: SmolStr::new_static(ROOT_TAG),
                    attributes: Vec::new(),
                    children: Vec::new(),
                },
                observed: true,
            },
        );
        Self {
            nodes,
            root,
            next_id: 2,
            queue: Vec::new(),
            silent_depth: 0,
            replay_depth: 0,
            protected_depth: 0,
            live_selection: None,
            version: 0,
        }
    }

    // === Queries ===

    /// The editable root.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(EditorError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(EditorError::NodeNotFound(id))
    }

    /// Whether the arena knows this id (attached or not).
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(Node::tag)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(Node::text)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(Node::is_text)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(Node::is_element)
    }

    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id).and_then(|n| n.attribute(name))
    }

    pub fn attributes(&self, id: NodeId) -> &[(SmolStr, String)] {
        self.get(id).map(Node::attributes).unwrap_or(&[])
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Boundary count: chars for text nodes, children for elements.
    pub fn size(&self, id: NodeId) -> usize {
        self.get(id).map(Node::size).unwrap_or(0)
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_of(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.child(parent, i))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_of(id)?;
        self.child(parent, index + 1)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// `id` followed by its ancestors, nearest first.
    pub fn ancestors_inclusive(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.contains(id).then_some(id),
        }
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors_inclusive(node).any(|n| n == ancestor)
    }

    /// Attached to the editable root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root, id)
    }

    /// Pre-order list of `id` and its descendants.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Tree order of two nodes (pre-order). Ancestors come first.
    pub fn compare_nodes(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let mut chain_a: Vec<NodeId> = self.ancestors_inclusive(a).collect();
        let mut chain_b: Vec<NodeId> = self.ancestors_inclusive(b).collect();
        chain_a.reverse();
        chain_b.reverse();
        if chain_a.first() != chain_b.first() {
            // Different trees; fall back to a stable but arbitrary order.
            return a.cmp(&b);
        }
        let shared = chain_a
            .iter()
            .zip(chain_b.iter())
            .take_while(|(x, y)| x == y)
            .count();
        match (chain_a.get(shared), chain_b.get(shared)) {
            (None, _) => Ordering::Less,
            (_, None) => Ordering::Greater,
            (Some(&ca), Some(&cb)) => {
                let ia = self.index_of(ca).unwrap_or(0);
                let ib = self.index_of(cb).unwrap_or(0);
                ia.cmp(&ib)
            }
        }
    }

    /// Tree order of two boundary points.
    pub fn compare_positions(&self, a: Position, b: Position) -> Ordering {
        if a.node == b.node {
            return a.offset.cmp(&b.offset);
        }
        if self.is_inclusive_ancestor(a.node, b.node) {
            let child = self.child_containing(a.node, b.node);
            let index = child.and_then(|c| self.index_of(c)).unwrap_or(0);
            return if index < a.offset {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        if self.is_inclusive_ancestor(b.node, a.node) {
            return self.compare_positions(b, a).reverse();
        }
        self.compare_nodes(a.node, b.node)
    }

    /// The child of `ancestor` on the path down to `node`.
    pub fn child_containing(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        self.ancestors_inclusive(node)
            .find(|&n| self.parent(n) == Some(ancestor))
    }

    // === Creation ===

    fn allocate(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                parent: None,
                data,
                observed: false,
            },
        );
        id
    }

    /// Create a detached element. Tags are stored lowercase.
    pub fn create_element(&mut self, tag: impl AsRef<str>) -> NodeId {
        self.create_element_with(tag, std::iter::empty::<(&str, &str)>())
    }

    /// Create a detached element with initial attributes (not reported on the bus).
    pub fn create_element_with<N, V>(
        &mut self,
        tag: impl AsRef<str>,
        attributes: impl IntoIterator<Item = (N, V)>,
    ) -> NodeId
    where
        N: Into<SmolStr>,
        V: Into<String>,
    {
        let mut attrs: Vec<(SmolStr, String)> = Vec::new();
        for (name, value) in attributes {
            let name = name.into();
            let value = value.into();
            match attrs.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => attrs.push((name, value)),
            }
        }
        self.allocate(NodeData::Element {
            tag: SmolStr::new(tag.as_ref().to_ascii_lowercase()),
            attributes: attrs,
            children: Vec::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.allocate(NodeData::Text { text: text.into() })
    }

    /// Create a detached copy of `id` without its children.
    pub fn shallow_clone(&mut self, id: NodeId) -> Result<NodeId> {
        let data = match &self.node(id)?.data {
            NodeData::Element {
                tag, attributes, ..
            } => NodeData::Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                children: Vec::new(),
            },
            NodeData::Text { text } => NodeData::Text { text: text.clone() },
        };
        Ok(self.allocate(data))
    }

    // === Mutation primitives ===

    /// Insert `child` into `parent` before `before` (`None` appends).
    ///
    /// An attached child is first removed from its current parent, like the DOM.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<()> {
        if !self.node(parent)?.is_element() {
            return Err(EditorError::NotAnElement(parent));
        }
        self.node(child)?;
        if child == self.root {
            return Err(EditorError::InvalidHierarchy(
                "the editable root cannot be moved".into(),
            ));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(EditorError::InvalidHierarchy(format!(
                "inserting {child} into {parent} would create a cycle"
            )));
        }
        let before = match before {
            Some(b) if b == child => self.next_sibling(child),
            other => other,
        };
        if let Some(b) = before {
            if self.parent(b) != Some(parent) {
                return Err(EditorError::InvalidHierarchy(format!(
                    "{b} is not a child of {parent}"
                )));
            }
        }

        // A move keeps the boundaries inside the moved subtree. A move into or
        // out of a protected subtree is protected as a whole, so history never
        // replays one half of it.
        let mut protected_move = false;
        let carried = if let Some(from) = self.parent(child) {
            protected_move =
                schema::is_protected(self, from) || schema::is_protected(self, parent);
            let carried = self.boundaries_inside(child);
            if protected_move {
                self.protected_depth += 1;
            }
            let removed = self.remove(child);
            if protected_move {
                self.protected_depth -= 1;
            }
            removed?;
            carried
        } else {
            [None, None]
        };

        let index = match before {
            Some(b) => self.index_of(b).ok_or(EditorError::NodeNotFound(b))?,
            None => self.children(parent).len(),
        };
        if let NodeData::Element { children, .. } = &mut self.node_mut(parent)?.data {
            children.insert(index, child);
        }
        self.node_mut(child)?.parent = Some(parent);

        let parent_observed = self.node(parent)?.observed;
        if parent_observed {
            self.mark_observed(child);
        }

        self.adjust_live(|_, p| {
            if p.node == parent && p.offset > index {
                Position::new(p.node, p.offset + 1)
            } else {
                p
            }
        });
        self.reattach_boundaries(carried);

        if protected_move {
            self.protected_depth += 1;
        }
        self.enqueue(MutationRecord::ChildList {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
            next_sibling: before,
        });
        if protected_move {
            self.protected_depth -= 1;
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `node` right after `reference`, in the same parent.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<()> {
        let parent = self.parent(reference).ok_or_else(|| {
            EditorError::InvalidHierarchy(format!("{reference} is not attached"))
        })?;
        let next = self.next_sibling(reference);
        let next = if next == Some(node) {
            self.next_sibling(node)
        } else {
            next
        };
        self.insert_before(parent, node, next)
    }

    /// Detach `node` (and its subtree) from its parent. The nodes stay in the arena.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        if node == self.root {
            return Err(EditorError::InvalidHierarchy(
                "the editable root cannot be removed".into(),
            ));
        }
        let parent = self
            .node(node)?
            .parent
            .ok_or_else(|| EditorError::InvalidHierarchy(format!("{node} is not attached")))?;
        let index = self.index_of(node).ok_or(EditorError::NodeNotFound(node))?;
        let next_sibling = self.next_sibling(node);

        self.adjust_live(|doc, p| {
            if doc.is_inclusive_ancestor(node, p.node) {
                Position::new(parent, index)
            } else if p.node == parent && p.offset > index {
                Position::new(parent, p.offset - 1)
            } else {
                p
            }
        });

        if let NodeData::Element { children, .. } = &mut self.node_mut(parent)?.data {
            children.remove(index);
        }
        self.node_mut(node)?.parent = None;

        self.enqueue(MutationRecord::ChildList {
            target: parent,
            added: Vec::new(),
            removed: vec![node],
            next_sibling,
        });
        Ok(())
    }

    /// Move every child of `from` to the end of `to`, in order.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let children = self.children(from).to_vec();
        for child in children {
            self.append_child(to, child)?;
        }
        Ok(())
    }

    /// Replace `node` by its children.
    pub fn unwrap(&mut self, node: NodeId) -> Result<()> {
        let parent = self
            .parent(node)
            .ok_or_else(|| EditorError::InvalidHierarchy(format!("{node} is not attached")))?;
        let children = self.children(node).to_vec();
        for child in children {
            self.insert_before(parent, child, Some(node))?;
        }
        self.remove(node)
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        let old_value = self.element_attribute(node, name)?;
        if old_value.as_deref() == Some(value) {
            return Ok(());
        }
        if let NodeData::Element { attributes, .. } = &mut self.node_mut(node)?.data {
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attributes.push((SmolStr::new(name), value.to_string())),
            }
        }
        self.enqueue(MutationRecord::Attributes {
            target: node,
            name: SmolStr::new(name),
            old_value,
            new_value: Some(value.to_string()),
        });
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<()> {
        let old_value = self.element_attribute(node, name)?;
        if old_value.is_none() {
            return Ok(());
        }
        if let NodeData::Element { attributes, .. } = &mut self.node_mut(node)?.data {
            attributes.retain(|(n, _)| n != name);
        }
        self.enqueue(MutationRecord::Attributes {
            target: node,
            name: SmolStr::new(name),
            old_value,
            new_value: None,
        });
        Ok(())
    }

    fn element_attribute(&self, node: NodeId, name: &str) -> Result<Option<String>> {
        let n = self.node(node)?;
        if !n.is_element() {
            return Err(EditorError::NotAnElement(node));
        }
        Ok(n.attribute(name).map(str::to_string))
    }

    /// Replace the whole text of a text node. Live offsets are clamped.
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) -> Result<()> {
        let new_text = text.into();
        let old_text = self.text_of(node)?.to_string();
        if old_text == new_text {
            return Ok(());
        }
        let new_len = new_text.chars().count();
        self.write_text(node, new_text.clone())?;
        self.adjust_live(|_, p| {
            if p.node == node && p.offset > new_len {
                Position::new(node, new_len)
            } else {
                p
            }
        });
        self.enqueue(MutationRecord::CharacterData {
            target: node,
            old_text,
            new_text,
        });
        Ok(())
    }

    /// Insert `data` at char `offset` of a text node.
    pub fn insert_text(&mut self, node: NodeId, offset: usize, data: &str) -> Result<()> {
        let old_text = self.text_of(node)?.to_string();
        let len = old_text.chars().count();
        if offset > len {
            return Err(EditorError::OutOfBounds { node, offset });
        }
        if data.is_empty() {
            return Ok(());
        }
        let byte = char_to_byte(&old_text, offset);
        let mut new_text = old_text.clone();
        new_text.insert_str(byte, data);
        let inserted = data.chars().count();
        self.write_text(node, new_text.clone())?;
        self.adjust_live(|_, p| {
            if p.node == node && p.offset > offset {
                Position::new(node, p.offset + inserted)
            } else {
                p
            }
        });
        self.enqueue(MutationRecord::CharacterData {
            target: node,
            old_text,
            new_text,
        });
        Ok(())
    }

    /// Delete the char range of a text node.
    pub fn delete_text(&mut self, node: NodeId, range: Range<usize>) -> Result<()> {
        let old_text = self.text_of(node)?.to_string();
        let len = old_text.chars().count();
        if range.start > range.end || range.end > len {
            return Err(EditorError::OutOfBounds {
                node,
                offset: range.end,
            });
        }
        if range.is_empty() {
            return Ok(());
        }
        let start = char_to_byte(&old_text, range.start);
        let end = char_to_byte(&old_text, range.end);
        let mut new_text = old_text.clone();
        new_text.replace_range(start..end, "");
        let count = range.end - range.start;
        self.write_text(node, new_text.clone())?;
        self.adjust_live(|_, p| {
            if p.node != node || p.offset <= range.start {
                p
            } else if p.offset <= range.end {
                Position::new(node, range.start)
            } else {
                Position::new(node, p.offset - count)
            }
        });
        self.enqueue(MutationRecord::CharacterData {
            target: node,
            old_text,
            new_text,
        });
        Ok(())
    }

    /// Split a text node at a char offset; the tail becomes a new next sibling.
    ///
    /// Live boundaries after the split point follow the tail.
    pub fn split_text(&mut self, node: NodeId, offset: usize) -> Result<NodeId> {
        let text = self.text_of(node)?.to_string();
        let len = text.chars().count();
        if offset > len {
            return Err(EditorError::OutOfBounds { node, offset });
        }
        if self.parent(node).is_none() {
            return Err(EditorError::InvalidHierarchy(format!("{node} is not attached")));
        }
        let byte = char_to_byte(&text, offset);
        let (head, tail) = text.split_at(byte);
        let (head, tail) = (head.to_string(), tail.to_string());

        let follows = |p: Position| (p.node == node && p.offset > offset).then_some(p.offset);
        let moved = self
            .live_selection
            .map(|sel| (follows(sel.anchor), follows(sel.focus)));

        let tail_node = self.create_text(tail);
        self.insert_after(node, tail_node)?;
        self.set_text(node, head)?;

        if let (Some((anchor, focus)), Some(mut sel)) = (moved, self.live_selection) {
            if let Some(o) = anchor {
                sel.anchor = Position::new(tail_node, o - offset);
            }
            if let Some(o) = focus {
                sel.focus = Position::new(tail_node, o - offset);
            }
            self.live_selection = Some(sel);
        }
        Ok(tail_node)
    }

    fn text_of(&self, node: NodeId) -> Result<&str> {
        self.node(node)?
            .text()
            .ok_or(EditorError::NotAText(node))
    }

    fn write_text(&mut self, node: NodeId, value: String) -> Result<()> {
        match &mut self.node_mut(node)?.data {
            NodeData::Text { text } => {
                *text = value;
                Ok(())
            }
            NodeData::Element { .. } => Err(EditorError::NotAText(node)),
        }
    }

    /// Apply a record forward, through the primitives.
    ///
    /// The current state must match the record's "before" state; a mismatch
    /// means the tree diverged from history and is reported as inconsistent.
    pub fn apply_record(&mut self, record: &MutationRecord) -> Result<()> {
        match record {
            MutationRecord::ChildList {
                target,
                added,
                removed,
                next_sibling,
            } => {
                for &node in removed {
                    if self.parent(node) != Some(*target) {
                        return Err(EditorError::InconsistentMutation(format!(
                            "{node} is not a child of {target}"
                        )));
                    }
                    self.remove(node)?;
                }
                for &node in added {
                    self.insert_before(*target, node, *next_sibling)?;
                }
            }
            MutationRecord::Attributes {
                target,
                name,
                old_value,
                new_value,
            } => {
                let current = self.element_attribute(*target, name)?;
                if current != *old_value {
                    return Err(EditorError::InconsistentMutation(format!(
                        "attribute `{name}` of {target} diverged from history"
                    )));
                }
                match new_value {
                    Some(value) => self.set_attribute(*target, name, value)?,
                    None => self.remove_attribute(*target, name)?,
                }
            }
            MutationRecord::CharacterData {
                target,
                old_text,
                new_text,
            } => {
                if self.text_of(*target)? != old_text {
                    return Err(EditorError::InconsistentMutation(format!(
                        "text of {target} diverged from history"
                    )));
                }
                self.set_text(*target, new_text.clone())?;
            }
        }
        Ok(())
    }

    // === Mutation bus ===

    fn mark_observed(&mut self, id: NodeId) {
        for n in self.descendants(id) {
            if let Some(node) = self.nodes.get_mut(&n) {
                node.observed = true;
            }
        }
    }

    fn enqueue(&mut self, record: MutationRecord) {
        self.version += 1;
        let subject = record.target();
        if !self.get(subject).is_some_and(|n| n.observed) {
            return;
        }
        let origin = if self.replay_depth > 0 {
            Origin::Replay
        } else if self.silent_depth > 0 {
            Origin::Silent
        } else {
            Origin::User
        };
        let protected = self.is_protected_record(&record);
        tracing::trace!(
            target: "weaver::mutation",
            ?origin,
            protected,
            record = ?record,
            "mutation"
        );
        self.queue.push(QueuedMutation {
            record,
            origin,
            protected,
        });
    }

    fn is_protected_record(&self, record: &MutationRecord) -> bool {
        if self.protected_depth > 0 {
            return true;
        }
        match record {
            MutationRecord::ChildList { target, .. } => schema::is_protected(self, *target),
            MutationRecord::Attributes { target, name, .. } => {
                name != PROTECTED_ATTR
                    && self
                        .parent(*target)
                        .is_some_and(|p| schema::is_protected(self, p))
            }
            MutationRecord::CharacterData { target, .. } => self
                .parent(*target)
                .is_some_and(|p| schema::is_protected(self, p)),
        }
    }

    /// Drain the mutation bus, oldest first.
    pub fn take_records(&mut self) -> Vec<QueuedMutation> {
        std::mem::take(&mut self.queue)
    }

    /// Bumped by every change, reported or not.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_pending_records(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Run `f` with every mutation it makes tagged [`Origin::Silent`].
    pub fn silently<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.silent_depth += 1;
        let out = f(self);
        self.silent_depth -= 1;
        out
    }

    /// Run `f` with every mutation it makes tagged [`Origin::Replay`].
    pub(crate) fn replaying<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.replay_depth += 1;
        let out = f(self);
        self.replay_depth -= 1;
        out
    }

    /// Drop every node but the root. Ids keep increasing afterwards.
    pub(crate) fn clear(&mut self) {
        let root = self.root;
        self.nodes.retain(|&id, _| id == root);
        if let Some(NodeData::Element { children, .. }) =
            self.nodes.get_mut(&root).map(|n| &mut n.data)
        {
            children.clear();
        }
        self.queue.clear();
        self.live_selection = None;
    }

    // === Live selection ===

    /// Selection tracked through mutations like a DOM live range.
    pub fn live_selection(&self) -> Option<Selection> {
        self.live_selection
    }

    pub fn set_live_selection(&mut self, selection: Option<Selection>) {
        self.live_selection = selection;
    }

    fn boundaries_inside(&self, node: NodeId) -> [Option<Position>; 2] {
        match self.live_selection {
            Some(sel) => [sel.anchor, sel.focus]
                .map(|p| self.is_inclusive_ancestor(node, p.node).then_some(p)),
            None => [None, None],
        }
    }

    fn reattach_boundaries(&mut self, [anchor, focus]: [Option<Position>; 2]) {
        if let Some(mut sel) = self.live_selection {
            sel.anchor = anchor.unwrap_or(sel.anchor);
            sel.focus = focus.unwrap_or(sel.focus);
            self.live_selection = Some(sel);
        }
    }

    fn adjust_live(&mut self, f: impl Fn(&Self, Position) -> Position) {
        if let Some(mut sel) = self.live_selection {
            sel.anchor = f(self, sel.anchor);
            sel.focus = f(self, sel.focus);
            self.live_selection = Some(sel);
        }
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

/// Byte index of a char offset (clamped to the end).
pub(crate) fn char_to_byte(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(doc: &mut Document, text: &str) -> (NodeId, NodeId) {
        let p = doc.create_element("p");
        let t = doc.create_text(text);
        doc.append_child(p, t).unwrap();
        doc.append_child(doc.root(), p).unwrap();
        (p, t)
    }

    #[test]
    fn test_detached_building_is_not_reported() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let t = doc.create_text("hi");
        doc.append_child(p, t).unwrap();
        doc.set_attribute(p, "class", "a").unwrap();
        assert!(!doc.has_pending_records());

        doc.append_child(doc.root(), p).unwrap();
        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].origin, Origin::User);

        // Now observed: further changes are reported.
        doc.set_text(t, "ho").unwrap();
        assert_eq!(doc.take_records().len(), 1);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut doc = Document::new();
        let (p, _) = paragraph(&mut doc, "a");
        doc.clear();
        let q = doc.create_element("p");
        assert!(q > p);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut doc = Document::new();
        let (p, t) = paragraph(&mut doc, "a");
        let err = doc.append_child(p, p).unwrap_err();
        assert!(matches!(err, EditorError::InvalidHierarchy(_)));
        let err = doc.append_child(t, p).unwrap_err();
        assert!(matches!(err, EditorError::NotAnElement(_)));
        let err = doc.remove(doc.root()).unwrap_err();
        assert!(matches!(err, EditorError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_compare_positions() {
        let mut doc = Document::new();
        let (p1, t1) = paragraph(&mut doc, "ab");
        let (_p2, t2) = paragraph(&mut doc, "cd");
        let root = doc.root();

        assert_eq!(
            doc.compare_positions(Position::new(t1, 1), Position::new(t2, 0)),
            Ordering::Less
        );
        assert_eq!(
            doc.compare_positions(Position::new(root, 1), Position::new(t1, 2)),
            Ordering::Greater
        );
        assert_eq!(
            doc.compare_positions(Position::new(root, 0), Position::new(t1, 0)),
            Ordering::Less
        );
        assert_eq!(
            doc.compare_positions(Position::new(t2, 0), Position::new(p1, 1)),
            Ordering::Greater
        );
        assert_eq!(
            doc.compare_positions(Position::new(t1, 1), Position::new(t1, 1)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_live_selection_follows_removal_and_insertion() {
        let mut doc = Document::new();
        let (_p1, t1) = paragraph(&mut doc, "ab");
        let (p2, _t2) = paragraph(&mut doc, "cd");
        let root = doc.root();

        doc.set_live_selection(Some(Selection::collapsed(Position::new(root, 2))));
        doc.remove(p2).unwrap();
        assert_eq!(
            doc.live_selection().unwrap().anchor,
            Position::new(root, 1)
        );

        doc.set_live_selection(Some(Selection::collapsed(Position::new(t1, 1))));
        let p1 = doc.parent(t1).unwrap();
        doc.remove(p1).unwrap();
        assert_eq!(
            doc.live_selection().unwrap().anchor,
            Position::new(root, 0)
        );

        doc.insert_before(root, p1, None).unwrap();
        doc.set_live_selection(Some(Selection::collapsed(Position::new(root, 1))));
        doc.insert_before(root, p2, Some(p1)).unwrap();
        assert_eq!(
            doc.live_selection().unwrap().anchor,
            Position::new(root, 2)
        );
    }

    #[test]
    fn test_move_carries_inner_boundaries() {
        let mut doc = Document::new();
        let (p1, _t1) = paragraph(&mut doc, "ab");
        let (_p2, t2) = paragraph(&mut doc, "cd");
        doc.set_live_selection(Some(Selection::collapsed(Position::new(t2, 1))));
        doc.append_child(p1, t2).unwrap();
        assert_eq!(doc.live_selection().unwrap().anchor, Position::new(t2, 1));
        assert_eq!(doc.parent(t2), Some(p1));
    }

    #[test]
    fn test_text_edits_shift_live_offsets() {
        let mut doc = Document::new();
        let (_p, t) = paragraph(&mut doc, "héllo");
        doc.set_live_selection(Some(Selection::collapsed(Position::new(t, 4))));

        doc.insert_text(t, 1, "xy").unwrap();
        assert_eq!(doc.text(t), Some("hxyéllo"));
        assert_eq!(doc.live_selection().unwrap().anchor.offset, 6);

        doc.delete_text(t, 0..3).unwrap();
        assert_eq!(doc.text(t), Some("éllo"));
        assert_eq!(doc.live_selection().unwrap().anchor.offset, 3);

        doc.delete_text(t, 1..4).unwrap();
        assert_eq!(doc.live_selection().unwrap().anchor.offset, 1);
    }

    #[test]
    fn test_split_text_moves_trailing_boundary() {
        let mut doc = Document::new();
        let (p, t) = paragraph(&mut doc, "abcd");
        doc.set_live_selection(Some(Selection::collapsed(Position::new(t, 3))));

        let tail = doc.split_text(t, 2).unwrap();
        assert_eq!(doc.text(t), Some("ab"));
        assert_eq!(doc.text(tail), Some("cd"));
        assert_eq!(doc.children(p), &[t, tail]);
        assert_eq!(
            doc.live_selection().unwrap().anchor,
            Position::new(tail, 1)
        );
    }

    #[test]
    fn test_apply_record_detects_divergence() {
        let mut doc = Document::new();
        let (_p, t) = paragraph(&mut doc, "ab");
        let record = MutationRecord::CharacterData {
            target: t,
            old_text: "zz".into(),
            new_text: "ab".into(),
        };
        let err = doc.apply_record(&record).unwrap_err();
        assert!(matches!(err, EditorError::InconsistentMutation(_)));
    }

    #[test]
    fn test_protected_records_are_tagged() {
        let mut doc = Document::new();
        let guard = doc.create_element_with("div", [(PROTECTED_ATTR, "true")]);
        doc.append_child(doc.root(), guard).unwrap();
        doc.take_records();

        let child = doc.create_element("span");
        doc.append_child(guard, child).unwrap();
        doc.set_attribute(guard, "class", "x").unwrap();
        doc.set_attribute(child, "class", "y").unwrap();

        let flags: Vec<bool> = doc.take_records().iter().map(|m| m.protected).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_moves_across_protection_are_tagged_whole() {
        let mut doc = Document::new();
        let guard = doc.create_element_with("div", [(PROTECTED_ATTR, "true")]);
        doc.append_child(doc.root(), guard).unwrap();
        let (p, _) = paragraph(&mut doc, "a");
        let (q, _) = paragraph(&mut doc, "b");
        doc.take_records();

        doc.append_child(guard, p).unwrap();
        let flags: Vec<bool> = doc.take_records().iter().map(|m| m.protected).collect();
        assert_eq!(flags, vec![true, true]);

        doc.append_child(doc.root(), p).unwrap();
        let flags: Vec<bool> = doc.take_records().iter().map(|m| m.protected).collect();
        assert_eq!(flags, vec![true, true]);

        // Moves outside protected content stay recorded.
        doc.insert_before(doc.root(), q, Some(p)).unwrap();
        let flags: Vec<bool> = doc.take_records().iter().map(|m| m.protected).collect();
        assert_eq!(flags, vec![false, false]);
    }
}

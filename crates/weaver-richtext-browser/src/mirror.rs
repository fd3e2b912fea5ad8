//! DOM mirror of the document arena.
//!
//! Every arena node that ever reached the editable root gets one DOM node,
//! kept for the lifetime of the mirror so undo can put the very same DOM node
//! back. Mutations are applied from the *current* arena state rather than from
//! the record payloads, which makes batches that were pumped late (or twice)
//! converge on the same DOM.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};
use weaver_richtext_core::{
    Document, ExternalMutation, MutationListener, MutationRecord, NodeId, Position, QueuedMutation,
};

/// Arena ↔ DOM node mapping rooted at the editor element.
pub struct DomMirror {
    root: web_sys::Element,
    document: web_sys::Document,
    nodes: HashMap<NodeId, web_sys::Node>,
    /// DOM node → arena id, keyed by object identity.
    ids: js_sys::Map,
}

impl std::fmt::Debug for DomMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomMirror")
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl DomMirror {
    pub fn new(root: web_sys::Element, document: web_sys::Document) -> Self {
        Self {
            root,
            document,
            nodes: HashMap::new(),
            ids: js_sys::Map::new(),
        }
    }

    /// Mirror over `root`, taking the owner document from the element.
    pub fn for_element(root: web_sys::Element) -> Option<Self> {
        let document = root.owner_document()?;
        Some(Self::new(root, document))
    }

    pub fn root_element(&self) -> &web_sys::Element {
        &self.root
    }

    pub fn dom_node(&self, id: NodeId) -> Option<&web_sys::Node> {
        self.nodes.get(&id)
    }

    pub fn node_id(&self, node: &web_sys::Node) -> Option<NodeId> {
        let key: &JsValue = node.as_ref();
        self.ids.get(key).as_f64().map(|raw| NodeId(raw as u32))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn bind(&mut self, id: NodeId, node: web_sys::Node) {
        let key: &JsValue = node.as_ref();
        self.ids.set(key, &JsValue::from_f64(f64::from(id.0)));
        self.nodes.insert(id, node);
    }

    /// Throw away the DOM content and rebuild it from `doc`.
    pub fn rebuild(&mut self, doc: &Document) -> Result<(), JsValue> {
        self.root.set_text_content(None);
        self.nodes.clear();
        self.ids.clear();
        let root: web_sys::Node = self.root.clone().unchecked_into();
        self.bind(doc.root(), root.clone());
        for &child in doc.children(doc.root()) {
            let dom = self.ensure(doc, child)?;
            root.append_child(&dom)?;
        }
        tracing::debug!(target: "weaver::dom", nodes = self.nodes.len(), "rebuilt DOM mirror");
        Ok(())
    }

    /// The DOM node for `id`, created with its whole subtree if it has none yet.
    fn ensure(&mut self, doc: &Document, id: NodeId) -> Result<web_sys::Node, JsValue> {
        if let Some(existing) = self.nodes.get(&id) {
            return Ok(existing.clone());
        }
        let node: web_sys::Node = if let Some(text) = doc.text(id) {
            self.document.create_text_node(text).unchecked_into()
        } else {
            let tag = doc.tag(id).ok_or_else(|| JsValue::from_str("node without tag"))?;
            let element = self.document.create_element(tag)?;
            for (name, value) in doc.attributes(id) {
                element.set_attribute(name, value)?;
            }
            element.unchecked_into()
        };
        self.bind(id, node.clone());
        for &child in doc.children(id) {
            let dom = self.ensure(doc, child)?;
            node.append_child(&dom)?;
        }
        Ok(node)
    }

    /// Make the DOM children of `target` match its arena children, in order.
    fn sync_children(&mut self, doc: &Document, target: NodeId) -> Result<(), JsValue> {
        let Some(parent) = self.nodes.get(&target).cloned() else {
            // Never mirrored: it gets built whole once it is attached.
            return Ok(());
        };
        let mut desired = Vec::with_capacity(doc.children(target).len());
        for &child in doc.children(target) {
            desired.push(self.ensure(doc, child)?);
        }
        for (index, wanted) in desired.iter().enumerate() {
            let current = parent.child_nodes().get(index as u32);
            if current.as_ref() != Some(wanted) {
                parent.insert_before(wanted, current.as_ref())?;
            }
        }
        while let Some(extra) = parent.child_nodes().get(desired.len() as u32) {
            parent.remove_child(&extra)?;
        }
        Ok(())
    }

    fn apply(&mut self, doc: &Document, record: &MutationRecord) -> Result<(), JsValue> {
        match record {
            MutationRecord::ChildList { target, .. } => self.sync_children(doc, *target),
            MutationRecord::Attributes { target, name, .. } => {
                let Some(element) = self
                    .nodes
                    .get(target)
                    .and_then(|n| n.dyn_ref::<web_sys::Element>())
                else {
                    return Ok(());
                };
                match doc.attribute(*target, name) {
                    Some(value) => element.set_attribute(name, value),
                    None => element.remove_attribute(name),
                }
            }
            MutationRecord::CharacterData { target, .. } => {
                if let Some(node) = self.nodes.get(target) {
                    node.set_node_value(doc.text(*target));
                }
                Ok(())
            }
        }
    }

    // === Positions ===

    /// Map a native boundary point to an arena position.
    ///
    /// DOM text offsets count UTF-16 units, arena offsets count chars. Nodes the
    /// mirror does not know (browser-inserted text, other page content) are
    /// mapped through their closest known ancestor.
    pub fn to_position(&self, node: &web_sys::Node, offset: u32) -> Option<Position> {
        if let Some(id) = self.node_id(node) {
            if node.node_type() == web_sys::Node::TEXT_NODE {
                let text = node.node_value().unwrap_or_default();
                return Some(Position::new(id, utf16_to_chars(&text, offset as usize)));
            }
            return Some(Position::new(id, self.known_children_before(node, offset)));
        }

        let mut child = node.clone();
        loop {
            let parent = child.parent_node()?;
            if !self.root.contains(Some(&parent)) {
                return None;
            }
            if let Some(id) = self.node_id(&parent) {
                let index = dom_index(&parent, &child)?;
                return Some(Position::new(id, self.known_children_before(&parent, index)));
            }
            child = parent;
        }
    }

    fn known_children_before(&self, parent: &web_sys::Node, dom_offset: u32) -> usize {
        let children = parent.child_nodes();
        (0..dom_offset.min(children.length()))
            .filter_map(|i| children.get(i))
            .filter(|c| self.node_id(c).is_some())
            .count()
    }

    /// Map an arena position to a native boundary point.
    ///
    /// Works from the DOM alone, which the session keeps in sync before it
    /// publishes a selection.
    pub fn position_to_dom(&self, position: Position) -> Option<(web_sys::Node, u32)> {
        let node = self.nodes.get(&position.node)?;
        if node.node_type() == web_sys::Node::TEXT_NODE {
            let text = node.node_value().unwrap_or_default();
            return Some((node.clone(), chars_to_utf16(&text, position.offset) as u32));
        }
        let children = node.child_nodes();
        let mut known = 0;
        for i in 0..children.length() {
            let is_known = children.get(i).is_some_and(|c| self.node_id(&c).is_some());
            if is_known {
                if known == position.offset {
                    return Some((node.clone(), i));
                }
                known += 1;
            }
        }
        Some((node.clone(), children.length()))
    }

    // === External changes ===

    /// Describe native typing in `node` as an external mutation.
    ///
    /// The target is `None` when the text node is unknown to the mirror, which
    /// the session rejects as inconsistent.
    pub fn external_text(&self, node: &web_sys::Node) -> ExternalMutation {
        ExternalMutation::Text {
            target: self.node_id(node),
            text: node.node_value().unwrap_or_default(),
        }
    }
}

fn dom_index(parent: &web_sys::Node, child: &web_sys::Node) -> Option<u32> {
    let children = parent.child_nodes();
    (0..children.length()).find(|&i| children.get(i).as_ref() == Some(child))
}

pub fn utf16_to_chars(text: &str, utf16_offset: usize) -> usize {
    let mut units = 0;
    for (chars, c) in text.chars().enumerate() {
        if units >= utf16_offset {
            return chars;
        }
        units += c.len_utf16();
    }
    text.chars().count()
}

pub fn chars_to_utf16(text: &str, char_offset: usize) -> usize {
    text.chars().take(char_offset).map(char::len_utf16).sum()
}

/// The session's listener half of a shared mirror.
#[derive(Clone, Debug)]
pub struct MirrorListener(pub Rc<RefCell<DomMirror>>);

impl MutationListener for MirrorListener {
    fn on_mutation(&mut self, doc: &Document, mutation: &QueuedMutation) {
        let Ok(mut mirror) = self.0.try_borrow_mut() else {
            tracing::warn!(target: "weaver::dom", "DOM mirror busy, dropping mutation");
            return;
        };
        if let Err(err) = mirror.apply(doc, &mutation.record) {
            tracing::warn!(
                target: "weaver::dom",
                error = ?err,
                node = %mutation.record.target(),
                "failed to mirror mutation"
            );
        }
    }

    fn on_reset(&mut self, doc: &Document) {
        let Ok(mut mirror) = self.0.try_borrow_mut() else {
            tracing::warn!(target: "weaver::dom", "DOM mirror busy, skipping rebuild");
            return;
        };
        if let Err(err) = mirror.rebuild(doc) {
            tracing::error!(target: "weaver::dom", error = ?err, "failed to rebuild DOM mirror");
        }
    }
}

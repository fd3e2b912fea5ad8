//! Element classification and subtree markers.
//!
//! The core only knows a handful of structural categories: block elements,
//! inline formatting elements, and void ("visible empty") elements. Plugins can
//! extend the block set by claiming tags through the registry.

use std::collections::HashSet;

use smol_str::SmolStr;

use crate::tree::{Document, NodeId};

/// Marks a subtree excluded from recording, selection and normalization.
/// `"false"` on an inner node re-enables it.
pub const PROTECTED_ATTR: &str = "data-oe-protected";

/// Marks a subtree whose content is excluded from serialization and structural
/// normalization but otherwise live.
pub const TRANSIENT_ATTR: &str = "data-oe-transient-content";

pub const CONTENTEDITABLE_ATTR: &str = "contenteditable";

/// Block-level tags recognized without any plugin claim.
pub const DEFAULT_BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "pre",
    "ul",
    "ol",
    "li",
    "table",
    "thead",
    "tbody",
    "tr",
    "td",
    "th",
    "section",
    "article",
    "header",
    "footer",
    "nav",
    "aside",
    "figure",
    "hr",
];

/// Inline elements that only carry formatting and can be descended into,
/// merged, or dropped when empty.
pub const INLINE_FORMATTING_TAGS: &[&str] = &[
    "b", "strong", "i", "em", "u", "s", "strike", "del", "ins", "sub", "sup", "span", "font",
    "code", "mark", "small", "a",
];

/// Elements that cannot hold a caret; they render as a visible but empty box.
pub const VOID_TAGS: &[&str] = &[
    "br", "img", "hr", "input", "wbr", "area", "col", "embed", "source", "track",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

pub fn is_inline_formatting_tag(tag: &str) -> bool {
    INLINE_FORMATTING_TAGS.contains(&tag)
}

/// Structural knowledge shared by the selection model and the normalizer.
#[derive(Clone, Debug)]
pub struct Schema {
    blocks: HashSet<SmolStr>,
    default_block: SmolStr,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new("p", std::iter::empty::<SmolStr>())
    }
}

impl Schema {
    /// Build a schema from the default block set plus claimed tags.
    pub fn new(
        default_block: impl Into<SmolStr>,
        claimed: impl IntoIterator<Item = impl Into<SmolStr>>,
    ) -> Self {
        let mut blocks: HashSet<SmolStr> =
            DEFAULT_BLOCK_TAGS.iter().map(|t| SmolStr::new(t)).collect();
        blocks.extend(claimed.into_iter().map(Into::into));
        let default_block = default_block.into();
        blocks.insert(default_block.clone());
        Self {
            blocks,
            default_block,
        }
    }

    pub fn default_block(&self) -> &str {
        &self.default_block
    }

    pub fn is_block_tag(&self, tag: &str) -> bool {
        self.blocks.contains(tag)
    }

    pub fn is_block(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node).is_some_and(|t| self.is_block_tag(t))
    }

    /// Inline content: text, void and non-block elements.
    pub fn is_inline(&self, doc: &Document, node: NodeId) -> bool {
        match doc.tag(node) {
            Some(tag) => !self.is_block_tag(tag),
            None => doc.contains(node),
        }
    }

    /// Closest block ancestor-or-self, stopping at (and possibly returning) the root.
    pub fn closest_block(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        doc.ancestors_inclusive(node)
            .find(|&n| n == doc.root() || self.is_block(doc, n))
    }
}

/// Whether the node sits in a protected region.
///
/// The nearest ancestor-or-self element carrying [`PROTECTED_ATTR`] decides:
/// `""`/`"true"` protect, anything else re-enables.
pub fn is_protected(doc: &Document, node: NodeId) -> bool {
    marker_state(doc, node, PROTECTED_ATTR)
}

/// Whether the node sits in a transient region.
pub fn is_transient(doc: &Document, node: NodeId) -> bool {
    marker_state(doc, node, TRANSIENT_ATTR)
}

fn marker_state(doc: &Document, node: NodeId, attr: &str) -> bool {
    for id in doc.ancestors_inclusive(node) {
        if let Some(value) = doc.attribute(id, attr) {
            return value.is_empty() || value == "true";
        }
    }
    false
}

/// Whether a caret may live inside `node`.
///
/// Walks up to the closest element carrying either a protection marker or a
/// `contenteditable` attribute. Text nodes take their parent's state.
pub fn is_editable(doc: &Document, node: NodeId) -> bool {
    for id in doc.ancestors_inclusive(node) {
        if id == doc.root() {
            return true;
        }
        if let Some(value) = doc.attribute(id, PROTECTED_ATTR) {
            return !(value.is_empty() || value == "true");
        }
        if let Some(value) = doc.attribute(id, CONTENTEDITABLE_ATTR) {
            return value != "false";
        }
    }
    // Detached nodes are not editable.
    false
}

/// The closest ancestor-or-self that makes `node` non-editable, if any.
pub fn non_editable_boundary(doc: &Document, node: NodeId) -> Option<NodeId> {
    for id in doc.ancestors_inclusive(node) {
        if id == doc.root() {
            return None;
        }
        if let Some(value) = doc.attribute(id, PROTECTED_ATTR) {
            return (value.is_empty() || value == "true").then_some(id);
        }
        if let Some(value) = doc.attribute(id, CONTENTEDITABLE_ATTR) {
            return (value == "false").then_some(id);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection_reenabled_by_inner_marker() {
        let mut doc = Document::new();
        let outer = doc.create_element_with("div", [(PROTECTED_ATTR, "true")]);
        let inner = doc.create_element_with("div", [(PROTECTED_ATTR, "false")]);
        let text = doc.create_text("x");
        doc.append_child(doc.root(), outer).unwrap();
        doc.append_child(outer, inner).unwrap();
        doc.append_child(inner, text).unwrap();

        assert!(is_protected(&doc, outer));
        assert!(!is_protected(&doc, inner));
        assert!(!is_protected(&doc, text));
        assert!(is_editable(&doc, text));
        assert!(!is_editable(&doc, outer));
        assert_eq!(non_editable_boundary(&doc, outer), Some(outer));
        assert_eq!(non_editable_boundary(&doc, text), None);
    }

    #[test]
    fn test_claimed_block_tags() {
        let schema = Schema::new("p", ["x-card"]);
        assert!(schema.is_block_tag("x-card"));
        assert!(schema.is_block_tag("h2"));
        assert!(!schema.is_block_tag("b"));
    }
}

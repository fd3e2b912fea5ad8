//! Persistence form of the tree.
//!
//! A [`SerializedNode`] is a plain serde tree, independent of arena ids. The
//! content of transient elements is never saved: the element keeps its
//! attributes but loses its children.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::Result;
use crate::schema::{is_transient, is_void_tag};
use crate::tree::markup::escape_into;
use crate::tree::{Document, NodeData, NodeId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SerializedNode {
    Element {
        tag: SmolStr,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attributes: Vec<(SmolStr, String)>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<SerializedNode>,
    },
    Text {
        text: String,
    },
}

impl SerializedNode {
    /// Markup for this node and its children.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Text { text } => escape_into(text, false, out),
            Self::Element {
                tag,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if is_void_tag(tag) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

/// Serialize `node` and its subtree, leaving out transient content.
///
/// Transience is inherited: starting below a transient element still saves
/// nothing of its content.
pub fn serialize_node(doc: &Document, node: NodeId) -> Result<SerializedNode> {
    let transient = is_transient(doc, node);
    Ok(match doc.node(node)?.data() {
        NodeData::Text { .. } if transient => SerializedNode::Text {
            text: String::new(),
        },
        NodeData::Text { text } => SerializedNode::Text { text: text.clone() },
        NodeData::Element {
            tag,
            attributes,
            children,
        } => {
            let children = if transient {
                Vec::new()
            } else {
                children
                    .iter()
                    .map(|&child| serialize_node(doc, child))
                    .collect::<Result<Vec<_>>>()?
            };
            SerializedNode::Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                children,
            }
        }
    })
}

/// Serialized children of the editable root.
pub fn serialize_content(doc: &Document) -> Result<Vec<SerializedNode>> {
    doc.children(doc.root())
        .iter()
        .map(|&child| serialize_node(doc, child))
        .collect()
}

/// Saved markup of the document: the root's children without transient content.
pub fn content_html(doc: &Document) -> Result<String> {
    Ok(serialize_content(doc)?
        .iter()
        .map(SerializedNode::to_html)
        .collect())
}

/// Rebuild a serialized subtree as detached nodes with fresh ids.
pub fn unserialize_node(doc: &mut Document, node: &SerializedNode) -> Result<NodeId> {
    match node {
        SerializedNode::Text { text } => Ok(doc.create_text(text.clone())),
        SerializedNode::Element {
            tag,
            attributes,
            children,
        } => {
            let element = doc.create_element_with(tag.as_str(), attributes.iter().cloned());
            for child in children {
                let child = unserialize_node(doc, child)?;
                doc.append_child(element, child)?;
            }
            Ok(element)
        }
    }
}

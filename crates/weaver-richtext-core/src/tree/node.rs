//! Node storage types for the document arena.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Stable identity of a node within a document.
///
/// Allocated monotonically by the owning [`Document`](super::Document) and never
/// reused, so mutation records and history steps can refer to a node across
/// detach/reattach cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payload of an arena node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeData {
    Element {
        tag: SmolStr,
        /// Attribute order is preserved; names are unique.
        attributes: Vec<(SmolStr, String)>,
        children: Vec<NodeId>,
    },
    Text {
        text: String,
    },
}

/// A node slot in the arena.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) data: NodeData,
    /// Set once the node has been inside the observed tree; mutations of nodes
    /// that were never observed are not reported on the bus.
    pub(crate) observed: bool,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text { .. })
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element { .. })
    }

    /// Lowercase tag name, `None` for text nodes.
    pub fn tag(&self) -> Option<&str> {
        match &self.data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text { text } => Some(text.as_str()),
            NodeData::Element { .. } => None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.data {
            NodeData::Element { children, .. } => children,
            NodeData::Text { .. } => &[],
        }
    }

    pub fn attributes(&self) -> &[(SmolStr, String)] {
        match &self.data {
            NodeData::Element { attributes, .. } => attributes,
            NodeData::Text { .. } => &[],
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Boundary count: chars for text nodes, children for elements.
    pub fn size(&self) -> usize {
        match &self.data {
            NodeData::Element { children, .. } => children.len(),
            NodeData::Text { text } => text.chars().count(),
        }
    }
}

//! The document tree: node arena, primitives and markup.

mod document;
pub mod markup;
mod node;

pub use document::{Ancestors, Document, ROOT_TAG};
pub(crate) use document::char_to_byte;
pub use node::{Node, NodeData, NodeId};

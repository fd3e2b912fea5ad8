//! weaver-richtext-core: framework-free rich text editing core.
//!
//! This crate provides:
//! - `Document` - node arena with live selection and a mutation queue
//! - `History` - step-based undo/redo over recorded mutations
//! - `Registry` - typed plugin resources (commands, keybindings, hooks, block tags)
//! - `Session` - the editor instance tying dispatch, selection and history together
//! - `CorePlugin` - built-in text editing commands
//!
//! Hosts plug in a [`SelectionPlatform`] for the native selection and
//! [`MutationListener`]s to mirror the tree into a real DOM.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod mutation;
pub mod normalize;
pub mod registry;
pub mod schema;
pub mod selection;
pub mod serialize;
pub mod session;
pub mod tree;

#[cfg(test)]
mod test_utils;

pub use commands::CorePlugin;
pub use config::EditorConfig;
pub use dispatch::{CommandContext, payload_str};
pub use error::{EditorError, HandlerFailure, Result};
pub use history::{History, HistoryState, Step};
pub use mutation::{MutationListener, MutationRecord, Origin, QueuedMutation};
pub use normalize::Normalizer;
pub use registry::{
    Binding, KeyChord, NormalizationHook, Plugin, Registry, RegistryBuilder, Resource,
    ResourceKind,
};
pub use schema::Schema;
pub use selection::{
    Direction, MemorySelection, PlatformError, Position, Selection, SelectionHook,
    SelectionPlatform, SelectionUpdate,
};
pub use serialize::SerializedNode;
pub use session::{ExternalMutation, Session};
pub use smol_str::SmolStr;
pub use tree::{Document, Node, NodeData, NodeId};

//! Mutation records emitted by the tree primitives.
//!
//! Every primitive on [`Document`](crate::tree::Document) reports what it did as a
//! [`MutationRecord`] on the document's mutation bus. Records carry the stable id of
//! the affected node and enough state to be inverted exactly:
//!
//! - inverses are applied in reverse record order against the same ids;
//! - a `ChildList` record adds or removes nodes before `next_sibling`
//!   (`None` meaning "at the end");
//! - `Attributes` and `CharacterData` records hold both the old and the new value.

use smol_str::SmolStr;

use crate::tree::NodeId;

/// One observed low-level tree mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationRecord {
    /// Children of `target` were added and/or removed.
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        next_sibling: Option<NodeId>,
    },
    /// An attribute of `target` changed. `None` means absent.
    Attributes {
        target: NodeId,
        name: SmolStr,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    /// The text of a text node changed.
    CharacterData {
        target: NodeId,
        old_text: String,
        new_text: String,
    },
}

impl MutationRecord {
    /// The node the mutation was reported on (the parent for child list changes).
    pub fn target(&self) -> NodeId {
        match self {
            Self::ChildList { target, .. }
            | Self::Attributes { target, .. }
            | Self::CharacterData { target, .. } => *target,
        }
    }

    /// The record that undoes this one.
    pub fn inverse(&self) -> MutationRecord {
        match self {
            Self::ChildList {
                target,
                added,
                removed,
                next_sibling,
            } => Self::ChildList {
                target: *target,
                added: removed.clone(),
                removed: added.clone(),
                next_sibling: *next_sibling,
            },
            Self::Attributes {
                target,
                name,
                old_value,
                new_value,
            } => Self::Attributes {
                target: *target,
                name: name.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            Self::CharacterData {
                target,
                old_text,
                new_text,
            } => Self::CharacterData {
                target: *target,
                old_text: new_text.clone(),
                new_text: old_text.clone(),
            },
        }
    }
}

/// Where a mutation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Regular editing; recorded into history.
    User,
    /// Explicitly silent (initial normalization, host escapes); never recorded.
    Silent,
    /// History replaying a step (undo, redo, revert); never recorded.
    Replay,
}

/// A record waiting on the mutation bus, tagged at the time it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedMutation {
    pub record: MutationRecord,
    pub origin: Origin,
    /// The mutation happened underneath a protected node.
    pub protected: bool,
}

/// Receives every mutation applied to a document, recorded or not.
///
/// Implemented by layers that mirror the tree elsewhere (the browser DOM bridge).
pub trait MutationListener {
    fn on_mutation(&mut self, doc: &crate::tree::Document, mutation: &QueuedMutation);

    /// The whole content was replaced; rebuild from `doc` instead of patching.
    fn on_reset(&mut self, doc: &crate::tree::Document) {
        let _ = doc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_swaps_child_lists() {
        let rec = MutationRecord::ChildList {
            target: NodeId(1),
            added: vec![NodeId(4)],
            removed: vec![],
            next_sibling: Some(NodeId(3)),
        };
        let inv = rec.inverse();
        assert_eq!(
            inv,
            MutationRecord::ChildList {
                target: NodeId(1),
                added: vec![],
                removed: vec![NodeId(4)],
                next_sibling: Some(NodeId(3)),
            }
        );
        assert_eq!(inv.inverse(), rec);
    }

    #[test]
    fn test_attribute_inverse_swaps_values() {
        let rec = MutationRecord::Attributes {
            target: NodeId(2),
            name: "class".into(),
            old_value: None,
            new_value: Some("a".into()),
        };
        let inv = rec.inverse();
        assert_eq!(inv.target(), NodeId(2));
        assert!(matches!(
            inv,
            MutationRecord::Attributes { old_value: Some(_), new_value: None, .. }
        ));
    }
}

//! Selection value types: positions, direction, anchor/focus pairs.

use serde::{Deserialize, Serialize};

use crate::tree::NodeId;

/// A boundary point in the tree.
///
/// `offset` counts chars for text nodes and children for elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub node: NodeId,
    pub offset: usize,
}

impl Position {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Direction of a selection in tree order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Anchor precedes focus.
    Forward,
    /// Focus precedes anchor.
    Backward,
    /// Anchor and focus coincide.
    #[default]
    None,
}

/// Anchor/focus selection.
///
/// The anchor is where the selection started, the focus is where it ends now.
/// They may be in any order; `direction` tells which comes first in the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Position,
    pub focus: Position,
    pub direction: Direction,
}

impl Selection {
    /// Create a collapsed selection (caret).
    pub fn collapsed(position: Position) -> Self {
        Self {
            anchor: position,
            focus: position,
            direction: Direction::None,
        }
    }

    /// Create a selection with a precomputed direction.
    pub fn new(anchor: Position, focus: Position, direction: Direction) -> Self {
        Self {
            anchor,
            focus,
            direction,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// The endpoint that comes first in tree order.
    pub fn start(&self) -> Position {
        match self.direction {
            Direction::Backward => self.focus,
            _ => self.anchor,
        }
    }

    /// The endpoint that comes last in tree order.
    pub fn end(&self) -> Position {
        match self.direction {
            Direction::Backward => self.anchor,
            _ => self.focus,
        }
    }

    pub fn is_backwards(&self) -> bool {
        self.direction == Direction::Backward
    }
}

/// Caller-side selection request; a missing focus collapses onto the anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionUpdate {
    pub anchor: Position,
    pub focus: Option<Position>,
}

impl SelectionUpdate {
    pub fn caret(position: Position) -> Self {
        Self {
            anchor: position,
            focus: None,
        }
    }

    pub fn range(anchor: Position, focus: Position) -> Self {
        Self {
            anchor,
            focus: Some(focus),
        }
    }
}

impl From<Position> for SelectionUpdate {
    fn from(position: Position) -> Self {
        Self::caret(position)
    }
}

impl From<Selection> for SelectionUpdate {
    fn from(selection: Selection) -> Self {
        Self::range(selection.anchor, selection.focus)
    }
}

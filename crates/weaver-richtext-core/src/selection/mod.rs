//! Selection model.
//!
//! The authoritative selection lives in the [`Document`] as a live range, so
//! every tree primitive keeps it valid. This module maps it to and from the
//! native selection and applies the normalization rules in [`position`].

mod platform;
pub mod position;
mod types;

use std::cmp::Ordering;
use std::sync::Arc;

pub use platform::{MemorySelection, PlatformError, SelectionPlatform};
pub use position::normalize_position;
pub use types::{Direction, Position, Selection, SelectionUpdate};

use crate::error::{EditorError, Result};
use crate::schema::{self, Schema};
use crate::tree::Document;

/// Called after the selection was set or restored.
pub type SelectionHook = Arc<dyn Fn(&Document, Option<&Selection>)>;

/// Direction of the range `anchor..focus` in tree order.
pub fn direction_of(doc: &Document, anchor: Position, focus: Position) -> Direction {
    match doc.compare_positions(anchor, focus) {
        Ordering::Less => Direction::Forward,
        Ordering::Greater => Direction::Backward,
        Ordering::Equal => Direction::None,
    }
}

/// Bridges the live selection, the native platform and selection hooks.
pub struct SelectionModel {
    platform: Box<dyn SelectionPlatform>,
    hooks: Vec<SelectionHook>,
}

impl std::fmt::Debug for SelectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionModel")
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl SelectionModel {
    pub fn new(platform: Box<dyn SelectionPlatform>, hooks: Vec<SelectionHook>) -> Self {
        Self { platform, hooks }
    }

    /// The last known in-editable selection.
    pub fn selection(&self, doc: &Document) -> Option<Selection> {
        doc.live_selection()
    }

    /// Adopt the native selection if both endpoints are inside the editable root.
    ///
    /// Otherwise the live selection is kept as the last in-editable one.
    pub fn sync_from_platform(&self, doc: &mut Document) -> Option<Selection> {
        if let Some(native) = self.platform.read() {
            if doc.is_connected(native.anchor.node) && doc.is_connected(native.focus.node) {
                let anchor = position::clamp(doc, native.anchor);
                let focus = position::clamp(doc, native.focus);
                let selection = Selection::new(anchor, focus, direction_of(doc, anchor, focus));
                doc.set_live_selection(Some(selection));
            }
        }
        doc.live_selection()
    }

    /// Whether the native selection currently sits in editable content.
    pub fn is_in_editable(&self, doc: &Document) -> bool {
        self.platform.read().is_some_and(|sel| {
            [sel.anchor.node, sel.focus.node]
                .into_iter()
                .all(|n| doc.is_connected(n) && schema::is_editable(doc, n))
        })
    }

    /// Canonical equivalent of a position inside the editable root.
    pub fn normalized_position(
        &self,
        doc: &Document,
        schema: &Schema,
        position: Position,
    ) -> Result<Position> {
        check_in_root(doc, position)?;
        Ok(normalize_position(doc, schema, position))
    }

    /// Set the selection, normalizing each endpoint unless told not to.
    pub fn set_selection(
        &mut self,
        doc: &mut Document,
        schema: &Schema,
        update: SelectionUpdate,
        normalize: bool,
    ) -> Result<Selection> {
        let focus = update.focus.unwrap_or(update.anchor);
        check_in_root(doc, update.anchor)?;
        check_in_root(doc, focus)?;

        let fix = |p: Position| {
            if normalize {
                normalize_position(doc, schema, p)
            } else {
                position::clamp(doc, p)
            }
        };
        let anchor = fix(update.anchor);
        let focus = fix(focus);
        let selection = Selection::new(anchor, focus, direction_of(doc, anchor, focus));

        tracing::debug!(
            target: "weaver::selection",
            anchor = %selection.anchor.node,
            anchor_offset = selection.anchor.offset,
            focus = %selection.focus.node,
            focus_offset = selection.focus.offset,
            direction = ?selection.direction,
            "set selection"
        );
        doc.set_live_selection(Some(selection));
        self.publish(doc);
        Ok(selection)
    }

    /// Restore a snapshot taken earlier, remapping endpoints that left the tree.
    pub fn restore(&mut self, doc: &mut Document, schema: &Schema, snapshot: Option<Selection>) {
        let Some(snapshot) = snapshot else {
            doc.set_live_selection(None);
            self.publish(doc);
            return;
        };
        let remap = |p: Position| {
            let p = if doc.is_connected(p.node) {
                p
            } else {
                tracing::debug!(
                    target: "weaver::selection",
                    node = %p.node,
                    "selection endpoint detached, remapping to document start"
                );
                Position::new(doc.root(), 0)
            };
            normalize_position(doc, schema, p)
        };
        let anchor = remap(snapshot.anchor);
        let focus = remap(snapshot.focus);
        doc.set_live_selection(Some(Selection::new(
            anchor,
            focus,
            direction_of(doc, anchor, focus),
        )));
        self.publish(doc);
    }

    /// Write the live selection to the native platform and notify hooks.
    pub fn publish(&mut self, doc: &Document) {
        let selection = doc.live_selection();
        if let Err(err) = self.platform.write(selection.as_ref()) {
            tracing::warn!(
                target: "weaver::selection",
                error = %err,
                "native selection write failed"
            );
        }
        for hook in &self.hooks {
            hook(doc, selection.as_ref());
        }
    }
}

fn check_in_root(doc: &Document, position: Position) -> Result<()> {
    if doc.is_connected(position.node) {
        Ok(())
    } else {
        Err(EditorError::OutOfBounds {
            node: position.node,
            offset: position.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::test_utils::parse_doc;

    #[test]
    fn test_set_selection_rejects_outside_root() {
        let (mut doc, _) = parse_doc("<p>a</p>");
        let detached = doc.create_text("x");
        let mut model = SelectionModel::new(Box::new(MemorySelection::new()), Vec::new());
        let err = model
            .set_selection(
                &mut doc,
                &Schema::default(),
                Position::new(detached, 0).into(),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, EditorError::OutOfBounds { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_set_selection_direction_and_hooks() {
        let (mut doc, _) = parse_doc("<p>abc</p>");
        let t = doc.first_child(doc.first_child(doc.root()).unwrap()).unwrap();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let hook: SelectionHook =
            Arc::new(move |_: &Document, _: Option<&Selection>| seen.set(seen.get() + 1));
        let native = MemorySelection::new();
        let mut model = SelectionModel::new(Box::new(native.clone()), vec![hook]);

        let sel = model
            .set_selection(
                &mut doc,
                &Schema::default(),
                SelectionUpdate::range(Position::new(t, 3), Position::new(t, 1)),
                true,
            )
            .unwrap();
        assert_eq!(sel.direction, Direction::Backward);
        assert_eq!(sel.start(), Position::new(t, 1));
        assert_eq!(native.get(), Some(sel));
        assert_eq!(calls.get(), 1);

        let sel = model
            .set_selection(&mut doc, &Schema::default(), Position::new(t, 2).into(), true)
            .unwrap();
        assert_eq!(sel.direction, Direction::None);
    }

    #[test]
    fn test_native_outside_root_keeps_last_selection() {
        let (mut doc, selection) = parse_doc("<p>a[]b</p>");
        let native = MemorySelection::new();
        let model = SelectionModel::new(Box::new(native.clone()), Vec::new());
        doc.set_live_selection(selection);

        let elsewhere = doc.create_text("outside");
        native.set(Some(Selection::collapsed(Position::new(elsewhere, 0))));
        assert_eq!(model.sync_from_platform(&mut doc), selection);
        assert!(!model.is_in_editable(&doc));

        let anchor = selection.unwrap().anchor;
        native.set(Some(Selection::collapsed(Position::new(anchor.node, 0))));
        let synced = model.sync_from_platform(&mut doc).unwrap();
        assert_eq!(synced.anchor.offset, 0);
        assert!(model.is_in_editable(&doc));
    }
}

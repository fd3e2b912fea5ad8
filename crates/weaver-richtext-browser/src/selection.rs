//! Native selection over `window.getSelection()`.
//!
//! Reads and writes go through the shared [`DomMirror`] to translate between
//! DOM boundary points and arena positions. The session recomputes direction
//! and validates the endpoints, so reads only need to resolve node ids.

use std::cell::RefCell;
use std::rc::Rc;

use weaver_richtext_core::{Direction, PlatformError, Selection, SelectionPlatform};

use crate::mirror::DomMirror;

/// Browser selection platform sharing the session's DOM mirror.
#[derive(Clone, Debug)]
pub struct BrowserSelection {
    mirror: Rc<RefCell<DomMirror>>,
}

impl BrowserSelection {
    pub fn new(mirror: Rc<RefCell<DomMirror>>) -> Self {
        Self { mirror }
    }
}

fn native_selection() -> Result<web_sys::Selection, PlatformError> {
    let window = web_sys::window().ok_or("no window")?;
    window
        .get_selection()
        .map_err(|e| format!("get_selection failed: {e:?}"))?
        .ok_or_else(|| "no selection object".into())
}

impl SelectionPlatform for BrowserSelection {
    fn read(&self) -> Option<Selection> {
        let mirror = self.mirror.try_borrow().ok()?;
        let selection = native_selection().ok()?;
        let anchor = mirror.to_position(&selection.anchor_node()?, selection.anchor_offset())?;
        let focus = mirror.to_position(&selection.focus_node()?, selection.focus_offset())?;
        tracing::trace!(
            target: "weaver::selection",
            anchor = %anchor.node,
            anchor_offset = anchor.offset,
            focus = %focus.node,
            focus_offset = focus.offset,
            "read native selection"
        );
        Some(Selection::new(anchor, focus, Direction::None))
    }

    fn write(&mut self, selection: Option<&Selection>) -> Result<(), PlatformError> {
        let native = native_selection()?;
        let Some(selection) = selection else {
            return native
                .remove_all_ranges()
                .map_err(|e| format!("remove_all_ranges failed: {e:?}").into());
        };
        let mirror = self
            .mirror
            .try_borrow()
            .map_err(|_| PlatformError::from("DOM mirror busy"))?;
        let (anchor_node, anchor_offset) = mirror
            .position_to_dom(selection.anchor)
            .ok_or_else(|| format!("anchor {} is not mirrored", selection.anchor.node))?;
        let (focus_node, focus_offset) = mirror
            .position_to_dom(selection.focus)
            .ok_or_else(|| format!("focus {} is not mirrored", selection.focus.node))?;
        native
            .set_base_and_extent(&anchor_node, anchor_offset, &focus_node, focus_offset)
            .map_err(|e| format!("set_base_and_extent failed: {e:?}"))?;
        Ok(())
    }
}

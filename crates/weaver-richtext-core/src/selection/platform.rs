//! Native selection abstraction.
//!
//! The selection model never talks to a UI directly. It reads and writes the
//! native anchor/focus through a [`SelectionPlatform`]; the browser crate maps
//! that onto `window.getSelection()`, [`MemorySelection`] keeps it in memory.

use std::cell::RefCell;
use std::rc::Rc;

use super::types::Selection;

/// Error type for platform operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl From<&str> for PlatformError {
    fn from(s: &str) -> Self {
        PlatformError(s.to_string())
    }
}

impl From<String> for PlatformError {
    fn from(s: String) -> Self {
        PlatformError(s)
    }
}

/// Platform-specific selection access.
pub trait SelectionPlatform {
    /// Current native selection, mapped to document node ids.
    ///
    /// Returns `None` when nothing is selected or when an endpoint cannot be
    /// mapped to a document node (focus is elsewhere on the page).
    fn read(&self) -> Option<Selection>;

    /// Show `selection` natively. `None` clears the native selection.
    fn write(&mut self, selection: Option<&Selection>) -> Result<(), PlatformError>;
}

/// In-memory native selection.
///
/// Clones share the same slot, so a host (or a test) can keep a handle and
/// move the "native" caret like a user would.
#[derive(Clone, Debug, Default)]
pub struct MemorySelection {
    slot: Rc<RefCell<Option<Selection>>>,
}

impl MemorySelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a user-driven selection change.
    pub fn set(&self, selection: Option<Selection>) {
        *self.slot.borrow_mut() = selection;
    }

    pub fn get(&self) -> Option<Selection> {
        *self.slot.borrow()
    }
}

impl SelectionPlatform for MemorySelection {
    fn read(&self) -> Option<Selection> {
        self.get()
    }

    fn write(&mut self, selection: Option<&Selection>) -> Result<(), PlatformError> {
        self.set(selection.copied());
        Ok(())
    }
}

//! Browser DOM layer for the weaver rich text editor.
//!
//! This crate mirrors a `weaver-richtext-core` session into a contenteditable
//! element and feeds browser events back into it. It assumes a
//! `wasm32-unknown-unknown` target environment.
//!
//! # Architecture
//!
//! - `mirror`: arena ↔ DOM node mapping, applied as a mutation listener
//! - `selection`: native selection platform over `window.getSelection()`
//! - `events`: keydown and beforeinput handling
//! - `editor`: session + mirror bundle for an element
//! - `logging`: console tracing and panic hook
//!
//! # Re-exports
//!
//! This crate re-exports `weaver-richtext-core` for convenience, so consumers
//! only need to depend on `weaver-richtext-browser`.

pub use weaver_richtext_core;

pub mod editor;
pub mod events;
pub mod logging;
pub mod mirror;
pub mod selection;

pub use editor::{BrowserEditor, BrowserError};
pub use events::{
    BeforeInputContext, BeforeInputResult, InputType, command_for, handle_beforeinput,
    handle_keydown, parse_browser_input_type,
};
pub use logging::init_logging;
pub use mirror::{DomMirror, MirrorListener};
pub use selection::BrowserSelection;

//! Browser event handling for the editor.
//!
//! Keyboard events are matched against registered keybindings; `beforeinput`
//! events are mapped onto the built-in editing commands so the browser never
//! edits the contenteditable tree on its own.

use serde_json::{Value, json};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use weaver_richtext_core::commands::{
    DELETE_BACKWARD, DELETE_FORWARD, INSERT_LINE_BREAK, INSERT_PARAGRAPH_BREAK, INSERT_TEXT, REDO,
    UNDO,
};
use weaver_richtext_core::{KeyChord, Position, Result, SelectionUpdate, Session};

use crate::mirror::DomMirror;

// === StaticRange binding ===
//
// StaticRange is returned by InputEvent.getTargetRanges() and is not exposed
// by web-sys.

#[wasm_bindgen]
extern "C" {
    pub type StaticRange;

    #[wasm_bindgen(method, getter, structural, js_name = startContainer)]
    pub fn start_container(this: &StaticRange) -> web_sys::Node;

    #[wasm_bindgen(method, getter, structural, js_name = startOffset)]
    pub fn start_offset(this: &StaticRange) -> u32;

    #[wasm_bindgen(method, getter, structural, js_name = endContainer)]
    pub fn end_container(this: &StaticRange) -> web_sys::Node;

    #[wasm_bindgen(method, getter, structural, js_name = endOffset)]
    pub fn end_offset(this: &StaticRange) -> u32;
}

// === Keyboard ===

/// Keys that only modify other keys never form a chord on their own.
const MODIFIER_KEYS: &[&str] = &["Control", "Shift", "Alt", "Meta", "AltGraph", "CapsLock"];

/// Chord for a keydown event, `None` for bare modifier presses.
pub fn chord_from_event(event: &web_sys::KeyboardEvent) -> Option<KeyChord> {
    let key = event.key();
    if key.is_empty() || MODIFIER_KEYS.contains(&key.as_str()) {
        return None;
    }
    Some(chord_from_parts(
        &key,
        event.ctrl_key(),
        event.shift_key(),
        event.alt_key(),
        event.meta_key(),
    ))
}

pub fn chord_from_parts(key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> KeyChord {
    let mut chord = KeyChord::new(key);
    chord.ctrl = ctrl;
    chord.shift = shift;
    chord.alt = alt;
    chord.meta = meta;
    chord
}

/// Dispatch the keybinding for a keydown event, preventing the default
/// browser action when one handled it.
pub fn handle_keydown(session: &mut Session, event: &web_sys::KeyboardEvent) -> Result<bool> {
    if event.is_composing() {
        return Ok(false);
    }
    let Some(chord) = chord_from_event(event) else {
        return Ok(false);
    };
    let handled = session.dispatch_key(&chord)?;
    if handled {
        event.prevent_default();
    }
    Ok(handled)
}

// === InputType browser parsing ===

/// The `beforeinput` input types the editor distinguishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputType {
    InsertText,
    InsertReplacementText,
    InsertFromPaste,
    InsertFromDrop,
    InsertCompositionText,
    InsertLineBreak,
    InsertParagraph,
    DeleteContentBackward,
    DeleteContentForward,
    DeleteByCut,
    DeleteByDrag,
    DeleteContent,
    HistoryUndo,
    HistoryRedo,
    Unknown(String),
}

/// Parse a W3C Input Events `inputType` string.
pub fn parse_browser_input_type(s: &str) -> InputType {
    match s {
        "insertText" => InputType::InsertText,
        "insertReplacementText" => InputType::InsertReplacementText,
        "insertFromPaste" => InputType::InsertFromPaste,
        "insertFromDrop" => InputType::InsertFromDrop,
        "insertCompositionText" => InputType::InsertCompositionText,
        "insertLineBreak" => InputType::InsertLineBreak,
        "insertParagraph" => InputType::InsertParagraph,
        "deleteContentBackward" => InputType::DeleteContentBackward,
        "deleteContentForward" => InputType::DeleteContentForward,
        "deleteByCut" => InputType::DeleteByCut,
        "deleteByDrag" => InputType::DeleteByDrag,
        "deleteContent" => InputType::DeleteContent,
        "historyUndo" => InputType::HistoryUndo,
        "historyRedo" => InputType::HistoryRedo,
        other => InputType::Unknown(other.to_string()),
    }
}

// === BeforeInput event handling ===

/// Result of handling a beforeinput event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeforeInputResult {
    /// A command ran; the default browser behavior must be prevented.
    Handled,
    /// Left to the browser (composition, drops, unknown input types).
    PassThrough,
}

/// The parts of a beforeinput event the mapping depends on.
#[derive(Debug, Clone)]
pub struct BeforeInputContext {
    pub input_type: InputType,
    /// Text to insert, if any.
    pub data: Option<String>,
    /// Range the browser wants to modify, from `getTargetRanges()`.
    pub target_range: Option<(Position, Position)>,
    pub is_composing: bool,
}

impl BeforeInputContext {
    pub fn new(input_type: InputType) -> Self {
        Self {
            input_type,
            data: None,
            target_range: None,
            is_composing: false,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Read the context off a live event, mapping target ranges through `mirror`.
    pub fn from_event(event: &web_sys::InputEvent, mirror: &DomMirror) -> Self {
        Self {
            input_type: parse_browser_input_type(&event.input_type()),
            data: data_from_event(event),
            target_range: target_range_from_event(event, mirror),
            is_composing: event.is_composing(),
        }
    }
}

/// Data from a beforeinput event, falling back to the plain text transfer.
pub fn data_from_event(event: &web_sys::InputEvent) -> Option<String> {
    if let Some(data) = event.data().filter(|d| !d.is_empty()) {
        return Some(data);
    }
    event
        .data_transfer()
        .and_then(|transfer| transfer.get_data("text/plain").ok())
        .filter(|text| !text.is_empty())
}

/// First target range of the event, mapped to arena positions.
pub fn target_range_from_event(
    event: &web_sys::InputEvent,
    mirror: &DomMirror,
) -> Option<(Position, Position)> {
    let ranges = event.get_target_ranges();
    if ranges.length() == 0 {
        return None;
    }
    let range: StaticRange = ranges.get(0).unchecked_into();
    let start = mirror.to_position(&range.start_container(), range.start_offset())?;
    let end = mirror.to_position(&range.end_container(), range.end_offset())?;
    Some((start, end))
}

/// The command (and payload) an input type maps to.
///
/// `None` leaves the event to the browser.
pub fn command_for(input_type: &InputType, data: Option<&str>) -> Option<(&'static str, Value)> {
    match input_type {
        InputType::InsertText | InputType::InsertReplacementText | InputType::InsertFromPaste => {
            data.map(|text| (INSERT_TEXT, json!({ "text": text })))
        }
        InputType::InsertLineBreak => Some((INSERT_LINE_BREAK, Value::Null)),
        InputType::InsertParagraph => Some((INSERT_PARAGRAPH_BREAK, Value::Null)),
        InputType::DeleteContentBackward
        | InputType::DeleteByCut
        | InputType::DeleteByDrag
        | InputType::DeleteContent => Some((DELETE_BACKWARD, Value::Null)),
        InputType::DeleteContentForward => Some((DELETE_FORWARD, Value::Null)),
        InputType::HistoryUndo => Some((UNDO, Value::Null)),
        InputType::HistoryRedo => Some((REDO, Value::Null)),
        InputType::InsertFromDrop | InputType::InsertCompositionText | InputType::Unknown(_) => {
            None
        }
    }
}

/// Run the command for a beforeinput event.
///
/// Composition is left to the browser except for history input. A target
/// range, when present, replaces the session selection first.
pub fn handle_beforeinput(
    session: &mut Session,
    ctx: &BeforeInputContext,
) -> Result<BeforeInputResult> {
    let history = matches!(ctx.input_type, InputType::HistoryUndo | InputType::HistoryRedo);
    if ctx.is_composing && !history {
        return Ok(BeforeInputResult::PassThrough);
    }
    let Some((command, payload)) = command_for(&ctx.input_type, ctx.data.as_deref()) else {
        tracing::trace!(target: "weaver::dom", input_type = ?ctx.input_type, "beforeinput passed through");
        return Ok(BeforeInputResult::PassThrough);
    };
    if let Some((start, end)) = ctx.target_range {
        session.set_selection(SelectionUpdate::range(start, end), true)?;
    }
    let removes_selection = matches!(
        ctx.input_type,
        InputType::DeleteByCut | InputType::DeleteByDrag | InputType::DeleteContent
    );
    if removes_selection && session.get_selection().is_none_or(|s| s.is_collapsed()) {
        return Ok(BeforeInputResult::Handled);
    }
    session.dispatch(command, &payload)?;
    Ok(BeforeInputResult::Handled)
}

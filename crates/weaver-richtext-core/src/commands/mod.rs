//! Built-in editing commands.
//!
//! [`CorePlugin`] contributes the minimum a host needs to type into the
//! document: text insertion, block and line breaks, deletion, select-all and
//! history commands, with their default keybindings.

pub mod editing;

use serde_json::Value;

use crate::dispatch::{CommandContext, payload_str};
use crate::error::{HandlerFailure, Result};
use crate::registry::{Plugin, Resource};
use crate::selection::{Position, SelectionUpdate};

#[cfg(test)]
mod tests;

pub const INSERT_TEXT: &str = "insert_text";
pub const INSERT_PARAGRAPH_BREAK: &str = "insert_paragraph_break";
pub const INSERT_LINE_BREAK: &str = "insert_line_break";
pub const DELETE_BACKWARD: &str = "delete_backward";
pub const DELETE_FORWARD: &str = "delete_forward";
pub const SELECT_ALL: &str = "select_all";
pub const UNDO: &str = "undo";
pub const REDO: &str = "redo";

type HandlerResult = std::result::Result<Option<Value>, HandlerFailure>;

/// Text editing, deletion and history commands.
#[derive(Clone, Copy, Debug, Default)]
pub struct CorePlugin;

impl CorePlugin {
    pub const NAME: &'static str = "core";
}

impl Plugin for CorePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resources(&self) -> Result<Vec<Resource>> {
        Ok(vec![
            Resource::command(INSERT_TEXT, insert_text),
            Resource::command(INSERT_PARAGRAPH_BREAK, insert_paragraph_break),
            Resource::command(INSERT_LINE_BREAK, insert_line_break),
            Resource::command(DELETE_BACKWARD, delete_backward),
            Resource::command(DELETE_FORWARD, delete_forward),
            Resource::command(SELECT_ALL, select_all),
            Resource::command(UNDO, |ctx, _| Ok(Some(Value::Bool(ctx.undo()?)))),
            Resource::command(REDO, |ctx, _| Ok(Some(Value::Bool(ctx.redo()?)))),
            Resource::keybinding("Enter", INSERT_PARAGRAPH_BREAK, Value::Null)?,
            Resource::keybinding("Shift+Enter", INSERT_LINE_BREAK, Value::Null)?,
            Resource::keybinding("Backspace", DELETE_BACKWARD, Value::Null)?,
            Resource::keybinding("Delete", DELETE_FORWARD, Value::Null)?,
            Resource::keybinding("Ctrl+A", SELECT_ALL, Value::Null)?,
            Resource::keybinding("Ctrl+Z", UNDO, Value::Null)?,
            Resource::keybinding("Ctrl+Y", REDO, Value::Null)?,
            Resource::keybinding("Ctrl+Shift+Z", REDO, Value::Null)?,
        ])
    }
}

/// `{ "text": "..." }`. Newlines become paragraph breaks.
fn insert_text(ctx: &mut CommandContext<'_>, payload: &Value) -> HandlerResult {
    let text = payload_str(payload, "text")?;
    let Some(selection) = ctx.selection() else {
        return Ok(None);
    };
    let (doc, schema) = ctx.doc_and_schema();
    let mut caret = editing::delete_selection(doc, schema, selection)?;
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            caret = editing::insert_paragraph_break(doc, schema, caret)?;
        }
        caret = editing::insert_text(doc, caret, line.trim_end_matches('\r'))?;
    }
    ctx.set_selection(caret)?;
    Ok(None)
}

fn insert_paragraph_break(ctx: &mut CommandContext<'_>, _payload: &Value) -> HandlerResult {
    let Some(selection) = ctx.selection() else {
        return Ok(None);
    };
    let (doc, schema) = ctx.doc_and_schema();
    let caret = editing::delete_selection(doc, schema, selection)?;
    let caret = editing::insert_paragraph_break(doc, schema, caret)?;
    ctx.set_selection(caret)?;
    Ok(None)
}

fn insert_line_break(ctx: &mut CommandContext<'_>, _payload: &Value) -> HandlerResult {
    let Some(selection) = ctx.selection() else {
        return Ok(None);
    };
    let (doc, schema) = ctx.doc_and_schema();
    let caret = editing::delete_selection(doc, schema, selection)?;
    let caret = editing::insert_line_break(doc, schema, caret)?;
    ctx.set_selection(caret)?;
    Ok(None)
}

fn delete_backward(ctx: &mut CommandContext<'_>, _payload: &Value) -> HandlerResult {
    let Some(selection) = ctx.selection() else {
        return Ok(None);
    };
    let (doc, schema) = ctx.doc_and_schema();
    let caret = if selection.is_collapsed() {
        editing::delete_backward(doc, schema, selection.focus)?
    } else {
        editing::delete_selection(doc, schema, selection)?
    };
    ctx.set_selection(caret)?;
    Ok(None)
}

fn delete_forward(ctx: &mut CommandContext<'_>, _payload: &Value) -> HandlerResult {
    let Some(selection) = ctx.selection() else {
        return Ok(None);
    };
    let (doc, schema) = ctx.doc_and_schema();
    let caret = if selection.is_collapsed() {
        editing::delete_forward(doc, schema, selection.focus)?
    } else {
        editing::delete_selection(doc, schema, selection)?
    };
    ctx.set_selection(caret)?;
    Ok(None)
}

fn select_all(ctx: &mut CommandContext<'_>, _payload: &Value) -> HandlerResult {
    let root = ctx.doc().root();
    let end = ctx.doc().size(root);
    ctx.set_selection(SelectionUpdate::range(
        Position::new(root, 0),
        Position::new(root, end),
    ))?;
    Ok(None)
}

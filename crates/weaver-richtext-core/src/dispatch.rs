//! Command handler context.
//!
//! Handlers receive a [`CommandContext`] borrowing the session. It exposes the
//! tree primitives, the selection model, history controls and nested dispatch.
//! Nested dispatch never closes a step; only the outermost
//! [`Session::dispatch`](crate::Session::dispatch) does.

use serde_json::Value;
use smol_str::SmolStr;

use crate::config::EditorConfig;
use crate::error::{EditorError, HandlerFailure, Result};
use crate::schema::Schema;
use crate::selection::{Position, Selection, SelectionUpdate};
use crate::session::Session;
use crate::tree::Document;

pub struct CommandContext<'a> {
    session: &'a mut Session,
    command: SmolStr,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(session: &'a mut Session, command: SmolStr) -> Self {
        Self { session, command }
    }

    /// Name of the command being handled.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn doc(&self) -> &Document {
        self.session.document()
    }

    /// Tree primitives. Every change is reported on the mutation bus.
    pub fn doc_mut(&mut self) -> &mut Document {
        self.session.doc_mut_unarmed()
    }

    /// Tree primitives together with the schema, for edits that need both.
    pub fn doc_and_schema(&mut self) -> (&mut Document, &Schema) {
        self.session.doc_and_schema()
    }

    pub fn schema(&self) -> &Schema {
        self.session.schema()
    }

    pub fn config(&self) -> &EditorConfig {
        self.session.config()
    }

    /// The live selection, kept up to date by the tree primitives.
    pub fn selection(&self) -> Option<Selection> {
        self.session.document().live_selection()
    }

    /// Set and normalize the selection.
    pub fn set_selection(&mut self, update: impl Into<SelectionUpdate>) -> Result<Selection> {
        self.session.set_selection(update.into(), true)
    }

    pub fn normalized_position(&self, position: Position) -> Result<Position> {
        self.session.normalized_position(position)
    }

    /// Dispatch another command within the current step.
    pub fn dispatch(&mut self, name: &str, payload: &Value) -> Result<Option<Value>> {
        self.session.dispatch(name, payload)
    }

    /// Mutate without recording into history.
    pub fn silently<R>(&mut self, f: impl FnOnce(&mut Document) -> R) -> R {
        self.session.silently(f)
    }

    pub fn pause_history(&mut self) {
        self.session.pause_history();
    }

    pub fn resume_history(&mut self) {
        self.session.resume_history();
    }

    pub fn revert_current_step(&mut self) -> Result<()> {
        self.session.revert_current_step()
    }

    pub fn undo(&mut self) -> Result<bool> {
        self.session.undo()
    }

    pub fn redo(&mut self) -> Result<bool> {
        self.session.redo()
    }
}

/// Wrap a handler failure, keeping errors that already name their command.
pub(crate) fn handler_error(command: &str, source: HandlerFailure) -> EditorError {
    match source.downcast::<EditorError>() {
        Ok(err) if matches!(*err, EditorError::Handler { .. }) => *err,
        Ok(err) => EditorError::Handler {
            command: SmolStr::new(command),
            source: err,
        },
        Err(source) => EditorError::Handler {
            command: SmolStr::new(command),
            source,
        },
    }
}

/// Read a string field from a command payload.
pub fn payload_str<'v>(payload: &'v Value, field: &str) -> std::result::Result<&'v str, HandlerFailure> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("payload field `{field}` must be a string").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_handler_errors_are_not_rewrapped() {
        let inner = EditorError::Handler {
            command: "inner".into(),
            source: "boom".into(),
        };
        let err = handler_error("outer", Box::new(inner));
        assert!(matches!(err, EditorError::Handler { command, .. } if command == "inner"));

        let err = handler_error("outer", "plain".into());
        assert!(matches!(err, EditorError::Handler { command, .. } if command == "outer"));
    }

    #[test]
    fn test_payload_str() {
        let payload = serde_json::json!({ "text": "hi", "n": 1 });
        assert_eq!(payload_str(&payload, "text").unwrap(), "hi");
        assert!(payload_str(&payload, "n").is_err());
    }
}

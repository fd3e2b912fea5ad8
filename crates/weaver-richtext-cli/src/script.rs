//! Edit scripts replayed against a session.
//!
//! A script is a JSON array of steps:
//!
//! ```json
//! [
//!   { "op": "caret", "text": "hello", "offset": 5 },
//!   { "op": "dispatch", "command": "insert_text", "payload": { "text": "!" } },
//!   { "op": "key", "chord": "Enter" },
//!   { "op": "undo" }
//! ]
//! ```

use miette::Diagnostic;
use serde::Deserialize;
use serde_json::Value;
use weaver_richtext_core::{
    EditorError, KeyChord, Position, SelectionUpdate, Session, SmolStr,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Collapse the selection inside the first text node containing `text`.
    Caret { text: String, offset: usize },
    /// Select from one text match to another.
    Select {
        anchor: String,
        anchor_offset: usize,
        focus: String,
        focus_offset: usize,
    },
    Dispatch {
        command: SmolStr,
        #[serde(default)]
        payload: Value,
    },
    Key { chord: String },
    Undo,
    Redo,
}

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ScriptError {
    #[error("invalid edit script")]
    #[diagnostic(code(weaver::cli::script), help("a script is a JSON array of `op` objects"))]
    Parse(#[source] serde_json::Error),

    #[error("step {index}: no text node contains {text:?}")]
    #[diagnostic(code(weaver::cli::no_match))]
    NoMatch { index: usize, text: String },

    #[error("step {index} failed")]
    #[diagnostic(code(weaver::cli::step))]
    Step {
        index: usize,
        #[source]
        #[diagnostic_source]
        source: EditorError,
    },
}

pub fn parse(json: &str) -> Result<Vec<Step>, ScriptError> {
    serde_json::from_str(json).map_err(ScriptError::Parse)
}

/// What a replay did, for the summary line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub steps: usize,
    /// Keys that matched no binding.
    pub unbound_keys: usize,
}

fn find_text(session: &Session, needle: &str, index: usize) -> Result<Position, ScriptError> {
    let doc = session.document();
    doc.descendants(doc.root())
        .into_iter()
        .find(|&n| doc.text(n).is_some_and(|t| t.contains(needle)))
        .map(|n| Position::new(n, 0))
        .ok_or_else(|| ScriptError::NoMatch {
            index,
            text: needle.to_string(),
        })
}

fn at(session: &Session, needle: &str, offset: usize, index: usize) -> Result<Position, ScriptError> {
    let start = find_text(session, needle, index)?;
    Ok(Position::new(start.node, offset))
}

pub fn replay(session: &mut Session, steps: &[Step]) -> Result<Report, ScriptError> {
    let mut report = Report::default();
    for (index, step) in steps.iter().enumerate() {
        let fail = |source| ScriptError::Step { index, source };
        tracing::debug!(step = index, ?step, "replaying step");
        match step {
            Step::Caret { text, offset } => {
                let caret = at(session, text, *offset, index)?;
                session
                    .set_selection(SelectionUpdate::caret(caret), true)
                    .map_err(fail)?;
            }
            Step::Select {
                anchor,
                anchor_offset,
                focus,
                focus_offset,
            } => {
                let anchor = at(session, anchor, *anchor_offset, index)?;
                let focus = at(session, focus, *focus_offset, index)?;
                session
                    .set_selection(SelectionUpdate::range(anchor, focus), true)
                    .map_err(fail)?;
            }
            Step::Dispatch { command, payload } => {
                session.dispatch(command, payload).map_err(fail)?;
            }
            Step::Key { chord } => {
                let chord: KeyChord = chord.parse().map_err(fail)?;
                if !session.dispatch_key(&chord).map_err(fail)? {
                    tracing::warn!(step = index, %chord, "key is not bound");
                    report.unbound_keys += 1;
                }
            }
            Step::Undo => {
                session.undo().map_err(fail)?;
            }
            Step::Redo => {
                session.redo().map_err(fail)?;
            }
        }
        report.steps += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_richtext_core::{CorePlugin, EditorConfig, MemorySelection, Plugin};

    fn session(html: &str) -> Session {
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(CorePlugin)];
        let mut session = Session::new(
            EditorConfig::default(),
            &plugins,
            Box::new(MemorySelection::new()),
        )
        .unwrap();
        session.reset_content(html).unwrap();
        session
    }

    #[test]
    fn test_parse_script() {
        let steps = parse(
            r#"[
                { "op": "caret", "text": "ab", "offset": 1 },
                { "op": "dispatch", "command": "delete_backward" },
                { "op": "key", "chord": "Ctrl+Z" }
            ]"#,
        )
        .unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Caret {
                    text: "ab".into(),
                    offset: 1
                },
                Step::Dispatch {
                    command: "delete_backward".into(),
                    payload: Value::Null
                },
                Step::Key {
                    chord: "Ctrl+Z".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_ops() {
        let err = parse(r#"[{ "op": "explode" }]"#).unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
    }

    #[test]
    fn test_replay_edits() {
        let mut session = session("<p>hello</p>");
        let steps = parse(
            r#"[
                { "op": "caret", "text": "hello", "offset": 5 },
                { "op": "dispatch", "command": "insert_text", "payload": { "text": " world" } },
                { "op": "key", "chord": "Enter" },
                { "op": "dispatch", "command": "insert_text", "payload": { "text": "second" } },
                { "op": "key", "chord": "F2" }
            ]"#,
        )
        .unwrap();
        let report = replay(&mut session, &steps).unwrap();
        assert_eq!(report, Report { steps: 5, unbound_keys: 1 });
        insta::assert_snapshot!(
            session.content_html().unwrap(),
            @"<p>hello world</p><p>second</p>"
        );
    }

    #[test]
    fn test_replay_range_and_undo() {
        let mut session = session("<p>one</p><p>two</p>");
        let steps = parse(
            r#"[
                { "op": "select", "anchor": "one", "anchor_offset": 1, "focus": "two", "focus_offset": 2 },
                { "op": "key", "chord": "Backspace" },
                { "op": "undo" },
                { "op": "redo" }
            ]"#,
        )
        .unwrap();
        replay(&mut session, &steps).unwrap();
        insta::assert_snapshot!(session.content_html().unwrap(), @"<p>oo</p>");
    }

    #[test]
    fn test_replay_reports_failing_step() {
        let mut session = session("<p>hello</p>");
        let steps = parse(
            r#"[
                { "op": "caret", "text": "hello", "offset": 0 },
                { "op": "dispatch", "command": "missing_command" }
            ]"#,
        )
        .unwrap();
        match replay(&mut session, &steps).unwrap_err() {
            ScriptError::Step { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(source, EditorError::UnknownCommand(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = replay(
            &mut session,
            &[Step::Caret {
                text: "absent".into(),
                offset: 0,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::NoMatch { index: 0, .. }));
    }
}

use std::sync::Arc;

use serde_json::{Value, json};

use super::*;
use crate::registry::{KeyChord, Registry};
use crate::schema::Schema;
use crate::test_utils::{render_session, session_with, session_with_plugins};
use crate::tree::{Document, NodeId};

fn run(html: &str, command: &str, payload: Value) -> String {
    let mut session = session_with(html);
    session.dispatch(command, &payload).unwrap();
    render_session(&session)
}

#[test]
fn test_core_keybindings() {
    let registry = Registry::from_plugins(&[Box::new(CorePlugin) as Box<dyn Plugin>]).unwrap();
    let bound = |chord: &str| {
        registry
            .keybinding(&chord.parse::<KeyChord>().unwrap())
            .map(|b| b.command.to_string())
    };
    assert_eq!(bound("Enter").as_deref(), Some(INSERT_PARAGRAPH_BREAK));
    assert_eq!(bound("shift+Enter").as_deref(), Some(INSERT_LINE_BREAK));
    assert_eq!(bound("Ctrl+Shift+z").as_deref(), Some(REDO));
    assert_eq!(bound("Ctrl+a").as_deref(), Some(SELECT_ALL));
    assert_eq!(bound("Alt+Enter"), None);
}

#[test]
fn test_typing_replaces_selection() {
    insta::assert_snapshot!(
        run("<p>a[bc</p><p>de]f</p>", INSERT_TEXT, json!({ "text": "X" })),
        @"<p>aX[]f</p>"
    );
}

#[test]
fn test_multiline_text_splits_blocks() {
    insta::assert_snapshot!(
        run("<p>a[]b</p>", INSERT_TEXT, json!({ "text": "1\r\n2" })),
        @"<p>a1</p><p>2[]b</p>"
    );
}

#[test]
fn test_insert_text_requires_text_payload() {
    let mut session = session_with("<p>a[]</p>");
    let err = session
        .dispatch(INSERT_TEXT, &json!({ "txt": "oops" }))
        .unwrap_err();
    assert!(matches!(err, crate::EditorError::Handler { .. }));
    assert_eq!(render_session(&session), "<p>a[]</p>");
}

#[test]
fn test_enter_at_end_leaves_placeholder() {
    insta::assert_snapshot!(
        run("<p>ab[]</p>", INSERT_PARAGRAPH_BREAK, Value::Null),
        @"<p>ab</p><p>[]<br></p>"
    );
}

#[test]
fn test_enter_over_range() {
    insta::assert_snapshot!(
        run("<p>a[b</p><p>c]d</p>", INSERT_PARAGRAPH_BREAK, Value::Null),
        @"<p>a</p><p>[]d</p>"
    );
}

#[test]
fn test_line_break_at_end_of_block() {
    insta::assert_snapshot!(
        run("<p>ab[]</p>", INSERT_LINE_BREAK, Value::Null),
        @"<p>ab<br>[]<br></p>"
    );
}

#[test]
fn test_backspace_joins_blocks_and_undo_splits_them() {
    let mut session = session_with("<p>ab</p><p>[]cd</p>");
    session.dispatch(DELETE_BACKWARD, &Value::Null).unwrap();
    assert_eq!(render_session(&session), "<p>ab[]cd</p>");
    session.undo().unwrap();
    assert_eq!(render_session(&session), "<p>ab</p><p>[]cd</p>");
}

#[test]
fn test_backspace_in_first_block_is_a_no_op() {
    let mut session = session_with("<p>[]ab</p>");
    session.dispatch(DELETE_BACKWARD, &Value::Null).unwrap();
    assert_eq!(render_session(&session), "<p>[]ab</p>");
    assert_eq!(session.history_len(), 0);
}

#[test]
fn test_backspace_empties_last_character() {
    // The emptied block gets its placeholder back when the step closes.
    insta::assert_snapshot!(
        run("<p>a[]</p>", DELETE_BACKWARD, Value::Null),
        @"<p>[]<br></p>"
    );
}

#[test]
fn test_delete_pulls_next_block() {
    insta::assert_snapshot!(
        run("<h1>ti[]</h1><p>tle</p>", DELETE_FORWARD, Value::Null),
        @"<h1>ti[]tle</h1>"
    );
}

#[test]
fn test_delete_removes_horizontal_rule() {
    insta::assert_snapshot!(
        run("<p>a[]</p><hr><p>b</p>", DELETE_FORWARD, Value::Null),
        @"<p>a[]</p><p>b</p>"
    );
}

#[test]
fn test_select_all_then_type() {
    let mut session = session_with("<p>one</p><ul><li>t[]wo</li></ul>");
    session.dispatch(SELECT_ALL, &Value::Null).unwrap();
    assert_eq!(
        render_session(&session),
        "[<p>one</p><ul><li>two</li></ul>]"
    );
    session
        .dispatch(INSERT_TEXT, &json!({ "text": "new" }))
        .unwrap();
    assert_eq!(render_session(&session), "<p>new[]</p>");
}

#[test]
fn test_undo_command_reports_result() {
    let mut session = session_with("<p>a[]</p>");
    assert_eq!(
        session.dispatch(UNDO, &Value::Null).unwrap(),
        Some(Value::Bool(false))
    );
    session.dispatch(INSERT_TEXT, &json!({ "text": "b" })).unwrap();
    assert_eq!(
        session.dispatch(UNDO, &Value::Null).unwrap(),
        Some(Value::Bool(true))
    );
    assert_eq!(
        session.dispatch(REDO, &Value::Null).unwrap(),
        Some(Value::Bool(true))
    );
    assert_eq!(render_session(&session), "<p>ab[]</p>");
}

/// Claims `figure` children as blocks and drops `<font>` wrappers.
struct Figures;

impl Plugin for Figures {
    fn name(&self) -> &str {
        "figures"
    }

    fn dependencies(&self) -> &[&str] {
        &[CorePlugin::NAME]
    }

    fn resources(&self) -> Result<Vec<Resource>> {
        let strip_fonts = |doc: &mut Document, _: &Schema, root: NodeId| -> Result<()> {
            for node in doc.descendants(root) {
                if doc.is_tag(node, "font") && doc.parent(node).is_some() {
                    doc.unwrap(node)?;
                }
            }
            Ok(())
        };
        Ok(vec![
            Resource::BlockTag("figcaption".into()),
            Resource::NormalizationHook(Arc::new(strip_fonts)),
        ])
    }
}

#[test]
fn test_plugin_hooks_and_block_claims() {
    let mut session = session_with_plugins(
        "<figure><figcaption>cap[]</figcaption></figure>",
        vec![Box::new(CorePlugin), Box::new(Figures)],
    );
    assert!(session.schema().is_block_tag("figcaption"));

    session
        .dispatch(INSERT_TEXT, &json!({ "text": "!" }))
        .unwrap();
    let caption = session
        .document()
        .descendants(session.document().root())
        .into_iter()
        .find(|&n| session.document().is_tag(n, "figcaption"))
        .unwrap();
    let root = session.document().root();
    let doc = session.document_mut();
    let font = doc.create_element("font");
    let inner = doc.create_text("x");
    doc.append_child(font, inner).unwrap();
    doc.append_child(caption, font).unwrap();
    session.close_step().unwrap();
    insta::assert_snapshot!(
        session.content_html().unwrap(),
        @"<figure><figcaption>cap!x</figcaption></figure>"
    );
    assert!(!session.normalize(root).unwrap());
}

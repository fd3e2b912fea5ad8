//! WASM browser tests for weaver-richtext-browser.
//!
//! Run with: `wasm-pack test --headless --firefox` or `--chrome`

use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

use serde_json::Value;
use weaver_richtext_browser::events::chord_from_parts;
use weaver_richtext_browser::weaver_richtext_core::commands::{
    DELETE_BACKWARD, INSERT_PARAGRAPH_BREAK, INSERT_TEXT, UNDO,
};
use weaver_richtext_browser::weaver_richtext_core::{
    CorePlugin, EditorConfig, Plugin, Position, SelectionUpdate,
};
use weaver_richtext_browser::{
    BeforeInputContext, BeforeInputResult, BrowserEditor, InputType, command_for,
    handle_beforeinput, parse_browser_input_type,
};

fn host(html: &str) -> web_sys::HtmlElement {
    let document = web_sys::window().unwrap().document().unwrap();
    let element = document.create_element("div").unwrap();
    element.set_inner_html(html);
    document.body().unwrap().append_child(&element).unwrap();
    element.unchecked_into()
}

fn attach(html: &str) -> (BrowserEditor, web_sys::HtmlElement) {
    let root = host(html);
    let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(CorePlugin)];
    let editor = BrowserEditor::attach(root.clone(), EditorConfig::default(), &plugins).unwrap();
    (editor, root)
}

/// Caret at the end of the first text node.
fn caret_at_end_of_text(editor: &mut BrowserEditor) {
    let doc = editor.session().document();
    let text = doc
        .descendants(doc.root())
        .into_iter()
        .find(|&n| doc.is_text(n))
        .unwrap();
    let end = doc.size(text);
    editor
        .session_mut()
        .set_selection(SelectionUpdate::caret(Position::new(text, end)), false)
        .unwrap();
}

// === InputType parsing tests ===

#[wasm_bindgen_test]
fn test_parse_input_types() {
    assert_eq!(parse_browser_input_type("insertText"), InputType::InsertText);
    assert_eq!(
        parse_browser_input_type("deleteContentBackward"),
        InputType::DeleteContentBackward
    );
    match parse_browser_input_type("formatBold") {
        InputType::Unknown(s) => assert_eq!(s, "formatBold"),
        other => panic!("Expected Unknown variant, got {other:?}"),
    }
}

#[wasm_bindgen_test]
fn test_command_mapping() {
    let (command, payload) = command_for(&InputType::InsertText, Some("hi")).unwrap();
    assert_eq!(command, INSERT_TEXT);
    assert_eq!(payload["text"], "hi");
    assert_eq!(
        command_for(&InputType::InsertParagraph, None),
        Some((INSERT_PARAGRAPH_BREAK, Value::Null))
    );
    assert_eq!(
        command_for(&InputType::DeleteContentBackward, None),
        Some((DELETE_BACKWARD, Value::Null))
    );
    assert_eq!(command_for(&InputType::HistoryUndo, None), Some((UNDO, Value::Null)));
    assert_eq!(command_for(&InputType::InsertText, None), None);
    assert_eq!(command_for(&InputType::InsertCompositionText, Some("x")), None);
}

// === Mirror tests ===

#[wasm_bindgen_test]
fn test_attach_normalizes_and_mirrors() {
    let (editor, root) = attach("loose text");
    assert_eq!(root.inner_html(), "<p>loose text</p>");
    assert_eq!(editor.content_html().unwrap(), "<p>loose text</p>");
    assert_eq!(root.get_attribute("contenteditable").as_deref(), Some("true"));
}

#[wasm_bindgen_test]
fn test_commands_update_dom_and_selection() {
    let (mut editor, root) = attach("<p>hello</p>");
    caret_at_end_of_text(&mut editor);

    let ctx = BeforeInputContext::new(InputType::InsertText).with_data(" world");
    let result = handle_beforeinput(editor.session_mut(), &ctx).unwrap();
    assert_eq!(result, BeforeInputResult::Handled);
    assert_eq!(root.inner_html(), "<p>hello world</p>");

    let ctx = BeforeInputContext::new(InputType::InsertParagraph);
    handle_beforeinput(editor.session_mut(), &ctx).unwrap();
    assert_eq!(root.inner_html(), "<p>hello world</p><p><br></p>");

    // The native caret follows the session into the new block.
    let native = web_sys::window().unwrap().get_selection().unwrap().unwrap();
    let focus = native.focus_node().unwrap();
    let second = root.last_element_child().unwrap();
    let second: &web_sys::Node = second.as_ref();
    assert!(second.is_same_node(Some(&focus)));
}

#[wasm_bindgen_test]
fn test_undo_restores_dom_nodes() {
    let (mut editor, root) = attach("<p>ab</p><p>cd</p>");
    let first_p = root.first_element_child().unwrap();

    let doc = editor.session().document();
    let blocks = doc.children(doc.root()).to_vec();
    let second_text = doc.first_child(blocks[1]).unwrap();
    editor
        .session_mut()
        .set_selection(SelectionUpdate::caret(Position::new(second_text, 0)), false)
        .unwrap();

    let ctx = BeforeInputContext::new(InputType::DeleteContentBackward);
    handle_beforeinput(editor.session_mut(), &ctx).unwrap();
    assert_eq!(root.inner_html(), "<p>abcd</p>");

    let ctx = BeforeInputContext::new(InputType::HistoryUndo);
    handle_beforeinput(editor.session_mut(), &ctx).unwrap();
    assert_eq!(root.inner_html(), "<p>ab</p><p>cd</p>");
    let restored = root.first_element_child().unwrap();
    let restored: &web_sys::Node = restored.as_ref();
    assert!(first_p.is_same_node(Some(restored)));
}

#[wasm_bindgen_test]
fn test_composition_passes_through() {
    let (mut editor, root) = attach("<p>hello</p>");
    caret_at_end_of_text(&mut editor);

    let mut ctx = BeforeInputContext::new(InputType::InsertText).with_data("x");
    ctx.is_composing = true;
    let result = handle_beforeinput(editor.session_mut(), &ctx).unwrap();
    assert_eq!(result, BeforeInputResult::PassThrough);
    assert_eq!(root.inner_html(), "<p>hello</p>");
}

#[wasm_bindgen_test]
fn test_native_typing_is_adopted() {
    let (mut editor, root) = attach("<p>hello</p>");
    let text_node = root.first_element_child().unwrap().first_child().unwrap();
    text_node.set_node_value(Some("hello!"));

    editor.observe_text_input(&text_node).unwrap();
    assert_eq!(editor.content_html().unwrap(), "<p>hello!</p>");
    assert!(editor.session().can_undo());
}

#[wasm_bindgen_test]
fn test_unknown_text_node_is_rejected() {
    let (mut editor, _root) = attach("<p>hello</p>");
    let document = web_sys::window().unwrap().document().unwrap();
    let stray: web_sys::Node = document.create_text_node("stray").unchecked_into();
    assert!(editor.observe_text_input(&stray).is_err());
    assert_eq!(editor.content_html().unwrap(), "<p>hello</p>");
}

// === Keyboard tests ===

#[wasm_bindgen_test]
fn test_keybindings_dispatch() {
    let (mut editor, root) = attach("<p>hello</p>");
    caret_at_end_of_text(&mut editor);

    let enter = chord_from_parts("Enter", false, false, false, false);
    assert!(editor.session_mut().dispatch_key(&enter).unwrap());
    assert_eq!(root.inner_html(), "<p>hello</p><p><br></p>");

    let undo = chord_from_parts("z", true, false, false, false);
    assert!(editor.session_mut().dispatch_key(&undo).unwrap());
    assert_eq!(root.inner_html(), "<p>hello</p>");

    let unbound = chord_from_parts("q", false, false, true, false);
    assert!(!editor.session_mut().dispatch_key(&unbound).unwrap());
}

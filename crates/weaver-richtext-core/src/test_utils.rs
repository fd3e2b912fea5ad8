//! Markup fixtures with selection markers.
//!
//! `[` marks the anchor and `]` the focus. Markers inside text become char
//! offsets; a marker alone between elements becomes a child index.

use std::cmp::Ordering;

use crate::commands::CorePlugin;
use crate::config::EditorConfig;
use crate::registry::Plugin;
use crate::selection::{MemorySelection, Position, Selection, direction_of};
use crate::session::Session;
use crate::tree::{Document, NodeId, markup};

const ANCHOR: char = '[';
const FOCUS: char = ']';

/// Build a document whose root holds `html`, returning the marked selection.
pub fn parse_doc(html: &str) -> (Document, Option<Selection>) {
    let mut doc = Document::new();
    let root = doc.root();
    let selection = load_into(&mut doc, root, html);
    doc.take_records();
    (doc, selection)
}

/// Append `html` to `root`, returning the marked selection.
pub fn load_into(doc: &mut Document, root: NodeId, html: &str) -> Option<Selection> {
    for node in markup::parse_fragment(doc, html).unwrap() {
        doc.append_child(root, node).unwrap();
    }
    take_markers(doc, root)
}

/// Strip the selection markers found under `root`, returning the selection.
pub fn take_markers(doc: &mut Document, root: NodeId) -> Option<Selection> {
    let mut anchor = None;
    let mut focus = None;
    for node in doc.descendants(root) {
        let Some(text) = doc.text(node).map(str::to_string) else {
            continue;
        };
        if !text.contains([ANCHOR, FOCUS]) {
            continue;
        }
        let mut cleaned = String::new();
        let mut found = Vec::new();
        for c in text.chars() {
            match c {
                ANCHOR | FOCUS => found.push((c, cleaned.chars().count())),
                _ => cleaned.push(c),
            }
        }
        let positions: Vec<(char, Position)> = if cleaned.is_empty() {
            let parent = doc.parent(node).unwrap();
            let index = doc.index_of(node).unwrap();
            doc.remove(node).unwrap();
            found
                .into_iter()
                .map(|(c, _)| (c, Position::new(parent, index)))
                .collect()
        } else {
            doc.set_text(node, cleaned).unwrap();
            found
                .into_iter()
                .map(|(c, offset)| (c, Position::new(node, offset)))
                .collect()
        };
        for (c, position) in positions {
            if c == ANCHOR {
                anchor = Some(position);
            } else {
                focus = Some(position);
            }
        }
    }

    let anchor = anchor?;
    let focus = focus.unwrap_or(anchor);
    Some(Selection::new(anchor, focus, direction_of(doc, anchor, focus)))
}

/// A session with the core commands over `html`, selection markers applied.
///
/// Markers must sit inside text: the content is normalized before they are removed.
pub fn session_with(html: &str) -> Session {
    session_with_plugins(html, vec![Box::new(CorePlugin)])
}

pub fn session_with_plugins(html: &str, plugins: Vec<Box<dyn Plugin>>) -> Session {
    let mut session = Session::new(
        EditorConfig::default(),
        &plugins,
        Box::new(MemorySelection::new()),
    )
    .unwrap();
    session.reset_content(html).unwrap();
    let selection = session.silently(|doc| {
        let root = doc.root();
        take_markers(doc, root)
    });
    if let Some(selection) = selection {
        session.set_selection(selection.into(), false).unwrap();
    }
    session
}

/// Markup of the session's content with its live selection drawn in.
pub fn render_session(session: &Session) -> String {
    render(session.document(), session.document().live_selection())
}

/// Markup of the root children with the selection drawn in.
pub fn render(doc: &Document, selection: Option<Selection>) -> String {
    let Some(selection) = selection else {
        return markup::inner_html(doc, doc.root());
    };
    let mut doc = doc.clone();
    let backwards = doc.compare_positions(selection.anchor, selection.focus) == Ordering::Greater;
    let (start, end) = if backwards {
        (selection.focus, selection.anchor)
    } else {
        (selection.anchor, selection.focus)
    };
    let (start_marker, end_marker) = if backwards {
        (FOCUS, ANCHOR)
    } else {
        (ANCHOR, FOCUS)
    };
    doc.silently(|doc| {
        insert_marker(doc, end, end_marker);
        insert_marker(doc, start, start_marker);
    });
    markup::inner_html(&doc, doc.root())
}

fn insert_marker(doc: &mut Document, position: Position, marker: char) {
    if doc.is_text(position.node) {
        doc.insert_text(position.node, position.offset, &marker.to_string())
            .unwrap();
    } else {
        let before = doc.child(position.node, position.offset);
        let text = doc.create_text(marker.to_string());
        doc.insert_before(position.node, text, before).unwrap();
    }
}

/// First text node whose content equals `text`.
pub fn find_text(doc: &Document, text: &str) -> NodeId {
    doc.descendants(doc.root())
        .into_iter()
        .find(|&n| doc.text(n) == Some(text))
        .unwrap_or_else(|| panic!("no text node {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_roundtrip() {
        for html in [
            "<p>a[]b</p>",
            "<p>a[b</p><p>c]d</p>",
            "<p>a]b[c</p>",
            "<p>[]<br></p>",
        ] {
            let (doc, selection) = parse_doc(html);
            assert_eq!(render(&doc, selection), html);
        }
    }

    #[test]
    fn test_element_marker() {
        let (doc, selection) = parse_doc("<p>[]<br></p>");
        let p = doc.first_child(doc.root()).unwrap();
        assert_eq!(selection.unwrap().anchor, Position::new(p, 0));
    }
}

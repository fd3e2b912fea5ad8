//! HTML fragment reading and writing.
//!
//! This is a lenient fragment parser, not an HTML5 tree builder: comments and
//! doctypes are dropped, unmatched end tags are ignored and unclosed elements
//! are closed at the end of input. Tag and attribute names are ASCII
//! `[A-Za-z0-9:_-]`, lowercased.

use smol_str::SmolStr;

use crate::error::Result;
use crate::schema::is_void_tag;

use super::document::Document;
use super::node::{NodeData, NodeId};

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Text(String),
    Start {
        name: SmolStr,
        attributes: Vec<(SmolStr, String)>,
        self_closing: bool,
    },
    End(SmolStr),
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            push_text(&mut out, decode_entities(&input[start..i]));
            continue;
        }

        if input[i..].starts_with("<!--") {
            match input[i + 4..].find("-->") {
                Some(end) => i += 4 + end + 3,
                None => break,
            }
            continue;
        }
        if input[i..].starts_with("<!") || input[i..].starts_with("<?") {
            match input[i..].find('>') {
                Some(end) => i += end + 1,
                None => break,
            }
            continue;
        }

        let closing = bytes.get(i + 1) == Some(&b'/');
        let name_start = if closing { i + 2 } else { i + 1 };
        let mut j = name_start;
        while j < bytes.len() && is_name_byte(bytes[j]) {
            j += 1;
        }
        if j == name_start {
            // A lone `<` is text.
            push_text(&mut out, "<".to_string());
            i += 1;
            continue;
        }
        let name = SmolStr::new(input[name_start..j].to_ascii_lowercase());

        if closing {
            while j < bytes.len() && bytes[j] != b'>' {
                j += 1;
            }
            out.push(Token::End(name));
            i = (j + 1).min(bytes.len());
            continue;
        }

        let mut attributes: Vec<(SmolStr, String)> = Vec::new();
        let mut self_closing = false;
        let mut k = j;
        loop {
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k >= bytes.len() {
                break;
            }
            match bytes[k] {
                b'>' => {
                    k += 1;
                    break;
                }
                b'/' => {
                    self_closing = true;
                    k += 1;
                    continue;
                }
                _ => {}
            }
            let attr_start = k;
            while k < bytes.len() && is_name_byte(bytes[k]) {
                k += 1;
            }
            if k == attr_start {
                // Skip garbage we cannot name.
                k += 1;
                continue;
            }
            let attr_name = SmolStr::new(input[attr_start..k].to_ascii_lowercase());
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            let mut value = String::new();
            if bytes.get(k) == Some(&b'=') {
                k += 1;
                while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                    k += 1;
                }
                match bytes.get(k) {
                    Some(&quote @ (b'"' | b'\'')) => {
                        let value_start = k + 1;
                        let value_end = input[value_start..]
                            .find(quote as char)
                            .map(|e| value_start + e)
                            .unwrap_or(bytes.len());
                        value = decode_entities(&input[value_start..value_end]);
                        k = (value_end + 1).min(bytes.len());
                    }
                    Some(_) => {
                        let value_start = k;
                        while k < bytes.len()
                            && !bytes[k].is_ascii_whitespace()
                            && bytes[k] != b'>'
                        {
                            k += 1;
                        }
                        value = decode_entities(&input[value_start..k]);
                    }
                    None => {}
                }
            }
            if !attributes.iter().any(|(n, _)| *n == attr_name) {
                attributes.push((attr_name, value));
            }
        }
        out.push(Token::Start {
            name,
            attributes,
            self_closing,
        });
        i = k;
    }
    out
}

fn push_text(out: &mut Vec<Token>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(Token::Text(prev)) = out.last_mut() {
        prev.push_str(&text);
    } else {
        out.push(Token::Text(text));
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..].find(';').filter(|&e| e <= 10).and_then(|end| {
            let entity = &rest[1..1 + end];
            decode_entity(entity).map(|c| (c, end + 2))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Parse `html` into detached nodes of `doc`, returning the top-level nodes in order.
///
/// Nothing is reported on the mutation bus: the nodes are not attached yet.
pub fn parse_fragment(doc: &mut Document, html: &str) -> Result<Vec<NodeId>> {
    let mut roots = Vec::new();
    let mut stack: Vec<NodeId> = Vec::new();

    for token in tokenize(html) {
        match token {
            Token::Text(text) => {
                let node = doc.create_text(text);
                attach(doc, &mut roots, &stack, node)?;
            }
            Token::Start {
                name,
                attributes,
                self_closing,
            } => {
                let node = doc.create_element_with(name.as_str(), attributes);
                attach(doc, &mut roots, &stack, node)?;
                if !self_closing && !is_void_tag(&name) {
                    stack.push(node);
                }
            }
            Token::End(name) => {
                if let Some(depth) = stack
                    .iter()
                    .rposition(|&open| doc.tag(open) == Some(name.as_str()))
                {
                    stack.truncate(depth);
                }
            }
        }
    }
    Ok(roots)
}

fn attach(
    doc: &mut Document,
    roots: &mut Vec<NodeId>,
    stack: &[NodeId],
    node: NodeId,
) -> Result<()> {
    match stack.last() {
        Some(&parent) => doc.append_child(parent, node),
        None => {
            roots.push(node);
            Ok(())
        }
    }
}

/// Markup of `node` itself and its subtree.
pub fn outer_html(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, &mut out);
    out
}

/// Markup of the children of `node`.
pub fn inner_html(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    for &child in doc.children(node) {
        write_node(doc, child, &mut out);
    }
    out
}

fn write_node(doc: &Document, node: NodeId, out: &mut String) {
    let Some(n) = doc.get(node) else {
        return;
    };
    match n.data() {
        NodeData::Text { text } => escape_into(text, false, out),
        NodeData::Element {
            tag,
            attributes,
            children,
        } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            out.push('>');
            if is_void_tag(tag) {
                return;
            }
            for &child in children {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

pub(crate) fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

//! Structural normalization.
//!
//! A pass applies plugin hooks and then the built-in rules; passes repeat until
//! the tree stops changing, which makes [`Normalizer::normalize`] idempotent.
//! Protected and transient subtrees are left alone, except below an inner
//! `data-oe-protected="false"` that re-enables them.

use crate::config::EditorConfig;
use crate::error::Result;
use crate::registry::NormalizationHook;
use crate::schema::{self, Schema, is_inline_formatting_tag, is_void_tag};
use crate::tree::{Document, NodeId};

const MAX_PASSES: usize = 8;

/// Blocks that hold other blocks rather than text; they never get a placeholder.
const CONTAINER_BLOCK_TAGS: &[&str] = &["ul", "ol", "table", "thead", "tbody", "tfoot", "tr"];

pub struct Normalizer {
    hooks: Vec<NormalizationHook>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Normalizer {
    pub fn new(hooks: Vec<NormalizationHook>) -> Self {
        Self { hooks }
    }

    /// Normalize the subtree under `root`. Returns whether anything changed.
    pub fn normalize(
        &self,
        doc: &mut Document,
        schema: &Schema,
        config: &EditorConfig,
        root: NodeId,
    ) -> Result<bool> {
        let start = doc.version();
        for pass in 0..MAX_PASSES {
            let before = doc.version();
            for hook in &self.hooks {
                hook(doc, schema, root)?;
            }
            let rules = Rules { schema, config };
            rules.visit(doc, root)?;
            if doc.version() == before {
                let changed = doc.version() != start;
                if changed {
                    tracing::debug!(
                        target: "weaver::normalize",
                        passes = pass + 1,
                        "normalized subtree {root}"
                    );
                }
                return Ok(changed);
            }
        }
        tracing::warn!(
            target: "weaver::normalize",
            "normalization of {root} did not settle after {MAX_PASSES} passes"
        );
        Ok(true)
    }
}

struct Rules<'a> {
    schema: &'a Schema,
    config: &'a EditorConfig,
}

fn is_skipped(doc: &Document, node: NodeId) -> bool {
    schema::is_protected(doc, node) || schema::is_transient(doc, node)
}

impl Rules<'_> {
    fn visit(&self, doc: &mut Document, node: NodeId) -> Result<()> {
        for child in doc.children(node).to_vec() {
            if doc.is_element(child) {
                self.visit(doc, child)?;
            }
        }
        if is_skipped(doc, node) || !doc.is_element(node) {
            return Ok(());
        }
        self.clean_children(doc, node)?;
        if node == doc.root() {
            self.fix_root(doc, node)?;
        } else if self.schema.is_block(doc, node) {
            self.fix_block(doc, node)?;
        }
        Ok(())
    }

    fn clean_children(&self, doc: &mut Document, parent: NodeId) -> Result<()> {
        for child in doc.children(parent).to_vec() {
            if doc.text(child).is_some_and(str::is_empty) {
                doc.remove(child)?;
                continue;
            }
            if !self.is_formatting(doc, child) || is_skipped(doc, child) {
                continue;
            }
            if doc.children(child).is_empty() {
                doc.remove(child)?;
            } else if doc.is_tag(child, "span") && doc.attributes(child).is_empty() {
                doc.unwrap(child)?;
            }
        }

        let mut index = 0;
        while index + 1 < doc.children(parent).len() {
            let (Some(left), Some(right)) =
                (doc.child(parent, index), doc.child(parent, index + 1))
            else {
                break;
            };
            if self.mergeable(doc, left, right) {
                doc.move_children(right, left)?;
                doc.remove(right)?;
            } else {
                index += 1;
            }
        }
        Ok(())
    }

    fn is_formatting(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node)
            .is_some_and(|tag| is_inline_formatting_tag(tag) && !self.schema.is_block_tag(tag))
    }

    fn mergeable(&self, doc: &Document, left: NodeId, right: NodeId) -> bool {
        if !self.is_formatting(doc, left) || doc.tag(left) != doc.tag(right) {
            return false;
        }
        if is_skipped(doc, left) || is_skipped(doc, right) {
            return false;
        }
        let mut a = doc.attributes(left).to_vec();
        let mut b = doc.attributes(right).to_vec();
        a.sort();
        b.sort();
        a == b
    }

    fn fix_block(&self, doc: &mut Document, block: NodeId) -> Result<()> {
        let Some(tag) = doc.tag(block) else {
            return Ok(());
        };
        if is_void_tag(tag) || CONTAINER_BLOCK_TAGS.contains(&tag) {
            return Ok(());
        }

        if doc.children(block).is_empty() {
            let br = doc.create_element("br");
            doc.append_child(block, br)?;
            return Ok(());
        }

        // A trailing placeholder after visible content renders nothing.
        let children = doc.children(block);
        if let [.., prev, last] = children {
            let (prev, last) = (*prev, *last);
            if doc.is_tag(last, "br") && !doc.is_tag(prev, "br") {
                doc.remove(last)?;
            }
        }
        Ok(())
    }

    fn fix_root(&self, doc: &mut Document, root: NodeId) -> Result<()> {
        if !self.config.allow_inline_at_root {
            let mut run: Vec<NodeId> = Vec::new();
            for child in doc.children(root).to_vec() {
                if self.is_root_inline(doc, child) {
                    run.push(child);
                } else {
                    self.wrap_run(doc, root, std::mem::take(&mut run))?;
                }
            }
            self.wrap_run(doc, root, run)?;
        }

        if doc.children(root).is_empty() {
            let block = doc.create_element(self.schema.default_block());
            let br = doc.create_element("br");
            doc.append_child(block, br)?;
            doc.append_child(root, block)?;
        }
        Ok(())
    }

    fn is_root_inline(&self, doc: &Document, node: NodeId) -> bool {
        self.schema.is_inline(doc, node) && !(doc.is_element(node) && is_skipped(doc, node))
    }

    fn wrap_run(&self, doc: &mut Document, root: NodeId, run: Vec<NodeId>) -> Result<()> {
        let Some(&first) = run.first() else {
            return Ok(());
        };
        let blank = run
            .iter()
            .all(|&n| doc.text(n).is_some_and(|t| t.trim().is_empty()));
        if blank {
            for node in run {
                doc.remove(node)?;
            }
            return Ok(());
        }
        let block = doc.create_element(self.schema.default_block());
        doc.insert_before(root, block, Some(first))?;
        for node in run {
            doc.append_child(block, node)?;
        }
        Ok(())
    }
}

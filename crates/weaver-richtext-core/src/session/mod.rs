//! Editing session: one document with its registry, history and selection.
//!
//! The session is the single entry point for dispatch, undo, redo and history
//! controls. After every entry point it drains the document's mutation bus,
//! feeding each record to the mutation listeners and to history.

use std::sync::Arc;

use serde_json::Value;
use smol_str::SmolStr;

use crate::config::EditorConfig;
use crate::dispatch::{CommandContext, handler_error};
use crate::error::{EditorError, Result};
use crate::history::History;
use crate::mutation::MutationListener;
use crate::normalize::Normalizer;
use crate::registry::{KeyChord, Plugin, Registry};
use crate::schema::{self, Schema};
use crate::selection::{Position, Selection, SelectionModel, SelectionPlatform, SelectionUpdate};
use crate::serialize::{self, SerializedNode};
use crate::tree::{Document, NodeId, markup};


/// A change made to the tree outside the primitives, reported by the host.
///
/// `None` ids stand for nodes the host could not map to a document node.
#[derive(Clone, Debug, PartialEq)]
pub enum ExternalMutation {
    Text {
        target: Option<NodeId>,
        text: String,
    },
    Attribute {
        target: Option<NodeId>,
        name: SmolStr,
        value: Option<String>,
    },
    /// A fresh subtree was inserted; it is adopted with new ids.
    Insert {
        parent: Option<NodeId>,
        before: Option<NodeId>,
        node: SerializedNode,
    },
    Remove {
        target: Option<NodeId>,
    },
}

pub struct Session {
    doc: Document,
    registry: Arc<Registry>,
    schema: Schema,
    config: EditorConfig,
    history: History,
    selection: SelectionModel,
    normalizer: Normalizer,
    listeners: Vec<Box<dyn MutationListener>>,
    depth: u32,
    mute_listeners: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("history_len", &self.history.len())
            .field("history_cursor", &self.history.cursor())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session from an ordered plugin list.
    pub fn new(
        config: EditorConfig,
        plugins: &[Box<dyn Plugin>],
        platform: Box<dyn SelectionPlatform>,
    ) -> Result<Self> {
        let registry = Registry::from_plugins(plugins)?;
        Self::with_registry(config, registry, platform)
    }

    /// Create a session sharing an already frozen registry.
    pub fn with_registry(
        config: EditorConfig,
        registry: Arc<Registry>,
        platform: Box<dyn SelectionPlatform>,
    ) -> Result<Self> {
        config.validate()?;
        let schema = Schema::new(
            config.default_block.clone(),
            registry.block_tags().iter().cloned(),
        );
        let selection = SelectionModel::new(platform, registry.selection_hooks().to_vec());
        let normalizer = Normalizer::new(registry.normalization_hooks().to_vec());
        let mut session = Self {
            doc: Document::new(),
            history: History::new(&config),
            registry,
            schema,
            config,
            selection,
            normalizer,
            listeners: Vec::new(),
            depth: 0,
            mute_listeners: false,
        };
        session.reset_content("")?;
        Ok(session)
    }

    pub fn add_listener(&mut self, mut listener: Box<dyn MutationListener>) {
        listener.on_reset(&self.doc);
        self.listeners.push(listener);
    }

    // === Accessors ===

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Direct tree access for programmatic edits outside a command.
    ///
    /// Changes join the pending step; call [`Session::close_step`] to close it.
    pub fn document_mut(&mut self) -> &mut Document {
        if self.depth == 0 {
            self.history.begin(self.doc.live_selection());
        }
        &mut self.doc
    }

    pub(crate) fn doc_mut_unarmed(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub(crate) fn doc_and_schema(&mut self) -> (&mut Document, &Schema) {
        (&mut self.doc, &self.schema)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_cursor(&self) -> usize {
        self.history.cursor()
    }

    // === Mutation bus ===

    /// Drain the mutation bus into listeners and history.
    fn pump(&mut self) {
        for mutation in self.doc.take_records() {
            if !self.mute_listeners {
                for listener in &mut self.listeners {
                    listener.on_mutation(&self.doc, &mutation);
                }
            }
            self.history.record(&mutation, self.doc.live_selection());
        }
    }

    /// Run `f` with its mutations kept out of history.
    pub fn silently<R>(&mut self, f: impl FnOnce(&mut Document) -> R) -> R {
        let out = self.doc.silently(f);
        self.pump();
        out
    }

    // === Selection ===

    /// The current selection: the native one when it is inside the editable
    /// root, the last in-editable selection otherwise.
    pub fn get_selection(&mut self) -> Option<Selection> {
        if self.depth == 0 {
            self.selection.sync_from_platform(&mut self.doc)
        } else {
            self.doc.live_selection()
        }
    }

    pub fn set_selection(&mut self, update: SelectionUpdate, normalize: bool) -> Result<Selection> {
        self.pump();
        self.selection
            .set_selection(&mut self.doc, &self.schema, update, normalize)
    }

    pub fn normalized_position(&self, position: Position) -> Result<Position> {
        self.selection
            .normalized_position(&self.doc, &self.schema, position)
    }

    pub fn is_in_editable(&self) -> bool {
        self.selection.is_in_editable(&self.doc)
    }

    /// Re-normalize the live selection and push it to the native platform.
    fn restore_selection(&mut self, snapshot: Option<Selection>) -> Option<Selection> {
        self.selection
            .restore(&mut self.doc, &self.schema, snapshot);
        self.doc.live_selection()
    }

    // === Dispatch ===

    /// Run every handler registered for `name`, in registration order.
    ///
    /// The outermost call closes the step when all handlers succeed. On
    /// failure the partial mutations stay on the tree and in the pending step.
    pub fn dispatch(&mut self, name: &str, payload: &Value) -> Result<Option<Value>> {
        let outermost = self.depth == 0;
        if outermost {
            self.close_dirty_step()?;
            let pre = self.selection.sync_from_platform(&mut self.doc);
            self.history.begin(pre);
        }

        let result = self.run_handlers(name, payload);

        if outermost {
            match &result {
                Ok(_) => {
                    self.close_step()?;
                }
                Err(err) => {
                    self.pump();
                    self.history.disarm();
                    if matches!(err, EditorError::UnknownCommand(_)) {
                        tracing::debug!(target: "weaver::dispatch", command = name, "unknown command");
                    } else {
                        tracing::warn!(
                            target: "weaver::dispatch",
                            command = name,
                            error = %err,
                            "command failed, step left open"
                        );
                    }
                }
            }
        }
        result
    }

    fn run_handlers(&mut self, name: &str, payload: &Value) -> Result<Option<Value>> {
        let registry = Arc::clone(&self.registry);
        let handlers = registry.handlers(name);
        if handlers.is_empty() {
            return Err(EditorError::UnknownCommand(SmolStr::new(name)));
        }
        tracing::debug!(
            target: "weaver::dispatch",
            command = name,
            handlers = handlers.len(),
            depth = self.depth,
            "dispatch"
        );

        self.depth += 1;
        let mut result = None;
        for handler in handlers {
            let outcome = {
                let mut ctx = CommandContext::new(self, SmolStr::new(name));
                handler(&mut ctx, payload)
            };
            self.pump();
            match outcome {
                Ok(Some(value)) => result = Some(value),
                Ok(None) => {}
                Err(source) => {
                    self.depth -= 1;
                    return Err(handler_error(name, source));
                }
            }
        }
        self.depth -= 1;
        Ok(result)
    }

    /// Dispatch the command bound to `chord`. Returns `false` when unbound.
    pub fn dispatch_key(&mut self, chord: &KeyChord) -> Result<bool> {
        let Some(binding) = self.registry.keybinding(chord).cloned() else {
            return Ok(false);
        };
        tracing::trace!(target: "weaver::dispatch", chord = %chord, command = %binding.command, "key");
        self.dispatch(&binding.command, &binding.payload)?;
        Ok(true)
    }

    // === Steps ===

    /// Step boundary: normalize, capture the post-selection and close the
    /// pending step. Returns the new step id, if anything was recorded.
    pub fn close_step(&mut self) -> Result<Option<u64>> {
        self.pump();
        if self.history.has_pending() {
            let root = self.doc.root();
            self.normalizer
                .normalize(&mut self.doc, &self.schema, &self.config, root)?;
            self.pump();
        }
        let live = self.doc.live_selection();
        let post = self.restore_selection(live);
        Ok(self.history.commit(post))
    }

    fn close_dirty_step(&mut self) -> Result<()> {
        self.pump();
        if self.history.has_pending() {
            tracing::warn!(target: "weaver::history", "closing step left open by a failed command");
            self.close_step()?;
        }
        Ok(())
    }

    /// Roll back and drop the pending step instead of closing it.
    pub fn discard_pending_step(&mut self) -> Result<()> {
        self.pump();
        self.history.discard_pending(&mut self.doc)?;
        self.pump();
        let live = self.doc.live_selection();
        self.restore_selection(live);
        Ok(())
    }

    pub fn undo(&mut self) -> Result<bool> {
        self.close_dirty_step()?;
        let restored = self.history.undo(&mut self.doc)?;
        self.pump();
        match restored {
            Some(selection) => {
                self.restore_selection(selection);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> Result<bool> {
        self.close_dirty_step()?;
        let restored = self.history.redo(&mut self.doc)?;
        self.pump();
        match restored {
            Some(selection) => {
                self.restore_selection(selection);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn pause_history(&mut self) {
        self.pump();
        self.history.pause();
    }

    pub fn resume_history(&mut self) {
        self.pump();
        self.history.resume();
    }

    /// Undo every change since the pause (or the pending step when recording).
    pub fn revert_current_step(&mut self) -> Result<()> {
        self.pump();
        self.history.revert_current_step(&mut self.doc)?;
        self.pump();
        Ok(())
    }

    // === Normalization ===

    /// Normalize a subtree now; changes join the pending step.
    pub fn normalize(&mut self, subtree: NodeId) -> Result<bool> {
        if !self.doc.is_connected(subtree) {
            return Err(EditorError::OutOfBounds {
                node: subtree,
                offset: 0,
            });
        }
        let changed = self
            .normalizer
            .normalize(&mut self.doc, &self.schema, &self.config, subtree)?;
        self.pump();
        Ok(changed)
    }

    // === External mutations ===

    /// Adopt a change the host already made to its view of the tree.
    ///
    /// The change is applied to the document and recorded, but not echoed to
    /// mutation listeners. Returns the ids allocated for an inserted subtree,
    /// in pre-order. A change the document cannot trace is an
    /// [`EditorError::InconsistentMutation`]; the pending step is rolled back.
    pub fn observe_external(&mut self, mutation: ExternalMutation) -> Result<Vec<NodeId>> {
        self.pump();
        if self.depth == 0 {
            self.history.begin(self.doc.live_selection());
        }
        if let Err(err) = self.check_external(&mutation) {
            tracing::error!(target: "weaver::history", error = %err, "untraceable mutation");
            if let Err(rollback) = self.discard_pending_step() {
                tracing::error!(target: "weaver::history", error = %rollback, "rollback failed");
            }
            return Err(err);
        }

        self.mute_listeners = true;
        let applied = self.apply_external(mutation);
        self.pump();
        self.mute_listeners = false;
        applied
    }

    fn check_external(&self, mutation: &ExternalMutation) -> Result<()> {
        let known = |id: Option<NodeId>, what: &str| match id {
            Some(id) if self.doc.is_connected(id) => Ok(id),
            Some(id) => Err(EditorError::InconsistentMutation(format!(
                "{what} {id} is not in the document"
            ))),
            None => Err(EditorError::InconsistentMutation(format!(
                "{what} has no stable id"
            ))),
        };
        match mutation {
            ExternalMutation::Text { target, .. } => {
                let id = known(*target, "text target")?;
                if !self.doc.is_text(id) {
                    return Err(EditorError::NotAText(id));
                }
            }
            ExternalMutation::Attribute { target, .. } => {
                known(*target, "attribute target")?;
            }
            ExternalMutation::Insert { parent, before, .. } => {
                let parent = known(*parent, "insertion parent")?;
                if let Some(before) = before {
                    if self.doc.parent(*before) != Some(parent) {
                        return Err(EditorError::InconsistentMutation(format!(
                            "{before} is not a child of {parent}"
                        )));
                    }
                }
            }
            ExternalMutation::Remove { target } => {
                let id = known(*target, "removed node")?;
                if id == self.doc.root() {
                    return Err(EditorError::InconsistentMutation(
                        "the editable root was removed".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply_external(&mut self, mutation: ExternalMutation) -> Result<Vec<NodeId>> {
        match mutation {
            ExternalMutation::Text { target, text } => {
                if let Some(id) = target {
                    self.doc.set_text(id, text)?;
                }
                Ok(Vec::new())
            }
            ExternalMutation::Attribute {
                target,
                name,
                value,
            } => {
                if let Some(id) = target {
                    match value {
                        Some(value) => self.doc.set_attribute(id, &name, &value)?,
                        None => self.doc.remove_attribute(id, &name)?,
                    }
                }
                Ok(Vec::new())
            }
            ExternalMutation::Insert {
                parent,
                before,
                node,
            } => {
                let Some(parent) = parent else {
                    return Ok(Vec::new());
                };
                let fresh = serialize::unserialize_node(&mut self.doc, &node)?;
                self.doc.insert_before(parent, fresh, before)?;
                Ok(self.doc.descendants(fresh))
            }
            ExternalMutation::Remove { target } => {
                if let Some(id) = target {
                    self.doc.remove(id)?;
                }
                Ok(Vec::new())
            }
        }
    }

    // === Content ===

    pub fn serialize_node(&self, node: NodeId) -> Result<SerializedNode> {
        serialize::serialize_node(&self.doc, node)
    }

    /// Detached copy of a serialized subtree, ready to be inserted by a command.
    pub fn unserialize_node(&mut self, node: &SerializedNode) -> Result<NodeId> {
        serialize::unserialize_node(&mut self.doc, node)
    }

    /// Markup to persist, without transient content.
    pub fn content_html(&self) -> Result<String> {
        serialize::content_html(&self.doc)
    }

    /// Replace the whole content. Normalizes silently, clears history and puts
    /// the caret at the start.
    pub fn reset_content(&mut self, html: &str) -> Result<()> {
        self.history.clear();
        let root = self.doc.root();
        let normalizer = &self.normalizer;
        let schema = &self.schema;
        let config = &self.config;
        self.doc.silently(|doc| -> Result<()> {
            doc.clear();
            for node in markup::parse_fragment(doc, html)? {
                doc.append_child(root, node)?;
            }
            normalizer.normalize(doc, schema, config, root)?;
            Ok(())
        })?;
        self.doc.take_records();
        for listener in &mut self.listeners {
            listener.on_reset(&self.doc);
        }
        tracing::debug!(target: "weaver::history", bytes = html.len(), "content reset");
        let start = Position::new(self.first_leaf_block(), 0);
        self.restore_selection(Some(Selection::collapsed(start)));
        Ok(())
    }

    /// The first block that holds inline content, following first children.
    fn first_leaf_block(&self) -> NodeId {
        let mut block = self.doc.root();
        while let Some(child) = self.doc.first_child(block) {
            let enterable = self.schema.is_block(&self.doc, child)
                && !self.doc.tag(child).is_some_and(schema::is_void_tag)
                && schema::is_editable(&self.doc, child);
            if !enterable {
                break;
            }
            block = child;
        }
        block
    }
}
